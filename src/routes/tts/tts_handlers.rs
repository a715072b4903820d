use std::path::Path;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::info;
use sqlx::MySqlPool;
use uuid::Uuid;

use super::tts_models::{GenerateRequest, PageQuery, TaskListQuery};
use crate::auth::authenticate;
use crate::error::ApiError;
use crate::helpers::{client_ip, estimate_audio_duration, page_offset, Page};
use crate::models::audit::{self, AuditEntry};
use crate::models::task::{tts_task_limit, TaskStatus, TtsTask};
use crate::models::voice_model::VoiceModel;
use crate::routes::respond;
use crate::services::jobs::JobQueue;
use crate::validators::{
    validate_emotion, validate_pagination, validate_speed, validate_tts_text, ALLOWED_EMOTIONS,
};

pub async fn generate(
    pool: web::Data<MySqlPool>,
    queue: web::Data<JobQueue>,
    http: HttpRequest,
    req: web::Json<GenerateRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let text = req.text.trim();
    info!("tts request from user {} ({} chars)", user.username, text.chars().count());

    validate_tts_text(text)?;
    validate_emotion(&req.emotion)?;
    validate_speed(req.speed)?;

    let model = sqlx::query_as::<_, VoiceModel>("SELECT * FROM voice_models WHERE id = ?")
        .bind(&req.model_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or(ApiError::NotFound("Voice model"))?;

    if !model.is_usable() {
        return Err(ApiError::Validation("Model is not available for use".into()));
    }
    if !model.usable_by(&user.id) {
        return Err(ApiError::Forbidden(
            "You do not have permission to use this model".into(),
        ));
    }

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tts_tasks WHERE user_id = ? AND status IN ('pending', 'processing')",
    )
    .bind(&user.id)
    .fetch_one(pool.get_ref())
    .await?;
    let limit = tts_task_limit(user.role);
    if active >= limit {
        return Err(ApiError::TaskLimit(format!(
            "Maximum concurrent synthesis tasks ({}) exceeded",
            limit
        )));
    }

    let task_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO tts_tasks \
         (id, user_id, model_id, text, emotion, speed, status, download_count, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(&task_id)
    .bind(&user.id)
    .bind(&model.id)
    .bind(text)
    .bind(&req.emotion)
    .bind(req.speed)
    .bind(TaskStatus::Pending.as_str())
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await?;

    sqlx::query("UPDATE voice_models SET usage_count = usage_count + 1 WHERE id = ?")
        .bind(&model.id)
        .execute(pool.get_ref())
        .await?;

    queue.dispatch_tts(task_id.clone());

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("generate_speech", "tts_task")
            .resource_id(&task_id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    Ok(respond::created(
        "Speech generation started",
        serde_json::json!({
            "task_id": task_id,
            "status": TaskStatus::Pending.as_str(),
            "model_id": model.id,
            "emotion": req.emotion,
            "speed": req.speed,
            "estimated_audio_duration": estimate_audio_duration(text, req.speed),
        }),
    ))
}

pub async fn list_tasks(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    query: web::Query<TaskListQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let (page, per_page) = validate_pagination(query.page, query.per_page)?;

    if let Some(status) = &query.status {
        if TaskStatus::parse(status).is_none() {
            return Err(ApiError::Validation(format!("Unknown status: {}", status)));
        }
    }

    let (total, tasks) = match &query.status {
        Some(status) => {
            let total: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM tts_tasks WHERE user_id = ? AND status = ?",
            )
            .bind(&user.id)
            .bind(status)
            .fetch_one(pool.get_ref())
            .await?;
            let tasks = sqlx::query_as::<_, TtsTask>(
                "SELECT * FROM tts_tasks WHERE user_id = ? AND status = ? \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(&user.id)
            .bind(status)
            .bind(per_page as i64)
            .bind(page_offset(page, per_page))
            .fetch_all(pool.get_ref())
            .await?;
            (total, tasks)
        }
        None => {
            let total: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM tts_tasks WHERE user_id = ?")
                    .bind(&user.id)
                    .fetch_one(pool.get_ref())
                    .await?;
            let tasks = sqlx::query_as::<_, TtsTask>(
                "SELECT * FROM tts_tasks WHERE user_id = ? \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(&user.id)
            .bind(per_page as i64)
            .bind(page_offset(page, per_page))
            .fetch_all(pool.get_ref())
            .await?;
            (total, tasks)
        }
    };

    Ok(respond::ok_with(
        "TTS tasks retrieved successfully",
        Page::new(tasks, total, page, per_page),
    ))
}

pub async fn task_detail(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let task = owned_task(pool.get_ref(), &path.into_inner(), &user.id).await?;
    Ok(respond::ok_with("TTS task retrieved successfully", task))
}

pub async fn download_audio(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let task_id = path.into_inner();
    let task = owned_task(pool.get_ref(), &task_id, &user.id).await?;

    if task.status() != TaskStatus::Completed {
        return Err(ApiError::Validation("Audio is not ready yet".into()));
    }
    let audio_path = task
        .audio_path
        .as_deref()
        .ok_or(ApiError::NotFound("Audio file"))?;

    let bytes = tokio::fs::read(audio_path).await?;

    sqlx::query("UPDATE tts_tasks SET download_count = download_count + 1 WHERE id = ?")
        .bind(&task_id)
        .execute(pool.get_ref())
        .await?;

    let filename = Path::new(audio_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("speech.wav");

    info!("user {} downloaded audio for tts task {}", user.username, task_id);
    Ok(HttpResponse::Ok()
        .content_type("audio/wav")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(bytes))
}

pub async fn available_models(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let (page, per_page) = validate_pagination(query.page, query.per_page)?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM voice_models WHERE status = 'active' AND (is_public = TRUE OR owner_id = ?)",
    )
    .bind(&user.id)
    .fetch_one(pool.get_ref())
    .await?;

    let models = sqlx::query_as::<_, VoiceModel>(
        "SELECT * FROM voice_models WHERE status = 'active' AND (is_public = TRUE OR owner_id = ?) \
         ORDER BY usage_count DESC, created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(&user.id)
    .bind(per_page as i64)
    .bind(page_offset(page, per_page))
    .fetch_all(pool.get_ref())
    .await?;

    let items: Vec<_> = models.iter().map(|m| m.to_public()).collect();
    Ok(respond::ok_with(
        "Available models retrieved successfully",
        Page::new(items, total, page, per_page),
    ))
}

pub async fn emotions() -> HttpResponse {
    respond::ok_with("Supported emotions", ALLOWED_EMOTIONS)
}

async fn owned_task(pool: &MySqlPool, task_id: &str, user_id: &str) -> Result<TtsTask, ApiError> {
    sqlx::query_as::<_, TtsTask>("SELECT * FROM tts_tasks WHERE id = ? AND user_id = ?")
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("TTS task"))
}
