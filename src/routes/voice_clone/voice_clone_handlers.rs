use std::path::Path;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{info, warn};
use sqlx::MySqlPool;
use uuid::Uuid;

use super::voice_clone_models::{
    PageQuery, StartTrainingRequest, TaskListQuery, UploadSampleQuery, MAX_TRAINING_SECONDS,
    MIN_TRAINING_SAMPLES, MIN_TRAINING_SECONDS,
};
use crate::auth::authenticate;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::helpers::{
    client_ip, estimate_training_completion, page_offset, sha256_hex, unique_filename, Page,
};
use crate::models::audit::{self, AuditEntry};
use crate::models::task::{clone_task_limit, CloneTask, TaskStatus};
use crate::models::upload::{Upload, FILE_TYPE_AUDIO};
use crate::models::voice_model::VoiceModel;
use crate::routes::respond;
use crate::services::jobs::JobQueue;
use crate::validators::{
    validate_audio_filename, validate_audio_size, validate_model_name, validate_pagination,
};

const SAMPLE_SUBDIR: &str = "audio_samples";

/// WAV duration from the header.
fn probe_duration(ext: &str, data: &[u8]) -> Option<f64> {
    if ext != "wav" {
        return None;
    }
    let reader = hound::WavReader::new(data).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Assumed bitrate (bits per second) for formats whose duration has to be
/// estimated from file size.
fn assumed_bitrate(ext: &str) -> f64 {
    match ext {
        // 16-bit 44.1 kHz mono PCM
        "wav" => 705_600.0,
        "flac" => 440_000.0,
        // mp3 / m4a
        _ => 128_000.0,
    }
}

/// Duration of an uploaded sample: exact for parseable WAV headers,
/// size/bitrate estimate for everything else. Every accepted upload gets a
/// duration so training validation can always sum them.
fn sample_duration(ext: &str, data: &[u8]) -> f64 {
    probe_duration(ext, data).unwrap_or_else(|| {
        let secs = data.len() as f64 * 8.0 / assumed_bitrate(ext);
        (secs * 100.0).round() / 100.0
    })
}

pub async fn upload_sample(
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    http: HttpRequest,
    query: web::Query<UploadSampleQuery>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    info!("sample upload '{}' from user {}", query.filename, user.username);

    let ext = validate_audio_filename(&query.filename)?;
    validate_audio_size(body.len(), config.max_upload_bytes)?;

    let sha256 = sha256_hex(&body);

    // Same bytes uploaded twice by the same user: hand back the existing record.
    let existing = sqlx::query_as::<_, Upload>(
        "SELECT * FROM uploads WHERE user_id = ? AND sha256 = ? AND is_deleted = FALSE",
    )
    .bind(&user.id)
    .bind(&sha256)
    .fetch_optional(pool.get_ref())
    .await?;

    if let Some(upload) = existing {
        return Ok(respond::ok_with("Sample already uploaded", upload));
    }

    let duration = sample_duration(&ext, &body);

    let filename = unique_filename(&query.filename, &format!("user_{}", &user.id[..8]));
    let dir = Path::new(&config.upload_dir).join(SAMPLE_SUBDIR);
    tokio::fs::create_dir_all(&dir).await?;
    let file_path = dir.join(&filename);
    tokio::fs::write(&file_path, &body).await?;

    let upload_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO uploads \
         (id, user_id, filename, original_filename, file_path, file_size, file_type, \
          sha256, duration_secs, is_deleted, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE, ?)",
    )
    .bind(&upload_id)
    .bind(&user.id)
    .bind(&filename)
    .bind(&query.filename)
    .bind(file_path.to_string_lossy().as_ref())
    .bind(body.len() as i64)
    .bind(FILE_TYPE_AUDIO)
    .bind(&sha256)
    .bind(duration)
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await?;

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("upload_audio_sample", "upload")
            .resource_id(&upload_id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    Ok(respond::created(
        "Audio sample uploaded successfully",
        serde_json::json!({
            "upload_id": upload_id,
            "filename": filename,
            "file_size": body.len(),
            "duration_secs": duration,
        }),
    ))
}

pub async fn start_training(
    pool: web::Data<MySqlPool>,
    queue: web::Data<JobQueue>,
    http: HttpRequest,
    req: web::Json<StartTrainingRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let model_name = req.model_name.trim();
    info!("training request '{}' from user {}", model_name, user.username);

    validate_model_name(model_name)?;

    if req.sample_ids.len() < MIN_TRAINING_SAMPLES {
        return Err(ApiError::Validation(format!(
            "At least {} audio samples are required",
            MIN_TRAINING_SAMPLES
        )));
    }

    let name_taken: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM voice_models WHERE name = ? AND owner_id = ?",
    )
    .bind(model_name)
    .bind(&user.id)
    .fetch_one(pool.get_ref())
    .await?;
    if name_taken > 0 {
        return Err(ApiError::Conflict("Model name already exists".into()));
    }

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM clone_tasks WHERE user_id = ? AND status IN ('pending', 'processing')",
    )
    .bind(&user.id)
    .fetch_one(pool.get_ref())
    .await?;
    let limit = clone_task_limit(user.role);
    if active >= limit {
        return Err(ApiError::TaskLimit(format!(
            "Maximum concurrent training tasks ({}) exceeded",
            limit
        )));
    }

    // Samples must exist, be audio, and belong to the caller.
    let placeholders = vec!["?"; req.sample_ids.len()].join(", ");
    let sql = format!(
        "SELECT * FROM uploads WHERE id IN ({}) AND user_id = ? AND file_type = ? AND is_deleted = FALSE",
        placeholders
    );
    let mut q = sqlx::query_as::<_, Upload>(&sql);
    for id in &req.sample_ids {
        q = q.bind(id);
    }
    let samples = q
        .bind(&user.id)
        .bind(FILE_TYPE_AUDIO)
        .fetch_all(pool.get_ref())
        .await?;

    if samples.len() != req.sample_ids.len() {
        return Err(ApiError::Validation(
            "Some audio samples not found or invalid".into(),
        ));
    }

    // Every upload records a duration; a NULL here is a legacy row that
    // must not silently count as zero seconds.
    let mut total_duration = 0.0;
    for sample in &samples {
        match sample.duration_secs {
            Some(secs) => total_duration += secs,
            None => {
                return Err(ApiError::Validation(format!(
                    "Sample '{}' has no recorded duration, please re-upload it",
                    sample.original_filename
                )))
            }
        }
    }
    if total_duration < MIN_TRAINING_SECONDS {
        return Err(ApiError::Validation(format!(
            "Total audio duration must be at least {} seconds",
            MIN_TRAINING_SECONDS as i64
        )));
    }
    if total_duration > MAX_TRAINING_SECONDS {
        return Err(ApiError::Validation(format!(
            "Total audio duration must not exceed {} seconds",
            MAX_TRAINING_SECONDS as i64
        )));
    }

    let sample_paths: Vec<&str> = samples.iter().map(|s| s.file_path.as_str()).collect();
    let sample_paths_json = serde_json::to_string(&sample_paths)
        .map_err(|e| ApiError::Internal(format!("failed to encode sample paths: {}", e)))?;

    let task_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO clone_tasks \
         (id, user_id, model_name, status, progress, sample_count, total_duration, \
          sample_paths, created_at, estimated_completion) \
         VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?)",
    )
    .bind(&task_id)
    .bind(&user.id)
    .bind(model_name)
    .bind(TaskStatus::Pending.as_str())
    .bind(samples.len() as i32)
    .bind(total_duration)
    .bind(&sample_paths_json)
    .bind(Utc::now())
    .bind(estimate_training_completion(samples.len() as i64, total_duration))
    .execute(pool.get_ref())
    .await?;

    queue.dispatch_clone(task_id.clone());

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("start_voice_clone_training", "clone_task")
            .resource_id(&task_id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    Ok(respond::created(
        "Voice clone training started",
        serde_json::json!({
            "task_id": task_id,
            "status": TaskStatus::Pending.as_str(),
            "sample_count": samples.len(),
            "total_duration": total_duration,
        }),
    ))
}

pub async fn list_samples(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let (page, per_page) = validate_pagination(query.page, query.per_page)?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM uploads WHERE user_id = ? AND file_type = ? AND is_deleted = FALSE",
    )
    .bind(&user.id)
    .bind(FILE_TYPE_AUDIO)
    .fetch_one(pool.get_ref())
    .await?;

    let samples = sqlx::query_as::<_, Upload>(
        "SELECT * FROM uploads WHERE user_id = ? AND file_type = ? AND is_deleted = FALSE \
         ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(&user.id)
    .bind(FILE_TYPE_AUDIO)
    .bind(per_page as i64)
    .bind(page_offset(page, per_page))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(respond::ok_with(
        "Samples retrieved successfully",
        Page::new(samples, total, page, per_page),
    ))
}

pub async fn delete_sample(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let sample_id = path.into_inner();

    let sample = sqlx::query_as::<_, Upload>(
        "SELECT * FROM uploads WHERE id = ? AND user_id = ? AND is_deleted = FALSE",
    )
    .bind(&sample_id)
    .bind(&user.id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or(ApiError::NotFound("Audio sample"))?;

    // Refuse while a pending/processing training run still reads the file.
    let active_tasks = sqlx::query_as::<_, CloneTask>(
        "SELECT * FROM clone_tasks WHERE user_id = ? AND status IN ('pending', 'processing')",
    )
    .bind(&user.id)
    .fetch_all(pool.get_ref())
    .await?;

    if active_tasks
        .iter()
        .any(|t| t.sample_paths().iter().any(|p| p == &sample.file_path))
    {
        return Err(ApiError::Conflict(
            "Sample is used by an active training task".into(),
        ));
    }

    sqlx::query("UPDATE uploads SET is_deleted = TRUE WHERE id = ?")
        .bind(&sample_id)
        .execute(pool.get_ref())
        .await?;

    if let Err(e) = tokio::fs::remove_file(&sample.file_path).await {
        warn!("failed to remove sample file {}: {}", sample.file_path, e);
    }

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("delete_audio_sample", "upload")
            .resource_id(&sample_id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    info!("user {} deleted sample {}", user.username, sample_id);
    Ok(respond::ok("Sample deleted"))
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
                "SELECT COUNT(*) FROM clone_tasks WHERE user_id = ? AND status = ?",
            )
            .bind(&user.id)
            .bind(status)
            .fetch_one(pool.get_ref())
            .await?;
            let tasks = sqlx::query_as::<_, CloneTask>(
                "SELECT * FROM clone_tasks WHERE user_id = ? AND status = ? \
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
                sqlx::query_scalar("SELECT COUNT(*) FROM clone_tasks WHERE user_id = ?")
                    .bind(&user.id)
                    .fetch_one(pool.get_ref())
                    .await?;
            let tasks = sqlx::query_as::<_, CloneTask>(
                "SELECT * FROM clone_tasks WHERE user_id = ? \
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
        "Tasks retrieved successfully",
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
    Ok(respond::ok_with("Task retrieved successfully", task))
}

pub async fn cancel_task(
    pool: web::Data<MySqlPool>,
    queue: web::Data<JobQueue>,
    http: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let task_id = path.into_inner();
    let task = owned_task(pool.get_ref(), &task_id, &user.id).await?;

    if !task.status().can_cancel() {
        return Err(ApiError::Validation(format!(
            "Task in status '{}' cannot be cancelled",
            task.status
        )));
    }

    // Flag the running job first so it stops touching the row, then write
    // the terminal state.
    queue.request_cancel(&task_id).await;

    sqlx::query(
        "UPDATE clone_tasks SET status = ?, completed_at = ?, error_message = ? \
         WHERE id = ? AND status IN ('pending', 'processing')",
    )
    .bind(TaskStatus::Cancelled.as_str())
    .bind(Utc::now())
    .bind("Cancelled by user")
    .bind(&task_id)
    .execute(pool.get_ref())
    .await?;

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("cancel_clone_task", "clone_task")
            .resource_id(&task_id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    info!("user {} cancelled clone task {}", user.username, task_id);
    Ok(respond::ok("Task cancelled"))
}

pub async fn retry_task(
    pool: web::Data<MySqlPool>,
    queue: web::Data<JobQueue>,
    http: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let task_id = path.into_inner();
    let task = owned_task(pool.get_ref(), &task_id, &user.id).await?;

    if !task.status().can_retry() {
        return Err(ApiError::Validation("Only failed tasks can be retried".into()));
    }

    let reset = sqlx::query(
        "UPDATE clone_tasks SET status = ?, progress = 0, error_message = NULL, \
         started_at = NULL, completed_at = NULL WHERE id = ? AND status = ?",
    )
    .bind(TaskStatus::Pending.as_str())
    .bind(&task_id)
    .bind(TaskStatus::Failed.as_str())
    .execute(pool.get_ref())
    .await?;

    if reset.rows_affected() == 0 {
        return Err(ApiError::Conflict("Task state changed, retry aborted".into()));
    }

    queue.dispatch_clone(task_id.clone());

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("retry_clone_task", "clone_task")
            .resource_id(&task_id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    info!("user {} retried clone task {}", user.username, task_id);
    Ok(respond::ok("Task queued for retry"))
}

pub async fn task_result(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let task = owned_task(pool.get_ref(), &path.into_inner(), &user.id).await?;

    if task.status() != TaskStatus::Completed {
        return Err(ApiError::Validation("Task has not completed".into()));
    }

    let model_id = task
        .result_model_id
        .as_deref()
        .ok_or(ApiError::NotFound("Result model"))?;

    let model = sqlx::query_as::<_, VoiceModel>("SELECT * FROM voice_models WHERE id = ?")
        .bind(model_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or(ApiError::NotFound("Result model"))?;

    Ok(respond::ok_with("Training result", model.to_public()))
}

async fn owned_task(pool: &MySqlPool, task_id: &str, user_id: &str) -> Result<CloneTask, ApiError> {
    sqlx::query_as::<_, CloneTask>("SELECT * FROM clone_tasks WHERE id = ? AND user_id = ?")
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Voice clone task"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_bytes(sample_rate: u32, samples: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut buf, spec).unwrap();
            for i in 0..samples {
                writer.write_sample((i % 128) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn wav_duration_from_header() {
        // 16000 samples at 8kHz = 2 seconds
        let data = wav_bytes(8000, 16000);
        let duration = probe_duration("wav", &data).unwrap();
        assert!((duration - 2.0).abs() < 1e-9);
    }

    #[test]
    fn non_wav_and_garbage_are_not_header_probed() {
        assert!(probe_duration("mp3", b"whatever").is_none());
        assert!(probe_duration("wav", b"not a riff header").is_none());
    }

    #[test]
    fn every_accepted_format_gets_a_duration() {
        // 160000 bytes of mp3 at the assumed 128 kbps = 10 seconds
        let mp3 = vec![0u8; 160_000];
        assert!((sample_duration("mp3", &mp3) - 10.0).abs() < 1e-9);

        // compressed formats estimate longer than raw PCM of the same size
        let bytes = vec![0u8; 100_000];
        assert!(sample_duration("flac", &bytes) > sample_duration("wav", &bytes));
        assert!(sample_duration("m4a", &bytes) > sample_duration("flac", &bytes));

        // a wav with a broken header still gets a size-based estimate
        assert!(sample_duration("wav", b"not a riff header") > 0.0);

        // a parseable wav header wins over the estimate
        let data = wav_bytes(8000, 16000);
        assert!((sample_duration("wav", &data) - 2.0).abs() < 1e-9);
    }
}
