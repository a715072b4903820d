use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use log::{info, warn};
use sqlx::MySqlPool;
use uuid::Uuid;

use super::admin_models::{
    AuditLogQuery, CleanupRequest, CreateTagRequest, ModelListQuery, OfficialModelRequest,
    PageQuery, ReviewModelRequest, UpdateRoleRequest, UpdateStatusRequest,
};
use crate::auth::{authenticate, require_admin, require_auditor};
use crate::error::ApiError;
use crate::helpers::{client_ip, page_offset, Page};
use crate::models::audit::{self, AuditEntry, AuditLog};
use crate::models::upload::Upload;
use crate::models::user::User;
use crate::models::voice_model::{
    VoiceModel, MODEL_STATUS_ACTIVE, MODEL_STATUS_INACTIVE, MODEL_TYPE_OFFICIAL, REVIEW_APPROVED,
    REVIEW_PENDING, REVIEW_REJECTED,
};
use crate::routes::respond;
use crate::services::jobs::JobQueue;
use crate::validators::{validate_model_name, validate_pagination, validate_role};

pub async fn list_models(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    query: web::Query<ModelListQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    require_auditor(pool.get_ref(), &http, &user).await?;
    let (page, per_page) = validate_pagination(query.page, query.per_page)?;

    let (total, models) = match &query.review_status {
        Some(status) => {
            if ![REVIEW_PENDING, REVIEW_APPROVED, REVIEW_REJECTED].contains(&status.as_str()) {
                return Err(ApiError::Validation(format!(
                    "Unknown review status: {}",
                    status
                )));
            }
            let total: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM voice_models WHERE review_status = ?",
            )
            .bind(status)
            .fetch_one(pool.get_ref())
            .await?;
            let models = sqlx::query_as::<_, VoiceModel>(
                "SELECT * FROM voice_models WHERE review_status = ? \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(status)
            .bind(per_page as i64)
            .bind(page_offset(page, per_page))
            .fetch_all(pool.get_ref())
            .await?;
            (total, models)
        }
        None => {
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM voice_models")
                .fetch_one(pool.get_ref())
                .await?;
            let models = sqlx::query_as::<_, VoiceModel>(
                "SELECT * FROM voice_models ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(per_page as i64)
            .bind(page_offset(page, per_page))
            .fetch_all(pool.get_ref())
            .await?;
            (total, models)
        }
    };

    Ok(respond::ok_with(
        "Models retrieved successfully",
        Page::new(models, total, page, per_page),
    ))
}

pub async fn review_model(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    path: web::Path<String>,
    req: web::Json<ReviewModelRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    require_auditor(pool.get_ref(), &http, &user).await?;

    let model = sqlx::query_as::<_, VoiceModel>("SELECT * FROM voice_models WHERE id = ?")
        .bind(path.as_str())
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or(ApiError::NotFound("Voice model"))?;

    if !model.review_open() {
        return Err(ApiError::Conflict("Model has already been reviewed".into()));
    }
    if !req.approve && req.message.as_deref().map_or(true, |m| m.trim().is_empty()) {
        return Err(ApiError::Validation(
            "A rejection must include a message for the owner".into(),
        ));
    }

    let (review_status, status) = if req.approve {
        (REVIEW_APPROVED, MODEL_STATUS_ACTIVE)
    } else {
        (REVIEW_REJECTED, MODEL_STATUS_INACTIVE)
    };

    let updated = sqlx::query(
        "UPDATE voice_models SET review_status = ?, status = ?, review_message = ?, \
         reviewed_by = ?, reviewed_at = ? WHERE id = ? AND review_status = 'pending'",
    )
    .bind(review_status)
    .bind(status)
    .bind(req.message.as_deref().map(str::trim))
    .bind(&user.id)
    .bind(Utc::now())
    .bind(&model.id)
    .execute(pool.get_ref())
    .await?;

    // A concurrent reviewer may have won the guarded update.
    if updated.rows_affected() == 0 {
        return Err(ApiError::Conflict("Model has already been reviewed".into()));
    }

    info!(
        "model {} reviewed by {}: {}",
        model.id, user.username, review_status
    );
    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("review_model", "voice_model")
            .resource_id(&model.id)
            .user_id(&user.id)
            .ip(ip.as_deref())
            .detail(review_status),
    )
    .await;

    Ok(respond::ok_with(
        "Model review recorded",
        serde_json::json!({ "review_status": review_status, "status": status }),
    ))
}

pub async fn register_official_model(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    req: web::Json<OfficialModelRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    require_admin(pool.get_ref(), &http, &user).await?;

    let name = req.name.trim();
    validate_model_name(name)?;
    if req.model_path.trim().is_empty() {
        return Err(ApiError::Validation("model_path must not be empty".into()));
    }

    let taken: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM voice_models WHERE name = ? AND model_type = ?",
    )
    .bind(name)
    .bind(MODEL_TYPE_OFFICIAL)
    .fetch_one(pool.get_ref())
    .await?;
    if taken > 0 {
        return Err(ApiError::Conflict(
            "An official model with this name already exists".into(),
        ));
    }

    let model_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO voice_models \
         (id, name, description, model_type, owner_id, model_path, status, is_public, \
          review_status, reviewed_by, reviewed_at, usage_count, created_at) \
         VALUES (?, ?, ?, ?, NULL, ?, ?, TRUE, ?, ?, ?, 0, ?)",
    )
    .bind(&model_id)
    .bind(name)
    .bind(req.description.as_deref().map(str::trim))
    .bind(MODEL_TYPE_OFFICIAL)
    .bind(req.model_path.trim())
    .bind(MODEL_STATUS_ACTIVE)
    .bind(REVIEW_APPROVED)
    .bind(&user.id)
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await?;

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("register_official_model", "voice_model")
            .resource_id(&model_id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    Ok(respond::created(
        "Official model registered",
        serde_json::json!({ "model_id": model_id }),
    ))
}

pub async fn list_users(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    require_admin(pool.get_ref(), &http, &user).await?;
    let (page, per_page) = validate_pagination(query.page, query.per_page)?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool.get_ref())
        .await?;
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(per_page as i64)
    .bind(page_offset(page, per_page))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(respond::ok_with(
        "Users retrieved successfully",
        Page::new(users, total, page, per_page),
    ))
}

pub async fn update_user_role(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    path: web::Path<String>,
    req: web::Json<UpdateRoleRequest>,
) -> Result<HttpResponse, ApiError> {
    let admin = authenticate(pool.get_ref(), &http).await?;
    require_admin(pool.get_ref(), &http, &admin).await?;

    validate_role(req.role)?;
    let user_id = path.into_inner();
    if user_id == admin.id {
        return Err(ApiError::Validation("You cannot change your own role".into()));
    }

    let updated = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
        .bind(req.role)
        .bind(&user_id)
        .execute(pool.get_ref())
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("User"));
    }

    let detail = format!("role set to {}", req.role);
    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("update_user_role", "user")
            .resource_id(&user_id)
            .user_id(&admin.id)
            .ip(ip.as_deref())
            .detail(&detail),
    )
    .await;

    Ok(respond::ok("User role updated"))
}

pub async fn update_user_status(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    path: web::Path<String>,
    req: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    let admin = authenticate(pool.get_ref(), &http).await?;
    require_admin(pool.get_ref(), &http, &admin).await?;

    let user_id = path.into_inner();
    if user_id == admin.id {
        return Err(ApiError::Validation(
            "You cannot change your own account status".into(),
        ));
    }

    let updated = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
        .bind(req.is_active)
        .bind(&user_id)
        .execute(pool.get_ref())
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("User"));
    }

    // Disabling an account kills its sessions immediately.
    if !req.is_active {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(&user_id)
            .execute(pool.get_ref())
            .await?;
    }

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("update_user_status", "user")
            .resource_id(&user_id)
            .user_id(&admin.id)
            .ip(ip.as_deref())
            .detail(if req.is_active { "activated" } else { "deactivated" }),
    )
    .await;

    Ok(respond::ok("User status updated"))
}

pub async fn list_audit_logs(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    query: web::Query<AuditLogQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    require_admin(pool.get_ref(), &http, &user).await?;
    let (page, per_page) = validate_pagination(query.page, query.per_page)?;

    let mut conditions: Vec<&str> = Vec::new();
    if query.action.is_some() {
        conditions.push("action = ?");
    }
    if query.resource_type.is_some() {
        conditions.push("resource_type = ?");
    }
    if query.user_id.is_some() {
        conditions.push("user_id = ?");
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM audit_logs{}", where_clause);
    let rows_sql = format!(
        "SELECT * FROM audit_logs{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        where_clause
    );
    let mut count_query = sqlx::query_scalar(&count_sql);
    let mut rows_query = sqlx::query_as::<_, AuditLog>(&rows_sql);
    if let Some(action) = &query.action {
        count_query = count_query.bind(action);
        rows_query = rows_query.bind(action);
    }
    if let Some(resource_type) = &query.resource_type {
        count_query = count_query.bind(resource_type);
        rows_query = rows_query.bind(resource_type);
    }
    if let Some(user_id) = &query.user_id {
        count_query = count_query.bind(user_id);
        rows_query = rows_query.bind(user_id);
    }

    let total: i64 = count_query.fetch_one(pool.get_ref()).await?;
    let logs = rows_query
        .bind(per_page as i64)
        .bind(page_offset(page, per_page))
        .fetch_all(pool.get_ref())
        .await?;

    Ok(respond::ok_with(
        "Audit logs retrieved successfully",
        Page::new(logs, total, page, per_page),
    ))
}

pub async fn statistics(
    pool: web::Data<MySqlPool>,
    queue: web::Data<JobQueue>,
    http: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    require_admin(pool.get_ref(), &http, &user).await?;

    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool.get_ref())
        .await?;
    let active_users: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active = TRUE")
            .fetch_one(pool.get_ref())
            .await?;
    let total_models: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM voice_models")
        .fetch_one(pool.get_ref())
        .await?;
    let pending_reviews: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM voice_models WHERE review_status = 'pending'",
    )
    .fetch_one(pool.get_ref())
    .await?;
    let active_clone_tasks: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM clone_tasks WHERE status IN ('pending', 'processing')",
    )
    .fetch_one(pool.get_ref())
    .await?;
    let active_tts_tasks: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tts_tasks WHERE status IN ('pending', 'processing')",
    )
    .fetch_one(pool.get_ref())
    .await?;
    let completed_tasks: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM clone_tasks WHERE status = 'completed') + \
                (SELECT COUNT(*) FROM tts_tasks WHERE status = 'completed')",
    )
    .fetch_one(pool.get_ref())
    .await?;
    let failed_tasks: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM clone_tasks WHERE status = 'failed') + \
                (SELECT COUNT(*) FROM tts_tasks WHERE status = 'failed')",
    )
    .fetch_one(pool.get_ref())
    .await?;
    let finished = completed_tasks + failed_tasks;
    let success_rate = if finished > 0 {
        Some((completed_tasks as f64 / finished as f64 * 1000.0).round() / 10.0)
    } else {
        None
    };
    let stored_bytes: Option<i64> =
        sqlx::query_scalar("SELECT SUM(file_size) FROM uploads WHERE is_deleted = FALSE")
            .fetch_one(pool.get_ref())
            .await?;

    Ok(respond::ok_with(
        "Statistics retrieved successfully",
        serde_json::json!({
            "total_users": total_users,
            "active_users": active_users,
            "total_models": total_models,
            "pending_reviews": pending_reviews,
            "active_clone_tasks": active_clone_tasks,
            "active_tts_tasks": active_tts_tasks,
            "completed_tasks": completed_tasks,
            "failed_tasks": failed_tasks,
            "task_success_rate": success_rate,
            "jobs_in_flight": queue.in_flight().await,
            "stored_bytes": stored_bytes.unwrap_or(0),
        }),
    ))
}

pub async fn cleanup(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    req: web::Json<CleanupRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    require_admin(pool.get_ref(), &http, &user).await?;

    let retention_days = req.retention_days.unwrap_or(30);
    if retention_days < 1 {
        return Err(ApiError::Validation("retention_days must be at least 1".into()));
    }
    let cutoff = Utc::now() - Duration::days(retention_days);

    let expired_sessions = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
        .bind(Utc::now())
        .execute(pool.get_ref())
        .await?
        .rows_affected();

    let stale = sqlx::query_as::<_, Upload>(
        "SELECT * FROM uploads WHERE is_deleted = TRUE AND created_at < ?",
    )
    .bind(cutoff)
    .fetch_all(pool.get_ref())
    .await?;

    let mut purged_uploads = 0u64;
    for upload in &stale {
        if let Err(e) = tokio::fs::remove_file(&upload.file_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove upload file {}: {}", upload.file_path, e);
                continue;
            }
        }
        sqlx::query("DELETE FROM uploads WHERE id = ?")
            .bind(&upload.id)
            .execute(pool.get_ref())
            .await?;
        purged_uploads += 1;
    }

    // Dead tasks past retention, with the synthesized audio they left behind.
    let dead_audio: Vec<String> = sqlx::query_scalar(
        "SELECT audio_path FROM tts_tasks \
         WHERE status IN ('failed', 'cancelled') AND created_at < ? AND audio_path IS NOT NULL",
    )
    .bind(cutoff)
    .fetch_all(pool.get_ref())
    .await?;
    for path in &dead_audio {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove audio file {}: {}", path, e);
            }
        }
    }
    let purged_tts = sqlx::query(
        "DELETE FROM tts_tasks WHERE status IN ('failed', 'cancelled') AND created_at < ?",
    )
    .bind(cutoff)
    .execute(pool.get_ref())
    .await?
    .rows_affected();
    let purged_clone = sqlx::query(
        "DELETE FROM clone_tasks WHERE status IN ('failed', 'cancelled') AND created_at < ?",
    )
    .bind(cutoff)
    .execute(pool.get_ref())
    .await?
    .rows_affected();

    info!(
        "cleanup by {}: {} sessions, {} uploads, {} tasks",
        user.username,
        expired_sessions,
        purged_uploads,
        purged_tts + purged_clone
    );
    let detail = format!(
        "{} expired sessions, {} purged uploads, {} purged tasks",
        expired_sessions,
        purged_uploads,
        purged_tts + purged_clone
    );
    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("cleanup", "system")
            .user_id(&user.id)
            .ip(ip.as_deref())
            .detail(&detail),
    )
    .await;

    Ok(respond::ok_with(
        "Cleanup completed",
        serde_json::json!({
            "expired_sessions": expired_sessions,
            "purged_uploads": purged_uploads,
            "purged_tasks": purged_tts + purged_clone,
        }),
    ))
}

pub async fn create_tag(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    req: web::Json<CreateTagRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    require_admin(pool.get_ref(), &http, &user).await?;

    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > 50 {
        return Err(ApiError::Validation(
            "Tag name must be 1-50 characters".into(),
        ));
    }
    let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE name = ?")
        .bind(name)
        .fetch_one(pool.get_ref())
        .await?;
    if taken > 0 {
        return Err(ApiError::Conflict("Tag already exists".into()));
    }

    let tag_id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO tags (id, name, description, created_at) VALUES (?, ?, ?, ?)")
        .bind(&tag_id)
        .bind(name)
        .bind(req.description.as_deref().map(str::trim))
        .bind(Utc::now())
        .execute(pool.get_ref())
        .await?;

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("create_tag", "tag")
            .resource_id(&tag_id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    Ok(respond::created(
        "Tag created",
        serde_json::json!({ "tag_id": tag_id }),
    ))
}

pub async fn delete_tag(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    require_admin(pool.get_ref(), &http, &user).await?;

    let tag_id = path.into_inner();
    sqlx::query("DELETE FROM model_tags WHERE tag_id = ?")
        .bind(&tag_id)
        .execute(pool.get_ref())
        .await?;
    let deleted = sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(&tag_id)
        .execute(pool.get_ref())
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("Tag"));
    }

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("delete_tag", "tag")
            .resource_id(&tag_id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    Ok(respond::ok("Tag deleted"))
}
