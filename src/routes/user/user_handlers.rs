use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::info;
use sqlx::MySqlPool;

use super::user_models::{DeleteAccountRequest, PageQuery, UpdateProfileRequest};
use crate::auth::authenticate;
use crate::error::ApiError;
use crate::helpers::{client_ip, format_file_size, page_offset, Page};
use crate::models::audit::{self, AuditEntry};
use crate::models::task::{CloneTask, TtsTask};
use crate::models::upload::Upload;
use crate::routes::respond;
use crate::validators::{validate_email, validate_pagination};

pub async fn get_profile(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    Ok(respond::ok_with("Profile retrieved successfully", user))
}

pub async fn update_profile(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    req: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;

    if let Some(email) = &req.email {
        let email = email.trim();
        validate_email(email)?;
        let taken: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ? AND id != ?")
                .bind(email)
                .bind(&user.id)
                .fetch_one(pool.get_ref())
                .await?;
        if taken > 0 {
            return Err(ApiError::Conflict("Email is already in use".into()));
        }
        sqlx::query("UPDATE users SET email = ? WHERE id = ?")
            .bind(email)
            .bind(&user.id)
            .execute(pool.get_ref())
            .await?;
    }

    if let Some(avatar_url) = &req.avatar_url {
        sqlx::query("UPDATE users SET avatar_url = ? WHERE id = ?")
            .bind(avatar_url.trim())
            .bind(&user.id)
            .execute(pool.get_ref())
            .await?;
    }

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("update_profile", "user")
            .resource_id(&user.id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    Ok(respond::ok("Profile updated successfully"))
}

pub async fn task_history(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let (page, per_page) = validate_pagination(query.page, query.per_page)?;

    let clone_total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM clone_tasks WHERE user_id = ?")
            .bind(&user.id)
            .fetch_one(pool.get_ref())
            .await?;
    let clone_tasks = sqlx::query_as::<_, CloneTask>(
        "SELECT * FROM clone_tasks WHERE user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(&user.id)
    .bind(per_page as i64)
    .bind(page_offset(page, per_page))
    .fetch_all(pool.get_ref())
    .await?;

    let tts_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tts_tasks WHERE user_id = ?")
        .bind(&user.id)
        .fetch_one(pool.get_ref())
        .await?;
    let tts_tasks = sqlx::query_as::<_, TtsTask>(
        "SELECT * FROM tts_tasks WHERE user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(&user.id)
    .bind(per_page as i64)
    .bind(page_offset(page, per_page))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(respond::ok_with(
        "Task history retrieved successfully",
        serde_json::json!({
            "clone_tasks": Page::new(clone_tasks, clone_total, page, per_page),
            "tts_tasks": Page::new(tts_tasks, tts_total, page, per_page),
        }),
    ))
}

pub async fn list_uploads(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;
    let (page, per_page) = validate_pagination(query.page, query.per_page)?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM uploads WHERE user_id = ? AND is_deleted = FALSE",
    )
    .bind(&user.id)
    .fetch_one(pool.get_ref())
    .await?;

    let uploads = sqlx::query_as::<_, Upload>(
        "SELECT * FROM uploads WHERE user_id = ? AND is_deleted = FALSE \
         ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(&user.id)
    .bind(per_page as i64)
    .bind(page_offset(page, per_page))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(respond::ok_with(
        "Uploads retrieved successfully",
        Page::new(uploads, total, page, per_page),
    ))
}

pub async fn statistics(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;

    let upload_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM uploads WHERE user_id = ? AND is_deleted = FALSE",
    )
    .bind(&user.id)
    .fetch_one(pool.get_ref())
    .await?;
    let upload_bytes: Option<i64> = sqlx::query_scalar(
        "SELECT SUM(file_size) FROM uploads WHERE user_id = ? AND is_deleted = FALSE",
    )
    .bind(&user.id)
    .fetch_one(pool.get_ref())
    .await?;
    let upload_bytes = upload_bytes.unwrap_or(0).max(0) as u64;

    let model_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM voice_models WHERE owner_id = ?")
            .bind(&user.id)
            .fetch_one(pool.get_ref())
            .await?;
    let clone_completed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM clone_tasks WHERE user_id = ? AND status = 'completed'",
    )
    .bind(&user.id)
    .fetch_one(pool.get_ref())
    .await?;
    let tts_completed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tts_tasks WHERE user_id = ? AND status = 'completed'",
    )
    .bind(&user.id)
    .fetch_one(pool.get_ref())
    .await?;
    let clone_failed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM clone_tasks WHERE user_id = ? AND status = 'failed'",
    )
    .bind(&user.id)
    .fetch_one(pool.get_ref())
    .await?;
    let tts_failed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tts_tasks WHERE user_id = ? AND status = 'failed'",
    )
    .bind(&user.id)
    .fetch_one(pool.get_ref())
    .await?;
    let downloads: Option<i64> =
        sqlx::query_scalar("SELECT SUM(download_count) FROM tts_tasks WHERE user_id = ?")
            .bind(&user.id)
            .fetch_one(pool.get_ref())
            .await?;

    Ok(respond::ok_with(
        "Statistics retrieved successfully",
        serde_json::json!({
            "upload_count": upload_count,
            "upload_bytes": upload_bytes,
            "upload_size": format_file_size(upload_bytes),
            "model_count": model_count,
            "completed_clone_tasks": clone_completed,
            "completed_tts_tasks": tts_completed,
            "clone_success_rate": success_rate(clone_completed, clone_failed),
            "tts_success_rate": success_rate(tts_completed, tts_failed),
            "audio_downloads": downloads.unwrap_or(0),
        }),
    ))
}

/// Share of finished tasks that completed, as a percentage. None when the
/// user has no finished tasks yet.
fn success_rate(completed: i64, failed: i64) -> Option<f64> {
    let finished = completed + failed;
    if finished == 0 {
        return None;
    }
    Some((completed as f64 / finished as f64 * 1000.0).round() / 10.0)
}

pub async fn delete_account(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    req: web::Json<DeleteAccountRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;

    let ok = bcrypt::verify(&req.password, &user.password_hash)
        .map_err(|_| ApiError::Internal("Password verification failed".into()))?;
    if !ok {
        return Err(ApiError::Unauthorized("Incorrect password".into()));
    }

    // Stop in-flight work, hide the data, then lock the account out.
    for table in ["clone_tasks", "tts_tasks"] {
        let sql = format!(
            "UPDATE {} SET status = 'cancelled', completed_at = ?, \
             error_message = 'Account deleted' \
             WHERE user_id = ? AND status IN ('pending', 'processing')",
            table
        );
        sqlx::query(&sql)
            .bind(Utc::now())
            .bind(&user.id)
            .execute(pool.get_ref())
            .await?;
    }
    sqlx::query("UPDATE uploads SET is_deleted = TRUE WHERE user_id = ?")
        .bind(&user.id)
        .execute(pool.get_ref())
        .await?;
    sqlx::query("UPDATE users SET is_active = FALSE WHERE id = ?")
        .bind(&user.id)
        .execute(pool.get_ref())
        .await?;
    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(&user.id)
        .execute(pool.get_ref())
        .await?;

    info!("user {} deactivated their account", user.username);
    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("delete_account", "user")
            .resource_id(&user.id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    Ok(respond::ok("Account deactivated"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_handles_empty_history() {
        assert_eq!(success_rate(0, 0), None);
        assert_eq!(success_rate(3, 1), Some(75.0));
        assert_eq!(success_rate(0, 5), Some(0.0));
        assert_eq!(success_rate(7, 0), Some(100.0));
        assert_eq!(success_rate(1, 2), Some(33.3));
    }
}
