use actix_web::{web, HttpRequest, HttpResponse};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use log::info;
use sqlx::MySqlPool;
use uuid::Uuid;

use super::auth_models::{
    ChangePasswordRequest, CheckEmailRequest, CheckUsernameRequest, LoginRequest,
    RegisterRequest, UniquenessResponse,
};
use crate::auth::{authenticate, removal_cookie, session_cookie, SESSION_COOKIE};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::helpers::client_ip;
use crate::models::audit::{self, AuditEntry};
use crate::models::user::{User, ROLE_USER};
use crate::routes::respond;
use crate::validators::{validate_email, validate_password, validate_username};

pub async fn register(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    req: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let username = req.username.trim();
    let email = req.email.trim();
    info!("register request for username {}", username);

    validate_username(username)?;
    validate_email(email)?;
    validate_password(&req.password)?;

    let taken: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE username = ? OR email = ?",
    )
    .bind(username)
    .bind(email)
    .fetch_one(pool.get_ref())
    .await?;

    if taken > 0 {
        return Err(ApiError::Conflict("Username or email already registered".into()));
    }

    let password_hash = hash(&req.password, DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))?;

    let user_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, avatar_url, is_active, role, created_at) \
         VALUES (?, ?, ?, ?, NULL, TRUE, ?, ?)",
    )
    .bind(&user_id)
    .bind(username)
    .bind(email)
    .bind(&password_hash)
    .bind(ROLE_USER)
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await?;

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("register", "user")
            .resource_id(&user_id)
            .user_id(&user_id)
            .ip(ip.as_deref()),
    )
    .await;

    info!("user {} registered", username);
    Ok(respond::created(
        "User registered successfully",
        serde_json::json!({ "user_id": user_id, "username": username }),
    ))
}

pub async fn check_username(
    pool: web::Data<MySqlPool>,
    req: web::Json<CheckUsernameRequest>,
) -> Result<HttpResponse, ApiError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(&req.username)
        .fetch_one(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(UniquenessResponse { is_unique: count == 0 }))
}

pub async fn check_email(
    pool: web::Data<MySqlPool>,
    req: web::Json<CheckEmailRequest>,
) -> Result<HttpResponse, ApiError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_one(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(UniquenessResponse { is_unique: count == 0 }))
}

pub async fn login(
    pool: web::Data<MySqlPool>,
    config: web::Data<AppConfig>,
    http: HttpRequest,
    req: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    info!("login request for username {}", req.username);

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(&req.username)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid username or password".into()))?;

    if !user.is_active {
        return Err(ApiError::Unauthorized("User account is inactive".into()));
    }

    let valid = verify(&req.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(format!("password check failed: {}", e)))?;
    if !valid {
        let ip = client_ip(&http);
        audit::record(
            pool.get_ref(),
            AuditEntry::new("login", "user")
                .user_id(&user.id)
                .ip(ip.as_deref())
                .detail("Wrong password")
                .failed(),
        )
        .await;
        return Err(ApiError::Unauthorized("Invalid username or password".into()));
    }

    let session_id = Uuid::new_v4().to_string();
    let expires_at = if req.remember_me {
        Utc::now() + Duration::days(config.persistent_session_days)
    } else {
        Utc::now() + Duration::minutes(config.session_ttl_minutes)
    };

    // One session per user: replace any previous row, expired or not.
    let existing: Option<String> =
        sqlx::query_scalar("SELECT session_id FROM sessions WHERE user_id = ?")
            .bind(&user.id)
            .fetch_optional(pool.get_ref())
            .await?;

    if existing.is_some() {
        sqlx::query(
            "UPDATE sessions SET session_id = ?, expires_at = ?, is_persistent = ? WHERE user_id = ?",
        )
        .bind(&session_id)
        .bind(expires_at)
        .bind(req.remember_me)
        .bind(&user.id)
        .execute(pool.get_ref())
        .await?;
    } else {
        sqlx::query(
            "INSERT INTO sessions (session_id, user_id, expires_at, is_persistent) VALUES (?, ?, ?, ?)",
        )
        .bind(&session_id)
        .bind(&user.id)
        .bind(expires_at)
        .bind(req.remember_me)
        .execute(pool.get_ref())
        .await?;
    }

    sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(&user.id)
        .execute(pool.get_ref())
        .await?;

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("login", "user").user_id(&user.id).ip(ip.as_deref()),
    )
    .await;

    info!("user {} logged in", user.username);
    Ok(HttpResponse::Ok()
        .cookie(session_cookie(session_id))
        .json(serde_json::json!({
            "success": true,
            "message": "Login successful",
            "data": { "user_id": user.id, "username": user.username, "role": user.role }
        })))
}

pub async fn logout(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let session_id = http
        .cookie(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::Unauthorized("Session ID does not exist".into()))?;

    let deleted = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
        .bind(&session_id)
        .execute(pool.get_ref())
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::Unauthorized("Session not found".into()));
    }

    info!("session {} logged out", session_id);
    Ok(HttpResponse::Ok()
        .cookie(removal_cookie())
        .json(serde_json::json!({ "success": true, "message": "Logout successful" })))
}

pub async fn change_password(
    pool: web::Data<MySqlPool>,
    http: HttpRequest,
    req: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = authenticate(pool.get_ref(), &http).await?;

    let valid = verify(&req.old_password, &user.password_hash)
        .map_err(|e| ApiError::Internal(format!("password check failed: {}", e)))?;
    if !valid {
        return Err(ApiError::Unauthorized("Current password is incorrect".into()));
    }

    validate_password(&req.new_password)?;

    let password_hash = hash(&req.new_password, DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))?;

    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(&user.id)
        .execute(pool.get_ref())
        .await?;

    // Force re-login everywhere else.
    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(&user.id)
        .execute(pool.get_ref())
        .await?;

    let ip = client_ip(&http);
    audit::record(
        pool.get_ref(),
        AuditEntry::new("change_password", "user")
            .resource_id(&user.id)
            .user_id(&user.id)
            .ip(ip.as_deref()),
    )
    .await;

    info!("user {} changed password", user.username);
    Ok(respond::ok("Password changed, please log in again"))
}
