//! Session-cookie authentication and role gates.
//!
//! Sessions are opaque UUIDs stored in the `sessions` table and carried in an
//! `http_only` cookie. Handlers call [`authenticate`] first; admin surfaces
//! layer [`require_admin`] / [`require_auditor`] on top.

use actix_web::cookie::Cookie;
use actix_web::HttpRequest;
use chrono::Utc;
use sqlx::MySqlPool;

use crate::error::ApiError;
use crate::helpers::client_ip;
use crate::models::audit::{self, AuditEntry};
use crate::models::session::Session;
use crate::models::user::User;

pub const SESSION_COOKIE: &str = "session_id";

/// Session cookie scoped to the whole API, not just the login path.
pub fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, session_id)
        .path("/")
        .http_only(true)
        .finish()
}

/// Expired counterpart that makes the browser drop the session on logout.
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .finish();
    cookie.make_removal();
    cookie
}

/// Resolves the session cookie to an active user. Expired sessions are
/// deleted on sight.
pub async fn authenticate(pool: &MySqlPool, req: &HttpRequest) -> Result<User, ApiError> {
    let session_id = req
        .cookie(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".into()))?;

    let session =
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE session_id = ?")
            .bind(&session_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid session".into()))?;

    if session.is_expired(Utc::now()) {
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(&session_id)
            .execute(pool)
            .await?;
        return Err(ApiError::Unauthorized("Session expired".into()));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&session.user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid session".into()))?;

    if !user.is_active {
        return Err(ApiError::Unauthorized("User account is inactive".into()));
    }

    Ok(user)
}

/// Admin gate. Rejections leave an audit trail.
pub async fn require_admin(
    pool: &MySqlPool,
    req: &HttpRequest,
    user: &User,
) -> Result<(), ApiError> {
    if !user.is_admin() {
        log_denied(pool, req, user, "admin_function").await;
        return Err(ApiError::Forbidden("Administrator privileges required".into()));
    }
    Ok(())
}

/// Auditor-or-admin gate for the model review surface.
pub async fn require_auditor(
    pool: &MySqlPool,
    req: &HttpRequest,
    user: &User,
) -> Result<(), ApiError> {
    if !user.is_auditor() {
        log_denied(pool, req, user, "auditor_function").await;
        return Err(ApiError::Forbidden("Auditor privileges required".into()));
    }
    Ok(())
}

async fn log_denied(pool: &MySqlPool, req: &HttpRequest, user: &User, resource_type: &str) {
    let ip = client_ip(req);
    let detail = format!("Attempted to access {}", req.path());
    audit::record(
        pool,
        AuditEntry::new("unauthorized_access_attempt", resource_type)
            .user_id(&user.id)
            .ip(ip.as_deref())
            .detail(&detail)
            .failed(),
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::time::Duration;

    #[test]
    fn session_cookie_covers_the_whole_api() {
        let cookie = session_cookie("abc-123".into());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "abc-123");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
    }

    #[test]
    fn removal_cookie_expires_immediately() {
        let cookie = removal_cookie();
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }
}
