use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySqlPool};
use uuid::Uuid;

pub const AUDIT_SUCCESS: &str = "success";
pub const AUDIT_FAILED: &str = "failed";

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub detail: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new audit entry. Kept as a builder-ish struct so call sites
/// only fill in what they have.
pub struct AuditEntry<'a> {
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub detail: Option<&'a str>,
    pub status: &'a str,
}

impl<'a> AuditEntry<'a> {
    pub fn new(action: &'a str, resource_type: &'a str) -> Self {
        AuditEntry {
            action,
            resource_type,
            resource_id: None,
            user_id: None,
            ip_address: None,
            detail: None,
            status: AUDIT_SUCCESS,
        }
    }

    pub fn resource_id(mut self, id: &'a str) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn user_id(mut self, id: &'a str) -> Self {
        self.user_id = Some(id);
        self
    }

    pub fn ip(mut self, ip: Option<&'a str>) -> Self {
        self.ip_address = ip;
        self
    }

    pub fn detail(mut self, detail: &'a str) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn failed(mut self) -> Self {
        self.status = AUDIT_FAILED;
        self
    }
}

/// Writes an audit row. Failures are logged and swallowed so a broken audit
/// insert never fails the request that triggered it.
pub async fn record(pool: &MySqlPool, entry: AuditEntry<'_>) {
    let result = sqlx::query(
        "INSERT INTO audit_logs \
         (id, action, resource_type, resource_id, user_id, ip_address, detail, status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(entry.action)
    .bind(entry.resource_type)
    .bind(entry.resource_id)
    .bind(entry.user_id)
    .bind(entry.ip_address)
    .bind(entry.detail)
    .bind(entry.status)
    .bind(Utc::now())
    .execute(pool)
    .await;

    if let Err(e) = result {
        log::warn!("failed to write audit log for action {}: {}", entry.action, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_builder_fills_fields() {
        let entry = AuditEntry::new("review_model", "voice_model")
            .resource_id("m1")
            .user_id("u1")
            .ip(Some("10.0.0.1"))
            .detail("approved")
            .failed();

        assert_eq!(entry.action, "review_model");
        assert_eq!(entry.resource_id, Some("m1"));
        assert_eq!(entry.user_id, Some("u1"));
        assert_eq!(entry.ip_address, Some("10.0.0.1"));
        assert_eq!(entry.status, AUDIT_FAILED);
    }
}
