use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub is_persistent: bool,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry_comparison() {
        let now = Utc::now();
        let live = Session {
            session_id: "s1".into(),
            user_id: "u1".into(),
            expires_at: now + Duration::minutes(5),
            is_persistent: false,
        };
        let dead = Session {
            session_id: "s2".into(),
            user_id: "u1".into(),
            expires_at: now - Duration::minutes(5),
            is_persistent: true,
        };
        assert!(!live.is_expired(now));
        assert!(dead.is_expired(now));
    }
}
