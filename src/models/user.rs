use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Permission levels. Stored as an integer so role checks stay ordered
/// (admin implies auditor implies user).
pub const ROLE_USER: i32 = 0;
pub const ROLE_AUDITOR: i32 = 1;
pub const ROLE_ADMIN: i32 = 2;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub role: i32,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role >= ROLE_ADMIN
    }

    pub fn is_auditor(&self) -> bool {
        self.role >= ROLE_AUDITOR
    }

    /// Profile view without the email, used when the caller is not the
    /// account owner.
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
            is_active: self.is_active,
            role: self.role,
            created_at: self.created_at,
            last_login_at: self.last_login_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub role: i32,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_role(role: i32) -> User {
        User {
            id: "u1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "hash".into(),
            avatar_url: None,
            is_active: true,
            role,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn roles_are_ordered() {
        assert!(!user_with_role(ROLE_USER).is_auditor());
        assert!(user_with_role(ROLE_AUDITOR).is_auditor());
        assert!(!user_with_role(ROLE_AUDITOR).is_admin());
        assert!(user_with_role(ROLE_ADMIN).is_auditor());
        assert!(user_with_role(ROLE_ADMIN).is_admin());
    }

    #[test]
    fn serialized_user_hides_password_hash() {
        let json = serde_json::to_string(&user_with_role(ROLE_USER)).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(json.contains("alice"));
    }
}
