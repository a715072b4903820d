use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const MODEL_TYPE_USER_TRAINED: &str = "user_trained";
pub const MODEL_TYPE_OFFICIAL: &str = "official";

pub const MODEL_STATUS_ACTIVE: &str = "active";
pub const MODEL_STATUS_INACTIVE: &str = "inactive";
pub const MODEL_STATUS_PENDING_REVIEW: &str = "pending_review";

pub const REVIEW_PENDING: &str = "pending";
pub const REVIEW_APPROVED: &str = "approved";
pub const REVIEW_REJECTED: &str = "rejected";

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct VoiceModel {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub model_type: String,
    pub owner_id: Option<String>,
    pub model_path: String,
    pub status: String,
    pub is_public: bool,
    pub review_status: String,
    pub review_message: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub usage_count: i32,
    pub created_at: DateTime<Utc>,
}

impl VoiceModel {
    pub fn is_official(&self) -> bool {
        self.model_type == MODEL_TYPE_OFFICIAL
    }

    pub fn is_usable(&self) -> bool {
        self.status == MODEL_STATUS_ACTIVE
    }

    /// Whether the model still awaits a review verdict.
    pub fn review_open(&self) -> bool {
        self.review_status == REVIEW_PENDING
    }

    /// Whether `user_id` may synthesize with this model.
    pub fn usable_by(&self, user_id: &str) -> bool {
        self.is_usable() && (self.is_public || self.owner_id.as_deref() == Some(user_id))
    }

    /// Catalog view: strips the on-disk path unless the caller owns the model.
    pub fn to_public(&self) -> PublicVoiceModel {
        PublicVoiceModel {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            model_type: self.model_type.clone(),
            owner_id: self.owner_id.clone(),
            status: self.status.clone(),
            is_public: self.is_public,
            review_status: self.review_status.clone(),
            usage_count: self.usage_count,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublicVoiceModel {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub model_type: String,
    pub owner_id: Option<String>,
    pub status: String,
    pub is_public: bool,
    pub review_status: String,
    pub usage_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(status: &str, is_public: bool, owner: Option<&str>) -> VoiceModel {
        VoiceModel {
            id: "m1".into(),
            name: "voice".into(),
            description: None,
            model_type: MODEL_TYPE_USER_TRAINED.into(),
            owner_id: owner.map(String::from),
            model_path: "/models/m1.pth".into(),
            status: status.into(),
            is_public,
            review_status: REVIEW_APPROVED.into(),
            review_message: None,
            reviewed_by: None,
            reviewed_at: None,
            usage_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn usable_by_owner_or_public() {
        assert!(model(MODEL_STATUS_ACTIVE, true, None).usable_by("anyone"));
        assert!(model(MODEL_STATUS_ACTIVE, false, Some("u1")).usable_by("u1"));
        assert!(!model(MODEL_STATUS_ACTIVE, false, Some("u1")).usable_by("u2"));
        assert!(!model(MODEL_STATUS_PENDING_REVIEW, true, None).usable_by("u1"));
        assert!(!model(MODEL_STATUS_INACTIVE, true, Some("u1")).usable_by("u1"));
    }

    #[test]
    fn review_is_open_only_while_pending() {
        let mut m = model(MODEL_STATUS_PENDING_REVIEW, false, Some("u1"));
        m.review_status = REVIEW_PENDING.into();
        assert!(m.review_open());

        m.review_status = REVIEW_APPROVED.into();
        assert!(!m.review_open());
        m.review_status = REVIEW_REJECTED.into();
        assert!(!m.review_open());
    }

    #[test]
    fn public_view_has_no_path() {
        let json = serde_json::to_string(&model(MODEL_STATUS_ACTIVE, true, None).to_public())
            .unwrap();
        assert!(!json.contains("model_path"));
    }
}
