use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const FILE_TYPE_AUDIO: &str = "audio";

/// A file uploaded by a user. Rows are soft-deleted so training tasks that
/// already reference a sample keep a usable audit trail.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Upload {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub original_filename: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub sha256: String,
    pub duration_secs: Option<f64>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}
