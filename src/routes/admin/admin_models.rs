use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ModelListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub review_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewModelRequest {
    pub approve: bool,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OfficialModelRequest {
    pub name: String,
    pub description: Option<String>,
    pub model_path: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    /// Purge soft-deleted uploads older than this many days. Defaults to 30.
    pub retention_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}
