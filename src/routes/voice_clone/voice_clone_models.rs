use serde::Deserialize;

#[derive(Deserialize)]
pub struct UploadSampleQuery {
    pub filename: String,
}

#[derive(Deserialize)]
pub struct StartTrainingRequest {
    pub model_name: String,
    pub sample_ids: Vec<String>,
}

/// Shared list-endpoint query: pagination plus an optional status filter.
#[derive(Deserialize)]
pub struct TaskListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Minimum number of samples for a training run.
pub const MIN_TRAINING_SAMPLES: usize = 3;
/// Total sample duration bounds for a training run, in seconds.
pub const MIN_TRAINING_SECONDS: f64 = 30.0;
pub const MAX_TRAINING_SECONDS: f64 = 600.0;
