use serde::Deserialize;

fn default_emotion() -> String {
    "neutral".to_string()
}

fn default_speed() -> f64 {
    1.0
}

#[derive(Deserialize)]
pub struct GenerateRequest {
    pub text: String,
    pub model_id: String,
    #[serde(default = "default_emotion")]
    pub emotion: String,
    #[serde(default = "default_speed")]
    pub speed: f64,
}

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
