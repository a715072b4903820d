//! HTTP client for the external voice-cloning / TTS engine.
//!
//! The engine shares storage with this backend: requests reference sample and
//! model files by path, and responses reference the artifacts the engine wrote.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("engine returned status {0}: {1}")]
    Status(u16, String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl EngineError {
    /// Transient errors worth retrying: transport failures and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Connect(_) => true,
            EngineError::Status(code, _) => *code >= 500,
            EngineError::InvalidResponse(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrainVoiceRequest<'a> {
    pub model_name: &'a str,
    pub sample_paths: &'a [String],
}

#[derive(Debug, Deserialize)]
pub struct TrainVoiceResponse {
    pub model_path: String,
}

#[derive(Debug, Serialize)]
pub struct SynthesizeRequest<'a> {
    pub model_path: &'a str,
    pub text: &'a str,
    pub emotion: &'a str,
    pub speed: f64,
    pub output_dir: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SynthesizeResponse {
    pub audio_path: String,
    pub duration_secs: f64,
    pub size_bytes: i64,
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Clone)]
pub struct EngineClient {
    base_url: String,
    client: reqwest::Client,
}

impl EngineClient {
    pub fn new(base_url: &str) -> Self {
        EngineClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn health(&self) -> Result<HealthResponse, EngineError> {
        self.get_json("/health").await
    }

    pub async fn train_voice(
        &self,
        req: &TrainVoiceRequest<'_>,
    ) -> Result<TrainVoiceResponse, EngineError> {
        self.post_json("/train", req).await
    }

    pub async fn synthesize(
        &self,
        req: &SynthesizeRequest<'_>,
    ) -> Result<SynthesizeResponse, EngineError> {
        self.post_json("/synthesize", req).await
    }

    async fn get_json<R: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<R, EngineError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Connect(e.to_string()))?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, EngineError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::Connect(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<R: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<R, EngineError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status(status.as_u16(), body));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(EngineError::Connect("refused".into()).is_retryable());
        assert!(EngineError::Status(500, "oops".into()).is_retryable());
        assert!(EngineError::Status(503, "busy".into()).is_retryable());
        assert!(!EngineError::Status(404, "missing".into()).is_retryable());
        assert!(!EngineError::Status(422, "bad".into()).is_retryable());
        assert!(!EngineError::InvalidResponse("truncated".into()).is_retryable());
    }

    #[test]
    fn base_url_is_normalized() {
        let client = EngineClient::new("http://localhost:9880/");
        assert_eq!(client.base_url, "http://localhost:9880");
    }
}
