use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle shared by voice-clone training tasks and TTS tasks.
///
/// `pending -> processing -> completed | failed`
/// `pending | processing -> cancelled`
/// `failed -> pending` (retry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Processing)
    }

    pub fn can_cancel(&self) -> bool {
        self.is_active()
    }

    pub fn can_retry(&self) -> bool {
        *self == TaskStatus::Failed
    }

    pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (from, to),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
                | (Failed, Pending)
        )
    }
}

/// Concurrent-task allowances scale with the account role.
pub fn clone_task_limit(role: i32) -> i64 {
    match role {
        r if r >= crate::models::user::ROLE_ADMIN => 10,
        r if r >= crate::models::user::ROLE_AUDITOR => 5,
        _ => 2,
    }
}

pub fn tts_task_limit(role: i32) -> i64 {
    match role {
        r if r >= crate::models::user::ROLE_ADMIN => 20,
        r if r >= crate::models::user::ROLE_AUDITOR => 15,
        _ => 5,
    }
}

/// Voice-clone training task. `sample_paths` is a JSON array of upload paths,
/// mirrored in the `uploads` table.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct CloneTask {
    pub id: String,
    pub user_id: String,
    pub model_name: String,
    pub status: String,
    pub progress: i32,
    pub sample_count: i32,
    pub total_duration: f64,
    pub sample_paths: String,
    pub result_model_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl CloneTask {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::parse(&self.status).unwrap_or(TaskStatus::Failed)
    }

    pub fn sample_paths(&self) -> Vec<String> {
        serde_json::from_str(&self.sample_paths).unwrap_or_default()
    }

    /// Wall-clock processing time, if the task ever started.
    pub fn duration_seconds(&self) -> f64 {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
            (Some(start), None) => (Utc::now() - start).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        }
    }
}

/// Text-to-speech synthesis task.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct TtsTask {
    pub id: String,
    pub user_id: String,
    pub model_id: String,
    pub text: String,
    pub emotion: String,
    pub speed: f64,
    pub status: String,
    pub audio_path: Option<String>,
    pub audio_duration: Option<f64>,
    pub audio_size: Option<i64>,
    pub download_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TtsTask {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::parse(&self.status).unwrap_or(TaskStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for s in ["pending", "processing", "completed", "failed", "cancelled"] {
            assert_eq!(TaskStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(TaskStatus::parse("unknown").is_none());
    }

    #[test]
    fn active_cancel_retry_flags() {
        assert!(TaskStatus::Pending.is_active());
        assert!(TaskStatus::Processing.is_active());
        assert!(!TaskStatus::Completed.is_active());

        assert!(TaskStatus::Pending.can_cancel());
        assert!(TaskStatus::Processing.can_cancel());
        assert!(!TaskStatus::Completed.can_cancel());
        assert!(!TaskStatus::Cancelled.can_cancel());

        assert!(TaskStatus::Failed.can_retry());
        assert!(!TaskStatus::Completed.can_retry());
        assert!(!TaskStatus::Processing.can_retry());
    }

    #[test]
    fn legal_transitions() {
        use TaskStatus::*;
        assert!(TaskStatus::can_transition(Pending, Processing));
        assert!(TaskStatus::can_transition(Processing, Completed));
        assert!(TaskStatus::can_transition(Processing, Failed));
        assert!(TaskStatus::can_transition(Pending, Cancelled));
        assert!(TaskStatus::can_transition(Processing, Cancelled));
        assert!(TaskStatus::can_transition(Failed, Pending));

        assert!(!TaskStatus::can_transition(Completed, Processing));
        assert!(!TaskStatus::can_transition(Cancelled, Pending));
        assert!(!TaskStatus::can_transition(Completed, Cancelled));
    }

    #[test]
    fn task_limits_scale_with_role() {
        use crate::models::user::{ROLE_ADMIN, ROLE_AUDITOR, ROLE_USER};
        assert!(clone_task_limit(ROLE_USER) < clone_task_limit(ROLE_AUDITOR));
        assert!(clone_task_limit(ROLE_AUDITOR) < clone_task_limit(ROLE_ADMIN));
        assert!(tts_task_limit(ROLE_USER) < tts_task_limit(ROLE_ADMIN));
    }

    #[test]
    fn sample_paths_parse_json() {
        let task = CloneTask {
            id: "t1".into(),
            user_id: "u1".into(),
            model_name: "voice".into(),
            status: "pending".into(),
            progress: 0,
            sample_count: 2,
            total_duration: 42.0,
            sample_paths: r#"["a.wav","b.wav"]"#.into(),
            result_model_id: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            estimated_completion: None,
        };
        assert_eq!(task.sample_paths(), vec!["a.wav", "b.wav"]);

        let broken = CloneTask {
            sample_paths: "not json".into(),
            ..task
        };
        assert!(broken.sample_paths().is_empty());
    }
}
