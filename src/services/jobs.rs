//! Background job queue for training and synthesis work.
//!
//! Each dispatched task runs on its own tokio task; a semaphore bounds how
//! many engine calls run at once and a shared flag map lets the cancel
//! endpoints reach into running jobs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use sqlx::MySqlPool;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::models::task::{CloneTask, TaskStatus, TtsTask};
use crate::models::voice_model::{MODEL_STATUS_PENDING_REVIEW, MODEL_TYPE_USER_TRAINED, REVIEW_PENDING};
use crate::services::engine::{
    EngineClient, EngineError, SynthesizeRequest, TrainVoiceRequest,
};

pub const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 30_000;

/// Exponential backoff delay before retry `attempt` (1-based), capped.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let ms = BASE_DELAY_MS.saturating_mul(1u64 << exp).min(MAX_DELAY_MS);
    Duration::from_millis(ms)
}

#[derive(Clone)]
pub struct JobQueue {
    pool: MySqlPool,
    engine: EngineClient,
    output_dir: String,
    semaphore: Arc<Semaphore>,
    cancel_flags: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
}

impl JobQueue {
    pub fn new(pool: MySqlPool, engine: EngineClient, output_dir: String, max_concurrent: usize) -> Self {
        JobQueue {
            pool,
            engine,
            output_dir,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            cancel_flags: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of jobs currently dispatched and not yet finished.
    pub async fn in_flight(&self) -> usize {
        self.cancel_flags.lock().await.len()
    }

    /// Flags a running job for cancellation. Returns false when the job is
    /// not in flight (already finished, or never started).
    pub async fn request_cancel(&self, task_id: &str) -> bool {
        let flags = self.cancel_flags.lock().await;
        match flags.get(task_id) {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn dispatch_clone(&self, task_id: String) {
        let queue = self.clone();
        tokio::spawn(async move {
            let flag = queue.register(&task_id).await;
            if let Err(e) = queue.run_clone(&task_id, &flag).await {
                error!("clone task {} aborted: {}", task_id, e);
            }
            queue.unregister(&task_id).await;
        });
    }

    pub fn dispatch_tts(&self, task_id: String) {
        let queue = self.clone();
        tokio::spawn(async move {
            let flag = queue.register(&task_id).await;
            if let Err(e) = queue.run_tts(&task_id, &flag).await {
                error!("tts task {} aborted: {}", task_id, e);
            }
            queue.unregister(&task_id).await;
        });
    }

    async fn register(&self, task_id: &str) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .lock()
            .await
            .insert(task_id.to_string(), flag.clone());
        flag
    }

    async fn unregister(&self, task_id: &str) {
        self.cancel_flags.lock().await.remove(task_id);
    }

    async fn run_clone(&self, task_id: &str, cancel: &AtomicBool) -> Result<(), sqlx::Error> {
        // Claim the task. A concurrent cancel may have already moved it off
        // pending, in which case there is nothing to do.
        let claimed = sqlx::query(
            "UPDATE clone_tasks SET status = ?, started_at = ?, progress = 10 \
             WHERE id = ? AND status = ?",
        )
        .bind(TaskStatus::Processing.as_str())
        .bind(Utc::now())
        .bind(task_id)
        .bind(TaskStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        if claimed.rows_affected() == 0 {
            info!("clone task {} no longer pending, skipping", task_id);
            return Ok(());
        }

        let task = match sqlx::query_as::<_, CloneTask>("SELECT * FROM clone_tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?
        {
            Some(task) => task,
            None => return Ok(()),
        };

        let _permit = self.semaphore.acquire().await;
        info!("training voice model '{}' for task {}", task.model_name, task_id);

        let sample_paths = task.sample_paths();
        let request = TrainVoiceRequest {
            model_name: &task.model_name,
            sample_paths: &sample_paths,
        };

        match self
            .call_with_retry(cancel, || self.engine.train_voice(&request))
            .await
        {
            Ok(Some(trained)) => {
                let model_id = Uuid::new_v4().to_string();
                sqlx::query(
                    "INSERT INTO voice_models \
                     (id, name, description, model_type, owner_id, model_path, status, \
                      is_public, review_status, usage_count, created_at) \
                     VALUES (?, ?, NULL, ?, ?, ?, ?, FALSE, ?, 0, ?)",
                )
                .bind(&model_id)
                .bind(&task.model_name)
                .bind(MODEL_TYPE_USER_TRAINED)
                .bind(&task.user_id)
                .bind(&trained.model_path)
                .bind(MODEL_STATUS_PENDING_REVIEW)
                .bind(REVIEW_PENDING)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

                self.finish_clone(task_id, TaskStatus::Completed, Some(&model_id), None)
                    .await?;
                info!("clone task {} completed, model {}", task_id, model_id);
            }
            Ok(None) => {
                // Cancelled mid-flight. The cancel endpoint owns the row now.
                info!("clone task {} cancelled while running", task_id);
            }
            Err(e) => {
                warn!("clone task {} failed: {}", task_id, e);
                self.finish_clone(task_id, TaskStatus::Failed, None, Some(&e.to_string()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn finish_clone(
        &self,
        task_id: &str,
        status: TaskStatus,
        result_model_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let progress = if status == TaskStatus::Completed { 100 } else { 0 };
        sqlx::query(
            "UPDATE clone_tasks SET status = ?, progress = ?, result_model_id = ?, \
             error_message = ?, completed_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(progress)
        .bind(result_model_id)
        .bind(error_message)
        .bind(Utc::now())
        .bind(task_id)
        .bind(TaskStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn run_tts(&self, task_id: &str, cancel: &AtomicBool) -> Result<(), sqlx::Error> {
        let claimed = sqlx::query(
            "UPDATE tts_tasks SET status = ?, started_at = ? WHERE id = ? AND status = ?",
        )
        .bind(TaskStatus::Processing.as_str())
        .bind(Utc::now())
        .bind(task_id)
        .bind(TaskStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        if claimed.rows_affected() == 0 {
            info!("tts task {} no longer pending, skipping", task_id);
            return Ok(());
        }

        let task = match sqlx::query_as::<_, TtsTask>("SELECT * FROM tts_tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?
        {
            Some(task) => task,
            None => return Ok(()),
        };

        let model_path: Option<String> =
            sqlx::query_scalar("SELECT model_path FROM voice_models WHERE id = ?")
                .bind(&task.model_id)
                .fetch_optional(&self.pool)
                .await?;

        let model_path = match model_path {
            Some(path) => path,
            None => {
                self.finish_tts(task_id, TaskStatus::Failed, None, Some("Voice model no longer exists"))
                    .await?;
                return Ok(());
            }
        };

        let _permit = self.semaphore.acquire().await;

        let request = SynthesizeRequest {
            model_path: &model_path,
            text: &task.text,
            emotion: &task.emotion,
            speed: task.speed,
            output_dir: &self.output_dir,
        };

        match self
            .call_with_retry(cancel, || self.engine.synthesize(&request))
            .await
        {
            Ok(Some(audio)) => {
                self.finish_tts(task_id, TaskStatus::Completed, Some(&audio), None)
                    .await?;
                info!("tts task {} completed ({:.1}s audio)", task_id, audio.duration_secs);
            }
            Ok(None) => {
                info!("tts task {} cancelled while running", task_id);
            }
            Err(e) => {
                warn!("tts task {} failed: {}", task_id, e);
                self.finish_tts(task_id, TaskStatus::Failed, None, Some(&e.to_string()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn finish_tts(
        &self,
        task_id: &str,
        status: TaskStatus,
        audio: Option<&crate::services::engine::SynthesizeResponse>,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tts_tasks SET status = ?, audio_path = ?, audio_duration = ?, \
             audio_size = ?, error_message = ?, completed_at = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(audio.map(|a| a.audio_path.as_str()))
        .bind(audio.map(|a| a.duration_secs))
        .bind(audio.map(|a| a.size_bytes))
        .bind(error_message)
        .bind(Utc::now())
        .bind(task_id)
        .bind(TaskStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Runs an engine call with bounded retry. `Ok(None)` means the job was
    /// cancelled; the caller must not touch the task row in that case.
    async fn call_with_retry<T, F, Fut>(
        &self,
        cancel: &AtomicBool,
        mut call: F,
    ) -> Result<Option<T>, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, EngineError>>,
    {
        let mut attempt = 1;
        loop {
            if cancel.load(Ordering::Relaxed) {
                return Ok(None);
            }
            match call().await {
                Ok(value) => return Ok(Some(value)),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt + 1);
                    warn!(
                        "engine call failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt, MAX_ATTEMPTS, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(3), Duration::from_millis(2000));
        // never exceeds the cap, even for absurd attempt counts
        assert_eq!(backoff_delay(10), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn backoff_is_monotone() {
        for attempt in 1..12 {
            assert!(backoff_delay(attempt) <= backoff_delay(attempt + 1));
        }
    }
}
