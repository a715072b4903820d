use std::env;

/// Runtime configuration, read once at startup from the environment
/// (`.env` is loaded by `dotenv` in `main`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub engine_url: String,
    pub upload_dir: String,
    pub output_dir: String,
    pub max_concurrent_tasks: usize,
    pub session_ttl_minutes: i64,
    pub persistent_session_days: i64,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        AppConfig {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            engine_url: env_or("ENGINE_URL", "http://localhost:9880"),
            upload_dir: env_or("UPLOAD_DIR", "uploads"),
            output_dir: env_or("OUTPUT_DIR", "outputs"),
            max_concurrent_tasks: env_or("MAX_CONCURRENT_TASKS", "5")
                .parse()
                .expect("MAX_CONCURRENT_TASKS must be a number"),
            session_ttl_minutes: env_or("SESSION_TTL_MINUTES", "30")
                .parse()
                .expect("SESSION_TTL_MINUTES must be a number"),
            persistent_session_days: env_or("PERSISTENT_SESSION_DAYS", "10")
                .parse()
                .expect("PERSISTENT_SESSION_DAYS must be a number"),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", &(10 * 1024 * 1024).to_string())
                .parse()
                .expect("MAX_UPLOAD_BYTES must be a number"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
