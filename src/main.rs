use actix_web::{web, App, HttpResponse, HttpServer};
use dotenv::dotenv;
use log::info;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};

mod auth;
mod config;
mod error;
mod helpers;
mod models;
mod routes;
mod services;
mod validators;

use config::AppConfig;
use services::engine::EngineClient;
use services::jobs::JobQueue;

async fn health(pool: web::Data<MySqlPool>, engine: web::Data<EngineClient>) -> HttpResponse {
    let database = sqlx::query("SELECT 1").execute(pool.get_ref()).await.is_ok();
    let engine_status = match engine.health().await {
        Ok(h) => h.status,
        Err(_) => "unreachable".to_string(),
    };
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "database": database,
        "engine": engine_status,
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env();

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    tokio::fs::create_dir_all(&config.output_dir).await?;

    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to create pool");

    let engine = EngineClient::new(&config.engine_url);
    let queue = JobQueue::new(
        pool.clone(),
        engine.clone(),
        config.output_dir.clone(),
        config.max_concurrent_tasks,
    );

    let bind_addr = config.bind_addr.clone();
    let max_upload_bytes = config.max_upload_bytes;
    info!("server running at http://{}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(queue.clone()))
            .app_data(web::Data::new(engine.clone()))
            .app_data(web::PayloadConfig::new(max_upload_bytes))
            .route("/", web::get().to(|| async { HttpResponse::Ok().body("Voice backend is running") }))
            .route("/health", web::get().to(health))
            .configure(routes::routes::auth_configure)
            .configure(routes::routes::voice_clone_configure)
            .configure(routes::routes::tts_configure)
            .configure(routes::routes::model_configure)
            .configure(routes::routes::user_configure)
            .configure(routes::routes::admin_configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
