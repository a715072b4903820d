use actix_web::web;

use super::admin::admin_handlers;
use super::auth::auth_handlers;
use super::model_management::model_handlers;
use super::tts::tts_handlers;
use super::user::user_handlers;
use super::voice_clone::voice_clone_handlers;

pub fn auth_configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .route("/register", web::post().to(auth_handlers::register))
            .route("/check-username", web::post().to(auth_handlers::check_username))
            .route("/check-email", web::post().to(auth_handlers::check_email))
            .route("/login", web::post().to(auth_handlers::login))
            .route("/logout", web::post().to(auth_handlers::logout))
            .route("/change-password", web::post().to(auth_handlers::change_password)),
    );
}

pub fn voice_clone_configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/voice-clone")
            .route("/upload-sample", web::post().to(voice_clone_handlers::upload_sample))
            .route("/start-training", web::post().to(voice_clone_handlers::start_training))
            .route("/samples", web::get().to(voice_clone_handlers::list_samples))
            .route("/samples/{sample_id}", web::delete().to(voice_clone_handlers::delete_sample))
            .route("/tasks", web::get().to(voice_clone_handlers::list_tasks))
            .route("/tasks/{task_id}", web::get().to(voice_clone_handlers::task_detail))
            .route("/tasks/{task_id}/cancel", web::post().to(voice_clone_handlers::cancel_task))
            .route("/tasks/{task_id}/retry", web::post().to(voice_clone_handlers::retry_task))
            .route("/tasks/{task_id}/result", web::get().to(voice_clone_handlers::task_result)),
    );
}

pub fn tts_configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/tts")
            .route("/generate", web::post().to(tts_handlers::generate))
            .route("/tasks", web::get().to(tts_handlers::list_tasks))
            .route("/tasks/{task_id}", web::get().to(tts_handlers::task_detail))
            .route("/tasks/{task_id}/download", web::get().to(tts_handlers::download_audio))
            .route("/models", web::get().to(tts_handlers::available_models))
            .route("/emotions", web::get().to(tts_handlers::emotions)),
    );
}

pub fn model_configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/models")
            .route("/my-models", web::get().to(model_handlers::my_models))
            .route("/tags", web::get().to(model_handlers::list_tags))
            .route("/{model_id}", web::get().to(model_handlers::model_detail))
            .route("/{model_id}", web::put().to(model_handlers::update_model))
            .route("/{model_id}", web::delete().to(model_handlers::delete_model))
            .route("/{model_id}/toggle-public", web::post().to(model_handlers::toggle_public)),
    );
}

pub fn user_configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/user")
            .route("/profile", web::get().to(user_handlers::get_profile))
            .route("/profile", web::put().to(user_handlers::update_profile))
            .route("/tasks/history", web::get().to(user_handlers::task_history))
            .route("/uploads", web::get().to(user_handlers::list_uploads))
            .route("/statistics", web::get().to(user_handlers::statistics))
            .route("/account", web::delete().to(user_handlers::delete_account)),
    );
}

pub fn admin_configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/admin")
            .route("/models", web::get().to(admin_handlers::list_models))
            .route("/models/{model_id}/review", web::post().to(admin_handlers::review_model))
            .route("/official-models", web::post().to(admin_handlers::register_official_model))
            .route("/users", web::get().to(admin_handlers::list_users))
            .route("/users/{user_id}/role", web::put().to(admin_handlers::update_user_role))
            .route("/users/{user_id}/status", web::put().to(admin_handlers::update_user_status))
            .route("/audit-logs", web::get().to(admin_handlers::list_audit_logs))
            .route("/statistics", web::get().to(admin_handlers::statistics))
            .route("/cleanup", web::post().to(admin_handlers::cleanup))
            .route("/tags", web::post().to(admin_handlers::create_tag))
            .route("/tags/{tag_id}", web::delete().to(admin_handlers::delete_tag)),
    );
}
