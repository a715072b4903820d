// src/routes/mod.rs

pub mod admin;
pub mod auth;
pub mod model_management;
pub mod respond;
pub mod routes;
pub mod tts;
pub mod user;
pub mod voice_clone;
