// src/models/mod.rs

pub mod audit;
pub mod session;
pub mod task;
pub mod upload;
pub mod user;
pub mod voice_model;
