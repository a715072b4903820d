// src/services/mod.rs

pub mod engine;
pub mod jobs;
