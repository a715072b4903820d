pub mod tts_handlers;
pub mod tts_models;
