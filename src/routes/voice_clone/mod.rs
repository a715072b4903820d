pub mod voice_clone_handlers;
pub mod voice_clone_models;
