pub mod model_handlers;
pub mod model_models;
