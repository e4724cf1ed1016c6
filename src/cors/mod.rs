//! Cross-Origin Resource Sharing for browser payment forms.

mod config;
mod layer;

pub use config::CorsConfig;
pub use layer::build_cors_layer;
