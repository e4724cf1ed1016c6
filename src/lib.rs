//! cardrelay - a card-on-file payment relay for Square
//!
//! Accepts requests from mobile and web clients, forwards them to the Square
//! REST API, and keeps lightweight card metadata in a relational store.
//!
//! - **Customers**: link each application user to one Square customer
//! - **Cards**: tokenize cards on file, list and remove them
//! - **Charges**: charge a stored card or a one-time token exactly once per
//!   logical request
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cardrelay::{App, AppContext, ConfigBuilder, InMemoryCardStore, SquareClient};
//!
//! #[tokio::main]
//! async fn main() -> cardrelay::Result<()> {
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     cardrelay::init_tracing_with_config(&config);
//!
//!     let processor = Arc::new(SquareClient::new(&config.square)?);
//!     let store = Arc::new(InMemoryCardStore::new());
//!
//!     App::relay(AppContext::new(processor, store, config)).serve().await
//! }
//! ```

mod app;
mod config;
mod core;
pub mod cors;
mod error;
pub mod health;
pub mod http;
mod middleware;
pub mod payments;
pub mod routes;
pub mod square;
pub mod store;
pub mod testing;
pub mod timeout;
mod utils;

// Re-exports for public API
pub use app::{AppContext, AppContextBuilder};
pub use config::{
    Config, ConfigBuilder, DEFAULT_SQUARE_VERSION, LoggingConfig, SecurityConfig, ServerConfig,
    SquareConfig, SquareEnvironment, StoreConfig,
};
pub use core::App;
pub use cors::CorsConfig;
pub use error::{ErrorResponse, RelayError, Result, ValidationCode};
pub use health::HealthResponse;
pub use http::RouteModule;
pub use middleware::{API_KEY_HEADER, MakeRequestUuid};
pub use square::{PaymentProcessor, ProcessorReadiness, SquareClient};
#[cfg(feature = "database")]
pub use store::SeaOrmCardStore;
pub use store::{CardStore, InMemoryCardStore};
pub use timeout::TimeoutConfig;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// - `RUST_LOG`: log filter (e.g. "info", "cardrelay=debug")
/// - `CARDRELAY_LOG_JSON` or `LOG_JSON`: "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = utils::get_env_with_prefix("LOG_JSON")
        .and_then(|v| utils::parse_bool(&v))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing from the logging section of a [`Config`].
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
