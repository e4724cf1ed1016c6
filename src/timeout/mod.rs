//! Request timeout middleware.
//!
//! Cancels inbound requests that exceed the configured duration and answers
//! 408 with the relay error envelope.

mod config;
mod layer;

pub use config::TimeoutConfig;
pub use layer::{enforce_timeout, timeout_limit};
