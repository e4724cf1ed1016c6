use super::config::TimeoutConfig;
use crate::error::RelayError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Duration;

/// The inbound time limit, or `None` when the timeout is switched off.
pub fn timeout_limit(config: &TimeoutConfig) -> Option<Duration> {
    config.enabled.then(|| config.duration())
}

/// Cancel the inner service once `limit` elapses and answer with a
/// `REQUEST_TIMEOUT` envelope.
pub async fn enforce_timeout(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            let secs = limit.as_secs();
            RelayError::timeout(format!("Request to {path} exceeded {secs}s")).into_response()
        }
    }
}
