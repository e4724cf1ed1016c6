use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::app::AppContext;
use crate::error::RelayError;

/// Header carrying the internal API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Middleware for adding request ID to all requests
#[derive(Clone, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let request_id = Uuid::new_v4().to_string().parse().ok()?;
        Some(RequestId::new(request_id))
    }
}

/// Guard write endpoints with the internal API key.
///
/// Only `POST` and `DELETE` are checked, and only when a key is configured.
pub async fn require_api_key(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = ctx.api_key() else {
        return next.run(request).await;
    };

    let method = request.method().clone();
    if method != Method::POST && method != Method::DELETE {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !keys_match(provided, expected.expose_secret()) {
        tracing::warn!(
            method = %method,
            path = %request.uri().path(),
            key_present = !provided.is_empty(),
            "Rejected request with missing or invalid API key"
        );
        return RelayError::unauthorized("Missing or invalid API key").into_response();
    }

    next.run(request).await
}

fn keys_match(provided: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}
