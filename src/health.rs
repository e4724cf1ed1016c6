//! Liveness and configuration readiness.
//!
//! `/health` always answers 200 while the process is up. Readiness of the
//! processor and the store is reported in the body so a deploy can go live
//! before credentials are filled in.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::AppContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub square_ready: bool,
    /// Whether the metadata store answers. Named after the hosted Postgres
    /// the relay usually runs against.
    pub supabase_ready: bool,
    pub env: String,
    pub has_token: bool,
    pub has_location: bool,
    pub application_id_configured: bool,
    pub base_url: String,
    pub store: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

pub async fn check_health(ctx: &AppContext) -> HealthResponse {
    let readiness = ctx.processor.ensure_configured();
    let store_ready = ctx.store.is_ready().await;

    if !readiness.ready || !store_ready {
        tracing::debug!(
            square_ready = readiness.ready,
            store_ready,
            "Health check reports a component not ready"
        );
    }

    HealthResponse {
        ok: true,
        square_ready: readiness.ready,
        supabase_ready: store_ready,
        env: readiness.env,
        has_token: readiness.has_token,
        has_location: readiness.has_location,
        application_id_configured: readiness.application_id_configured,
        base_url: readiness.base_url,
        store: ctx.store.backend().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    }
}

pub async fn health_handler(State(ctx): State<AppContext>) -> HealthResponse {
    check_health(&ctx).await
}

pub fn health_routes() -> Router<AppContext> {
    Router::new().route("/health", get(health_handler))
}
