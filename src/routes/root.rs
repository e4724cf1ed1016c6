use axum::{Json, Router, extract::State, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::AppContext;
use crate::http::RouteModule;

const ENDPOINTS: &[&str] = &[
    "GET /health",
    "POST /api/square/customers/ensure",
    "POST /api/cards/create",
    "GET /api/cards?user_id=...",
    "DELETE /api/cards/{card_id}?user_id=...",
    "POST /api/payments/charge",
    "POST /api/payments",
];

/// `GET /` service banner.
pub struct RootRoutes;

impl RouteModule for RootRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/", get(banner))
    }
}

#[derive(Debug, Serialize)]
struct Banner {
    service: &'static str,
    status: &'static str,
    version: &'static str,
    environment: String,
    timestamp: DateTime<Utc>,
    endpoints: &'static [&'static str],
}

async fn banner(State(ctx): State<AppContext>) -> Json<Banner> {
    Json(Banner {
        service: env!("CARGO_PKG_NAME"),
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        environment: ctx.processor.ensure_configured().env,
        timestamp: Utc::now(),
        endpoints: ENDPOINTS,
    })
}
