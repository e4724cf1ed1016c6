use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::AppContext;
use crate::error::Result;
use crate::http::{RouteModule, ValidatedJson};
use crate::payments::EnsureCustomer;

pub struct CustomerRoutes;

impl RouteModule for CustomerRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/customers/ensure", post(ensure_customer))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/square")
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct EnsureCustomerBody {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub given_name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub family_name: Option<String>,
    #[serde(default)]
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnsureCustomerResponse {
    pub square_customer_id: String,
}

async fn ensure_customer(
    State(ctx): State<AppContext>,
    ValidatedJson(body): ValidatedJson<EnsureCustomerBody>,
) -> Result<Json<EnsureCustomerResponse>> {
    let link = ctx
        .customers()
        .ensure_customer(EnsureCustomer {
            user_id: body.user_id.unwrap_or_default(),
            given_name: body.given_name,
            family_name: body.family_name,
            email: body.email,
        })
        .await?;

    Ok(Json(EnsureCustomerResponse {
        square_customer_id: link.square_customer_id,
    }))
}
