use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::app::AppContext;
use crate::error::Result;
use crate::http::{RouteModule, ValidatedJson};
use crate::payments::ChargeRequest;
use crate::square::Payment;

pub struct PaymentRoutes;

impl RouteModule for PaymentRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/api/payments", post(create_payment))
            .route("/api/payments/charge", post(charge_stored_card))
    }
}

/// Body of `POST /api/payments/charge`.
#[derive(Debug, Deserialize, Validate)]
pub struct StoredChargeBody {
    #[serde(default)]
    pub user_id: Option<String>,
    /// Minor units, as a JSON integer or numeric string.
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub square_card_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub note: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Body of `POST /api/payments`. Either a one-time token (`source_id` or
/// `nonce`) or a stored card (`card_id` with `customer_id` and `user_id`).
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentBody {
    #[serde(default)]
    pub amount_cents: Option<Value>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub card_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub note: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoredChargeResponse {
    pub status: String,
    pub payment_id: String,
    pub receipt_url: Option<String>,
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub payment: Payment,
    pub success: bool,
}

/// A charge result: 200 when the payment completed, 402 otherwise. The body
/// is the same either way.
#[derive(Debug)]
pub struct ChargeOutcome<T> {
    pub completed: bool,
    pub body: T,
}

impl<T: Serialize> IntoResponse for ChargeOutcome<T> {
    fn into_response(self) -> Response {
        let status = if self.completed {
            StatusCode::OK
        } else {
            StatusCode::PAYMENT_REQUIRED
        };
        (status, Json(self.body)).into_response()
    }
}

fn log_outcome(payment: &Payment) {
    if !payment.is_completed() {
        tracing::warn!(
            payment_id = %payment.id,
            status = payment.status.as_str(),
            "Payment not completed"
        );
    }
}

async fn charge_stored_card(
    State(ctx): State<AppContext>,
    ValidatedJson(body): ValidatedJson<StoredChargeBody>,
) -> Result<ChargeOutcome<StoredChargeResponse>> {
    let request = ChargeRequest {
        user_id: body.user_id,
        customer_id: body.customer_id,
        card_id: body.square_card_id,
        source_id: None,
        amount: body.amount,
        currency: body.currency,
        note: body.note,
        idempotency_key: body.idempotency_key,
    };

    let payment = ctx.charges().charge(&request).await?;
    log_outcome(&payment);

    let completed = payment.is_completed();
    Ok(ChargeOutcome {
        completed,
        body: StoredChargeResponse {
            status: payment.status.as_str().to_string(),
            payment_id: payment.id,
            receipt_url: payment.receipt_url,
            success: completed,
        },
    })
}

async fn create_payment(
    State(ctx): State<AppContext>,
    ValidatedJson(body): ValidatedJson<PaymentBody>,
) -> Result<ChargeOutcome<PaymentResponse>> {
    let request = ChargeRequest {
        user_id: body.user_id,
        customer_id: body.customer_id,
        card_id: body.card_id,
        source_id: body.source_id.filter(|s| !s.trim().is_empty()).or(body.nonce),
        amount: body.amount_cents,
        currency: body.currency,
        note: body.note,
        idempotency_key: body.idempotency_key,
    };

    let payment = ctx.charges().charge(&request).await?;
    log_outcome(&payment);

    let completed = payment.is_completed();
    Ok(ChargeOutcome {
        completed,
        body: PaymentResponse {
            payment,
            success: completed,
        },
    })
}
