//! Processor client trait and request types.

use async_trait::async_trait;
use serde::Serialize;

use super::types::{Card, Customer, Money, Payment};
use crate::error::{RelayError, Result};

/// Whether the processor has the credentials it needs.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorReadiness {
    pub ready: bool,
    pub env: String,
    pub has_token: bool,
    pub has_location: bool,
    pub application_id_configured: bool,
    pub base_url: String,
}

/// Request to create a processor customer.
#[derive(Debug, Clone, Default)]
pub struct CreateCustomer {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub reference_id: Option<String>,
    pub idempotency_key: String,
}

/// Request to attach a tokenized card to a customer.
#[derive(Debug, Clone)]
pub struct CreateCard {
    pub customer_id: String,
    pub source_id: String,
    pub cardholder_name: Option<String>,
    pub billing_postal_code: Option<String>,
    pub idempotency_key: String,
}

/// Charge against a card already on file.
#[derive(Debug, Clone)]
pub struct StoredCardCharge {
    pub customer_id: String,
    pub card_id: String,
    pub amount: Money,
    pub note: Option<String>,
    pub idempotency_key: String,
}

/// Charge against a single-use card token.
#[derive(Debug, Clone)]
pub struct TokenCharge {
    pub source_id: String,
    pub amount: Money,
    pub note: Option<String>,
    pub customer_id: Option<String>,
    pub idempotency_key: String,
}

/// Trait for payment processor operations.
///
/// Implementations make one authenticated call per method and never retry;
/// callers own idempotency keys so a retry of theirs is safe.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Report configuration state without touching the network.
    fn ensure_configured(&self) -> ProcessorReadiness;

    async fn create_customer(&self, request: CreateCustomer) -> Result<Customer>;

    async fn create_card_on_file(&self, request: CreateCard) -> Result<Card>;

    async fn charge_with_stored_card(&self, request: StoredCardCharge) -> Result<Payment>;

    async fn charge_with_one_time_token(&self, request: TokenCharge) -> Result<Payment>;

    async fn disable_card(&self, card_id: &str) -> Result<Card>;

    /// Fail with a `Config` error unless credentials are present.
    fn require_ready(&self) -> Result<()> {
        let readiness = self.ensure_configured();
        if readiness.ready {
            return Ok(());
        }
        let mut missing = Vec::new();
        if !readiness.has_token {
            missing.push("access token");
        }
        if !readiness.has_location {
            missing.push("location id");
        }
        Err(RelayError::config(format!(
            "Square is not configured: missing {}",
            missing.join(" and ")
        )))
    }
}
