//! Live Square client implementation.
//!
//! Talks to the Square Connect v2 REST API over reqwest. One request per
//! call; the caller's idempotency key makes its own retries safe.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use super::client::{
    CreateCard, CreateCustomer, PaymentProcessor, ProcessorReadiness, StoredCardCharge,
    TokenCharge,
};
use super::types::{Card, Customer, Money, Payment};
use crate::config::{SquareConfig, SquareEnvironment};
use crate::error::{RelayError, Result};

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct CreateCustomerBody<'a> {
    idempotency_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    given_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    family_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct BillingAddressBody<'a> {
    postal_code: &'a str,
}

#[derive(Debug, Serialize)]
struct CardBody<'a> {
    customer_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cardholder_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    billing_address: Option<BillingAddressBody<'a>>,
}

#[derive(Debug, Serialize)]
struct CreateCardBody<'a> {
    idempotency_key: &'a str,
    source_id: &'a str,
    card: CardBody<'a>,
}

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    idempotency_key: &'a str,
    source_id: &'a str,
    amount_money: &'a Money,
    location_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
    autocomplete: bool,
}

#[derive(Debug, serde::Deserialize)]
struct CustomerEnvelope {
    customer: Customer,
}

#[derive(Debug, serde::Deserialize)]
struct CardEnvelope {
    card: Card,
}

#[derive(Debug, serde::Deserialize)]
struct PaymentEnvelope {
    payment: Payment,
}

// ============================================================================
// Live Square Client
// ============================================================================

/// Live Square client for production and sandbox use.
///
/// # Example
///
/// ```rust,ignore
/// use cardrelay::ConfigBuilder;
/// use cardrelay::square::SquareClient;
///
/// let config = ConfigBuilder::new().from_env().build()?;
/// let client = SquareClient::new(&config.square)?;
/// ```
#[derive(Clone)]
pub struct SquareClient {
    http: reqwest::Client,
    base_url: String,
    version: String,
    environment: SquareEnvironment,
    access_token: Option<SecretString>,
    location_id: Option<String>,
    application_id_configured: bool,
    timeout: Duration,
}

impl SquareClient {
    /// Create a client from configuration.
    ///
    /// Missing credentials are accepted here; every call then fails with a
    /// `Config` error instead of reaching the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &SquareConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("cardrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            version: config.version.clone(),
            environment: config.environment,
            access_token: config.access_token.clone().filter(|_| config.has_token()),
            location_id: config
                .location_id
                .clone()
                .filter(|_| config.has_location()),
            application_id_configured: config.application_id.is_some(),
            timeout: config.timeout(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn credentials(&self) -> Result<(&SecretString, &str)> {
        self.require_ready()?;
        match (&self.access_token, self.location_id.as_deref()) {
            (Some(token), Some(location)) => Ok((token, location)),
            _ => Err(RelayError::config("Square is not configured")),
        }
    }

    async fn post<B, R>(&self, operation: &str, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let (token, _) = self.credentials()?;
        let url = format!("{}{}", self.base_url, path);

        tracing::debug!(
            target: "cardrelay::square",
            operation = operation,
            path = path,
            "Calling Square"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(token.expose_secret())
            .header("Square-Version", &self.version)
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, operation))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(e, operation))?;

        if !status.is_success() {
            return Err(map_square_error(status, &bytes, operation));
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            RelayError::internal(format!("Square returned an unreadable {operation} response: {e}"))
        })
    }

    fn payment_body<'a>(
        &self,
        location_id: &'a str,
        idempotency_key: &'a str,
        source_id: &'a str,
        amount: &'a Money,
        customer_id: Option<&'a str>,
        note: Option<&'a str>,
    ) -> CreatePaymentBody<'a> {
        CreatePaymentBody {
            idempotency_key,
            source_id,
            amount_money: amount,
            location_id,
            customer_id,
            note,
            autocomplete: true,
        }
    }
}

// Debug implementation that doesn't expose the access token
impl std::fmt::Debug for SquareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SquareClient")
            .field("base_url", &self.base_url)
            .field("environment", &self.environment)
            .field("version", &self.version)
            .field("has_token", &self.access_token.is_some())
            .field("location_id", &self.location_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Error Mapping
// ============================================================================

/// Non-2xx responses carry Square's `errors[]` through to the caller.
fn map_square_error(status: StatusCode, bytes: &[u8], operation: &str) -> RelayError {
    let body = serde_json::from_slice::<Value>(bytes).unwrap_or_else(|_| {
        let text = String::from_utf8_lossy(bytes).trim().to_string();
        if text.is_empty() {
            Value::Null
        } else {
            Value::String(text)
        }
    });

    let first_code = body
        .get("errors")
        .and_then(|errors| errors.get(0))
        .and_then(|first| first.get("code"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    tracing::warn!(
        target: "cardrelay::square",
        operation = operation,
        status = status.as_u16(),
        code = first_code,
        "Square rejected request"
    );

    RelayError::Upstream {
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    }
}

fn map_transport_error(error: reqwest::Error, operation: &str) -> RelayError {
    tracing::error!(
        target: "cardrelay::square",
        operation = operation,
        timeout = error.is_timeout(),
        error = %error,
        "Square request failed"
    );
    error.into()
}

// ============================================================================
// PaymentProcessor Implementation
// ============================================================================

#[async_trait]
impl PaymentProcessor for SquareClient {
    fn ensure_configured(&self) -> ProcessorReadiness {
        let has_token = self.access_token.is_some();
        let has_location = self.location_id.is_some();
        ProcessorReadiness {
            ready: has_token && has_location,
            env: self.environment.as_str().to_string(),
            has_token,
            has_location,
            application_id_configured: self.application_id_configured,
            base_url: self.base_url.clone(),
        }
    }

    async fn create_customer(&self, request: CreateCustomer) -> Result<Customer> {
        let body = CreateCustomerBody {
            idempotency_key: &request.idempotency_key,
            given_name: request.given_name.as_deref(),
            family_name: request.family_name.as_deref(),
            email_address: request.email.as_deref(),
            reference_id: request.reference_id.as_deref(),
        };

        let envelope: CustomerEnvelope = self
            .post("create_customer", "/v2/customers", &body)
            .await?;
        Ok(envelope.customer)
    }

    async fn create_card_on_file(&self, request: CreateCard) -> Result<Card> {
        let body = CreateCardBody {
            idempotency_key: &request.idempotency_key,
            source_id: &request.source_id,
            card: CardBody {
                customer_id: &request.customer_id,
                cardholder_name: request.cardholder_name.as_deref(),
                billing_address: request
                    .billing_postal_code
                    .as_deref()
                    .map(|postal_code| BillingAddressBody { postal_code }),
            },
        };

        let envelope: CardEnvelope = self.post("create_card", "/v2/cards", &body).await?;
        Ok(envelope.card)
    }

    async fn charge_with_stored_card(&self, request: StoredCardCharge) -> Result<Payment> {
        let (_, location_id) = self.credentials()?;
        let body = self.payment_body(
            location_id,
            &request.idempotency_key,
            &request.card_id,
            &request.amount,
            Some(&request.customer_id),
            request.note.as_deref(),
        );

        let envelope: PaymentEnvelope = self
            .post("create_payment", "/v2/payments", &body)
            .await?;
        Ok(envelope.payment)
    }

    async fn charge_with_one_time_token(&self, request: TokenCharge) -> Result<Payment> {
        let (_, location_id) = self.credentials()?;
        let body = self.payment_body(
            location_id,
            &request.idempotency_key,
            &request.source_id,
            &request.amount,
            request.customer_id.as_deref(),
            request.note.as_deref(),
        );

        let envelope: PaymentEnvelope = self
            .post("create_payment", "/v2/payments", &body)
            .await?;
        Ok(envelope.payment)
    }

    async fn disable_card(&self, card_id: &str) -> Result<Card> {
        let path = disable_card_path(card_id);
        let envelope: CardEnvelope = self
            .post("disable_card", &path, &serde_json::json!({}))
            .await?;
        Ok(envelope.card)
    }
}

fn disable_card_path(card_id: &str) -> String {
    format!("/v2/cards/{}/disable", urlencoding::encode(card_id))
}

// ============================================================================
// Tests
// ============================================================================
