//! Recording fake of the Square processor.
//!
//! Behaves like Square's idempotency contract: a repeated idempotency key
//! returns the resource created the first time.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::error::{RelayError, Result};
use crate::square::{
    Card, CreateCard, CreateCustomer, Customer, Payment, PaymentProcessor, PaymentStatus,
    ProcessorReadiness, StoredCardCharge, TokenCharge,
};

/// In-process [`PaymentProcessor`] for tests and local development.
pub struct FakeProcessor {
    ready: bool,
    counter: AtomicU64,
    calls: AtomicUsize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    customers: HashMap<String, Customer>,
    cards: HashMap<String, Card>,
    payments: HashMap<String, Payment>,
    customer_requests: Vec<CreateCustomer>,
    card_requests: Vec<CreateCard>,
    stored_charges: Vec<StoredCardCharge>,
    token_charges: Vec<TokenCharge>,
    disabled: Vec<String>,
    next_error: Option<RelayError>,
    payment_status: Option<PaymentStatus>,
}

impl Default for FakeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProcessor {
    /// A configured fake that succeeds unless told otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: true,
            counter: AtomicU64::new(1),
            calls: AtomicUsize::new(0),
            state: Mutex::new(State::default()),
        }
    }

    /// A fake reporting missing credentials.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self {
            ready: false,
            ..Self::new()
        }
    }

    /// Make the next processor call fail with `error`.
    pub fn fail_next_with(&self, error: RelayError) {
        self.lock().next_error = Some(error);
    }

    /// Status given to payments created from now on.
    pub fn set_payment_status(&self, status: PaymentStatus) {
        self.lock().payment_status = Some(status);
    }

    /// Number of outbound calls attempted, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn customers_created(&self) -> usize {
        self.lock().customers.len()
    }

    pub fn payments_created(&self) -> usize {
        self.lock().payments.len()
    }

    pub fn last_customer_request(&self) -> Option<CreateCustomer> {
        self.lock().customer_requests.last().cloned()
    }

    pub fn card_idempotency_keys(&self) -> Vec<String> {
        self.lock()
            .card_requests
            .iter()
            .map(|r| r.idempotency_key.clone())
            .collect()
    }

    pub fn last_stored_charge(&self) -> Option<StoredCardCharge> {
        self.lock().stored_charges.last().cloned()
    }

    pub fn last_token_charge(&self) -> Option<TokenCharge> {
        self.lock().token_charges.last().cloned()
    }

    pub fn disabled_cards(&self) -> Vec<String> {
        self.lock().disabled.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Count the call and surface any queued failure.
    fn begin_call(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.lock().next_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn make_payment(
        &self,
        amount: &crate::square::Money,
        customer_id: Option<String>,
        note: Option<String>,
    ) -> Payment {
        let id = self.next_id("pay_test_");
        let status = self.lock().payment_status.unwrap_or(PaymentStatus::Completed);
        Payment {
            receipt_url: Some(format!("https://squareup.com/receipt/preview/{id}")),
            id,
            status,
            amount_money: amount.clone(),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            customer_id,
            note,
            extra: serde_json::Map::new(),
        }
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    fn ensure_configured(&self) -> ProcessorReadiness {
        ProcessorReadiness {
            ready: self.ready,
            env: "sandbox".to_string(),
            has_token: self.ready,
            has_location: self.ready,
            application_id_configured: false,
            base_url: "fake://square".to_string(),
        }
    }

    async fn create_customer(&self, request: CreateCustomer) -> Result<Customer> {
        self.begin_call()?;
        if let Some(existing) = self.lock().customers.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }
        let customer = Customer {
            id: self.next_id("cust_test_"),
            given_name: request.given_name.clone(),
            family_name: request.family_name.clone(),
            email_address: request.email.clone(),
            reference_id: request.reference_id.clone(),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        let mut state = self.lock();
        state.customer_requests.push(request.clone());
        Ok(state
            .customers
            .entry(request.idempotency_key)
            .or_insert(customer)
            .clone())
    }

    async fn create_card_on_file(&self, request: CreateCard) -> Result<Card> {
        self.begin_call()?;
        let id = self.next_id("ccof:test-");
        let mut state = self.lock();
        state.card_requests.push(request.clone());
        let card = state
            .cards
            .entry(request.idempotency_key.clone())
            .or_insert_with(|| Card {
                id,
                card_brand: Some("VISA".to_string()),
                last4: Some("1111".to_string()),
                exp_month: Some(12),
                exp_year: Some(2030),
                cardholder_name: request.cardholder_name.clone(),
                billing_address: request.billing_postal_code.clone().map(|postal_code| {
                    crate::square::Address {
                        postal_code: Some(postal_code),
                    }
                }),
                customer_id: Some(request.customer_id.clone()),
                enabled: true,
            });
        Ok(card.clone())
    }

    async fn charge_with_stored_card(&self, request: StoredCardCharge) -> Result<Payment> {
        self.begin_call()?;
        let payment = self.make_payment(
            &request.amount,
            Some(request.customer_id.clone()),
            request.note.clone(),
        );
        let mut state = self.lock();
        state.stored_charges.push(request.clone());
        Ok(state
            .payments
            .entry(request.idempotency_key)
            .or_insert(payment)
            .clone())
    }

    async fn charge_with_one_time_token(&self, request: TokenCharge) -> Result<Payment> {
        self.begin_call()?;
        let payment =
            self.make_payment(&request.amount, request.customer_id.clone(), request.note.clone());
        let mut state = self.lock();
        state.token_charges.push(request.clone());
        Ok(state
            .payments
            .entry(request.idempotency_key)
            .or_insert(payment)
            .clone())
    }

    async fn disable_card(&self, card_id: &str) -> Result<Card> {
        self.begin_call()?;
        let mut state = self.lock();
        let mut card = state
            .cards
            .values()
            .find(|c| c.id == card_id)
            .cloned()
            .ok_or_else(|| RelayError::Upstream {
                operation: "disable_card".to_string(),
                status: 404,
                body: serde_json::json!({"errors": [{"category": "INVALID_REQUEST_ERROR", "code": "NOT_FOUND"}]}),
            })?;
        card.enabled = false;
        state.disabled.push(card_id.to_string());
        Ok(card)
    }
}
