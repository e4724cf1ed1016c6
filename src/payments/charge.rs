//! Charges against stored cards and one-time tokens.

use serde_json::Value;
use std::sync::Arc;

use super::{idempotency, validation};
use crate::error::{RelayError, Result, ValidationCode};
use crate::square::{
    Money, Payment, PaymentProcessor, StoredCardCharge, TokenCharge, token_prefix,
};
use crate::store::CardStore;

/// A charge as received from a caller, before validation.
///
/// `amount` stays raw JSON so both integers and numeric strings are accepted.
#[derive(Debug, Clone, Default)]
pub struct ChargeRequest {
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub card_id: Option<String>,
    pub source_id: Option<String>,
    pub amount: Option<Value>,
    pub currency: Option<String>,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
}

enum Source<'a> {
    StoredCard {
        user_id: &'a str,
        customer_id: &'a str,
        card_id: &'a str,
    },
    Token {
        source_id: &'a str,
        customer_id: Option<&'a str>,
    },
}

/// Validates and dispatches charges.
#[derive(Clone)]
pub struct ChargeManager {
    processor: Arc<dyn PaymentProcessor>,
    store: Arc<dyn CardStore>,
}

impl ChargeManager {
    #[must_use]
    pub fn new(processor: Arc<dyn PaymentProcessor>, store: Arc<dyn CardStore>) -> Self {
        Self { processor, store }
    }

    /// Validate a charge and send it to Square.
    ///
    /// Returns the processor's payment whatever its status; callers decide
    /// how to report a payment that is not `COMPLETED`.
    pub async fn charge(&self, request: &ChargeRequest) -> Result<Payment> {
        let token = match request.source_id.as_deref() {
            Some(raw) => Some(validation::validate_source_token(raw)?),
            None => None,
        };
        let card_id = validation::non_blank(request.card_id.as_deref());

        if token.is_none() && card_id.is_none() {
            return Err(missing_source());
        }

        let amount = validation::parse_amount(request.amount.as_ref())?;
        let currency = validation::normalize_currency(request.currency.as_deref())?;
        let caller_key = match request.idempotency_key.as_deref() {
            Some(key) => Some(idempotency::validate_caller_key(key)?),
            None => None,
        };
        let note = validation::non_blank(request.note.as_deref()).map(String::from);

        let source = match (card_id, token) {
            (Some(card_id), _) => Source::StoredCard {
                user_id: validation::require("user_id", request.user_id.as_deref())?,
                customer_id: validation::require("customer_id", request.customer_id.as_deref())?,
                card_id,
            },
            (None, Some(source_id)) => Source::Token {
                source_id,
                customer_id: validation::non_blank(request.customer_id.as_deref()),
            },
            (None, None) => return Err(missing_source()),
        };

        self.processor.require_ready()?;

        let money = Money::new(amount, currency);
        let payment = match source {
            Source::StoredCard {
                user_id,
                customer_id,
                card_id,
            } => {
                self.verify_ownership(user_id, customer_id, card_id).await?;

                let idempotency_key = match caller_key {
                    Some(key) => key.to_string(),
                    None => {
                        tracing::warn!(
                            user_id = %user_id,
                            square_card_id = %card_id,
                            "stored card charge without idempotency_key, client retries may double charge"
                        );
                        idempotency::random_key()
                    }
                };

                tracing::info!(
                    user_id = %user_id,
                    square_card_id = %card_id,
                    amount = money.amount,
                    currency = %money.currency,
                    "charging stored card"
                );

                self.processor
                    .charge_with_stored_card(StoredCardCharge {
                        customer_id: customer_id.to_string(),
                        card_id: card_id.to_string(),
                        amount: money,
                        note,
                        idempotency_key,
                    })
                    .await?
            }
            Source::Token {
                source_id,
                customer_id,
            } => {
                let idempotency_key = match caller_key {
                    Some(key) => key.to_string(),
                    None => {
                        idempotency::token_payment_key(source_id, money.amount, &money.currency)
                    }
                };

                tracing::info!(
                    source = %token_prefix(source_id),
                    amount = money.amount,
                    currency = %money.currency,
                    "charging one-time token"
                );

                self.processor
                    .charge_with_one_time_token(TokenCharge {
                        source_id: source_id.to_string(),
                        amount: money,
                        note,
                        customer_id: customer_id.map(String::from),
                        idempotency_key,
                    })
                    .await?
            }
        };

        tracing::info!(
            payment_id = %payment.id,
            status = payment.status.as_str(),
            "payment created"
        );

        Ok(payment)
    }

    async fn verify_ownership(
        &self,
        user_id: &str,
        customer_id: &str,
        card_id: &str,
    ) -> Result<()> {
        let owned = match self.store.get_card(card_id).await? {
            Some(card) => card.user_id == user_id && card.square_customer_id == customer_id,
            None => false,
        };
        if !owned {
            tracing::warn!(
                user_id = %user_id,
                square_card_id = %card_id,
                "charge rejected, card not owned by user"
            );
            return Err(RelayError::forbidden("Card does not belong to user"));
        }
        Ok(())
    }
}

fn missing_source() -> RelayError {
    RelayError::validation(
        ValidationCode::MissingSource,
        "Provide a card token or a stored card id",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::square::PaymentStatus;
    use crate::store::{InMemoryCardStore, NewCard};
    use crate::testing::FakeProcessor;
    use serde_json::json;

    async fn setup() -> (ChargeManager, Arc<FakeProcessor>) {
        let processor = Arc::new(FakeProcessor::new());
        let store = InMemoryCardStore::new();
        store
            .insert_card(NewCard {
                user_id: "u1".to_string(),
                square_card_id: "ccof:u1-card".to_string(),
                square_customer_id: "cust_u1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        (ChargeManager::new(processor.clone(), Arc::new(store)), processor)
    }

    fn stored(user_id: &str, card_id: &str) -> ChargeRequest {
        ChargeRequest {
            user_id: Some(user_id.to_string()),
            customer_id: Some("cust_u1".to_string()),
            card_id: Some(card_id.to_string()),
            amount: Some(json!(1000)),
            ..Default::default()
        }
    }

    fn token(source_id: &str) -> ChargeRequest {
        ChargeRequest {
            source_id: Some(source_id.to_string()),
            amount: Some(json!(1000)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_source() {
        let (manager, processor) = setup().await;
        let err = manager
            .charge(&ChargeRequest {
                amount: Some(json!(1000)),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.validation_code(), Some(ValidationCode::MissingSource));
        assert_eq!(processor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_short_token() {
        let (manager, processor) = setup().await;
        let err = manager.charge(&token("short")).await.unwrap_err();
        assert_eq!(err.validation_code(), Some(ValidationCode::MissingNonce));
        assert_eq!(processor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_amount() {
        let (manager, processor) = setup().await;
        for amount in [json!(0), json!(-100), json!("abc")] {
            let mut request = token("cnon:valid-token-123");
            request.amount = Some(amount);
            let err = manager.charge(&request).await.unwrap_err();
            assert_eq!(err.validation_code(), Some(ValidationCode::BadAmount));
        }
        assert_eq!(processor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_token_charge_uses_derived_key_and_defaults() {
        let (manager, processor) = setup().await;
        let mut request = token("cnon:valid-token-123");
        request.amount = Some(json!("1000"));

        let payment = manager.charge(&request).await.unwrap();
        assert!(payment.is_completed());

        let sent = processor.last_token_charge().unwrap();
        assert_eq!(sent.amount, Money::new(1000, "USD"));
        assert_eq!(
            sent.idempotency_key,
            idempotency::token_payment_key("cnon:valid-token-123", 1000, "USD")
        );
    }

    #[tokio::test]
    async fn test_caller_key_is_used_verbatim() {
        let (manager, processor) = setup().await;
        let mut request = stored("u1", "ccof:u1-card");
        request.idempotency_key = Some("order-42".to_string());

        manager.charge(&request).await.unwrap();

        assert_eq!(processor.last_stored_charge().unwrap().idempotency_key, "order-42");
    }

    #[tokio::test]
    async fn test_foreign_card_is_forbidden() {
        let (manager, processor) = setup().await;
        let err = manager.charge(&stored("u2", "ccof:u1-card")).await.unwrap_err();
        assert!(matches!(err, RelayError::Forbidden(_)));

        let err = manager.charge(&stored("u1", "ccof:unknown")).await.unwrap_err();
        assert!(matches!(err, RelayError::Forbidden(_)));
        assert_eq!(processor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stored_card_requires_customer() {
        let (manager, _) = setup().await;
        let mut request = stored("u1", "ccof:u1-card");
        request.customer_id = None;
        let err = manager.charge(&request).await.unwrap_err();
        assert_eq!(err.validation_code(), Some(ValidationCode::MissingField));
    }

    #[tokio::test]
    async fn test_stored_card_charge() {
        let (manager, processor) = setup().await;
        let mut request = stored("u1", "ccof:u1-card");
        request.note = Some("Top-up".to_string());
        request.currency = Some("usd".to_string());

        manager.charge(&request).await.unwrap();

        let sent = processor.last_stored_charge().unwrap();
        assert_eq!(sent.card_id, "ccof:u1-card");
        assert_eq!(sent.customer_id, "cust_u1");
        assert_eq!(sent.note.as_deref(), Some("Top-up"));
        assert_eq!(sent.amount.currency, "USD");
    }

    #[tokio::test]
    async fn test_pending_payment_is_returned() {
        let (manager, processor) = setup().await;
        processor.set_payment_status(PaymentStatus::Pending);

        let payment = manager.charge(&token("cnon:valid-token-123")).await.unwrap();

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(!payment.is_completed());
    }
}
