//! Card-on-file management.

use std::sync::Arc;

use super::{idempotency, persist_or_reconcile, validation};
use crate::error::{RelayError, Result, ValidationCode};
use crate::square::{CreateCard, PaymentProcessor, token_prefix};
use crate::store::{CardRecord, CardStore, CardSummary, NewCard};

/// Input for [`CardManager::save_card`].
#[derive(Debug, Clone, Default)]
pub struct SaveCard {
    pub user_id: String,
    pub customer_id: String,
    pub nonce: String,
    pub cardholder_name: Option<String>,
    pub billing_postal_code: Option<String>,
}

/// Stores cards at Square and mirrors their metadata locally.
#[derive(Clone)]
pub struct CardManager {
    processor: Arc<dyn PaymentProcessor>,
    store: Arc<dyn CardStore>,
    disable_on_delete: bool,
}

impl CardManager {
    #[must_use]
    pub fn new(processor: Arc<dyn PaymentProcessor>, store: Arc<dyn CardStore>) -> Self {
        Self {
            processor,
            store,
            disable_on_delete: false,
        }
    }

    /// Also disable the card at Square when it is deleted locally.
    #[must_use]
    pub fn disable_on_delete(mut self, enabled: bool) -> Self {
        self.disable_on_delete = enabled;
        self
    }

    /// Attach a tokenized card to the customer and record it.
    ///
    /// Replaying a save whose card is already stored for the same user
    /// returns the stored record.
    pub async fn save_card(&self, request: SaveCard) -> Result<CardRecord> {
        let user_id = validation::require("user_id", Some(request.user_id.as_str()))?;
        let customer_id = validation::require("customer_id", Some(request.customer_id.as_str()))?;
        let nonce = validation::non_blank(Some(request.nonce.as_str())).ok_or_else(|| {
            RelayError::validation(ValidationCode::MissingNonce, "nonce is required")
        })?;

        // A linked user may only attach cards to their own customer
        if let Some(link) = self.store.find_customer_link(user_id).await? {
            if link.square_customer_id != customer_id {
                return Err(RelayError::forbidden("Customer does not belong to user"));
            }
        }

        self.processor.require_ready()?;

        tracing::debug!(
            user_id = %user_id,
            square_customer_id = %customer_id,
            nonce = %token_prefix(nonce),
            "creating card on file"
        );

        let card = self
            .processor
            .create_card_on_file(CreateCard {
                customer_id: customer_id.to_string(),
                source_id: nonce.to_string(),
                cardholder_name: validation::non_blank(request.cardholder_name.as_deref())
                    .map(String::from),
                billing_postal_code: validation::non_blank(request.billing_postal_code.as_deref())
                    .map(String::from),
                idempotency_key: idempotency::card_key(customer_id, nonce),
            })
            .await?;

        let new_card = NewCard {
            user_id: user_id.to_string(),
            square_card_id: card.id.clone(),
            square_customer_id: customer_id.to_string(),
            brand: card.card_brand.clone(),
            last4: card.last4.clone(),
            exp_month: card.exp_month,
            exp_year: card.exp_year,
            billing_zip: card
                .billing_postal_code()
                .map(String::from)
                .or_else(|| request.billing_postal_code.clone()),
            holder_name: card
                .cardholder_name
                .clone()
                .or_else(|| request.cardholder_name.clone()),
        };

        let stored = persist_or_reconcile("save_card", &card.id, || {
            self.store.insert_card(new_card.clone())
        })
        .await;

        match stored {
            Ok(record) => {
                tracing::info!(
                    user_id = %user_id,
                    square_card_id = %record.square_card_id,
                    is_default = record.is_default,
                    "card saved"
                );
                Ok(record)
            }
            Err(err) if err.is_conflict() => match self.store.get_card(&card.id).await? {
                Some(existing) if existing.user_id == user_id => {
                    tracing::info!(
                        user_id = %user_id,
                        square_card_id = %existing.square_card_id,
                        "card already stored, returning existing record"
                    );
                    Ok(existing)
                }
                _ => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Public card fields for a user, newest first.
    pub async fn list_cards(&self, user_id: Option<&str>) -> Result<Vec<CardSummary>> {
        let user_id = validation::require("user_id", user_id)?;
        let cards = self.store.list_cards(user_id).await?;
        Ok(cards.iter().map(CardRecord::summary).collect())
    }

    /// Remove a stored card.
    ///
    /// The card stays usable at Square unless disable-on-delete is enabled;
    /// a failed disable is logged and does not fail the delete.
    pub async fn delete_card(&self, user_id: Option<&str>, card_id: &str) -> Result<()> {
        let user_id = validation::require("user_id", user_id)?;
        let card_id = validation::require("card_id", Some(card_id))?;

        if !self.store.delete_card(user_id, card_id).await? {
            return Err(RelayError::not_found("Card not found"));
        }

        tracing::info!(user_id = %user_id, square_card_id = %card_id, "card deleted");

        if self.disable_on_delete {
            if let Err(err) = self.processor.disable_card(card_id).await {
                tracing::warn!(
                    square_card_id = %card_id,
                    error = %err,
                    "failed to disable card at Square after delete"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCardStore;
    use crate::testing::FakeProcessor;

    fn manager() -> (CardManager, Arc<FakeProcessor>, InMemoryCardStore) {
        let processor = Arc::new(FakeProcessor::new());
        let store = InMemoryCardStore::new();
        let manager = CardManager::new(processor.clone(), Arc::new(store.clone()));
        (manager, processor, store)
    }

    fn save(user_id: &str, nonce: &str) -> SaveCard {
        SaveCard {
            user_id: user_id.to_string(),
            customer_id: format!("cust_{user_id}"),
            nonce: nonce.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_card_is_default() {
        let (manager, _, _) = manager();

        let first = manager.save_card(save("u1", "cnon:first-card")).await.unwrap();
        let second = manager.save_card(save("u1", "cnon:second-card")).await.unwrap();

        assert!(first.is_default);
        assert!(!second.is_default);
        assert_eq!(first.brand.as_deref(), Some("VISA"));
        assert_eq!(first.last4.as_deref(), Some("1111"));
    }

    #[tokio::test]
    async fn test_replayed_save_returns_stored_record() {
        let (manager, processor, store) = manager();

        let first = manager.save_card(save("u1", "cnon:same-card")).await.unwrap();
        let again = manager.save_card(save("u1", "cnon:same-card")).await.unwrap();

        assert_eq!(first.square_card_id, again.square_card_id);
        assert_eq!(store.card_count().await, 1);
        // Same intent, same key
        let keys = processor.card_idempotency_keys();
        assert_eq!(keys[0], keys[1]);
    }

    #[tokio::test]
    async fn test_missing_fields_make_no_calls() {
        let (manager, processor, _) = manager();

        let mut request = save("u1", "cnon:card");
        request.customer_id = String::new();
        let err = manager.save_card(request).await.unwrap_err();
        assert_eq!(err.validation_code(), Some(ValidationCode::MissingField));

        let err = manager.save_card(save("u1", "  ")).await.unwrap_err();
        assert_eq!(err.validation_code(), Some(ValidationCode::MissingNonce));

        assert_eq!(processor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_foreign_customer_is_forbidden() {
        let (manager, processor, store) = manager();
        store.insert_customer_link("u1", "cust_u1").await.unwrap();

        let mut request = save("u1", "cnon:card-nonce");
        request.customer_id = "cust_someone_else".to_string();
        let err = manager.save_card(request).await.unwrap_err();

        assert!(matches!(err, RelayError::Forbidden(_)));
        assert_eq!(processor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_processor_error_is_returned_without_store_write() {
        let (manager, processor, store) = manager();
        processor.fail_next_with(RelayError::Upstream {
            operation: "create_card".to_string(),
            status: 400,
            body: serde_json::json!({"errors": [{"code": "CARD_TOKEN_USED"}]}),
        });

        let err = manager.save_card(save("u1", "cnon:used-token")).await.unwrap_err();

        assert!(matches!(err, RelayError::Upstream { .. }));
        assert_eq!(store.card_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_requires_user() {
        let (manager, _, _) = manager();
        assert!(manager.list_cards(None).await.is_err());
        assert!(manager.list_cards(Some("u1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_card_is_not_found() {
        let (manager, _, _) = manager();
        let err = manager.delete_card(Some("u1"), "ccof:nope").await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_does_not_disable_by_default() {
        let (manager, processor, _) = manager();
        let card = manager.save_card(save("u1", "cnon:delete-me")).await.unwrap();

        manager.delete_card(Some("u1"), &card.square_card_id).await.unwrap();

        assert!(processor.disabled_cards().is_empty());
    }

    #[tokio::test]
    async fn test_delete_disables_when_enabled() {
        let (manager, processor, _) = manager();
        let manager = manager.disable_on_delete(true);
        let card = manager.save_card(save("u1", "cnon:delete-me")).await.unwrap();

        processor.fail_next_with(RelayError::internal("square down"));
        manager.delete_card(Some("u1"), &card.square_card_id).await.unwrap();
        assert!(processor.disabled_cards().is_empty());

        let card = manager.save_card(save("u1", "cnon:delete-me-too")).await.unwrap();
        manager.delete_card(Some("u1"), &card.square_card_id).await.unwrap();
        assert_eq!(processor.disabled_cards(), vec![card.square_card_id]);
    }
}
