//! Customer management.
//!
//! Links application users to Square customers, creating the customer on
//! first use.

use std::sync::Arc;

use super::{idempotency, persist_or_reconcile, validation};
use crate::error::Result;
use crate::square::{CreateCustomer, PaymentProcessor};
use crate::store::{CardStore, CustomerLink};

/// Input for [`CustomerManager::ensure_customer`].
#[derive(Debug, Clone, Default)]
pub struct EnsureCustomer {
    pub user_id: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
}

/// Customer management operations.
#[derive(Clone)]
pub struct CustomerManager {
    processor: Arc<dyn PaymentProcessor>,
    store: Arc<dyn CardStore>,
}

impl CustomerManager {
    #[must_use]
    pub fn new(processor: Arc<dyn PaymentProcessor>, store: Arc<dyn CardStore>) -> Self {
        Self { processor, store }
    }

    /// Get the user's Square customer, creating and linking one if needed.
    ///
    /// Repeated calls for a user return the same customer. A concurrent
    /// caller that links first wins and its link is returned.
    pub async fn ensure_customer(&self, request: EnsureCustomer) -> Result<CustomerLink> {
        let user_id = validation::require("user_id", Some(request.user_id.as_str()))?;

        if let Some(link) = self.store.find_customer_link(user_id).await? {
            tracing::debug!(
                user_id = %user_id,
                square_customer_id = %link.square_customer_id,
                "customer already linked"
            );
            return Ok(link);
        }

        self.processor.require_ready()?;

        let given_name = validation::non_blank(request.given_name.as_deref());
        let family_name = validation::non_blank(request.family_name.as_deref());
        let email = validation::non_blank(request.email.as_deref());

        let customer = self
            .processor
            .create_customer(CreateCustomer {
                given_name: given_name.map(String::from),
                family_name: family_name.map(String::from),
                email: email.map(String::from),
                reference_id: Some(user_id.to_string()),
                idempotency_key: idempotency::customer_key(user_id, given_name, family_name, email),
            })
            .await?;

        let stored = persist_or_reconcile("ensure_customer", &customer.id, || {
            self.store.insert_customer_link(user_id, &customer.id)
        })
        .await;

        match stored {
            Ok(link) => {
                tracing::info!(
                    user_id = %user_id,
                    square_customer_id = %link.square_customer_id,
                    "customer linked"
                );
                Ok(link)
            }
            Err(err) if err.is_conflict() => {
                match self.store.find_customer_link(user_id).await? {
                    Some(link) => {
                        tracing::info!(
                            user_id = %user_id,
                            square_customer_id = %link.square_customer_id,
                            "customer linked concurrently, using existing link"
                        );
                        Ok(link)
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Linked customer id without creating one.
    pub async fn customer_id(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .find_customer_link(user_id)
            .await?
            .map(|link| link.square_customer_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::store::InMemoryCardStore;
    use crate::testing::FakeProcessor;

    fn manager() -> (CustomerManager, Arc<FakeProcessor>, InMemoryCardStore) {
        let processor = Arc::new(FakeProcessor::new());
        let store = InMemoryCardStore::new();
        let manager = CustomerManager::new(processor.clone(), Arc::new(store.clone()));
        (manager, processor, store)
    }

    fn ensure(user_id: &str) -> EnsureCustomer {
        EnsureCustomer {
            user_id: user_id.to_string(),
            email: Some("a@b.com".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_creates_and_links_customer() {
        let (manager, processor, store) = manager();

        let link = manager.ensure_customer(ensure("u1")).await.unwrap();

        assert_eq!(processor.customers_created(), 1);
        assert_eq!(store.link_count().await, 1);
        assert_eq!(
            manager.customer_id("u1").await.unwrap(),
            Some(link.square_customer_id)
        );
        let request = processor.last_customer_request().unwrap();
        assert_eq!(request.reference_id.as_deref(), Some("u1"));
        assert_eq!(request.email.as_deref(), Some("a@b.com"));
    }

    #[tokio::test]
    async fn test_second_call_reuses_link() {
        let (manager, processor, _) = manager();

        let first = manager.ensure_customer(ensure("u1")).await.unwrap();
        let second = manager.ensure_customer(ensure("u1")).await.unwrap();

        assert_eq!(first.square_customer_id, second.square_customer_id);
        assert_eq!(processor.customers_created(), 1);
    }

    #[tokio::test]
    async fn test_idempotency_key_is_stable_per_user() {
        let (manager, processor, store) = manager();
        manager.ensure_customer(ensure("u1")).await.unwrap();
        let first_key = processor.last_customer_request().unwrap().idempotency_key;

        // Pretend the link was lost and the client retried
        let fresh = CustomerManager::new(processor.clone(), Arc::new(InMemoryCardStore::new()));
        fresh.ensure_customer(ensure("u1")).await.unwrap();
        let second_key = processor.last_customer_request().unwrap().idempotency_key;

        assert_eq!(first_key, second_key);
        assert_eq!(store.link_count().await, 1);
    }

    #[tokio::test]
    async fn test_processor_failure_stores_nothing() {
        let (manager, processor, store) = manager();
        processor.fail_next_with(RelayError::Upstream {
            operation: "create_customer".to_string(),
            status: 400,
            body: serde_json::json!({"errors": [{"code": "INVALID_EMAIL_ADDRESS"}]}),
        });

        let err = manager.ensure_customer(ensure("u1")).await.unwrap_err();

        assert!(matches!(err, RelayError::Upstream { status: 400, .. }));
        assert_eq!(store.link_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_user_id() {
        let (manager, processor, _) = manager();
        let err = manager.ensure_customer(ensure(" ")).await.unwrap_err();
        assert!(matches!(err, RelayError::Validation { .. }));
        assert_eq!(processor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_processor() {
        let processor = Arc::new(FakeProcessor::unconfigured());
        let manager = CustomerManager::new(processor.clone(), Arc::new(InMemoryCardStore::new()));
        let err = manager.ensure_customer(ensure("u1")).await.unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
        assert_eq!(processor.call_count(), 0);
    }
}
