use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{CardRecord, CardStore, CustomerLink, NewCard};
use crate::error::{RelayError, Result};

/// In-memory card store for development and tests.
///
/// Cards are kept in insertion order; the default-card decision and the
/// insert happen under one write lock.
#[derive(Clone, Default)]
pub struct InMemoryCardStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    links: RwLock<Vec<CustomerLink>>,
    cards: RwLock<Vec<CardRecord>>,
}

impl InMemoryCardStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored cards across all users (for testing).
    pub async fn card_count(&self) -> usize {
        self.inner.cards.read().await.len()
    }

    /// Number of customer links (for testing).
    pub async fn link_count(&self) -> usize {
        self.inner.links.read().await.len()
    }
}

impl std::fmt::Debug for InMemoryCardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCardStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn find_customer_link(&self, user_id: &str) -> Result<Option<CustomerLink>> {
        let links = self.inner.links.read().await;
        Ok(links.iter().find(|l| l.user_id == user_id).cloned())
    }

    async fn insert_customer_link(
        &self,
        user_id: &str,
        square_customer_id: &str,
    ) -> Result<CustomerLink> {
        let mut links = self.inner.links.write().await;
        if links.iter().any(|l| l.user_id == user_id) {
            return Err(RelayError::conflict(format!(
                "User {user_id} is already linked to a customer"
            )));
        }
        let link = CustomerLink {
            user_id: user_id.to_string(),
            square_customer_id: square_customer_id.to_string(),
            created_at: Utc::now(),
        };
        links.push(link.clone());
        Ok(link)
    }

    async fn list_cards(&self, user_id: &str) -> Result<Vec<CardRecord>> {
        let cards = self.inner.cards.read().await;
        Ok(cards
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_card(&self, square_card_id: &str) -> Result<Option<CardRecord>> {
        let cards = self.inner.cards.read().await;
        Ok(cards
            .iter()
            .find(|c| c.square_card_id == square_card_id)
            .cloned())
    }

    async fn insert_card(&self, card: NewCard) -> Result<CardRecord> {
        let mut cards = self.inner.cards.write().await;
        if cards.iter().any(|c| c.square_card_id == card.square_card_id) {
            return Err(RelayError::conflict(format!(
                "Card {} is already stored",
                card.square_card_id
            )));
        }

        let is_default = !cards.iter().any(|c| c.user_id == card.user_id);

        let record = CardRecord {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: card.user_id,
            square_card_id: card.square_card_id,
            square_customer_id: card.square_customer_id,
            brand: card.brand,
            last4: card.last4,
            exp_month: card.exp_month,
            exp_year: card.exp_year,
            billing_zip: card.billing_zip,
            holder_name: card.holder_name,
            is_default,
            created_at: Utc::now(),
        };
        cards.push(record.clone());
        Ok(record)
    }

    async fn delete_card(&self, user_id: &str, square_card_id: &str) -> Result<bool> {
        let mut cards = self.inner.cards.write().await;
        let before = cards.len();
        cards.retain(|c| !(c.user_id == user_id && c.square_card_id == square_card_id));
        Ok(cards.len() != before)
    }

    async fn is_ready(&self) -> bool {
        true
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
