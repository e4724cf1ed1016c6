//! Card metadata persistence.
//!
//! The relay keeps only what it needs to charge a card again later: the
//! user-to-customer link and non-sensitive card metadata. Card numbers never
//! reach this layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

mod memory;
#[cfg(feature = "database")]
mod migration;
#[cfg(feature = "database")]
mod sea_orm_store;

pub use memory::InMemoryCardStore;
#[cfg(feature = "database")]
pub use migration::{Migrator, connect};
#[cfg(feature = "database")]
pub use sea_orm_store::SeaOrmCardStore;

/// Link between an application user and their Square customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerLink {
    pub user_id: String,
    pub square_customer_id: String,
    pub created_at: DateTime<Utc>,
}

/// A stored card-on-file record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    pub id: String,
    pub user_id: String,
    pub square_card_id: String,
    pub square_customer_id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub billing_zip: Option<String>,
    pub holder_name: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Card fields returned to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    pub square_card_id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub is_default: bool,
}

impl CardRecord {
    pub fn summary(&self) -> CardSummary {
        CardSummary {
            square_card_id: self.square_card_id.clone(),
            brand: self.brand.clone(),
            last4: self.last4.clone(),
            exp_month: self.exp_month,
            exp_year: self.exp_year,
            is_default: self.is_default,
        }
    }
}

/// Input for [`CardStore::insert_card`]. The store decides `is_default`.
#[derive(Debug, Clone, Default)]
pub struct NewCard {
    pub user_id: String,
    pub square_card_id: String,
    pub square_customer_id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i32>,
    pub exp_year: Option<i32>,
    pub billing_zip: Option<String>,
    pub holder_name: Option<String>,
}

/// Trait for storing customer links and card metadata.
#[async_trait]
pub trait CardStore: Send + Sync {
    // Customer links

    async fn find_customer_link(&self, user_id: &str) -> Result<Option<CustomerLink>>;

    /// Link a user to a Square customer.
    ///
    /// Returns `Conflict` if the user is already linked.
    async fn insert_customer_link(
        &self,
        user_id: &str,
        square_customer_id: &str,
    ) -> Result<CustomerLink>;

    // Cards

    /// Cards for a user, newest first.
    async fn list_cards(&self, user_id: &str) -> Result<Vec<CardRecord>>;

    async fn get_card(&self, square_card_id: &str) -> Result<Option<CardRecord>>;

    /// Store a card. The first card a user has becomes their default, decided
    /// atomically with the insert.
    ///
    /// Returns `Conflict` if `square_card_id` is already stored.
    async fn insert_card(&self, card: NewCard) -> Result<CardRecord>;

    /// Remove a user's card. Returns whether a record was deleted.
    async fn delete_card(&self, user_id: &str, square_card_id: &str) -> Result<bool>;

    async fn verify_card_ownership(&self, user_id: &str, square_card_id: &str) -> Result<bool> {
        Ok(self
            .get_card(square_card_id)
            .await?
            .is_some_and(|card| card.user_id == user_id))
    }

    // Health

    async fn is_ready(&self) -> bool;

    /// Short backend name for health output.
    fn backend(&self) -> &'static str;
}
