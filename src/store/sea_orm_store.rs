//! SeaORM-backed card store.
//!
//! Works against Postgres (including Supabase) and SQLite.
//!
//! # Example
//!
//! ```rust,ignore
//! use cardrelay::store::{connect, SeaOrmCardStore};
//!
//! let db = connect(&config.store).await?;
//! let store = SeaOrmCardStore::new(db);
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
};

use super::{CardRecord, CardStore, CustomerLink, NewCard};
use crate::error::{RelayError, Result};

// =============================================================================
// SeaORM Entities
// =============================================================================

mod entity {
    pub mod customer_link {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "customer_links")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub user_id: String,
            pub square_customer_id: String,
            pub created_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod card {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "cards")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub user_id: String,
            #[sea_orm(unique)]
            pub square_card_id: String,
            pub square_customer_id: String,
            pub brand: Option<String>,
            pub last4: Option<String>,
            pub exp_month: Option<i32>,
            pub exp_year: Option<i32>,
            pub billing_zip: Option<String>,
            pub holder_name: Option<String>,
            pub is_default: bool,
            pub created_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{card, customer_link};

// =============================================================================
// Helper Functions
// =============================================================================

fn model_to_link(model: customer_link::Model) -> CustomerLink {
    CustomerLink {
        user_id: model.user_id,
        square_customer_id: model.square_customer_id,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn model_to_card(model: card::Model) -> CardRecord {
    CardRecord {
        id: model.id,
        user_id: model.user_id,
        square_card_id: model.square_card_id,
        square_customer_id: model.square_customer_id,
        brand: model.brand,
        last4: model.last4,
        exp_month: model.exp_month,
        exp_year: model.exp_year,
        billing_zip: model.billing_zip,
        holder_name: model.holder_name,
        is_default: model.is_default,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn card_to_active_model(card: &NewCard, is_default: bool) -> card::ActiveModel {
    card::ActiveModel {
        id: Set(uuid::Uuid::now_v7().to_string()),
        user_id: Set(card.user_id.clone()),
        square_card_id: Set(card.square_card_id.clone()),
        square_customer_id: Set(card.square_customer_id.clone()),
        brand: Set(card.brand.clone()),
        last4: Set(card.last4.clone()),
        exp_month: Set(card.exp_month),
        exp_year: Set(card.exp_year),
        billing_zip: Set(card.billing_zip.clone()),
        holder_name: Set(card.holder_name.clone()),
        is_default: Set(is_default),
        created_at: Set(Utc::now().fixed_offset()),
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn card_conflict(square_card_id: &str) -> RelayError {
    RelayError::conflict(format!("Card {square_card_id} is already stored"))
}

// =============================================================================
// SeaOrmCardStore
// =============================================================================

/// SeaORM-backed store implementing [`CardStore`].
///
/// The one-default-per-user rule is backed by a partial unique index, so two
/// concurrent first saves cannot both become default.
#[derive(Clone, Debug)]
pub struct SeaOrmCardStore {
    db: DatabaseConnection,
}

impl SeaOrmCardStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn has_cards(&self, user_id: &str) -> Result<bool> {
        let count = card::Entity::find()
            .filter(card::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl CardStore for SeaOrmCardStore {
    // -------------------------------------------------------------------------
    // Customer Links
    // -------------------------------------------------------------------------

    async fn find_customer_link(&self, user_id: &str) -> Result<Option<CustomerLink>> {
        tracing::debug!(user_id = %user_id, "fetching customer link");

        let link = customer_link::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?;

        Ok(link.map(model_to_link))
    }

    async fn insert_customer_link(
        &self,
        user_id: &str,
        square_customer_id: &str,
    ) -> Result<CustomerLink> {
        tracing::debug!(
            user_id = %user_id,
            square_customer_id = %square_customer_id,
            "inserting customer link"
        );

        let link = customer_link::ActiveModel {
            user_id: Set(user_id.to_string()),
            square_customer_id: Set(square_customer_id.to_string()),
            created_at: Set(Utc::now().fixed_offset()),
        };

        match link.insert(&self.db).await {
            Ok(model) => Ok(model_to_link(model)),
            Err(err) if is_unique_violation(&err) => Err(RelayError::conflict(format!(
                "User {user_id} is already linked to a customer"
            ))),
            Err(err) => Err(err.into()),
        }
    }

    // -------------------------------------------------------------------------
    // Cards
    // -------------------------------------------------------------------------

    async fn list_cards(&self, user_id: &str) -> Result<Vec<CardRecord>> {
        tracing::debug!(user_id = %user_id, "listing cards");

        let cards = card::Entity::find()
            .filter(card::Column::UserId.eq(user_id))
            .order_by_desc(card::Column::CreatedAt)
            .order_by_desc(card::Column::Id)
            .all(&self.db)
            .await?;

        Ok(cards.into_iter().map(model_to_card).collect())
    }

    async fn get_card(&self, square_card_id: &str) -> Result<Option<CardRecord>> {
        let card = card::Entity::find()
            .filter(card::Column::SquareCardId.eq(square_card_id))
            .one(&self.db)
            .await?;

        Ok(card.map(model_to_card))
    }

    async fn insert_card(&self, new_card: NewCard) -> Result<CardRecord> {
        let wants_default = !self.has_cards(&new_card.user_id).await?;

        tracing::debug!(
            user_id = %new_card.user_id,
            square_card_id = %new_card.square_card_id,
            is_default = wants_default,
            "inserting card"
        );

        let err = match card_to_active_model(&new_card, wants_default)
            .insert(&self.db)
            .await
        {
            Ok(model) => return Ok(model_to_card(model)),
            Err(err) if is_unique_violation(&err) => err,
            Err(err) => return Err(err.into()),
        };

        if self.get_card(&new_card.square_card_id).await?.is_some() {
            return Err(card_conflict(&new_card.square_card_id));
        }
        if !wants_default {
            return Err(err.into());
        }

        // Another save for this user took the default slot first
        tracing::debug!(
            user_id = %new_card.user_id,
            "default card taken concurrently, storing as non-default"
        );
        match card_to_active_model(&new_card, false).insert(&self.db).await {
            Ok(model) => Ok(model_to_card(model)),
            Err(err) if is_unique_violation(&err) => {
                Err(card_conflict(&new_card.square_card_id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_card(&self, user_id: &str, square_card_id: &str) -> Result<bool> {
        tracing::debug!(
            user_id = %user_id,
            square_card_id = %square_card_id,
            "deleting card"
        );

        let result = card::Entity::delete_many()
            .filter(card::Column::UserId.eq(user_id))
            .filter(card::Column::SquareCardId.eq(square_card_id))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    // -------------------------------------------------------------------------
    // Health
    // -------------------------------------------------------------------------

    async fn is_ready(&self) -> bool {
        self.db.ping().await.is_ok()
    }

    fn backend(&self) -> &'static str {
        match self.db.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => "postgres",
            sea_orm::DatabaseBackend::Sqlite => "sqlite",
            _ => "sql",
        }
    }
}
