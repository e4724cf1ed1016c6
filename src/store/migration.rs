//! Schema for the card store and connection setup.

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use sea_orm_migration::prelude::*;
use secrecy::ExposeSecret;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::{RelayError, Result};

/// Migrator for the relay's tables.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250101_000001_create_card_tables::Migration)]
    }
}

/// Open the configured database and apply pending migrations.
///
/// # Errors
///
/// Returns `Config` when no database URL is set, and a database error when
/// the connection or a migration fails.
pub async fn connect(config: &StoreConfig) -> Result<DatabaseConnection> {
    let url = config
        .database_url
        .as_ref()
        .ok_or_else(|| RelayError::config("No database URL configured"))?;

    let mut opt = ConnectOptions::new(url.expose_secret().to_string());
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    tracing::info!(
        backend = ?db.get_database_backend(),
        max_connections = config.max_connections,
        "Database connection established"
    );

    if config.run_migrations {
        Migrator::up(&db, None)
            .await
            .map_err(|e| RelayError::internal(format!("Migration failed: {}", e)))?;
        tracing::info!("Database migrations completed successfully");
    }

    Ok(db)
}

mod m20250101_000001_create_card_tables {
    use sea_orm_migration::{prelude::*, schema::*};

    #[derive(DeriveMigrationName)]
    pub struct Migration;

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CustomerLinks::Table)
                        .if_not_exists()
                        .col(string(CustomerLinks::UserId).primary_key())
                        .col(string(CustomerLinks::SquareCustomerId).not_null())
                        .col(
                            timestamp_with_time_zone(CustomerLinks::CreatedAt)
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Cards::Table)
                        .if_not_exists()
                        .col(string(Cards::Id).primary_key())
                        .col(string(Cards::UserId).not_null())
                        .col(string(Cards::SquareCardId).not_null().unique_key())
                        .col(string(Cards::SquareCustomerId).not_null())
                        .col(string_null(Cards::Brand))
                        .col(string_null(Cards::Last4))
                        .col(integer_null(Cards::ExpMonth))
                        .col(integer_null(Cards::ExpYear))
                        .col(string_null(Cards::BillingZip))
                        .col(string_null(Cards::HolderName))
                        .col(boolean(Cards::IsDefault).not_null().default(false))
                        .col(
                            timestamp_with_time_zone(Cards::CreatedAt)
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cards_user_id_created_at")
                        .table(Cards::Table)
                        .col(Cards::UserId)
                        .col(Cards::CreatedAt)
                        .to_owned(),
                )
                .await?;

            // At most one default card per user. Partial indexes are not
            // expressible through the index builder on every backend.
            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS uq_cards_default_per_user \
                     ON cards (user_id) WHERE is_default",
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Cards::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CustomerLinks::Table).to_owned())
                .await?;
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum CustomerLinks {
        Table,
        UserId,
        SquareCustomerId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Cards {
        Table,
        Id,
        UserId,
        SquareCardId,
        SquareCustomerId,
        Brand,
        Last4,
        ExpMonth,
        ExpYear,
        BillingZip,
        HolderName,
        IsDefault,
        CreatedAt,
    }
}
