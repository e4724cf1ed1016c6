//! Database testing utilities
//!
//! SQLite in-memory databases with the relay's schema applied.
//!
//! # Example
//!
//! ```rust,ignore
//! use cardrelay::testing::TestDb;
//!
//! #[tokio::test]
//! async fn test_with_database() {
//!     let test_db = TestDb::new().await.expect("Failed to create test database");
//!     let store = test_db.store();
//! }
//! ```

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

use crate::store::{Migrator, SeaOrmCardStore};

/// Manages a migrated test database connection
pub struct TestDb {
    pub connection: DatabaseConnection,
}

impl TestDb {
    /// Fresh SQLite in-memory database with migrations applied
    ///
    /// Each call gets its own database: the pool is pinned to one
    /// connection, and an in-memory SQLite database lives per connection.
    pub async fn new() -> Result<Self, DbErr> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let connection = Database::connect(opt).await?;

        Migrator::up(&connection, None).await?;
        Ok(Self { connection })
    }

    /// Migrated database from `TEST_DATABASE_URL`, if one is configured
    ///
    /// Lets the same tests run against Postgres in CI.
    pub async fn from_env() -> Option<Result<Self, DbErr>> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        Some(Self::connect_and_migrate(&url).await)
    }

    async fn connect_and_migrate(url: &str) -> Result<Self, DbErr> {
        let connection = Database::connect(url).await?;
        Migrator::fresh(&connection).await?;
        Ok(Self { connection })
    }

    /// Card store backed by this database
    pub fn store(&self) -> SeaOrmCardStore {
        SeaOrmCardStore::new(self.connection.clone())
    }
}
