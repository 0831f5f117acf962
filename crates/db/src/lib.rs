//! Ledger and generation record persistence.
//!
//! The orchestration core talks to storage only through the
//! [`LedgerStore`] and [`RecordStore`] ports. Two implementations ship here:
//! in-memory stores for tests and single-process development, and Postgres
//! stores backed by the repositories in [`repositories`].

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repositories;
pub mod store;

pub use error::StoreError;
pub use memory::{InMemoryLedgerStore, InMemoryRecordStore};
pub use postgres::{PgLedgerStore, PgRecordStore};
pub use store::{LedgerStore, RecordStore};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations in `migrations/`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
