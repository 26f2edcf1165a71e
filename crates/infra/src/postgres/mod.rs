//! Postgres backend (sqlx).

pub mod storage;

use std::time::Duration;

use anyhow::Context;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use storage::PgStorage;

/// Schema for every table `PgStorage` reads and writes.
pub const SCHEMA_SQL: &str = include_str!("../../migrations/0001_init.sql");

/// Open a pool whose acquire timeout matches the storage call timeout.
pub async fn connect(database_url: &str, acquire_timeout: Duration) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
        .context("failed to connect to postgres")
}

/// Apply the schema. Statements are idempotent (`IF NOT EXISTS`).
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await
        .context("failed to apply schema")?;
    tracing::info!("database schema applied");
    Ok(())
}
