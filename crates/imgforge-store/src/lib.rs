//! Shared store backends for imgforge.
//!
//! Provides the in-memory store used for development and tests, and the
//! PostgreSQL store used in production.

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    let migrator = sqlx::migrate!("./migrations");
    info!(migrations = migrator.iter().count(), "Running database migrations");
    migrator.run(pool).await?;
    Ok(())
}
