//! Shared store backed by PostgreSQL.

use async_trait::async_trait;
use bytes::Bytes;
use imgforge_core::{Result, SharedStore};
use sqlx::PgPool;
use std::time::Duration;

use crate::{StoreError, StoreResult};

/// PostgreSQL implementation of [`SharedStore`].
///
/// Lists are rows ordered by a sequence; popping uses SKIP LOCKED so that
/// concurrent consumers never receive the same row.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Delete expired keys, returning how many were removed.
    pub async fn purge_expired(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM store_values WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SharedStore for PgStore {
    async fn push_back(&self, list: &str, payload: Bytes) -> Result<()> {
        sqlx::query("INSERT INTO store_lists (list_name, payload) VALUES ($1, $2)")
            .bind(list)
            .bind(payload.as_ref())
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn pop_front(&self, list: &str) -> Result<Option<Bytes>> {
        let payload: Option<Vec<u8>> = sqlx::query_scalar(
            r#"
            DELETE FROM store_lists
            WHERE id = (
                SELECT id FROM store_lists
                WHERE list_name = $1
                ORDER BY id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING payload
            "#,
        )
        .bind(list)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(payload.map(Bytes::from))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let value: Option<Vec<u8>> = sqlx::query_scalar(
            "SELECT value FROM store_values WHERE key = $1 AND expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO store_values (key, value, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value.as_ref())
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }
}
