//! Shared store primitive.
//!
//! A list with push-to-tail / pop-from-head, and a key-value space with
//! per-key expiry. Absence is reported as `None`, never as an error.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::Result;

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Append a payload to the tail of `list`.
    async fn push_back(&self, list: &str, payload: Bytes) -> Result<()>;

    /// Atomically remove and return the head of `list`.
    async fn pop_front(&self, list: &str) -> Result<Option<Bytes>>;

    /// Value stored under `key`, unless absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Overwrite `key`, resetting its expiry to `ttl` from now.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<()>;
}
