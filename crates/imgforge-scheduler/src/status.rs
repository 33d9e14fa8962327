//! Build status store with per-key serialized updates.

use bytes::Bytes;
use imgforge_core::{BuildStatusRecord, Error, Result, SharedStore, StatusUpdate, Transition};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Status records keyed by image name, expiring after `ttl`.
///
/// Updates to the same key are serialized within this process, so the
/// worker's transitions and a build's log deltas never interleave.
pub struct StatusStore {
    store: Arc<dyn SharedStore>,
    ttl: Duration,
    locks: Mutex<HashMap<String, KeyLock>>,
}

impl StatusStore {
    pub fn new(store: Arc<dyn SharedStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Overwrite the record for `key` and refresh its expiry.
    pub async fn set(&self, key: &str, record: &BuildStatusRecord) -> Result<()> {
        let entry = self.key_entry(key);
        let _held = entry.lock.lock().await;
        self.write(key, record).await
    }

    /// Fetch the record for `key`; absent or expired keys are `NotFound`.
    pub async fn get(&self, key: &str) -> Result<BuildStatusRecord> {
        let payload = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("build status for {}", key)))?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Merge a partial update into the stored record and write it back.
    pub async fn update(&self, key: &str, update: StatusUpdate) -> Result<BuildStatusRecord> {
        let entry = self.key_entry(key);
        let _held = entry.lock.lock().await;
        self.merge_and_write(key, update).await
    }

    async fn merge_and_write(&self, key: &str, update: StatusUpdate) -> Result<BuildStatusRecord> {
        let mut record = self.get(key).await?;
        match record.merge(update) {
            Transition::Rejected { from, to } => {
                warn!(image_name = %key, %from, %to, "Ignoring illegal status transition");
            }
            Transition::Advanced { from, to } => {
                debug!(image_name = %key, %from, %to, "Build status advanced");
            }
            Transition::Unchanged => {}
        }
        self.write(key, &record).await?;
        Ok(record)
    }

    async fn write(&self, key: &str, record: &BuildStatusRecord) -> Result<()> {
        let payload = serde_json::to_vec(record)?;
        self.store.set(key, Bytes::from(payload), self.ttl).await
    }

    fn key_entry<'a>(&'a self, key: &'a str) -> KeyEntry<'a> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = locks.entry(key.to_string()).or_default().clone();
        KeyEntry {
            store: self,
            key,
            lock,
        }
    }

    /// Drop the table entry once no other writer holds a handle to it.
    fn release_key_lock(&self, key: &str, lock: &KeyLock) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one held by the caller.
        if Arc::strong_count(lock) == 2 {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A writer's claim on a key's lock. Released on drop, including when the
/// write is cancelled mid-await.
struct KeyEntry<'a> {
    store: &'a StatusStore,
    key: &'a str,
    lock: KeyLock,
}

impl Drop for KeyEntry<'_> {
    fn drop(&mut self) {
        self.store.release_key_lock(self.key, &self.lock);
    }
}
