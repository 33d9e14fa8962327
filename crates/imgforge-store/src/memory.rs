//! In-process store for development and tests.

use async_trait::async_trait;
use bytes::Bytes;
use imgforge_core::{Result, SharedStore};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

/// Store backed by process memory. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    lists: Mutex<HashMap<String, VecDeque<Bytes>>>,
    values: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items currently in `list`.
    pub async fn list_len(&self, list: &str) -> usize {
        self.lists.lock().await.get(list).map_or(0, VecDeque::len)
    }

    /// Drop every expired key, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut values = self.values.lock().await;
        let before = values.len();
        values.retain(|_, entry| entry.expires_at > now);
        before - values.len()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn push_back(&self, list: &str, payload: Bytes) -> Result<()> {
        self.lists
            .lock()
            .await
            .entry(list.to_string())
            .or_default()
            .push_back(payload);
        Ok(())
    }

    async fn pop_front(&self, list: &str) -> Result<Option<Bytes>> {
        let mut lists = self.lists.lock().await;
        Ok(lists.get_mut(list).and_then(VecDeque::pop_front))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut values = self.values.lock().await;
        match values.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.values.lock().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_is_fifo() {
        let store = MemoryStore::new();
        store.push_back("q", Bytes::from("a")).await.unwrap();
        store.push_back("q", Bytes::from("b")).await.unwrap();

        assert_eq!(store.list_len("q").await, 2);
        assert_eq!(store.pop_front("q").await.unwrap(), Some(Bytes::from("a")));
        assert_eq!(store.pop_front("q").await.unwrap(), Some(Bytes::from("b")));
        assert_eq!(store.pop_front("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lists_are_independent() {
        let store = MemoryStore::new();
        store.push_back("one", Bytes::from("x")).await.unwrap();
        assert_eq!(store.pop_front("two").await.unwrap(), None);
        assert_eq!(store.list_len("one").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_values_expire_after_ttl() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from("v"), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from("v")));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_refreshes_ttl() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);
        store.set("k", Bytes::from("v1"), ttl).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        store.set("k", Bytes::from("v2"), ttl).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from("v2")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store
            .set("short", Bytes::from("1"), Duration::from_secs(1))
            .await
            .unwrap();
        store
            .set("long", Bytes::from("2"), Duration::from_secs(100))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.get("long").await.unwrap().is_some());
    }
}
