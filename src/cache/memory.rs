//! Process-local cache store with TTL
//!
//! Used for local development and single-instance deployments. Entries live
//! in a `DashMap`, so readers on different shards never block each other and
//! every write replaces the whole entry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::store::{CacheResult, CacheStore};

/// Thread-safe in-memory store
pub struct InMemoryCacheStore {
    entries: DashMap<String, StoredValue>,
}

/// A stored value with TTL metadata
struct StoredValue {
    value: Vec<u8>,
    stored_at: Instant,
    ttl: Duration,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

impl InMemoryCacheStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of entries, including expired ones not yet evicted
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict expired entries (background maintenance)
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        Ok(u64::from(self.entries.remove(key).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let store = InMemoryCacheStore::new();
        store
            .set("key", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("key").await.unwrap(), Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn test_miss() {
        let store = InMemoryCacheStore::new();
        assert_eq!(store.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = InMemoryCacheStore::new();
        store
            .set("key", b"v".to_vec(), Duration::from_millis(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(store.get("key").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let store = InMemoryCacheStore::new();
        store
            .set("key", b"first".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set("key", b"second".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("key").await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryCacheStore::new();
        store
            .set("key", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.delete("key").await.unwrap(), 1);
        assert_eq!(store.delete("key").await.unwrap(), 0);
        assert_eq!(store.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_evict_expired() {
        let store = InMemoryCacheStore::new();
        store
            .set("short", b"1".to_vec(), Duration::from_millis(1))
            .await
            .unwrap();
        store
            .set("long", b"2".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(store.evict_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long").await.unwrap(), Some(b"2".to_vec()));
    }
}
