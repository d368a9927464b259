//! In-process adaptor over an explicitly owned map.
//!
//! [`MemoryStore`] is a cloneable handle; clones share the same entries, so a
//! test can keep one handle for inspection while the cache layer writes
//! through another. Entries hold the JSON text exactly as an external
//! backend would see it.

use super::{decode, encode, CacheAdaptor, CacheStats};
use async_trait::async_trait;
use overcache_core::{AdaptorOptions, CacheKey, OvercacheResult};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct MemoryEntry {
    text: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Shared in-memory entry map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored text under a flattened key, ignoring expiry.
    pub async fn raw(&self, storage_key: &str) -> Option<String> {
        self.inner
            .entries
            .read()
            .await
            .get(storage_key)
            .map(|e| e.text.clone())
    }

    /// Whether a live entry exists under a flattened key.
    pub async fn contains(&self, storage_key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .entries
            .read()
            .await
            .get(storage_key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Flattened keys of every stored entry, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.entries.read().await.is_empty()
    }

    /// Remove every entry and reset the counters.
    pub async fn clear(&self) {
        self.inner.entries.write().await.clear();
        self.inner.hits.store(0, Ordering::Relaxed);
        self.inner.misses.store(0, Ordering::Relaxed);
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.inner.entries.read().await;
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            entry_count: entries.len() as u64,
            memory_bytes: entries.values().map(|e| e.text.len() as u64).sum(),
        }
    }

    async fn put(&self, storage_key: String, text: String, expires_at: Option<Instant>) {
        self.inner
            .entries
            .write()
            .await
            .insert(storage_key, MemoryEntry { text, expires_at });
    }

    async fn fetch(&self, storage_key: &str) -> Option<String> {
        let now = Instant::now();
        let found = {
            let entries = self.inner.entries.read().await;
            entries.get(storage_key).cloned()
        };

        match found {
            Some(entry) if entry.is_expired(now) => self.evict_expired(storage_key, now).await,
            Some(entry) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.text)
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Remove the entry if it is still expired once the write lock is held.
    /// A set that landed after the read is returned instead.
    async fn evict_expired(&self, storage_key: &str, now: Instant) -> Option<String> {
        let mut entries = self.inner.entries.write().await;
        match entries.get(storage_key) {
            Some(entry) if !entry.is_expired(now) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.text.clone())
            }
            Some(_) => {
                entries.remove(storage_key);
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn remove(&self, storage_key: &str) {
        self.inner.entries.write().await.remove(storage_key);
    }
}

/// Adaptor writing into a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryAdaptor {
    store: MemoryStore,
    options: AdaptorOptions,
}

impl MemoryAdaptor {
    pub fn new(store: MemoryStore, options: AdaptorOptions) -> Self {
        Self { store, options }
    }

    /// Adaptor over a fresh store with no namespace or lifetime.
    pub fn fresh() -> Self {
        Self::new(MemoryStore::new(), AdaptorOptions::default())
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Raw stored text for a cache key under this adaptor's namespace.
    pub async fn raw(&self, key: &CacheKey) -> Option<String> {
        self.store.raw(&self.storage_key(key)).await
    }
}

#[async_trait]
impl CacheAdaptor for MemoryAdaptor {
    async fn set<V: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &V,
    ) -> OvercacheResult<()> {
        let storage_key = self.storage_key(key);
        let text = encode(&storage_key, value)?;
        let expires_at = self.options.lifetime().map(|lifetime| Instant::now() + lifetime);
        self.store.put(storage_key, text, expires_at).await;
        Ok(())
    }

    async fn get<V: DeserializeOwned + Send>(&self, key: &CacheKey) -> OvercacheResult<Option<V>> {
        let storage_key = self.storage_key(key);
        match self.store.fetch(&storage_key).await {
            Some(text) => decode(&storage_key, &text).map(Some),
            None => Ok(None),
        }
    }

    async fn del(&self, key: &CacheKey) -> OvercacheResult<()> {
        self.store.remove(&self.storage_key(key)).await;
        Ok(())
    }

    fn options(&self) -> &AdaptorOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overcache_core::{AttributeKind, ModelDescriptor, PrimaryKey};
    use serde_json::{json, Value as JsonValue};
    use std::time::Duration;

    fn user_key(id: i64) -> CacheKey {
        let user = ModelDescriptor::builder("User")
            .primary_key("id", AttributeKind::Integer)
            .build()
            .unwrap();
        CacheKey::identity(&user, &PrimaryKey::from(id)).unwrap()
    }

    #[tokio::test]
    async fn test_set_get_del() {
        let adaptor = MemoryAdaptor::fresh();
        let key = user_key(1);

        adaptor.set(&key, &json!({ "id": 1 })).await.unwrap();
        let value: Option<JsonValue> = adaptor.get(&key).await.unwrap();
        assert_eq!(value, Some(json!({ "id": 1 })));

        adaptor.del(&key).await.unwrap();
        let value: Option<JsonValue> = adaptor.get(&key).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_del_missing_is_ok() {
        let adaptor = MemoryAdaptor::fresh();
        assert!(adaptor.del(&user_key(404)).await.is_ok());
    }

    #[tokio::test]
    async fn test_namespace_prefixes_keys() {
        let store = MemoryStore::new();
        let adaptor = MemoryAdaptor::new(store.clone(), AdaptorOptions::new().with_namespace("model"));
        adaptor.set(&user_key(1), &json!({ "id": 1 })).await.unwrap();

        assert_eq!(store.keys().await, vec!["model:User:1".to_string()]);
        assert_eq!(store.raw("model:User:1").await.as_deref(), Some(r#"{"id":1}"#));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = MemoryStore::new();
        let a = MemoryAdaptor::new(store.clone(), AdaptorOptions::new().with_namespace("a"));
        let b = MemoryAdaptor::new(store.clone(), AdaptorOptions::new().with_namespace("b"));
        a.set(&user_key(1), &json!("from a")).await.unwrap();

        let seen: Option<JsonValue> = b.get(&user_key(1)).await.unwrap();
        assert!(seen.is_none());
    }

    #[tokio::test]
    async fn test_lifetime_expires_entries() {
        let adaptor = MemoryAdaptor::new(
            MemoryStore::new(),
            AdaptorOptions::new().with_lifetime(Duration::from_millis(20)),
        );
        let key = user_key(1);
        adaptor.set(&key, &json!(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let value: Option<JsonValue> = adaptor.get(&key).await.unwrap();
        assert!(value.is_none());
        assert!(adaptor.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_eviction_keeps_entry_rewritten_after_read() {
        let store = MemoryStore::new();
        let read_at = Instant::now();
        store
            .put("User:1".to_string(), "1".to_string(), Some(read_at))
            .await;
        // A set lands between the expired read and the eviction.
        store
            .put(
                "User:1".to_string(),
                "2".to_string(),
                Some(read_at + Duration::from_secs(60)),
            )
            .await;

        assert_eq!(store.evict_expired("User:1", read_at).await.as_deref(), Some("2"));
        assert!(store.contains("User:1").await);

        store
            .put("User:2".to_string(), "3".to_string(), Some(read_at))
            .await;
        assert!(store.evict_expired("User:2", read_at).await.is_none());
        assert!(store.raw("User:2").await.is_none());
    }

    #[tokio::test]
    async fn test_set_after_expiry_is_readable() {
        let adaptor = MemoryAdaptor::new(
            MemoryStore::new(),
            AdaptorOptions::new().with_lifetime(Duration::from_millis(20)),
        );
        let key = user_key(1);
        adaptor.set(&key, &json!(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        adaptor.set(&key, &json!(2)).await.unwrap();

        let value: Option<JsonValue> = adaptor.get(&key).await.unwrap();
        assert_eq!(value, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_zero_lifetime_keeps_entries() {
        let adaptor = MemoryAdaptor::new(
            MemoryStore::new(),
            AdaptorOptions::new().with_lifetime(Duration::ZERO),
        );
        let key = user_key(1);
        adaptor.set(&key, &json!(1)).await.unwrap();

        let value: Option<JsonValue> = adaptor.get(&key).await.unwrap();
        assert_eq!(value, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_decode_failure_surfaces() {
        let adaptor = MemoryAdaptor::fresh();
        let key = user_key(1);
        adaptor.set(&key, &json!("text")).await.unwrap();

        let err = adaptor.get::<Vec<i64>>(&key).await.unwrap_err();
        assert!(err.is_decode_failure());
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let adaptor = MemoryAdaptor::fresh();
        let key = user_key(1);
        let _: Option<JsonValue> = adaptor.get(&key).await.unwrap();
        adaptor.set(&key, &json!(1)).await.unwrap();
        let _: Option<JsonValue> = adaptor.get(&key).await.unwrap();
        let _: Option<JsonValue> = adaptor.get(&key).await.unwrap();

        let stats = adaptor.store().stats().await;
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.memory_bytes, 1);

        adaptor.store().clear().await;
        assert_eq!(adaptor.store().stats().await, CacheStats::default());
    }
}
