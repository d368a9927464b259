//! Key-value store adaptors.
//!
//! An adaptor turns the cache protocol's `set` / `get` / `del` calls into
//! one backend's own protocol. Every adaptor:
//!
//! - flattens the key to `namespace:Model:part...` (namespace optional)
//! - stores values as JSON text
//! - applies the configured lifetime as the backend's expiry
//! - reports an absent entry as `Ok(None)` and a failed backend call as `Err`
//!
//! Adaptors keep no cache of their own; each call is exactly one backend call.

pub mod lmdb;
pub mod memory;
pub mod redis;

pub use lmdb::{LmdbAdaptor, LmdbAdaptorError};
pub use memory::{MemoryAdaptor, MemoryStore};
pub use redis::RedisAdaptor;

use async_trait::async_trait;
use overcache_core::{AdaptorOptions, CacheError, CacheKey, OvercacheResult};
use serde::{de::DeserializeOwned, Serialize};

/// Cache adaptor trait for pluggable key-value backends.
///
/// Implementations must be safe to share between tasks.
#[async_trait]
pub trait CacheAdaptor: Send + Sync {
    /// Store `value` under `key`, replacing any existing entry.
    async fn set<V: Serialize + Send + Sync>(&self, key: &CacheKey, value: &V)
        -> OvercacheResult<()>;

    /// Fetch the value stored under `key`, or `None` if there is no entry.
    ///
    /// A stored payload that does not decode as `V` yields
    /// [`CacheError::Deserialization`].
    async fn get<V: DeserializeOwned + Send>(&self, key: &CacheKey) -> OvercacheResult<Option<V>>;

    /// Remove the entry under `key`. Removing a missing entry succeeds.
    async fn del(&self, key: &CacheKey) -> OvercacheResult<()>;

    /// Namespace and lifetime this adaptor was configured with.
    fn options(&self) -> &AdaptorOptions;

    /// The flattened backend key for `key`.
    fn storage_key(&self, key: &CacheKey) -> String {
        key.join(self.options().namespace())
    }
}

/// Serialize a value to the JSON text stored by adaptors.
pub fn encode<V: Serialize + ?Sized>(key: &str, value: &V) -> OvercacheResult<String> {
    serde_json::to_string(value).map_err(|e| {
        CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Parse JSON text read back from a backend.
pub fn decode<V: DeserializeOwned>(key: &str, text: &str) -> OvercacheResult<V> {
    serde_json::from_str(text).map_err(|e| {
        CacheError::Deserialization {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Statistics about adaptor usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of reads that found an entry.
    pub hits: u64,
    /// Number of reads that found nothing.
    pub misses: u64,
    /// Number of entries currently stored.
    pub entry_count: u64,
    /// Approximate payload size in bytes.
    pub memory_bytes: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
