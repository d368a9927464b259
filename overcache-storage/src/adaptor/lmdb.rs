//! LMDB-backed adaptor.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped store
//! that survives process restarts.
//!
//! # Value Format
//!
//! `[expires_at: 8 bytes LE millis, 0 = never][json value]`
//!
//! LMDB has no native expiry, so the lifetime is enforced on read: an
//! expired entry is deleted and reported as absent.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use overcache_core::{AdaptorOptions, CacheError, CacheKey, OvercacheError, OvercacheResult};
use serde::{de::DeserializeOwned, Serialize};

use super::{decode, encode, CacheAdaptor, CacheStats};

const HEADER_LEN: usize = 8;

/// Error type for LMDB adaptor operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbAdaptorError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes are shorter than the expiry header.
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbAdaptorError> for OvercacheError {
    fn from(e: LmdbAdaptorError) -> Self {
        let reason = e.to_string();
        match e {
            LmdbAdaptorError::Corrupt(key) => CacheError::Deserialization { key, reason }.into(),
            other => CacheError::Backend {
                backend: "lmdb".to_string(),
                operation: match other {
                    LmdbAdaptorError::EnvOpen(_) | LmdbAdaptorError::DbOpen(_) => "OPEN",
                    _ => "TXN",
                }
                .to_string(),
                reason,
            }
            .into(),
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbAdaptorError {
    LmdbAdaptorError::Transaction(e.to_string())
}

/// LMDB-backed adaptor.
pub struct LmdbAdaptor {
    env: Env,
    db: Database<Bytes, Bytes>,
    options: AdaptorOptions,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for LmdbAdaptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbAdaptor")
            .field("path", &self.env.path())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl LmdbAdaptor {
    /// Open (or create) an LMDB adaptor.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        options: AdaptorOptions,
    ) -> Result<Self, LmdbAdaptorError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbAdaptorError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbAdaptorError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self {
            env,
            db,
            options,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Another adaptor over the same environment, e.g. under a different
    /// namespace. Hit counters start at zero.
    pub fn with_options(&self, options: AdaptorOptions) -> Self {
        Self {
            env: self.env.clone(),
            db: self.db,
            options,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Entry count, stored byte size and hit counters.
    pub fn stats(&self) -> OvercacheResult<CacheStats> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let mut entry_count = 0u64;
        let mut memory_bytes = 0u64;
        for item in self.db.iter(&rtxn).map_err(txn_error)? {
            let (_, bytes) = item.map_err(txn_error)?;
            entry_count += 1;
            memory_bytes += bytes.len() as u64;
        }
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            memory_bytes,
        })
    }

    fn expires_at_millis(&self) -> i64 {
        match self.options.lifetime() {
            Some(lifetime) => {
                let millis = i64::try_from(lifetime.as_millis()).unwrap_or(i64::MAX);
                Utc::now().timestamp_millis().saturating_add(millis.max(1))
            }
            None => 0,
        }
    }

    fn read(&self, storage_key: &str) -> Result<Option<Vec<u8>>, LmdbAdaptorError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let found = self
            .db
            .get(&rtxn, storage_key.as_bytes())
            .map_err(txn_error)?
            .map(<[u8]>::to_vec);
        Ok(found)
    }

    fn remove(&self, storage_key: &str) -> Result<(), LmdbAdaptorError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .delete(&mut wtxn, storage_key.as_bytes())
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    /// Delete the entry if it is still expired at `now_ms`, inside one write
    /// transaction. An entry rewritten since the read is returned instead.
    fn evict_expired(
        &self,
        storage_key: &str,
        now_ms: i64,
    ) -> Result<Option<Vec<u8>>, LmdbAdaptorError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let current = self
            .db
            .get(&wtxn, storage_key.as_bytes())
            .map_err(txn_error)?
            .map(<[u8]>::to_vec);
        let Some(bytes) = current else {
            return Ok(None);
        };
        if !is_expired(expires_at(storage_key, &bytes)?, now_ms) {
            return Ok(Some(bytes));
        }
        self.db
            .delete(&mut wtxn, storage_key.as_bytes())
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        tracing::debug!(key = %storage_key, "lmdb entry expired");
        Ok(None)
    }
}

fn expires_at(storage_key: &str, bytes: &[u8]) -> Result<i64, LmdbAdaptorError> {
    let header: [u8; HEADER_LEN] = bytes
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| LmdbAdaptorError::Corrupt(storage_key.to_string()))?;
    Ok(i64::from_le_bytes(header))
}

fn is_expired(expires_at: i64, now_ms: i64) -> bool {
    expires_at != 0 && now_ms >= expires_at
}

#[async_trait]
impl CacheAdaptor for LmdbAdaptor {
    async fn set<V: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &V,
    ) -> OvercacheResult<()> {
        let storage_key = self.storage_key(key);
        let payload = encode(&storage_key, value)?;

        let mut full_bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        full_bytes.extend_from_slice(&self.expires_at_millis().to_le_bytes());
        full_bytes.extend_from_slice(payload.as_bytes());

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, storage_key.as_bytes(), &full_bytes)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    async fn get<V: DeserializeOwned + Send>(&self, key: &CacheKey) -> OvercacheResult<Option<V>> {
        let storage_key = self.storage_key(key);
        let now_ms = Utc::now().timestamp_millis();
        let bytes = match self.read(&storage_key)? {
            Some(bytes) if is_expired(expires_at(&storage_key, &bytes)?, now_ms) => {
                self.evict_expired(&storage_key, now_ms)?
            }
            found => found,
        };
        let Some(bytes) = bytes else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        self.hits.fetch_add(1, Ordering::Relaxed);
        let text = std::str::from_utf8(&bytes[HEADER_LEN..]).map_err(|e| {
            CacheError::Deserialization {
                key: storage_key.clone(),
                reason: e.to_string(),
            }
        })?;
        decode(&storage_key, text).map(Some)
    }

    async fn del(&self, key: &CacheKey) -> OvercacheResult<()> {
        self.remove(&self.storage_key(key))?;
        Ok(())
    }

    fn options(&self) -> &AdaptorOptions {
        &self.options
    }
}
