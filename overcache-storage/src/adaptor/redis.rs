//! Redis adaptor.
//!
//! Values are stored as JSON strings with `SET key value [EX seconds]`,
//! read with `GET` and removed with `DEL`. The connection manager
//! reconnects on its own; this adaptor adds no retries.

use super::{decode, encode, CacheAdaptor};
use async_trait::async_trait;
use overcache_core::{AdaptorOptions, CacheError, CacheKey, OvercacheError, OvercacheResult};
use redis::aio::ConnectionManager;
use redis::{Cmd, RedisError};
use serde::{de::DeserializeOwned, Serialize};

/// Adaptor backed by a Redis server.
#[derive(Clone)]
pub struct RedisAdaptor {
    conn: ConnectionManager,
    options: AdaptorOptions,
}

impl std::fmt::Debug for RedisAdaptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisAdaptor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RedisAdaptor {
    /// Connect to `url` and build an adaptor.
    pub async fn connect(url: &str, options: AdaptorOptions) -> OvercacheResult<Self> {
        let client = redis::Client::open(url).map_err(|e| backend_error("CONNECT", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| backend_error("CONNECT", e))?;
        tracing::debug!(url = %url, namespace = ?options.namespace(), "connected redis adaptor");
        Ok(Self::new(conn, options))
    }

    /// Build an adaptor over an existing connection.
    pub fn new(conn: ConnectionManager, options: AdaptorOptions) -> Self {
        Self { conn, options }
    }

    /// A handle to the underlying connection.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

/// `SET key payload`, with `EX seconds` when a lifetime is configured.
pub fn set_command(storage_key: &str, payload: &str, options: &AdaptorOptions) -> Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(storage_key).arg(payload);
    if let Some(secs) = options.lifetime_secs() {
        cmd.arg("EX").arg(secs);
    }
    cmd
}

pub fn get_command(storage_key: &str) -> Cmd {
    let mut cmd = redis::cmd("GET");
    cmd.arg(storage_key);
    cmd
}

pub fn del_command(storage_key: &str) -> Cmd {
    let mut cmd = redis::cmd("DEL");
    cmd.arg(storage_key);
    cmd
}

fn backend_error(operation: &str, e: RedisError) -> OvercacheError {
    CacheError::Backend {
        backend: "redis".to_string(),
        operation: operation.to_string(),
        reason: e.to_string(),
    }
    .into()
}

#[async_trait]
impl CacheAdaptor for RedisAdaptor {
    async fn set<V: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &V,
    ) -> OvercacheResult<()> {
        let storage_key = self.storage_key(key);
        let payload = encode(&storage_key, value)?;
        let mut conn = self.conn.clone();
        let _: () = set_command(&storage_key, &payload, &self.options)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_error("SET", e))?;
        Ok(())
    }

    async fn get<V: DeserializeOwned + Send>(&self, key: &CacheKey) -> OvercacheResult<Option<V>> {
        let storage_key = self.storage_key(key);
        let mut conn = self.conn.clone();
        let payload: Option<String> = get_command(&storage_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_error("GET", e))?;
        match payload {
            Some(text) => decode(&storage_key, &text).map(Some),
            None => Ok(None),
        }
    }

    async fn del(&self, key: &CacheKey) -> OvercacheResult<()> {
        let storage_key = self.storage_key(key);
        let mut conn = self.conn.clone();
        let _: () = del_command(&storage_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| backend_error("DEL", e))?;
        Ok(())
    }

    fn options(&self) -> &AdaptorOptions {
        &self.options
    }
}
