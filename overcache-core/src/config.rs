//! Cache Configuration Module
//!
//! Adaptor options (namespace and entry lifetime) plus the process-level
//! settings used to wire adaptors together. Configuration is loaded from
//! environment variables with defaults suitable for local development.

use crate::error::{ConfigError, OvercacheError, OvercacheResult};
use crate::record::DEFAULT_MAX_DEPTH;
use std::path::PathBuf;
use std::time::Duration;

/// Deepest association nesting a config may request.
pub const MAX_INCLUDE_DEPTH_LIMIT: usize = 8;

/// Default Redis connection URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default LMDB map size in megabytes.
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 64;

// ============================================================================
// ADAPTOR OPTIONS
// ============================================================================

/// Options held by one key-value store adaptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptorOptions {
    /// Prefix prepended to every key.
    pub namespace: Option<String>,
    /// How long an entry survives in the store. `None` keeps it until removed.
    pub lifetime: Option<Duration>,
}

impl AdaptorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Entry lifetime, with a zero duration meaning none.
    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime.filter(|d| !d.is_zero())
    }

    /// Lifetime in whole seconds, rounded up so a sub-second lifetime still expires.
    pub fn lifetime_secs(&self) -> Option<u64> {
        self.lifetime().map(|d| {
            let secs = d.as_secs();
            if d.subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        })
    }
}

// ============================================================================
// PROCESS CONFIGURATION
// ============================================================================

/// Settings for a cache layer and the adaptors it can use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OvercacheConfig {
    pub namespace: Option<String>,
    pub lifetime: Option<Duration>,

    /// Levels of nested associations rebuilt from a cached record.
    pub max_include_depth: usize,

    pub redis_url: String,

    /// Directory for the LMDB adaptor. `None` disables it.
    pub lmdb_path: Option<PathBuf>,
    pub lmdb_max_size_mb: usize,
}

impl Default for OvercacheConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            lifetime: None,
            max_include_depth: DEFAULT_MAX_DEPTH,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            lmdb_path: None,
            lmdb_max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
        }
    }
}

impl OvercacheConfig {
    /// Create config from environment variables.
    ///
    /// Environment variables:
    /// - `OVERCACHE_NAMESPACE`: key prefix (default: none)
    /// - `OVERCACHE_LIFETIME_SECS`: entry lifetime, `0` for none (default: none)
    /// - `OVERCACHE_MAX_INCLUDE_DEPTH`: association depth (default: 2)
    /// - `OVERCACHE_REDIS_URL`: Redis URL (default: redis://127.0.0.1:6379)
    /// - `OVERCACHE_LMDB_PATH`: LMDB directory (default: none)
    /// - `OVERCACHE_LMDB_MAX_SIZE_MB`: LMDB map size (default: 64)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let namespace = lookup("OVERCACHE_NAMESPACE");

        let lifetime = lookup("OVERCACHE_LIFETIME_SECS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let max_include_depth = lookup("OVERCACHE_MAX_INCLUDE_DEPTH")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_include_depth);

        let redis_url = lookup("OVERCACHE_REDIS_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.redis_url);

        let lmdb_path = lookup("OVERCACHE_LMDB_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let lmdb_max_size_mb = lookup("OVERCACHE_LMDB_MAX_SIZE_MB")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.lmdb_max_size_mb);

        Self {
            namespace,
            lifetime,
            max_include_depth,
            redis_url,
            lmdb_path,
            lmdb_max_size_mb,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> OvercacheResult<()> {
        if let Some(ns) = &self.namespace {
            if ns.is_empty() {
                return Err(invalid("namespace", ns, "namespace must not be empty when set"));
            }
        }

        if self.max_include_depth > MAX_INCLUDE_DEPTH_LIMIT {
            return Err(invalid(
                "max_include_depth",
                &self.max_include_depth.to_string(),
                &format!("max_include_depth must be at most {}", MAX_INCLUDE_DEPTH_LIMIT),
            ));
        }

        if self.lmdb_max_size_mb == 0 {
            return Err(invalid(
                "lmdb_max_size_mb",
                "0",
                "lmdb_max_size_mb must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Options for adaptors built from this config.
    pub fn adaptor_options(&self) -> AdaptorOptions {
        AdaptorOptions {
            namespace: self.namespace.clone(),
            lifetime: self.lifetime,
        }
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> OvercacheError {
    OvercacheError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}
