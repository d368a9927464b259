//! Overcache - Transparent Cache Overlay for ORM Model Operations
//!
//! Wraps a backing relational store so that model reads are served from a
//! key-value cache when possible and model writes keep that cache current.
//!
//! ```ignore
//! let layer = with_cache(Arc::new(adaptor), Arc::new(backing), registry);
//! let users = layer.model("User")?;
//!
//! // Write-through: the new row is cached under ["User", "1"].
//! let mut daniel = users.cache().create(values([("name", Value::from("Daniel"))])).await?;
//!
//! // Read-through: served from the cache, no backing query.
//! let again = users.cache().find_by_pk(1).await?;
//!
//! // Instance write-through.
//! users.cache_instance(&mut daniel).update(values([("name", Value::from("Vikki"))])).await?;
//!
//! // Query results under a caller-chosen key.
//! let all = users.cache_with_key("all").find_all(&FindOptions::new()).await?;
//! ```
//!
//! Invalidation is always explicit: upsert, destroy and clear delete the
//! entry. Nothing expires except through the adaptor's configured lifetime.

pub mod cache;

pub use cache::{
    with_cache, CacheContext, CacheLayer, CacheOperation, Cacheable, CachedModel,
    CustomKeyCache, IdentityCache, InstanceCache, ModelCache,
};

pub use overcache_core::{
    values, AdaptorOptions, Association, AttributeKind, CacheKey, ModelDescriptor, ModelInstance,
    ModelRegistry, OvercacheConfig, OvercacheError, OvercacheResult, PrimaryKey, Value, Values,
};
pub use overcache_storage::{
    BackingStore, CacheAdaptor, FindOptions, Include, LmdbAdaptor, MemoryAdaptor, MemoryStore,
    RedisAdaptor,
};
