//! Cache a user model through create, read, update and a keyed query.
//!
//! ```text
//! cargo run --example users             # in-memory cache
//! cargo run --example users -- redis    # Redis at OVERCACHE_REDIS_URL
//! cargo run --example users -- lmdb     # LMDB at OVERCACHE_LMDB_PATH
//! RUST_LOG=overcache=debug cargo run --example users
//! ```

use overcache::{
    values, with_cache, AttributeKind, CacheAdaptor, CacheLayer, Cacheable, FindOptions,
    LmdbAdaptor, MemoryAdaptor, MemoryStore, ModelDescriptor, ModelRegistry, OvercacheConfig,
    OvercacheResult, RedisAdaptor, Value,
};
use overcache_core::ConfigError;
use overcache_storage::InMemoryBackingStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn registry() -> OvercacheResult<Arc<ModelRegistry>> {
    let mut registry = ModelRegistry::new();
    registry.register(
        ModelDescriptor::builder("User")
            .primary_key("id", AttributeKind::Integer)
            .attribute("name", AttributeKind::Text)
            .timestamps()
            .build()?,
    );
    Ok(Arc::new(registry))
}

async fn run<C: CacheAdaptor>(layer: CacheLayer<C>) -> OvercacheResult<()> {
    let users = layer.model("User")?;

    // Create user in the backing store and in the cache.
    users
        .cache()
        .create(values([("id", Value::from(1)), ("name", Value::from("Daniel"))]))
        .await?;

    // Load user from the cache.
    let Some(mut user) = users.cache().find_by_pk(1).await? else {
        tracing::warn!("user 1 vanished");
        return Ok(());
    };
    tracing::info!(name = ?user.get("name"), "loaded user");

    // Update in the backing store and the cache.
    users
        .cache_instance(&mut user)
        .update(values([("name", Value::from("Vikki"))]))
        .await?;

    // Cache the result of an arbitrary query under a custom key.
    let query = FindOptions::new().filter("name", "Vikki");
    let found = users.cache_with_key("vikki-users").find_all(&query).await?;
    tracing::info!(count = found.len(), "cached query result");

    Ok(())
}

#[tokio::main]
async fn main() -> OvercacheResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("overcache=debug,info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = OvercacheConfig::from_env();
    config.validate()?;
    let registry = registry()?;
    let backing = Arc::new(InMemoryBackingStore::new(Arc::clone(&registry)));
    let options = config.adaptor_options();

    match std::env::args().nth(1).as_deref() {
        Some("redis") => {
            let adaptor = RedisAdaptor::connect(&config.redis_url, options).await?;
            run(with_cache(Arc::new(adaptor), backing, registry).with_config(&config)?).await
        }
        Some("lmdb") => {
            let path = config
                .lmdb_path
                .clone()
                .ok_or(ConfigError::MissingRequired {
                    field: "OVERCACHE_LMDB_PATH".to_string(),
                })?;
            let adaptor = LmdbAdaptor::open(path, config.lmdb_max_size_mb, options)?;
            run(with_cache(Arc::new(adaptor), backing, registry).with_config(&config)?).await
        }
        _ => {
            let adaptor = MemoryAdaptor::new(MemoryStore::new(), options);
            let store = adaptor.store().clone();
            run(with_cache(Arc::new(adaptor), backing, registry).with_config(&config)?).await?;
            for key in store.keys().await {
                tracing::info!(key = %key, raw = ?store.raw(&key).await, "cache entry");
            }
            Ok(())
        }
    }
}
