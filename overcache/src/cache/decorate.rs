//! Decoration layer.
//!
//! [`with_cache`] wraps a cache client, a backing store and a model registry
//! into a [`CacheLayer`]. Each model type is then reached through a
//! [`CachedModel`], which implements [`Cacheable`]. The accessors hold
//! nothing but borrows, so calling them is free of side effects.

use super::class::{CustomKeyCache, IdentityCache};
use super::instance::InstanceCache;
use super::protocol::CacheContext;
use overcache_core::{
    ModelDescriptor, ModelInstance, ModelRegistry, OvercacheConfig, OvercacheResult,
};
use overcache_storage::{BackingStore, CacheAdaptor};
use std::sync::Arc;

/// Build a cache layer over `backing`, storing entries through `client`.
pub fn with_cache<C: CacheAdaptor>(
    client: Arc<C>,
    backing: Arc<dyn BackingStore>,
    registry: Arc<ModelRegistry>,
) -> CacheLayer<C> {
    CacheLayer {
        ctx: Arc::new(CacheContext::new(client, backing, registry)),
    }
}

/// Entry point for cached operations on every registered model type.
pub struct CacheLayer<C: CacheAdaptor> {
    ctx: Arc<CacheContext<C>>,
}

impl<C: CacheAdaptor> Clone for CacheLayer<C> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<C: CacheAdaptor> std::fmt::Debug for CacheLayer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer").finish_non_exhaustive()
    }
}

impl<C: CacheAdaptor> CacheLayer<C> {
    /// Bound association reconstruction of cached records to `depth` levels.
    pub fn with_max_depth(self, depth: usize) -> Self {
        let ctx = CacheContext {
            client: Arc::clone(&self.ctx.client),
            backing: Arc::clone(&self.ctx.backing),
            registry: Arc::clone(&self.ctx.registry),
            max_depth: depth,
        };
        Self { ctx: Arc::new(ctx) }
    }

    /// Apply the settings of a validated config.
    pub fn with_config(self, config: &OvercacheConfig) -> OvercacheResult<Self> {
        config.validate()?;
        Ok(self.with_max_depth(config.max_include_depth))
    }

    pub fn client(&self) -> &Arc<C> {
        self.ctx.client()
    }

    /// The undecorated backing store, for operations that must bypass the cache.
    pub fn backing(&self) -> &Arc<dyn BackingStore> {
        self.ctx.backing()
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.ctx.registry()
    }

    pub fn context(&self) -> &CacheContext<C> {
        &self.ctx
    }

    /// The cached view of model `name`.
    pub fn model(&self, name: &str) -> OvercacheResult<CachedModel<C>> {
        let model = self.ctx.registry.require(name)?;
        Ok(CachedModel {
            ctx: Arc::clone(&self.ctx),
            model,
        })
    }

    /// Instance operations for `instance`, whatever its model type.
    pub fn instance<'a>(&'a self, instance: &'a mut ModelInstance) -> InstanceCache<'a, C> {
        InstanceCache::new(&self.ctx, instance)
    }
}

/// Operation set chosen by whether a custom key was supplied.
pub enum ModelCache<'a, C: CacheAdaptor> {
    Identity(IdentityCache<'a, C>),
    Custom(CustomKeyCache<'a, C>),
}

/// Capability of reaching cache-aware operations for one model type.
pub trait Cacheable {
    type Client: CacheAdaptor;

    /// Identity-keyed operations.
    fn cache(&self) -> IdentityCache<'_, Self::Client>;

    /// Query-result operations under `custom_key`.
    fn cache_with_key<'a>(&'a self, custom_key: &'a str) -> CustomKeyCache<'a, Self::Client>;

    /// Instance operations bound to `instance`'s identity key.
    fn cache_instance<'a>(
        &'a self,
        instance: &'a mut ModelInstance,
    ) -> InstanceCache<'a, Self::Client>;

    fn cache_for<'a>(&'a self, custom_key: Option<&'a str>) -> ModelCache<'a, Self::Client> {
        match custom_key {
            Some(key) => ModelCache::Custom(self.cache_with_key(key)),
            None => ModelCache::Identity(self.cache()),
        }
    }
}

/// One model type seen through the cache layer.
pub struct CachedModel<C: CacheAdaptor> {
    ctx: Arc<CacheContext<C>>,
    model: Arc<ModelDescriptor>,
}

impl<C: CacheAdaptor> Clone for CachedModel<C> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            model: Arc::clone(&self.model),
        }
    }
}

impl<C: CacheAdaptor> CachedModel<C> {
    pub fn descriptor(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn backing(&self) -> &Arc<dyn BackingStore> {
        self.ctx.backing()
    }

    /// A new, unsaved instance of this model.
    pub fn build(&self) -> ModelInstance {
        ModelInstance::build(Arc::clone(&self.model))
    }
}

impl<C: CacheAdaptor> Cacheable for CachedModel<C> {
    type Client = C;

    fn cache(&self) -> IdentityCache<'_, C> {
        IdentityCache::new(&self.ctx, &self.model)
    }

    fn cache_with_key<'a>(&'a self, custom_key: &'a str) -> CustomKeyCache<'a, C> {
        CustomKeyCache::new(&self.ctx, &self.model, custom_key)
    }

    fn cache_instance<'a>(&'a self, instance: &'a mut ModelInstance) -> InstanceCache<'a, C> {
        InstanceCache::new(&self.ctx, instance)
    }
}

impl<C: CacheAdaptor> std::fmt::Debug for CachedModel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedModel")
            .field("model", &self.model.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overcache_core::{AttributeKind, ConfigError, OvercacheError};
    use overcache_storage::{InMemoryBackingStore, MemoryAdaptor};

    fn layer() -> CacheLayer<MemoryAdaptor> {
        let mut registry = ModelRegistry::new();
        registry.register(
            ModelDescriptor::builder("User")
                .primary_key("id", AttributeKind::Integer)
                .attribute("name", AttributeKind::Text)
                .build()
                .unwrap(),
        );
        let registry = Arc::new(registry);
        let backing = InMemoryBackingStore::new(Arc::clone(&registry));
        with_cache(Arc::new(MemoryAdaptor::fresh()), Arc::new(backing), registry)
    }

    #[test]
    fn test_model_lookup() {
        let layer = layer();
        assert_eq!(layer.model("User").unwrap().name(), "User");
        assert!(layer.model("Nope").is_err());
    }

    #[test]
    fn test_cache_for_dispatch() {
        let users = layer().model("User").unwrap();
        assert!(matches!(users.cache_for(None), ModelCache::Identity(_)));
        match users.cache_for(Some("active")) {
            ModelCache::Custom(custom) => assert_eq!(custom.custom_key(), "active"),
            ModelCache::Identity(_) => panic!("expected custom-key operations"),
        }
    }

    #[test]
    fn test_with_max_depth_keeps_client() {
        let layer = layer();
        let deeper = layer.clone().with_max_depth(4);
        assert_eq!(deeper.context().max_depth(), 4);
        assert_eq!(layer.context().max_depth(), 2);
        assert!(Arc::ptr_eq(layer.client(), deeper.client()));
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let config = OvercacheConfig {
            max_include_depth: 99,
            ..OvercacheConfig::default()
        };
        let err = layer().with_config(&config).unwrap_err();
        assert!(matches!(
            err,
            OvercacheError::Config(ConfigError::InvalidValue { .. })
        ));
    }
}
