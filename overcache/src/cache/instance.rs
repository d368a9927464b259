//! Instance-level operation set.

use super::protocol::{passthrough, CacheContext, CacheOperation};
use overcache_core::{ModelInstance, OvercacheResult, Values};
use overcache_storage::{CacheAdaptor, FindOptions};
use std::sync::Arc;

/// Operations bound to one instance's identity key.
pub struct InstanceCache<'a, C: CacheAdaptor> {
    ctx: &'a CacheContext<C>,
    instance: &'a mut ModelInstance,
}

impl<'a, C: CacheAdaptor> InstanceCache<'a, C> {
    pub(crate) fn new(ctx: &'a CacheContext<C>, instance: &'a mut ModelInstance) -> Self {
        Self { ctx, instance }
    }

    pub fn client(&self) -> &Arc<C> {
        self.ctx.client()
    }

    pub fn instance(&self) -> &ModelInstance {
        &*self.instance
    }

    /// Persist the instance and cache it.
    pub async fn save(&mut self) -> OvercacheResult<()> {
        self.ctx
            .backing
            .save(&mut *self.instance)
            .await
            .map_err(|e| passthrough(CacheOperation::Save, e))?;
        self.ctx.save_instance(&*self.instance).await
    }

    /// Apply `values`, persist them and cache the refreshed instance.
    pub async fn update(&mut self, values: Values) -> OvercacheResult<()> {
        self.ctx
            .backing
            .update(&mut *self.instance, values)
            .await
            .map_err(|e| passthrough(CacheOperation::Update, e))?;
        self.ctx.save_instance(&*self.instance).await
    }

    /// Reload with the associations already loaded on the instance, then cache.
    pub async fn reload(&mut self) -> OvercacheResult<()> {
        let options = FindOptions::reloading(&*self.instance);
        self.reload_with(&options).await
    }

    pub async fn reload_with(&mut self, options: &FindOptions) -> OvercacheResult<()> {
        self.ctx
            .backing
            .reload(&mut *self.instance, options)
            .await
            .map_err(|e| passthrough(CacheOperation::Reload, e))?;
        self.ctx.save_instance(&*self.instance).await
    }

    /// Delete the row and drop its cache entry.
    pub async fn destroy(&mut self) -> OvercacheResult<()> {
        self.ctx
            .backing
            .destroy(&mut *self.instance)
            .await
            .map_err(|e| passthrough(CacheOperation::Destroy, e))?;
        self.clear().await
    }

    /// Drop the cache entry. The backing store is not touched.
    pub async fn clear(&self) -> OvercacheResult<()> {
        let key = self.instance.identity_key()?;
        self.ctx.invalidate(&key).await
    }
}
