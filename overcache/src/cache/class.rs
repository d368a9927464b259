//! Class-level operation sets.
//!
//! [`IdentityCache`] keys entries by primary key; [`CustomKeyCache`] keys
//! query results by a caller-supplied string. The two never share entries.

use super::protocol::{passthrough, CacheContext, CacheOperation};
use overcache_core::{
    CacheKey, ModelDescriptor, ModelInstance, OvercacheResult, PrimaryKey, Values,
};
use overcache_storage::{CacheAdaptor, FindOptions};
use std::sync::Arc;

/// Identity-keyed operations for one model type.
pub struct IdentityCache<'a, C: CacheAdaptor> {
    ctx: &'a CacheContext<C>,
    model: &'a Arc<ModelDescriptor>,
}

impl<'a, C: CacheAdaptor> IdentityCache<'a, C> {
    pub(crate) fn new(ctx: &'a CacheContext<C>, model: &'a Arc<ModelDescriptor>) -> Self {
        Self { ctx, model }
    }

    pub fn client(&self) -> &Arc<C> {
        self.ctx.client()
    }

    /// Create a row and cache it under its identity key.
    pub async fn create(&self, values: Values) -> OvercacheResult<ModelInstance> {
        let instance = self
            .ctx
            .backing
            .create(self.model, values)
            .await
            .map_err(|e| passthrough(CacheOperation::Create, e))?;
        self.ctx.save_instance(&instance).await?;
        Ok(instance)
    }

    /// Find by primary key, serving from the cache when possible.
    pub async fn find_by_pk(
        &self,
        pk: impl Into<PrimaryKey>,
    ) -> OvercacheResult<Option<ModelInstance>> {
        self.find_by_pk_with(pk, &FindOptions::default()).await
    }

    /// Find by primary key with backing-store options (e.g. includes) for a miss.
    ///
    /// A hit returns whatever was cached, regardless of `options`.
    pub async fn find_by_pk_with(
        &self,
        pk: impl Into<PrimaryKey>,
        options: &FindOptions,
    ) -> OvercacheResult<Option<ModelInstance>> {
        let pk = pk.into();
        let key = CacheKey::identity(self.model, &pk)?;
        if let Some(hit) = self.ctx.load(self.model, &key).await? {
            return Ok(Some(hit));
        }

        let found = self
            .ctx
            .backing
            .find_by_pk(self.model, &pk, options)
            .await
            .map_err(|e| passthrough(CacheOperation::FindByPk, e))?;
        match found {
            Some(instance) => {
                self.ctx.save_instance(&instance).await?;
                Ok(Some(instance))
            }
            None => Ok(None),
        }
    }

    /// Upsert a row and drop its identity entry.
    ///
    /// The upsert result is never cached; the next read refetches it.
    pub async fn upsert(&self, values: Values) -> OvercacheResult<(ModelInstance, Option<bool>)> {
        let key = match PrimaryKey::from_values(self.model, &values) {
            Some(pk) => Some(CacheKey::identity(self.model, &pk)?),
            None => None,
        };
        let result = self
            .ctx
            .backing
            .upsert(self.model, values)
            .await
            .map_err(|e| passthrough(CacheOperation::Upsert, e))?;
        match key {
            Some(key) => self.ctx.invalidate(&key).await?,
            None => tracing::warn!(
                model = self.model.name(),
                "upsert without primary key, nothing to invalidate"
            ),
        }
        Ok(result)
    }

    /// [`upsert`](Self::upsert), returning only whether a row was created.
    pub async fn insert_or_update(&self, values: Values) -> OvercacheResult<Option<bool>> {
        let (_, created) = self.upsert(values).await?;
        Ok(created)
    }

    /// Drop the identity entry for `pk`. The backing store is not touched.
    pub async fn clear(&self, pk: impl Into<PrimaryKey>) -> OvercacheResult<()> {
        let key = CacheKey::identity(self.model, &pk.into())?;
        self.ctx.invalidate(&key).await
    }
}

/// Query-result operations for one model type under one custom key.
///
/// `find_all` and `find_one` share the key `[Model, customKey]`; use
/// different custom keys for different query shapes.
pub struct CustomKeyCache<'a, C: CacheAdaptor> {
    ctx: &'a CacheContext<C>,
    model: &'a Arc<ModelDescriptor>,
    custom_key: &'a str,
}

impl<'a, C: CacheAdaptor> CustomKeyCache<'a, C> {
    pub(crate) fn new(
        ctx: &'a CacheContext<C>,
        model: &'a Arc<ModelDescriptor>,
        custom_key: &'a str,
    ) -> Self {
        Self {
            ctx,
            model,
            custom_key,
        }
    }

    pub fn client(&self) -> &Arc<C> {
        self.ctx.client()
    }

    pub fn custom_key(&self) -> &str {
        self.custom_key
    }

    fn key(&self) -> OvercacheResult<CacheKey> {
        CacheKey::custom(self.model, self.custom_key)
    }

    /// All rows matching `options`, cached as one ordered list.
    ///
    /// An empty result is cached too.
    pub async fn find_all(&self, options: &FindOptions) -> OvercacheResult<Vec<ModelInstance>> {
        let key = self.key()?;
        if let Some(hit) = self.ctx.load_all(self.model, &key).await? {
            return Ok(hit);
        }

        let found = self
            .ctx
            .backing
            .find_all(self.model, options)
            .await
            .map_err(|e| passthrough(CacheOperation::FindAll, e))?;
        self.ctx.save_all(&key, &found).await?;
        Ok(found)
    }

    /// First row matching `options`. A missing row is not cached.
    pub async fn find_one(&self, options: &FindOptions) -> OvercacheResult<Option<ModelInstance>> {
        let key = self.key()?;
        if let Some(hit) = self.ctx.load(self.model, &key).await? {
            return Ok(Some(hit));
        }

        let found = self
            .ctx
            .backing
            .find_one(self.model, options)
            .await
            .map_err(|e| passthrough(CacheOperation::FindOne, e))?;
        if let Some(instance) = &found {
            self.ctx.save_at(&key, instance).await?;
        }
        Ok(found)
    }

    /// Drop the entry for this custom key.
    pub async fn clear(&self) -> OvercacheResult<()> {
        let key = self.key()?;
        self.ctx.invalidate(&key).await
    }
}
