//! Cache key / operation protocol.
//!
//! Every cached operation makes exactly one decision: read through, write
//! through or invalidate. The backing call always comes first; the cache is
//! touched only after it succeeds.

use overcache_core::{
    to_instance, to_instances, to_json, CacheKey, ModelDescriptor, ModelInstance, ModelRegistry,
    OvercacheError, OvercacheResult, DEFAULT_MAX_DEPTH,
};
use overcache_storage::{BackingStore, CacheAdaptor};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Every operation the cache layer intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOperation {
    Create,
    FindByPk,
    FindAll,
    FindOne,
    Upsert,
    Update,
    Reload,
    Save,
    Destroy,
    Clear,
}

impl CacheOperation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::FindByPk => "find_by_pk",
            Self::FindAll => "find_all",
            Self::FindOne => "find_one",
            Self::Upsert => "upsert",
            Self::Update => "update",
            Self::Reload => "reload",
            Self::Save => "save",
            Self::Destroy => "destroy",
            Self::Clear => "clear",
        }
    }
}

/// Shared state behind every operation set: the cache client, the backing
/// store, the model registry and the reconstruction depth.
pub struct CacheContext<C: CacheAdaptor> {
    pub(crate) client: Arc<C>,
    pub(crate) backing: Arc<dyn BackingStore>,
    pub(crate) registry: Arc<ModelRegistry>,
    pub(crate) max_depth: usize,
}

impl<C: CacheAdaptor> CacheContext<C> {
    pub fn new(
        client: Arc<C>,
        backing: Arc<dyn BackingStore>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            client,
            backing,
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn backing(&self) -> &Arc<dyn BackingStore> {
        &self.backing
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Store `instance` under its identity key.
    pub async fn save_instance(&self, instance: &ModelInstance) -> OvercacheResult<()> {
        let key = instance.identity_key()?;
        self.save_at(&key, instance).await
    }

    /// Store `instance` under an explicit key.
    pub async fn save_at(&self, key: &CacheKey, instance: &ModelInstance) -> OvercacheResult<()> {
        self.client.set(key, &to_json(instance)).await?;
        tracing::debug!(key = %key, model = instance.model_name(), "cache fill");
        Ok(())
    }

    /// Store an ordered result list under `key`.
    pub async fn save_all(&self, key: &CacheKey, instances: &[ModelInstance]) -> OvercacheResult<()> {
        let records: Vec<JsonValue> = instances.iter().map(to_json).collect();
        self.client.set(key, &records).await?;
        tracing::debug!(key = %key, count = records.len(), "cache fill");
        Ok(())
    }

    /// Read one instance from `key`.
    ///
    /// An absent, empty or undecodable entry is a miss.
    pub async fn load(
        &self,
        model: &Arc<ModelDescriptor>,
        key: &CacheKey,
    ) -> OvercacheResult<Option<ModelInstance>> {
        let Some(record) = self.fetch(key).await? else {
            return Ok(None);
        };
        match to_instance(&self.registry, model, Some(&record), self.max_depth) {
            Some(instance) => {
                tracing::debug!(key = %key, model = model.name(), "cache hit");
                Ok(Some(instance))
            }
            None => {
                tracing::debug!(key = %key, model = model.name(), "cache miss");
                Ok(None)
            }
        }
    }

    /// Read a result list from `key`. Any array, even an empty one, is a hit.
    pub async fn load_all(
        &self,
        model: &Arc<ModelDescriptor>,
        key: &CacheKey,
    ) -> OvercacheResult<Option<Vec<ModelInstance>>> {
        match self.fetch(key).await? {
            Some(JsonValue::Array(records)) => {
                tracing::debug!(key = %key, model = model.name(), count = records.len(), "cache hit");
                Ok(Some(to_instances(
                    &self.registry,
                    model,
                    &records,
                    self.max_depth,
                )))
            }
            Some(_) => {
                tracing::warn!(key = %key, model = model.name(), "cached entry is not a list");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Delete the entry at `key`.
    pub async fn invalidate(&self, key: &CacheKey) -> OvercacheResult<()> {
        self.client.del(key).await?;
        tracing::debug!(key = %key, "cache invalidate");
        Ok(())
    }

    async fn fetch(&self, key: &CacheKey) -> OvercacheResult<Option<JsonValue>> {
        match self.client.get::<JsonValue>(key).await {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                Ok(None)
            }
            Err(e) if e.is_decode_failure() => {
                tracing::warn!(key = %key, error = %e, "undecodable cache entry treated as miss");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl<C: CacheAdaptor> std::fmt::Debug for CacheContext<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("models", &self.registry.len())
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

/// Errors that leave the cache untouched carry through unchanged.
pub(crate) fn passthrough(operation: CacheOperation, error: OvercacheError) -> OvercacheError {
    tracing::debug!(operation = operation.name(), error = %error, "backing call failed");
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names_are_distinct() {
        let ops = [
            CacheOperation::Create,
            CacheOperation::FindByPk,
            CacheOperation::FindAll,
            CacheOperation::FindOne,
            CacheOperation::Upsert,
            CacheOperation::Update,
            CacheOperation::Reload,
            CacheOperation::Save,
            CacheOperation::Destroy,
            CacheOperation::Clear,
        ];
        let names: std::collections::HashSet<_> = ops.iter().map(|op| op.name()).collect();
        assert_eq!(names.len(), ops.len());
    }
}
