//! Backing relational-store interface.
//!
//! The cache layer consumes this trait and never looks behind it. An
//! implementation owns persistence, identity assignment, timestamps and
//! association loading; the cache only mirrors what it returns.

use async_trait::async_trait;
use overcache_core::{
    Association, ModelDescriptor, ModelInstance, OvercacheResult, PrimaryKey, Value, Values,
};
use std::sync::Arc;

/// One association to load alongside a row, with its own nested includes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Include {
    pub association: String,
    pub include: Vec<Include>,
}

impl Include {
    pub fn new(association: impl Into<String>) -> Self {
        Self {
            association: association.into(),
            include: Vec::new(),
        }
    }

    /// Also load `nested` on every instance this include produces.
    pub fn with(mut self, nested: Include) -> Self {
        self.include.push(nested);
        self
    }

    /// Includes matching the associations currently loaded on `instance`.
    pub fn from_loaded(instance: &ModelInstance) -> Vec<Include> {
        instance
            .associations()
            .iter()
            .map(|(name, association)| {
                let nested = match association {
                    Association::One(Some(inner)) => Self::from_loaded(inner),
                    Association::One(None) => Vec::new(),
                    Association::Many(items) => items.first().map(Self::from_loaded).unwrap_or_default(),
                };
                Include {
                    association: name.clone(),
                    include: nested,
                }
            })
            .collect()
    }
}

/// Query options for reads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindOptions {
    /// Attribute equality conditions, all of which must hold.
    pub filter: Values,
    pub include: Vec<Include>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(attribute.into(), value.into());
        self
    }

    pub fn include(mut self, include: Include) -> Self {
        self.include.push(include);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reload options that refresh whatever `instance` already has loaded.
    pub fn reloading(instance: &ModelInstance) -> Self {
        Self {
            include: Include::from_loaded(instance),
            ..Self::default()
        }
    }
}

/// Async backing-store trait for model operations.
///
/// Absent rows are `Ok(None)`; failures propagate as errors.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Insert a new row and return it as a persisted instance.
    async fn create(
        &self,
        model: &Arc<ModelDescriptor>,
        values: Values,
    ) -> OvercacheResult<ModelInstance>;

    /// Get a row by primary key.
    async fn find_by_pk(
        &self,
        model: &Arc<ModelDescriptor>,
        pk: &PrimaryKey,
        options: &FindOptions,
    ) -> OvercacheResult<Option<ModelInstance>>;

    /// All rows matching `options`, in insertion order.
    async fn find_all(
        &self,
        model: &Arc<ModelDescriptor>,
        options: &FindOptions,
    ) -> OvercacheResult<Vec<ModelInstance>>;

    /// First row matching `options`.
    async fn find_one(
        &self,
        model: &Arc<ModelDescriptor>,
        options: &FindOptions,
    ) -> OvercacheResult<Option<ModelInstance>> {
        let options = FindOptions {
            limit: Some(1),
            ..options.clone()
        };
        Ok(self.find_all(model, &options).await?.into_iter().next())
    }

    /// Insert or update by primary key.
    ///
    /// Returns the written row and whether it was created, when the store
    /// can tell.
    async fn upsert(
        &self,
        model: &Arc<ModelDescriptor>,
        values: Values,
    ) -> OvercacheResult<(ModelInstance, Option<bool>)>;

    /// Apply `values` to the instance and persist them.
    async fn update(&self, instance: &mut ModelInstance, values: Values) -> OvercacheResult<()>;

    /// Persist the instance, inserting it if it is a new record.
    async fn save(&self, instance: &mut ModelInstance) -> OvercacheResult<()>;

    /// Refresh the instance from its stored row.
    async fn reload(&self, instance: &mut ModelInstance, options: &FindOptions)
        -> OvercacheResult<()>;

    /// Delete the instance's row.
    async fn destroy(&self, instance: &mut ModelInstance) -> OvercacheResult<()>;
}
