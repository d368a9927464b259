//! In-memory backing store.
//!
//! Rows live in per-model tables keyed by their primary key. Association
//! links are stored explicitly per owner row. Every public operation bumps a
//! call counter so tests can check exactly how often the cache fell through.

use crate::backing::{BackingStore, FindOptions, Include};
use async_trait::async_trait;
use chrono::Utc;
use overcache_core::model::{CREATED_AT, DELETED_AT, UPDATED_AT};
use overcache_core::{
    Association, AttributeKind, CacheKey, ModelDescriptor, ModelError, ModelInstance,
    ModelRegistry, OvercacheError, OvercacheResult, PrimaryKey, StorageError, Value, Values,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
struct Row {
    seq: u64,
    values: Values,
}

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<String, Row>,
    last_id: i64,
}

/// (owner model, owner row key, association name)
type LinkKey = (String, String, String);

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    links: HashMap<LinkKey, Vec<String>>,
    next_seq: u64,
}

/// Snapshot of how many times each operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: u64,
    pub find_by_pk: u64,
    pub find_all: u64,
    pub find_one: u64,
    pub upsert: u64,
    pub update: u64,
    pub save: u64,
    pub reload: u64,
    pub destroy: u64,
}

impl CallCounts {
    pub fn total(&self) -> u64 {
        self.create
            + self.find_by_pk
            + self.find_all
            + self.find_one
            + self.upsert
            + self.update
            + self.save
            + self.reload
            + self.destroy
    }

    /// Number of read operations.
    pub fn reads(&self) -> u64 {
        self.find_by_pk + self.find_all + self.find_one + self.reload
    }
}

#[derive(Debug, Default)]
struct Counters {
    create: AtomicU64,
    find_by_pk: AtomicU64,
    find_all: AtomicU64,
    find_one: AtomicU64,
    upsert: AtomicU64,
    update: AtomicU64,
    save: AtomicU64,
    reload: AtomicU64,
    destroy: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CallCounts {
        CallCounts {
            create: self.create.load(Ordering::Relaxed),
            find_by_pk: self.find_by_pk.load(Ordering::Relaxed),
            find_all: self.find_all.load(Ordering::Relaxed),
            find_one: self.find_one.load(Ordering::Relaxed),
            upsert: self.upsert.load(Ordering::Relaxed),
            update: self.update.load(Ordering::Relaxed),
            save: self.save.load(Ordering::Relaxed),
            reload: self.reload.load(Ordering::Relaxed),
            destroy: self.destroy.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.create,
            &self.find_by_pk,
            &self.find_all,
            &self.find_one,
            &self.upsert,
            &self.update,
            &self.save,
            &self.reload,
            &self.destroy,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// In-memory backing store for tests and demos.
#[derive(Debug, Clone)]
pub struct InMemoryBackingStore {
    registry: Arc<ModelRegistry>,
    state: Arc<RwLock<State>>,
    counters: Arc<Counters>,
    unavailable: Arc<AtomicBool>,
}

fn row_key(model: &ModelDescriptor, pk: &PrimaryKey) -> OvercacheResult<String> {
    Ok(CacheKey::identity(model, pk)?.to_string())
}

fn is_live(row: &Row) -> bool {
    row.values.get(DELETED_AT).map_or(true, Value::is_null)
}

fn row_matches(row: &Row, filter: &Values) -> bool {
    filter
        .iter()
        .all(|(name, expected)| row.values.get(name).unwrap_or(&Value::Null) == expected)
}

fn stamp(model: &ModelDescriptor, values: &mut Values, creating: bool) {
    if !model.timestamps() {
        return;
    }
    let now = Value::Timestamp(Utc::now());
    if creating {
        values.insert(CREATED_AT.to_string(), now.clone());
    }
    values.insert(UPDATED_AT.to_string(), now);
}

impl InMemoryBackingStore {
    /// Create an empty store for the models in `registry`.
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            state: Arc::new(RwLock::new(State::default())),
            counters: Arc::new(Counters::default()),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Operation counts since creation or the last reset.
    pub fn calls(&self) -> CallCounts {
        self.counters.snapshot()
    }

    pub fn reset_calls(&self) {
        self.counters.reset();
    }

    /// Make every following operation fail with [`StorageError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Stored values of one row, without counting a call.
    pub fn peek(
        &self,
        model: &ModelDescriptor,
        pk: &PrimaryKey,
    ) -> OvercacheResult<Option<Values>> {
        let key = row_key(model, pk)?;
        let state = self.read()?;
        Ok(state
            .tables
            .get(model.name())
            .and_then(|t| t.rows.get(&key))
            .map(|r| r.values.clone()))
    }

    /// Number of live rows of `model`.
    pub fn count(&self, model: &ModelDescriptor) -> OvercacheResult<usize> {
        let state = self.read()?;
        Ok(state
            .tables
            .get(model.name())
            .map_or(0, |t| t.rows.values().filter(|r| is_live(r)).count()))
    }

    /// Replace the rows linked to `owner` through `association`.
    pub fn link(
        &self,
        owner: &ModelInstance,
        association: &str,
        targets: &[&ModelInstance],
    ) -> OvercacheResult<()> {
        let model = owner.model();
        let descriptor = model.require_association(association)?;
        if !descriptor.cardinality.is_collection() && targets.len() > 1 {
            return Err(StorageError::ConstraintViolation {
                constraint: format!("{}.{}", model.name(), association),
                reason: "single-valued association linked to several rows".to_string(),
            }
            .into());
        }

        let owner_key = row_key(model, &owner.primary_key()?)?;
        let mut target_keys = Vec::with_capacity(targets.len());
        for target in targets {
            if target.model_name() != descriptor.target {
                return Err(ModelError::InvalidDefinition {
                    model: model.name().to_string(),
                    reason: format!(
                        "association {} expects {}, got {}",
                        association,
                        descriptor.target,
                        target.model_name()
                    ),
                }
                .into());
            }
            target_keys.push(row_key(target.model(), &target.primary_key()?)?);
        }

        let mut state = self.write()?;
        state.links.insert(
            (model.name().to_string(), owner_key, association.to_string()),
            target_keys,
        );
        Ok(())
    }

    /// Remove every row and link. Counters are kept.
    pub fn clear(&self) -> OvercacheResult<()> {
        let mut state = self.write()?;
        *state = State::default();
        Ok(())
    }

    fn read(&self) -> OvercacheResult<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| OvercacheError::from(StorageError::LockPoisoned))
    }

    fn write(&self) -> OvercacheResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| OvercacheError::from(StorageError::LockPoisoned))
    }

    fn enter(&self, counter: &AtomicU64) -> OvercacheResult<()> {
        counter.fetch_add(1, Ordering::Relaxed);
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StorageError::Unavailable {
                reason: "backing store marked unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Validate `values`, assign identity and timestamps, and insert a row.
    fn insert_row(
        &self,
        state: &mut State,
        model: &Arc<ModelDescriptor>,
        values: Values,
    ) -> OvercacheResult<ModelInstance> {
        let mut instance = ModelInstance::with_values(Arc::clone(model), values)?;
        let table = state.tables.entry(model.name().to_string()).or_default();

        if let [pk_name] = model.primary_key() {
            let auto = model
                .attribute(pk_name)
                .is_some_and(|a| a.kind == AttributeKind::Integer);
            match instance.get(pk_name).and_then(Value::as_i64) {
                Some(id) => table.last_id = table.last_id.max(id),
                None if auto && instance.get(pk_name).map_or(true, Value::is_null) => {
                    table.last_id += 1;
                    instance.set(pk_name, table.last_id)?;
                }
                None => {}
            }
        }

        let key = row_key(model, &instance.primary_key()?)?;
        if table.rows.contains_key(&key) {
            return Err(StorageError::InsertFailed {
                model: model.name().to_string(),
                reason: format!("row {} already exists", key),
            }
            .into());
        }

        let mut stored = instance.values().clone();
        stamp(model, &mut stored, true);
        state.next_seq += 1;
        let seq = state.next_seq;
        state
            .tables
            .entry(model.name().to_string())
            .or_default()
            .rows
            .insert(key, Row { seq, values: stored.clone() });

        let mut created = ModelInstance::with_values(Arc::clone(model), stored)?;
        created.mark_persisted();
        Ok(created)
    }

    /// Merge `values` into an existing row and bump its update time.
    fn update_row(
        state: &mut State,
        model: &ModelDescriptor,
        key: &str,
        values: &Values,
    ) -> OvercacheResult<Values> {
        let row = state
            .tables
            .get_mut(model.name())
            .and_then(|t| t.rows.get_mut(key))
            .filter(|r| is_live(r))
            .ok_or_else(|| StorageError::UpdateFailed {
                model: model.name().to_string(),
                key: key.to_string(),
                reason: "row does not exist".to_string(),
            })?;
        row.values
            .extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        stamp(model, &mut row.values, false);
        Ok(row.values.clone())
    }

    fn materialize(
        &self,
        state: &State,
        model: &Arc<ModelDescriptor>,
        key: &str,
        row: &Row,
        include: &[Include],
    ) -> OvercacheResult<ModelInstance> {
        let mut instance = ModelInstance::with_values(Arc::clone(model), row.values.clone())?;
        instance.mark_persisted();
        self.load_includes(state, &mut instance, key, include)?;
        Ok(instance)
    }

    fn load_includes(
        &self,
        state: &State,
        instance: &mut ModelInstance,
        key: &str,
        include: &[Include],
    ) -> OvercacheResult<()> {
        let model = Arc::clone(instance.model());
        for inc in include {
            let descriptor = model.require_association(&inc.association)?;
            let target = self.registry.require(&descriptor.target)?;
            let link_key = (
                model.name().to_string(),
                key.to_string(),
                inc.association.clone(),
            );

            let mut loaded = Vec::new();
            if let (Some(keys), Some(table)) =
                (state.links.get(&link_key), state.tables.get(target.name()))
            {
                for target_key in keys {
                    if let Some(row) = table.rows.get(target_key).filter(|r| is_live(r)) {
                        loaded.push(self.materialize(state, &target, target_key, row, &inc.include)?);
                    }
                }
            }

            let association = if descriptor.cardinality.is_collection() {
                Association::Many(loaded)
            } else {
                Association::One(loaded.into_iter().next().map(Box::new))
            };
            instance.set_association(&inc.association, association)?;
        }
        Ok(())
    }

    fn select(
        &self,
        model: &Arc<ModelDescriptor>,
        options: &FindOptions,
    ) -> OvercacheResult<Vec<ModelInstance>> {
        let state = self.read()?;
        let Some(table) = state.tables.get(model.name()) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<(&String, &Row)> = table
            .rows
            .iter()
            .filter(|(_, r)| is_live(r) && row_matches(r, &options.filter))
            .collect();
        rows.sort_by_key(|(_, r)| r.seq);
        if let Some(limit) = options.limit {
            rows.truncate(limit);
        }

        rows.into_iter()
            .map(|(key, row)| self.materialize(&state, model, key, row, &options.include))
            .collect()
    }
}

#[async_trait]
impl BackingStore for InMemoryBackingStore {
    async fn create(
        &self,
        model: &Arc<ModelDescriptor>,
        values: Values,
    ) -> OvercacheResult<ModelInstance> {
        self.enter(&self.counters.create)?;
        let mut state = self.write()?;
        self.insert_row(&mut state, model, values)
    }

    async fn find_by_pk(
        &self,
        model: &Arc<ModelDescriptor>,
        pk: &PrimaryKey,
        options: &FindOptions,
    ) -> OvercacheResult<Option<ModelInstance>> {
        self.enter(&self.counters.find_by_pk)?;
        let key = row_key(model, pk)?;
        let state = self.read()?;
        match state
            .tables
            .get(model.name())
            .and_then(|t| t.rows.get(&key))
            .filter(|r| is_live(r))
        {
            Some(row) => self
                .materialize(&state, model, &key, row, &options.include)
                .map(Some),
            None => Ok(None),
        }
    }

    async fn find_all(
        &self,
        model: &Arc<ModelDescriptor>,
        options: &FindOptions,
    ) -> OvercacheResult<Vec<ModelInstance>> {
        self.enter(&self.counters.find_all)?;
        self.select(model, options)
    }

    async fn find_one(
        &self,
        model: &Arc<ModelDescriptor>,
        options: &FindOptions,
    ) -> OvercacheResult<Option<ModelInstance>> {
        self.enter(&self.counters.find_one)?;
        let options = FindOptions {
            limit: Some(1),
            ..options.clone()
        };
        Ok(self.select(model, &options)?.into_iter().next())
    }

    async fn upsert(
        &self,
        model: &Arc<ModelDescriptor>,
        values: Values,
    ) -> OvercacheResult<(ModelInstance, Option<bool>)> {
        self.enter(&self.counters.upsert)?;
        // Checked before the lock so a rejected value never reaches a row.
        let values = ModelInstance::with_values(Arc::clone(model), values)?
            .values()
            .clone();

        let mut state = self.write()?;
        let existing = match PrimaryKey::from_values(model, &values) {
            Some(pk) => {
                let key = row_key(model, &pk)?;
                let found = state
                    .tables
                    .get(model.name())
                    .and_then(|t| t.rows.get(&key))
                    .is_some_and(is_live);
                found.then_some(key)
            }
            None => None,
        };

        match existing {
            Some(key) => {
                let stored = Self::update_row(&mut state, model, &key, &values)?;
                let mut instance = ModelInstance::with_values(Arc::clone(model), stored)?;
                instance.mark_persisted();
                Ok((instance, Some(false)))
            }
            None => {
                let instance = self.insert_row(&mut state, model, values)?;
                Ok((instance, Some(true)))
            }
        }
    }

    async fn update(&self, instance: &mut ModelInstance, values: Values) -> OvercacheResult<()> {
        self.enter(&self.counters.update)?;
        instance.set_all(values)?;
        let model = Arc::clone(instance.model());
        let mut state = self.write()?;
        if instance.is_new_record() {
            let created = self.insert_row(&mut state, &model, instance.values().clone())?;
            instance.set_all(created.values().clone())?;
        } else {
            let key = row_key(&model, &instance.primary_key()?)?;
            let stored = Self::update_row(&mut state, &model, &key, instance.values())?;
            instance.set_all(stored)?;
        }
        instance.mark_persisted();
        Ok(())
    }

    async fn save(&self, instance: &mut ModelInstance) -> OvercacheResult<()> {
        self.enter(&self.counters.save)?;
        let model = Arc::clone(instance.model());
        let mut state = self.write()?;
        if instance.is_new_record() {
            let created = self.insert_row(&mut state, &model, instance.values().clone())?;
            instance.set_all(created.values().clone())?;
        } else {
            let key = row_key(&model, &instance.primary_key()?)?;
            let stored = Self::update_row(&mut state, &model, &key, instance.values())?;
            instance.set_all(stored)?;
        }
        instance.mark_persisted();
        Ok(())
    }

    async fn reload(
        &self,
        instance: &mut ModelInstance,
        options: &FindOptions,
    ) -> OvercacheResult<()> {
        self.enter(&self.counters.reload)?;
        let model = Arc::clone(instance.model());
        let key = row_key(&model, &instance.primary_key()?)?;
        let state = self.read()?;
        let row = state
            .tables
            .get(model.name())
            .and_then(|t| t.rows.get(&key))
            .filter(|r| is_live(r))
            .ok_or_else(|| StorageError::NotFound {
                model: model.name().to_string(),
                key: key.clone(),
            })?;
        *instance = self.materialize(&state, &model, &key, row, &options.include)?;
        Ok(())
    }

    async fn destroy(&self, instance: &mut ModelInstance) -> OvercacheResult<()> {
        self.enter(&self.counters.destroy)?;
        let model = Arc::clone(instance.model());
        let key = row_key(&model, &instance.primary_key()?)?;
        let mut state = self.write()?;

        if model.paranoid() {
            let now = Value::Timestamp(Utc::now());
            if let Some(row) = state
                .tables
                .get_mut(model.name())
                .and_then(|t| t.rows.get_mut(&key))
            {
                row.values.insert(DELETED_AT.to_string(), now.clone());
            }
            instance.set(DELETED_AT, now)?;
        } else if let Some(table) = state.tables.get_mut(model.name()) {
            table.rows.remove(&key);
            state
                .links
                .retain(|(owner, owner_key, _), _| !(owner == model.name() && *owner_key == key));
        }
        Ok(())
    }
}
