//! Model instances and primary keys

use crate::error::{ModelError, OvercacheResult};
use crate::key::CacheKey;
use crate::model::ModelDescriptor;
use crate::value::{Value, Values};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ordered primary-key components of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKey(Vec<Value>);

impl PrimaryKey {
    pub fn new(components: Vec<Value>) -> Self {
        Self(components)
    }

    pub fn components(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Extract the primary key of `model` from a set of values.
    ///
    /// Returns `None` if any component is missing or null.
    pub fn from_values(model: &ModelDescriptor, values: &Values) -> Option<Self> {
        model
            .primary_key()
            .iter()
            .map(|name| values.get(name).filter(|v| !v.is_null()).cloned())
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }
}

impl From<Value> for PrimaryKey {
    fn from(v: Value) -> Self {
        Self(vec![v])
    }
}

impl From<i32> for PrimaryKey {
    fn from(v: i32) -> Self {
        Self(vec![Value::from(v)])
    }
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self {
        Self(vec![Value::from(v)])
    }
}

impl From<&str> for PrimaryKey {
    fn from(v: &str) -> Self {
        Self(vec![Value::from(v)])
    }
}

impl From<String> for PrimaryKey {
    fn from(v: String) -> Self {
        Self(vec![Value::from(v)])
    }
}

impl From<Vec<Value>> for PrimaryKey {
    fn from(v: Vec<Value>) -> Self {
        Self(v)
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for PrimaryKey {
    fn from((a, b): (A, B)) -> Self {
        Self(vec![a.into(), b.into()])
    }
}

/// Loaded association state on an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Association {
    /// Single-valued association; `None` when no row is linked.
    One(Option<Box<ModelInstance>>),
    /// Collection association, in load order.
    Many(Vec<ModelInstance>),
}

impl Association {
    pub fn as_one(&self) -> Option<&ModelInstance> {
        match self {
            Association::One(Some(inner)) => Some(inner),
            _ => None,
        }
    }

    pub fn as_many(&self) -> &[ModelInstance] {
        match self {
            Association::Many(items) => items,
            Association::One(_) => &[],
        }
    }
}

/// One concrete record of a model type.
///
/// Owned by the caller. The cache only ever stores a detached plain copy.
#[derive(Debug, Clone)]
pub struct ModelInstance {
    model: Arc<ModelDescriptor>,
    values: Values,
    associations: BTreeMap<String, Association>,
    is_new_record: bool,
}

impl PartialEq for ModelInstance {
    fn eq(&self, other: &Self) -> bool {
        self.model.name() == other.model.name()
            && self.values == other.values
            && self.associations == other.associations
    }
}

impl ModelInstance {
    /// Build an unsaved instance with no values set.
    pub fn build(model: Arc<ModelDescriptor>) -> Self {
        Self {
            model,
            values: Values::new(),
            associations: BTreeMap::new(),
            is_new_record: true,
        }
    }

    /// Build an unsaved instance from attribute values.
    pub fn with_values(model: Arc<ModelDescriptor>, values: Values) -> OvercacheResult<Self> {
        let mut instance = Self::build(model);
        instance.set_all(values)?;
        Ok(instance)
    }

    pub fn model(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Set a declared attribute.
    ///
    /// The value must match the attribute's kind; see [`Value::conform`].
    pub fn set(&mut self, attribute: &str, value: impl Into<Value>) -> OvercacheResult<()> {
        let value = self.conform(attribute, value.into())?;
        self.values.insert(attribute.to_string(), value);
        Ok(())
    }

    /// Set several declared attributes; nothing is applied if any is unknown
    /// or of the wrong kind.
    pub fn set_all(&mut self, values: Values) -> OvercacheResult<()> {
        let mut checked = Values::new();
        for (name, value) in values {
            let value = self.conform(&name, value)?;
            checked.insert(name, value);
        }
        self.values.extend(checked);
        Ok(())
    }

    fn conform(&self, attribute: &str, value: Value) -> OvercacheResult<Value> {
        let declared = self.model.require_attribute(attribute)?;
        value.conform(declared.kind).map_err(|e| {
            ModelError::InvalidValue {
                model: self.model.name().to_string(),
                attribute: attribute.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Store a value without checking the declaration.
    ///
    /// Used when reconstructing conventional timestamp fields.
    pub(crate) fn set_raw(&mut self, attribute: String, value: Value) {
        self.values.insert(attribute, value);
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.get(name)
    }

    pub fn associations(&self) -> &BTreeMap<String, Association> {
        &self.associations
    }

    /// Attach loaded association state under a declared association name.
    pub fn set_association(&mut self, name: &str, association: Association) -> OvercacheResult<()> {
        let declared = self.model.require_association(name)?;
        let shape_matches = matches!(
            (&association, declared.cardinality.is_collection()),
            (Association::Many(_), true) | (Association::One(_), false)
        );
        if !shape_matches {
            return Err(ModelError::InvalidDefinition {
                model: self.model.name().to_string(),
                reason: format!("association {} loaded with the wrong cardinality", name),
            }
            .into());
        }
        self.associations.insert(name.to_string(), association);
        Ok(())
    }

    pub fn clear_associations(&mut self) {
        self.associations.clear();
    }

    /// True until the instance has been persisted or loaded from a store.
    pub fn is_new_record(&self) -> bool {
        self.is_new_record
    }

    pub fn mark_persisted(&mut self) {
        self.is_new_record = false;
    }

    /// Ordered primary-key values of this instance.
    pub fn primary_key(&self) -> OvercacheResult<PrimaryKey> {
        let mut components = Vec::with_capacity(self.model.primary_key().len());
        for name in self.model.primary_key() {
            match self.values.get(name) {
                Some(value) if !value.is_null() => components.push(value.clone()),
                _ => {
                    return Err(ModelError::MissingPrimaryKey {
                        model: self.model.name().to_string(),
                        attribute: name.clone(),
                    }
                    .into())
                }
            }
        }
        Ok(PrimaryKey::new(components))
    }

    /// Identity cache key `[Model, ...primaryKeyValues]`.
    pub fn identity_key(&self) -> OvercacheResult<CacheKey> {
        CacheKey::identity(&self.model, &self.primary_key()?)
    }
}
