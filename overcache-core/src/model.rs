//! Model type descriptors and the model registry.
//!
//! Every cacheable model type is declared up front: its attributes, its
//! ordered primary key and the associations it can load. The serializer
//! consults these descriptors instead of inspecting anything at runtime.

use crate::error::{ModelError, OvercacheResult};
use crate::value::AttributeKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Attribute names conventionally holding creation, update and deletion time.
pub const TIMESTAMP_FIELDS: [&str; 6] = [
    "createdAt",
    "updatedAt",
    "deletedAt",
    "created_at",
    "updated_at",
    "deleted_at",
];

/// Attribute name set by `timestamps()` for creation time.
pub const CREATED_AT: &str = "createdAt";
/// Attribute name set by `timestamps()` for update time.
pub const UPDATED_AT: &str = "updatedAt";
/// Attribute name set by `paranoid()` for soft deletion time.
pub const DELETED_AT: &str = "deletedAt";

/// True if `name` conventionally marks a creation/update/deletion time.
pub fn is_timestamp_field(name: &str) -> bool {
    TIMESTAMP_FIELDS.contains(&name)
}

/// A single declared attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: AttributeKind,
    pub primary_key: bool,
}

/// Association cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    HasOne,
    BelongsTo,
    HasMany,
    BelongsToMany,
}

impl Cardinality {
    /// True if the association loads an ordered list of instances.
    pub fn is_collection(&self) -> bool {
        matches!(self, Cardinality::HasMany | Cardinality::BelongsToMany)
    }
}

/// A named association from one model type to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDescriptor {
    /// Field name the association is loaded under.
    pub name: String,
    /// Name of the target model type.
    pub target: String,
    pub cardinality: Cardinality,
}

/// Static description of a model type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    name: String,
    attributes: Vec<AttributeDescriptor>,
    primary_key: Vec<String>,
    associations: Vec<AssociationDescriptor>,
    timestamps: bool,
    paranoid: bool,
}

impl ModelDescriptor {
    /// Start declaring a model type.
    pub fn builder(name: impl Into<String>) -> ModelDescriptorBuilder {
        ModelDescriptorBuilder {
            name: name.into(),
            attributes: Vec::new(),
            associations: Vec::new(),
            timestamps: false,
            paranoid: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary key attribute names, in key order.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn associations(&self) -> &[AssociationDescriptor] {
        &self.associations
    }

    pub fn association(&self, name: &str) -> Option<&AssociationDescriptor> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// Look up an attribute, failing with [`ModelError::UnknownAttribute`].
    pub fn require_attribute(&self, name: &str) -> OvercacheResult<&AttributeDescriptor> {
        self.attribute(name).ok_or_else(|| {
            ModelError::UnknownAttribute {
                model: self.name.clone(),
                attribute: name.to_string(),
            }
            .into()
        })
    }

    /// Look up an association, failing with [`ModelError::UnknownAssociation`].
    pub fn require_association(&self, name: &str) -> OvercacheResult<&AssociationDescriptor> {
        self.association(name).ok_or_else(|| {
            ModelError::UnknownAssociation {
                model: self.name.clone(),
                association: name.to_string(),
            }
            .into()
        })
    }

    /// Whether `createdAt`/`updatedAt` are maintained by the backing store.
    pub fn timestamps(&self) -> bool {
        self.timestamps
    }

    /// Whether destroy sets `deletedAt` instead of removing the row.
    pub fn paranoid(&self) -> bool {
        self.paranoid
    }
}

/// Builder for [`ModelDescriptor`].
#[derive(Debug, Clone)]
pub struct ModelDescriptorBuilder {
    name: String,
    attributes: Vec<AttributeDescriptor>,
    associations: Vec<AssociationDescriptor>,
    timestamps: bool,
    paranoid: bool,
}

impl ModelDescriptorBuilder {
    /// Add a primary-key attribute. Call repeatedly for composite keys.
    pub fn primary_key(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeDescriptor {
            name: name.into(),
            kind,
            primary_key: true,
        });
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeDescriptor {
            name: name.into(),
            kind,
            primary_key: false,
        });
        self
    }

    /// Add `createdAt` and `updatedAt` timestamp attributes.
    pub fn timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    /// Add a `deletedAt` attribute and soft-delete on destroy.
    pub fn paranoid(mut self) -> Self {
        self.paranoid = true;
        self
    }

    pub fn has_one(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.association(name, target, Cardinality::HasOne)
    }

    pub fn belongs_to(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.association(name, target, Cardinality::BelongsTo)
    }

    pub fn has_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.association(name, target, Cardinality::HasMany)
    }

    pub fn belongs_to_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.association(name, target, Cardinality::BelongsToMany)
    }

    pub fn association(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        self.associations.push(AssociationDescriptor {
            name: name.into(),
            target: target.into(),
            cardinality,
        });
        self
    }

    /// Finish the declaration.
    ///
    /// Fails if no primary key was declared or a field name is used twice.
    pub fn build(mut self) -> OvercacheResult<ModelDescriptor> {
        let invalid = |reason: String| ModelError::InvalidDefinition {
            model: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("model name must not be empty".to_string()).into());
        }

        let mut extra = Vec::new();
        if self.timestamps {
            extra.push(CREATED_AT);
            extra.push(UPDATED_AT);
        }
        if self.paranoid {
            extra.push(DELETED_AT);
        }
        for name in extra {
            if !self.attributes.iter().any(|a| a.name == name) {
                self.attributes.push(AttributeDescriptor {
                    name: name.to_string(),
                    kind: AttributeKind::Timestamp,
                    primary_key: false,
                });
            }
        }

        let mut seen: Vec<&str> = Vec::new();
        for field in self
            .attributes
            .iter()
            .map(|a| a.name.as_str())
            .chain(self.associations.iter().map(|a| a.name.as_str()))
        {
            if seen.contains(&field) {
                return Err(invalid(format!("field {} declared twice", field)).into());
            }
            seen.push(field);
        }

        let primary_key: Vec<String> = self
            .attributes
            .iter()
            .filter(|a| a.primary_key)
            .map(|a| a.name.clone())
            .collect();
        if primary_key.is_empty() {
            return Err(invalid("at least one primary key attribute is required".to_string()).into());
        }

        Ok(ModelDescriptor {
            name: self.name,
            attributes: self.attributes,
            primary_key,
            associations: self.associations,
            timestamps: self.timestamps,
            paranoid: self.paranoid,
        })
    }
}

/// All model types known to a cache layer, addressed by name.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<ModelDescriptor>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model type, replacing any previous one with the same name.
    pub fn register(&mut self, model: ModelDescriptor) -> Arc<ModelDescriptor> {
        let model = Arc::new(model);
        self.models
            .insert(model.name().to_string(), Arc::clone(&model));
        model
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelDescriptor>> {
        self.models.get(name).cloned()
    }

    /// Look up a model type, failing with [`ModelError::UnknownModel`].
    pub fn require(&self, name: &str) -> OvercacheResult<Arc<ModelDescriptor>> {
        self.get(name).ok_or_else(|| {
            ModelError::UnknownModel {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Check that every association points at a registered model.
    pub fn validate(&self) -> OvercacheResult<()> {
        for model in self.models.values() {
            for association in model.associations() {
                if !self.models.contains_key(&association.target) {
                    return Err(ModelError::InvalidDefinition {
                        model: model.name().to_string(),
                        reason: format!(
                            "association {} targets unknown model {}",
                            association.name, association.target
                        ),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
