//! Cache keys.
//!
//! A key is an ordered sequence of strings whose first segment is always the
//! model type name: `[Model, ...primaryKeyValues]` for identity caching or
//! `[Model, customKey]` for query-result caching. Keys can only be built
//! through the constructors below, so a key can never lack its model segment.

use crate::error::{CacheError, ModelError, OvercacheResult};
use crate::instance::PrimaryKey;
use crate::model::ModelDescriptor;
use std::fmt;

/// Separator placed between key segments when a key is flattened.
pub const SEPARATOR: char = ':';

/// A cache key scoped to one model type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: CacheKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKeyInner {
    model: String,
    parts: Vec<String>,
}

impl CacheKey {
    /// Identity key `[Model, ...primaryKeyValues]`.
    ///
    /// The primary key must have one component per primary-key attribute
    /// and none of them may be null.
    pub fn identity(model: &ModelDescriptor, pk: &PrimaryKey) -> OvercacheResult<Self> {
        let names = model.primary_key();
        if pk.len() != names.len() {
            return Err(ModelError::PrimaryKeyArity {
                model: model.name().to_string(),
                expected: names.len(),
                got: pk.len(),
            }
            .into());
        }

        let mut parts = Vec::with_capacity(names.len());
        for (name, value) in names.iter().zip(pk.components()) {
            let part = value.key_component().ok_or_else(|| ModelError::MissingPrimaryKey {
                model: model.name().to_string(),
                attribute: name.clone(),
            })?;
            parts.push(part);
        }

        Ok(Self {
            inner: CacheKeyInner {
                model: model.name().to_string(),
                parts,
            },
        })
    }

    /// Custom key `[Model, customKey]` for arbitrary query results.
    pub fn custom(model: &ModelDescriptor, custom_key: &str) -> OvercacheResult<Self> {
        if custom_key.is_empty() {
            return Err(CacheError::InvalidKey {
                reason: format!("custom key for {} must not be empty", model.name()),
            }
            .into());
        }
        Ok(Self {
            inner: CacheKeyInner {
                model: model.name().to_string(),
                parts: vec![custom_key.to_string()],
            },
        })
    }

    pub fn model_name(&self) -> &str {
        &self.inner.model
    }

    /// Segments after the model name.
    pub fn parts(&self) -> &[String] {
        &self.inner.parts
    }

    /// All segments, model name first.
    pub fn segments(&self) -> Vec<&str> {
        std::iter::once(self.inner.model.as_str())
            .chain(self.inner.parts.iter().map(String::as_str))
            .collect()
    }

    /// Flatten to `namespace:Model:part...`, omitting an absent namespace.
    pub fn join(&self, namespace: Option<&str>) -> String {
        let mut out = String::new();
        if let Some(ns) = namespace {
            out.push_str(ns);
            out.push(SEPARATOR);
        }
        out.push_str(&self.inner.model);
        for part in &self.inner.parts {
            out.push(SEPARATOR);
            out.push_str(part);
        }
        out
    }

    /// Prefix shared by every key of one model type under a namespace.
    pub fn model_prefix(namespace: Option<&str>, model: &str) -> String {
        match namespace {
            Some(ns) => format!("{ns}{SEPARATOR}{model}{SEPARATOR}"),
            None => format!("{model}{SEPARATOR}"),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{AttributeKind, Value};
    use crate::error::OvercacheError;
    use proptest::prelude::*;

    fn user() -> ModelDescriptor {
        ModelDescriptor::builder("User")
            .primary_key("id", AttributeKind::Integer)
            .attribute("name", AttributeKind::Text)
            .build()
            .unwrap()
    }

    fn comment() -> ModelDescriptor {
        ModelDescriptor::builder("Comment")
            .primary_key("userId", AttributeKind::Integer)
            .primary_key("articleUuid", AttributeKind::Text)
            .build()
            .unwrap()
    }

    #[test]
    fn test_identity_key_segments() {
        let key = CacheKey::identity(&user(), &PrimaryKey::from(1)).unwrap();
        assert_eq!(key.segments(), vec!["User", "1"]);
        assert_eq!(key.join(None), "User:1");
        assert_eq!(key.join(Some("model")), "model:User:1");
    }

    #[test]
    fn test_composite_identity_key() {
        let pk = PrimaryKey::new(vec![Value::from(7), Value::from("abc")]);
        let key = CacheKey::identity(&comment(), &pk).unwrap();
        assert_eq!(key.segments(), vec!["Comment", "7", "abc"]);
    }

    #[test]
    fn test_identity_arity_mismatch() {
        let err = CacheKey::identity(&comment(), &PrimaryKey::from(7)).unwrap_err();
        assert!(matches!(
            err,
            OvercacheError::Model(ModelError::PrimaryKeyArity {
                expected: 2,
                got: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_identity_null_component_rejected() {
        let err = CacheKey::identity(&user(), &PrimaryKey::from(Value::Null)).unwrap_err();
        assert!(matches!(
            err,
            OvercacheError::Model(ModelError::MissingPrimaryKey { .. })
        ));
    }

    #[test]
    fn test_custom_key() {
        let key = CacheKey::custom(&user(), "dan-users").unwrap();
        assert_eq!(key.segments(), vec!["User", "dan-users"]);
        assert!(CacheKey::custom(&user(), "").is_err());
    }

    #[test]
    fn test_model_prefix_matches_joined_keys() {
        let key = CacheKey::identity(&user(), &PrimaryKey::from(42)).unwrap();
        assert!(key
            .join(Some("ns"))
            .starts_with(&CacheKey::model_prefix(Some("ns"), "User")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Identity keys are stable: the same identity always yields the same key.
        #[test]
        fn prop_identity_key_is_stable(id in any::<i64>()) {
            let a = CacheKey::identity(&user(), &PrimaryKey::from(id)).unwrap();
            let b = CacheKey::identity(&user(), &PrimaryKey::from(id)).unwrap();
            prop_assert_eq!(a.join(None), b.join(None));
        }

        /// Changing either composite component yields a distinct key.
        #[test]
        fn prop_composite_components_distinguish(
            user_a in any::<i64>(),
            user_b in any::<i64>(),
            article_a in "[a-f0-9]{8}",
            article_b in "[a-f0-9]{8}",
        ) {
            let model = comment();
            let a = CacheKey::identity(
                &model,
                &PrimaryKey::new(vec![Value::from(user_a), Value::from(article_a.clone())]),
            ).unwrap();
            let b = CacheKey::identity(
                &model,
                &PrimaryKey::new(vec![Value::from(user_b), Value::from(article_b.clone())]),
            ).unwrap();

            if user_a == user_b && article_a == article_b {
                prop_assert_eq!(a.join(None), b.join(None));
            } else {
                prop_assert_ne!(a.join(None), b.join(None));
            }
        }

        /// Keys of different model types never collide.
        #[test]
        fn prop_model_name_distinguishes(id in any::<i64>()) {
            let group = ModelDescriptor::builder("Group")
                .primary_key("id", AttributeKind::Integer)
                .build()
                .unwrap();
            let a = CacheKey::identity(&user(), &PrimaryKey::from(id)).unwrap();
            let b = CacheKey::identity(&group, &PrimaryKey::from(id)).unwrap();
            prop_assert_ne!(a.join(None), b.join(None));
        }
    }
}
