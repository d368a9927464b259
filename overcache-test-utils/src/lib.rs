//! Overcache Test Utilities
//!
//! Shared test infrastructure for the overcache workspace:
//! - The fixture schema (User / Article / Comment / Group / Document)
//! - Proptest generators for attribute values and instances
//! - Custom assertions for overcache results and cached records

pub use overcache_storage::{CallCounts, InMemoryBackingStore, MemoryAdaptor, MemoryStore};

pub use overcache_core::{
    values, AdaptorOptions, AttributeKind, CacheError, ModelDescriptor, ModelError,
    ModelInstance, ModelRegistry, OvercacheError, OvercacheResult, PrimaryKey, StorageError,
    Timestamp, Value, Values,
};

use std::sync::Arc;

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! The schema every integration test runs against.
    //!
    //! All four relational models keep timestamps and soft-delete, matching
    //! a typical ORM default of `paranoid: true`.

    use super::*;

    /// Register the fixture models.
    ///
    /// - `User { id }` has many `Articles`, belongs to many `userGroups`
    /// - `Article { uuid }` belongs to `Author`
    /// - `Comment { userId, articleUuid }` has a composite key
    /// - `Group { id }` belongs to many `groupUsers`
    /// - `Document { id }` carries binary, JSON and timestamp columns
    pub fn fixture_registry() -> Arc<ModelRegistry> {
        let mut registry = ModelRegistry::new();
        let declarations = [
            ModelDescriptor::builder("User")
                .primary_key("id", AttributeKind::Integer)
                .attribute("name", AttributeKind::Text)
                .timestamps()
                .paranoid()
                .has_many("Articles", "Article")
                .belongs_to_many("userGroups", "Group")
                .build(),
            ModelDescriptor::builder("Article")
                .primary_key("uuid", AttributeKind::Text)
                .attribute("title", AttributeKind::Text)
                .timestamps()
                .paranoid()
                .belongs_to("Author", "User")
                .build(),
            ModelDescriptor::builder("Comment")
                .primary_key("userId", AttributeKind::Integer)
                .primary_key("articleUuid", AttributeKind::Text)
                .attribute("body", AttributeKind::Text)
                .timestamps()
                .paranoid()
                .build(),
            ModelDescriptor::builder("Group")
                .primary_key("id", AttributeKind::Integer)
                .attribute("name", AttributeKind::Text)
                .timestamps()
                .paranoid()
                .belongs_to_many("groupUsers", "User")
                .build(),
            ModelDescriptor::builder("Document")
                .primary_key("id", AttributeKind::Integer)
                .attribute("title", AttributeKind::Text)
                .attribute("body", AttributeKind::Binary)
                .attribute("meta", AttributeKind::Json)
                .attribute("publishedAt", AttributeKind::Timestamp)
                .build(),
        ];
        for declaration in declarations {
            match declaration {
                Ok(model) => {
                    registry.register(model);
                }
                Err(e) => panic!("fixture model is invalid: {}", e),
            }
        }
        if let Err(e) = registry.validate() {
            panic!("fixture registry is invalid: {}", e);
        }
        Arc::new(registry)
    }

    /// Look up a fixture model by name.
    #[track_caller]
    pub fn model(registry: &ModelRegistry, name: &str) -> Arc<ModelDescriptor> {
        match registry.require(name) {
            Ok(model) => model,
            Err(e) => panic!("{}", e),
        }
    }

    /// Empty backing store over the fixture schema.
    pub fn backing_store(registry: &Arc<ModelRegistry>) -> InMemoryBackingStore {
        InMemoryBackingStore::new(Arc::clone(registry))
    }

    /// Memory adaptor plus a second handle on the same store for inspection.
    pub fn memory_adaptor() -> (MemoryAdaptor, MemoryStore) {
        let store = MemoryStore::new();
        (
            MemoryAdaptor::new(store.clone(), AdaptorOptions::default()),
            store,
        )
    }

    pub fn daniel() -> Values {
        values([("id", Value::from(1)), ("name", Value::from("Daniel"))])
    }

    pub fn wonderful_group() -> Values {
        values([
            ("id", Value::from(1)),
            ("name", Value::from("Group of wonderful people")),
        ])
    }

    pub fn new_article() -> Values {
        values([
            ("uuid", Value::from("2086c06e-9dd9-4ee3-84b9-9e415dfd9c4c")),
            ("title", Value::from("New article")),
        ])
    }

    pub fn new_comment(user_id: i64, article_uuid: &str) -> Values {
        values([
            ("userId", Value::from(user_id)),
            ("articleUuid", Value::from(article_uuid)),
            ("body", Value::from("New comment")),
        ])
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for attribute values and fixture instances.

    use super::*;
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    /// Generate a Timestamp with sub-second precision (2020-2030).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
            DateTime::from_timestamp(secs, nanos).unwrap_or_else(Utc::now)
        })
    }

    /// Generate a display name.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z ]{0,23}"
    }

    /// Generate a UUID-shaped text key.
    pub fn arb_uuid_text() -> impl Strategy<Value = String> {
        "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}"
    }

    /// Generate a value of the given kind, or null.
    pub fn arb_value(kind: AttributeKind) -> BoxedStrategy<Value> {
        let present = match kind {
            AttributeKind::Integer => any::<i64>().prop_map(Value::Integer).boxed(),
            AttributeKind::Float => (-1.0e9f64..1.0e9).prop_map(Value::Float).boxed(),
            AttributeKind::Boolean => any::<bool>().prop_map(Value::Bool).boxed(),
            AttributeKind::Text => ".{0,32}".prop_map(Value::Text).boxed(),
            AttributeKind::Timestamp => arb_timestamp().prop_map(Value::Timestamp).boxed(),
            AttributeKind::Json => prop_oneof![
                any::<i64>().prop_map(|n| serde_json::json!({ "n": n })),
                "[a-z]{0,8}".prop_map(|s| serde_json::json!([s])),
            ]
            .prop_map(Value::Json)
            .boxed(),
            AttributeKind::Binary => proptest::collection::vec(any::<u8>(), 0..64)
                .prop_map(Value::Binary)
                .boxed(),
        };
        prop_oneof![1 => Just(Value::Null), 4 => present].boxed()
    }

    /// Generate a persisted-looking instance of `model` with every attribute set.
    ///
    /// Primary-key attributes are never null.
    pub fn arb_instance(model: Arc<ModelDescriptor>) -> BoxedStrategy<ModelInstance> {
        let strategies: Vec<BoxedStrategy<(String, Value)>> = model
            .attributes()
            .iter()
            .map(|attribute| {
                let name = attribute.name.clone();
                let value = if attribute.primary_key {
                    arb_value(attribute.kind)
                        .prop_filter("primary key must be set", |v| !v.is_null())
                        .boxed()
                } else {
                    arb_value(attribute.kind)
                };
                value.prop_map(move |v| (name.clone(), v)).boxed()
            })
            .collect();

        strategies
            .prop_map(move |pairs| {
                let mut instance = ModelInstance::build(Arc::clone(&model));
                for (name, value) in pairs {
                    if let Err(e) = instance.set(&name, value) {
                        panic!("generated attribute was rejected: {}", e);
                    }
                }
                instance.mark_persisted();
                instance
            })
            .boxed()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for overcache-specific validation.

    use super::*;
    use serde_json::Value as JsonValue;

    /// Assert that an OvercacheResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &OvercacheResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that an OvercacheResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &OvercacheResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &OvercacheResult<T>) {
        match result {
            Err(OvercacheError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_cache_error<T: std::fmt::Debug>(result: &OvercacheResult<T>) {
        match result {
            Err(OvercacheError::Cache(_)) => {}
            other => panic!("Expected Cache error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_model_error<T: std::fmt::Debug>(result: &OvercacheResult<T>) {
        match result {
            Err(OvercacheError::Model(_)) => {}
            other => panic!("Expected Model error, got: {:?}", other),
        }
    }

    /// Assert that the backing store saw exactly `expected` calls in total.
    #[track_caller]
    pub fn assert_backing_calls(store: &InMemoryBackingStore, expected: u64) {
        let calls = store.calls();
        assert_eq!(
            calls.total(),
            expected,
            "Backing store call count mismatch: {:?}",
            calls
        );
    }

    /// Assert that raw cached text decodes to the record of `instance`.
    #[track_caller]
    pub fn assert_cached_record(raw: Option<&str>, instance: &ModelInstance) {
        let Some(raw) = raw else {
            panic!("Expected a cached entry for {}", instance.model_name());
        };
        let cached: JsonValue = match serde_json::from_str(raw) {
            Ok(json) => json,
            Err(e) => panic!("Cached entry is not JSON: {} ({})", e, raw),
        };
        assert_eq!(cached, overcache_core::to_json(instance), "Cached record mismatch");
    }

    /// Assert two instances agree on every own attribute.
    #[track_caller]
    pub fn assert_same_attributes(actual: &ModelInstance, expected: &ModelInstance) {
        assert_eq!(actual.model_name(), expected.model_name(), "Model mismatch");
        assert_eq!(actual.values(), expected.values(), "Attribute mismatch");
    }
}
