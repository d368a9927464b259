//! Plain record serialization.
//!
//! A cached record is the JSON projection of an instance's own attributes
//! plus any loaded associations. Reconstruction goes the other way using the
//! declared descriptors: attributes are decoded per declared kind,
//! conventional timestamp names become dates again, and associations are
//! rebuilt as nested instances down to a bounded depth.
//!
//! Decoding is best effort. A field that cannot be decoded is logged and
//! left unset; it never aborts the rest of the record.

use crate::instance::{Association, ModelInstance};
use crate::model::{is_timestamp_field, AssociationDescriptor, ModelDescriptor, ModelRegistry};
use crate::value::{parse_timestamp, Value};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// Plain, JSON-representable form of one instance.
pub type Record = Map<String, JsonValue>;

/// Default association reconstruction depth.
pub const DEFAULT_MAX_DEPTH: usize = 2;

/// Flatten an instance to its plain record.
///
/// Attributes come first, in name order, followed by loaded associations.
pub fn to_record(instance: &ModelInstance) -> Record {
    let mut record = Record::new();
    for (name, value) in instance.values() {
        record.insert(name.clone(), value.to_json());
    }
    for (name, association) in instance.associations() {
        let json = match association {
            Association::One(None) => JsonValue::Null,
            Association::One(Some(inner)) => JsonValue::Object(to_record(inner)),
            Association::Many(items) => {
                JsonValue::Array(items.iter().map(|i| JsonValue::Object(to_record(i))).collect())
            }
        };
        record.insert(name.clone(), json);
    }
    record
}

/// Flatten an instance straight to a JSON value.
pub fn to_json(instance: &ModelInstance) -> JsonValue {
    JsonValue::Object(to_record(instance))
}

/// Rebuild an instance of `model` from a stored record.
///
/// Returns `None` for an absent, non-object or empty record. The result is
/// marked as already persisted. Associations nest at most `max_depth` levels
/// below the returned instance; deeper association fields are ignored.
pub fn to_instance(
    registry: &ModelRegistry,
    model: &Arc<ModelDescriptor>,
    json: Option<&JsonValue>,
    max_depth: usize,
) -> Option<ModelInstance> {
    let record = json?.as_object()?;
    if record.is_empty() {
        return None;
    }
    Some(build_instance(registry, model, record, 1, max_depth))
}

/// Rebuild every element of a stored list, skipping elements that are
/// not records.
pub fn to_instances(
    registry: &ModelRegistry,
    model: &Arc<ModelDescriptor>,
    items: &[JsonValue],
    max_depth: usize,
) -> Vec<ModelInstance> {
    items
        .iter()
        .filter_map(|item| to_instance(registry, model, Some(item), max_depth))
        .collect()
}

fn build_instance(
    registry: &ModelRegistry,
    model: &Arc<ModelDescriptor>,
    record: &Record,
    depth: usize,
    max_depth: usize,
) -> ModelInstance {
    let mut instance = ModelInstance::build(Arc::clone(model));
    instance.mark_persisted();

    for (name, json) in record {
        if let Some(attribute) = model.attribute(name) {
            match Value::from_json(attribute.kind, json) {
                Ok(value) => instance.set_raw(name.clone(), value),
                Err(e) => tracing::warn!(
                    model = %model.name(),
                    field = %name,
                    error = %e,
                    "skipping undecodable field"
                ),
            }
        } else if is_timestamp_field(name) {
            restore_timestamp(&mut instance, name, json);
        } else if let Some(association) = model.association(name) {
            if depth <= max_depth {
                rebuild_association(registry, &mut instance, association, json, depth, max_depth);
            }
        }
    }

    instance
}

/// Coerce an undeclared conventional timestamp field into a date.
fn restore_timestamp(instance: &mut ModelInstance, name: &str, json: &JsonValue) {
    if json.is_null() {
        return;
    }
    match parse_timestamp(json) {
        Ok(ts) => instance.set_raw(name.to_string(), Value::Timestamp(ts)),
        Err(e) => tracing::warn!(
            model = %instance.model_name(),
            field = %name,
            error = %e,
            "skipping undecodable timestamp"
        ),
    }
}

fn rebuild_association(
    registry: &ModelRegistry,
    instance: &mut ModelInstance,
    association: &AssociationDescriptor,
    json: &JsonValue,
    depth: usize,
    max_depth: usize,
) {
    let Some(target) = registry.get(&association.target) else {
        tracing::warn!(
            model = %instance.model_name(),
            association = %association.name,
            target = %association.target,
            "association target not registered"
        );
        return;
    };

    let loaded = if association.cardinality.is_collection() {
        let Some(items) = json.as_array() else {
            tracing::warn!(
                model = %instance.model_name(),
                association = %association.name,
                "expected a list of records"
            );
            return;
        };
        Association::Many(
            items
                .iter()
                .filter_map(JsonValue::as_object)
                .map(|item| build_instance(registry, &target, item, depth + 1, max_depth))
                .collect(),
        )
    } else {
        match json {
            JsonValue::Null => Association::One(None),
            JsonValue::Object(item) => Association::One(Some(Box::new(build_instance(
                registry,
                &target,
                item,
                depth + 1,
                max_depth,
            )))),
            _ => {
                tracing::warn!(
                    model = %instance.model_name(),
                    association = %association.name,
                    "expected a record"
                );
                return;
            }
        }
    };

    if let Err(e) = instance.set_association(&association.name, loaded) {
        tracing::warn!(
            model = %instance.model_name(),
            association = %association.name,
            error = %e,
            "skipping association"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{values, AttributeKind, Timestamp};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::json;

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry.register(
            ModelDescriptor::builder("User")
                .primary_key("id", AttributeKind::Integer)
                .attribute("name", AttributeKind::Text)
                .timestamps()
                .has_many("Articles", "Article")
                .build()
                .unwrap(),
        );
        registry.register(
            ModelDescriptor::builder("Article")
                .primary_key("uuid", AttributeKind::Text)
                .attribute("title", AttributeKind::Text)
                .timestamps()
                .belongs_to("Author", "User")
                .build()
                .unwrap(),
        );
        registry.register(
            ModelDescriptor::builder("Document")
                .primary_key("id", AttributeKind::Integer)
                .attribute("body", AttributeKind::Binary)
                .attribute("meta", AttributeKind::Json)
                .build()
                .unwrap(),
        );
        registry
    }

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn user(registry: &ModelRegistry, id: i64, name: &str) -> ModelInstance {
        ModelInstance::with_values(
            registry.require("User").unwrap(),
            values([
                ("id", Value::from(id)),
                ("name", Value::from(name)),
                ("createdAt", Value::from(ts(1_600_000_000))),
                ("updatedAt", Value::from(ts(1_600_000_100))),
            ]),
        )
        .unwrap()
    }

    fn article(registry: &ModelRegistry, uuid: &str) -> ModelInstance {
        ModelInstance::with_values(
            registry.require("Article").unwrap(),
            values([
                ("uuid", Value::from(uuid)),
                ("title", Value::from("Hello")),
                ("createdAt", Value::from(ts(1_600_000_200))),
            ]),
        )
        .unwrap()
    }

    #[test]
    fn test_absent_and_empty_records() {
        let registry = registry();
        let model = registry.require("User").unwrap();
        assert!(to_instance(&registry, &model, None, DEFAULT_MAX_DEPTH).is_none());
        assert!(to_instance(&registry, &model, Some(&json!({})), DEFAULT_MAX_DEPTH).is_none());
        assert!(to_instance(&registry, &model, Some(&json!(null)), DEFAULT_MAX_DEPTH).is_none());
        assert!(to_instance(&registry, &model, Some(&json!([1])), DEFAULT_MAX_DEPTH).is_none());
    }

    #[test]
    fn test_record_shape() {
        let registry = registry();
        let record = to_record(&user(&registry, 1, "Daniel"));
        assert_eq!(record["id"], json!(1));
        assert_eq!(record["name"], json!("Daniel"));
        assert_eq!(record["createdAt"], json!("2020-09-13T12:26:40Z"));
    }

    #[test]
    fn test_round_trip_restores_timestamps() {
        let registry = registry();
        let original = user(&registry, 1, "Daniel");
        let json = to_json(&original);
        let back = to_instance(&registry, original.model(), Some(&json), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(back, original);
        assert_eq!(back.get("createdAt"), Some(&Value::Timestamp(ts(1_600_000_000))));
        assert!(!back.is_new_record());
    }

    #[test]
    fn test_nested_associations_rebuilt() {
        let registry = registry();
        let mut author = user(&registry, 1, "Daniel");
        let mut post = article(&registry, "a1");
        post.set_association(
            "Author",
            Association::One(Some(Box::new(user(&registry, 1, "Daniel")))),
        )
        .unwrap();
        author
            .set_association("Articles", Association::Many(vec![post]))
            .unwrap();

        let json = to_json(&author);
        let back = to_instance(&registry, author.model(), Some(&json), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(back, author);

        let articles = back.association("Articles").unwrap().as_many();
        assert_eq!(articles.len(), 1);
        assert_eq!(
            articles[0].get("createdAt"),
            Some(&Value::Timestamp(ts(1_600_000_200)))
        );
        let nested_author = articles[0].association("Author").unwrap().as_one().unwrap();
        assert_eq!(nested_author.get("name"), Some(&Value::from("Daniel")));
    }

    #[test]
    fn test_depth_bound_drops_deeper_associations() {
        let registry = registry();
        let model = registry.require("User").unwrap();
        let json = json!({
            "id": 1,
            "Articles": [{
                "uuid": "a1",
                "Author": {
                    "id": 1,
                    "Articles": [{ "uuid": "a2" }]
                }
            }]
        });

        let back = to_instance(&registry, &model, Some(&json), DEFAULT_MAX_DEPTH).unwrap();
        let article = &back.association("Articles").unwrap().as_many()[0];
        let author = article.association("Author").unwrap().as_one().unwrap();
        assert!(author.association("Articles").is_none());

        let shallow = to_instance(&registry, &model, Some(&json), 0).unwrap();
        assert!(shallow.association("Articles").is_none());
    }

    #[test]
    fn test_bad_field_is_skipped() {
        let registry = registry();
        let model = registry.require("User").unwrap();
        let json = json!({ "id": 1, "name": 42, "updatedAt": "not a date", "unknown": true });
        let back = to_instance(&registry, &model, Some(&json), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(back.get("id"), Some(&Value::from(1)));
        assert!(back.get("name").is_none());
        assert!(back.get("updatedAt").is_none());
    }

    #[test]
    fn test_snake_case_timestamp_coerced() {
        let registry = registry();
        let model = registry.require("Article").unwrap();
        let json = json!({ "uuid": "a1", "created_at": 1_600_000_000_000i64 });
        let back = to_instance(&registry, &model, Some(&json), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(back.get("created_at"), Some(&Value::Timestamp(ts(1_600_000_000))));
    }

    #[test]
    fn test_binary_and_json_columns() {
        let registry = registry();
        let model = registry.require("Document").unwrap();
        let doc = ModelInstance::with_values(
            Arc::clone(&model),
            values([
                ("id", Value::from(1)),
                ("body", Value::Binary(vec![1, 2, 3])),
                ("meta", Value::Json(json!({ "tags": ["a"] }))),
            ]),
        )
        .unwrap();
        let back = to_instance(&registry, &model, Some(&to_json(&doc)), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_bad_collection_element_skipped() {
        let registry = registry();
        let model = registry.require("User").unwrap();
        let json = json!({ "id": 1, "Articles": [{ "uuid": "a1" }, 7, "x"] });
        let back = to_instance(&registry, &model, Some(&json), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(back.association("Articles").unwrap().as_many().len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Every own attribute survives a record round trip.
        #[test]
        fn prop_record_round_trip(
            id in any::<i64>(),
            name in ".{0,24}",
            created in 0i64..4_000_000_000,
            nanos in 0u32..1_000_000_000,
        ) {
            let registry = registry();
            let model = registry.require("User").unwrap();
            let created = Utc.timestamp_opt(created, nanos).unwrap();
            let original = ModelInstance::with_values(
                Arc::clone(&model),
                values([
                    ("id", Value::from(id)),
                    ("name", Value::from(name)),
                    ("createdAt", Value::from(created)),
                ]),
            )
            .unwrap();

            let back = to_instance(&registry, &model, Some(&to_json(&original)), DEFAULT_MAX_DEPTH);
            prop_assert_eq!(back, Some(original));
        }
    }
}
