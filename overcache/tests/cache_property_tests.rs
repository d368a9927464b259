//! Property-Based Tests for the Cache Protocol
//!
//! - Cached records round-trip every own attribute
//! - A create is immediately readable without a backing query
//! - A miss queries the backing store exactly once, then fills
//! - Composite keys differing in one component are distinct entries
//! - Custom keys never share state

use overcache::{Cacheable, FindOptions, PrimaryKey, Value};
use overcache_test_utils::fixtures::{fixture_registry, model, new_comment};
use overcache_test_utils::generators::{arb_instance, arb_name, arb_uuid_text};
use overcache_test_utils::values;
use proptest::prelude::*;
use tokio::runtime::Runtime;

#[path = "support/harness.rs"]
mod harness;
use harness::harness;

fn runtime() -> Runtime {
    Runtime::new().expect("tokio runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_cached_record_round_trips(
        document in arb_instance(model(&fixture_registry(), "Document"))
    ) {
        let rt = runtime();
        rt.block_on(async {
            let h = harness();
            let documents = h.layer.model("Document").unwrap();
            let ctx = h.layer.context();
            let key = document.identity_key().unwrap();

            ctx.save_instance(&document).await.unwrap();
            let loaded = ctx.load(documents.descriptor(), &key).await.unwrap();

            prop_assert_eq!(loaded.as_ref(), Some(&document));
            Ok(())
        })?;
    }

    #[test]
    fn prop_create_is_readable_without_backing_query(name in arb_name()) {
        let rt = runtime();
        rt.block_on(async {
            let h = harness();
            let users = h.layer.model("User").unwrap();
            let created = users
                .cache()
                .create(values([("name", Value::from(name.as_str()))]))
                .await
                .unwrap();
            let pk = created.primary_key().unwrap();
            h.backing.reset_calls();

            let found = users.cache().find_by_pk(pk).await.unwrap();

            prop_assert_eq!(found.as_ref(), Some(&created));
            prop_assert_eq!(h.backing.calls().total(), 0);
            Ok(())
        })?;
    }

    #[test]
    fn prop_miss_queries_backing_once(name in arb_name(), id in 1i64..10_000) {
        let rt = runtime();
        rt.block_on(async {
            let h = harness();
            let users = h.layer.model("User").unwrap();
            h.layer
                .backing()
                .create(
                    users.descriptor(),
                    values([("id", Value::from(id)), ("name", Value::from(name.as_str()))]),
                )
                .await
                .unwrap();
            h.backing.reset_calls();

            for _ in 0..3 {
                let found = users.cache().find_by_pk(id).await.unwrap();
                prop_assert!(found.is_some());
            }

            prop_assert_eq!(h.backing.calls().find_by_pk, 1);
            Ok(())
        })?;
    }

    #[test]
    fn prop_composite_key_components_are_distinct(
        a in 1i64..1_000,
        b in 1i64..1_000,
        uuid in arb_uuid_text(),
    ) {
        prop_assume!(a != b);
        let rt = runtime();
        rt.block_on(async {
            let h = harness();
            let comments = h.layer.model("Comment").unwrap();
            comments.cache().create(new_comment(a, &uuid)).await.unwrap();
            comments.cache().create(new_comment(b, &uuid)).await.unwrap();

            prop_assert_eq!(h.store.len().await, 2);
            comments.cache().clear((a, uuid.as_str())).await.unwrap();
            let key_a = format!("Comment:{}:{}", a, uuid);
            let key_b = format!("Comment:{}:{}", b, uuid);
            prop_assert!(!h.store.contains(&key_a).await);
            prop_assert!(h.store.contains(&key_b).await);

            let other = PrimaryKey::from((b, uuid.as_str()));
            h.backing.reset_calls();
            prop_assert!(comments.cache().find_by_pk(other).await.unwrap().is_some());
            prop_assert_eq!(h.backing.calls().total(), 0);
            Ok(())
        })?;
    }

    #[test]
    fn prop_custom_keys_are_independent(
        k1 in "[a-z]{1,8}",
        k2 in "[a-z]{1,8}",
    ) {
        prop_assume!(k1 != k2);
        let rt = runtime();
        rt.block_on(async {
            let h = harness();
            let users = h.layer.model("User").unwrap();
            let all = FindOptions::new();
            users.cache_with_key(&k1).find_all(&all).await.unwrap();
            users.cache_with_key(&k2).find_all(&all).await.unwrap();

            users.cache_with_key(&k1).clear().await.unwrap();

            let key1 = format!("User:{}", k1);
            let key2 = format!("User:{}", k2);
            prop_assert!(!h.store.contains(&key1).await);
            prop_assert!(h.store.contains(&key2).await);
            Ok(())
        })?;
    }
}
