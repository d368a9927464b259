//! Shared wiring for the overcache integration tests.

#![allow(dead_code)]

use overcache::{with_cache, AdaptorOptions, CacheLayer, MemoryAdaptor, MemoryStore, ModelRegistry};
use overcache_test_utils::fixtures::{backing_store, fixture_registry, memory_adaptor};
use overcache_test_utils::InMemoryBackingStore;
use std::sync::Arc;

pub struct Harness {
    pub layer: CacheLayer<MemoryAdaptor>,
    /// Second handle on the adaptor's store, for inspection.
    pub store: MemoryStore,
    /// Shares rows and call counters with the store behind `layer`.
    pub backing: InMemoryBackingStore,
    pub registry: Arc<ModelRegistry>,
}

pub fn harness() -> Harness {
    let (adaptor, store) = memory_adaptor();
    wire(adaptor, store)
}

pub fn harness_with(options: AdaptorOptions) -> Harness {
    let store = MemoryStore::new();
    wire(MemoryAdaptor::new(store.clone(), options), store)
}

fn wire(adaptor: MemoryAdaptor, store: MemoryStore) -> Harness {
    let registry = fixture_registry();
    let backing = backing_store(&registry);
    let layer = with_cache(
        Arc::new(adaptor),
        Arc::new(backing.clone()),
        Arc::clone(&registry),
    );
    Harness {
        layer,
        store,
        backing,
        registry,
    }
}
