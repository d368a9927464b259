//! Overcache Storage - Adaptors and Backing Store
//!
//! The two external collaborators of the cache protocol: key-value store
//! adaptors that hold cached records, and the backing relational store the
//! records are mirrored from.

pub mod adaptor;
pub mod backing;
pub mod memory_backing;

pub use adaptor::{
    CacheAdaptor, CacheStats, LmdbAdaptor, LmdbAdaptorError, MemoryAdaptor, MemoryStore,
    RedisAdaptor,
};
pub use backing::{BackingStore, FindOptions, Include};
pub use memory_backing::{CallCounts, InMemoryBackingStore};
