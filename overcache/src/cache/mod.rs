//! Cache-aware operation sets.

pub mod class;
pub mod decorate;
pub mod instance;
pub mod protocol;

pub use class::{CustomKeyCache, IdentityCache};
pub use decorate::{with_cache, CacheLayer, Cacheable, CachedModel, ModelCache};
pub use instance::InstanceCache;
pub use protocol::{CacheContext, CacheOperation};
