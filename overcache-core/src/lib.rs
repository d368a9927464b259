//! Overcache Core - Model Types, Keys and Records
//!
//! Everything the cache protocol needs to know about model types without
//! talking to any store: declared descriptors, instances, cache keys, the
//! plain record format and configuration. All other crates depend on this.

pub mod config;
pub mod error;
pub mod instance;
pub mod key;
pub mod model;
pub mod record;
pub mod value;

pub use config::{AdaptorOptions, OvercacheConfig};
pub use error::{
    CacheError, ConfigError, ModelError, OvercacheError, OvercacheResult, StorageError,
};
pub use instance::{Association, ModelInstance, PrimaryKey};
pub use key::CacheKey;
pub use model::{
    AssociationDescriptor, AttributeDescriptor, Cardinality, ModelDescriptor,
    ModelDescriptorBuilder, ModelRegistry,
};
pub use record::{to_instance, to_instances, to_json, to_record, Record, DEFAULT_MAX_DEPTH};
pub use value::{values, AttributeKind, FieldError, Timestamp, Value, Values};
