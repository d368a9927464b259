//! Error types for overcache operations

use thiserror::Error;

/// Backing relational-store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Row not found: {model} with key {key}")]
    NotFound { model: String, key: String },

    #[error("Insert failed for {model}: {reason}")]
    InsertFailed { model: String, reason: String },

    #[error("Update failed for {model} with key {key}: {reason}")]
    UpdateFailed {
        model: String,
        key: String,
        reason: String,
    },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },

    #[error("Backing store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Key-value store adaptor errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Failed to serialize value for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Failed to deserialize value for {key}: {reason}")]
    Deserialization { key: String, reason: String },

    #[error("{backend} call {operation} failed: {reason}")]
    Backend {
        backend: String,
        operation: String,
        reason: String,
    },

    #[error("Invalid cache key: {reason}")]
    InvalidKey { reason: String },
}

/// Schema misuse errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Unknown model: {name}")]
    UnknownModel { name: String },

    #[error("Model {model} has no attribute {attribute}")]
    UnknownAttribute { model: String, attribute: String },

    #[error("Model {model} has no association {association}")]
    UnknownAssociation { model: String, association: String },

    #[error("Missing primary key value {attribute} on {model}")]
    MissingPrimaryKey { model: String, attribute: String },

    #[error("Primary key arity mismatch on {model}: expected {expected}, got {got}")]
    PrimaryKeyArity {
        model: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid model definition for {model}: {reason}")]
    InvalidDefinition { model: String, reason: String },

    #[error("Invalid value for {model}.{attribute}: {reason}")]
    InvalidValue {
        model: String,
        attribute: String,
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all overcache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OvercacheError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl OvercacheError {
    /// True when a stored payload could not be decoded.
    ///
    /// The operation protocol treats these as a cache miss instead of
    /// failing the read.
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, OvercacheError::Cache(CacheError::Deserialization { .. }))
    }
}

/// Result type alias for overcache operations.
pub type OvercacheResult<T> = Result<T, OvercacheError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            model: "User".to_string(),
            key: "1".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Row not found"));
        assert!(msg.contains("User"));
        assert!(msg.contains("1"));
    }

    #[test]
    fn test_cache_error_display_backend() {
        let err = CacheError::Backend {
            backend: "redis".to_string(),
            operation: "SET".to_string(),
            reason: "connection refused".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("redis"));
        assert!(msg.contains("SET"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_model_error_display_arity() {
        let err = ModelError::PrimaryKeyArity {
            model: "Comment".to_string(),
            expected: 2,
            got: 1,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Comment"));
        assert!(msg.contains("expected 2"));
        assert!(msg.contains("got 1"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "namespace".to_string(),
            value: "".to_string(),
            reason: "must not be empty".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("namespace"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn test_overcache_error_from_variants() {
        let storage = OvercacheError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, OvercacheError::Storage(_)));

        let cache = OvercacheError::from(CacheError::InvalidKey {
            reason: "empty".to_string(),
        });
        assert!(matches!(cache, OvercacheError::Cache(_)));

        let model = OvercacheError::from(ModelError::UnknownModel {
            name: "Ghost".to_string(),
        });
        assert!(matches!(model, OvercacheError::Model(_)));

        let config = OvercacheError::from(ConfigError::MissingRequired {
            field: "redis_url".to_string(),
        });
        assert!(matches!(config, OvercacheError::Config(_)));
    }

    #[test]
    fn test_decode_failure_detection() {
        let decode = OvercacheError::from(CacheError::Deserialization {
            key: "User:1".to_string(),
            reason: "expected value".to_string(),
        });
        assert!(decode.is_decode_failure());

        let backend = OvercacheError::from(CacheError::Backend {
            backend: "memory".to_string(),
            operation: "GET".to_string(),
            reason: "closed".to_string(),
        });
        assert!(!backend.is_decode_failure());
    }
}
