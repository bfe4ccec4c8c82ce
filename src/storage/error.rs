//! Storage Errors
//!
//! TigerStyle: One error enum for the whole facade, explicit variants for
//! every outcome a caller is expected to branch on.

use thiserror::Error;

/// Result alias used throughout the facade.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by the storage facade and its backends.
///
/// "Absent" is not an error: `get` returns `Ok(None)`. Everything else a
/// caller can act on has its own variant; unclassified backend failures are
/// reported as [`StorageError::Backend`] and are never retried here.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Missing or unusable connection configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required resource could not be provisioned at startup.
    #[error("failed to provision {resource}: {source}")]
    Provisioning {
        /// Descriptor of the resource that failed, e.g. `table Customers`
        resource: String,
        /// Underlying failure
        #[source]
        source: Box<StorageError>,
    },

    /// Insert against a key that already exists.
    #[error("entity ({partition_key}, {row_key}) already exists in table {table}")]
    Conflict {
        /// Physical table name
        table: String,
        /// Partition key
        partition_key: String,
        /// Row key
        row_key: String,
    },

    /// Update with a version token that no longer matches the stored record.
    #[error(
        "entity ({partition_key}, {row_key}) in table {table} was modified by another writer; \
         re-read the entity and retry the update"
    )]
    StaleVersion {
        /// Physical table name
        table: String,
        /// Partition key
        partition_key: String,
        /// Row key
        row_key: String,
    },

    /// Update attempted with an entity that was never read from the store.
    #[error("entity ({partition_key}, {row_key}) has no version token; read it before updating")]
    MissingVersion {
        /// Partition key
        partition_key: String,
        /// Row key
        row_key: String,
    },

    /// A resource addressed by name does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// What was looked up, e.g. `blob images/cat.png`
        resource: String,
    },

    /// A resource or key name violates the naming rules.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        /// Offending name
        name: String,
        /// Rule that was violated
        reason: String,
    },

    /// Entity could not be converted to or from its stored representation.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Payload could not be read from its source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unclassified backend failure.
    #[error("backend error during {operation}: {message}")]
    Backend {
        /// Operation being performed, e.g. `insert_record`
        operation: String,
        /// Backend-provided message
        message: String,
    },
}

impl StorageError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Wrap a failure as fatal provisioning error for `resource`.
    pub fn provisioning(resource: impl Into<String>, source: StorageError) -> Self {
        Self::Provisioning {
            resource: resource.into(),
            source: Box::new(source),
        }
    }

    /// Create a not-found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an invalid-name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an unclassified backend error.
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether this is a stale-version outcome.
    #[must_use]
    pub fn is_stale_version(&self) -> bool {
        matches!(self, Self::StaleVersion { .. })
    }

    /// Whether this is an insert conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether this is a not-found outcome.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
