//! Entity - Partitioned, Versioned Records
//!
//! TigerStyle: Explicit types at the backend boundary.
//!
//! Application types implement [`TableEntity`]. At the backend boundary they
//! travel as [`TableRecord`]s: the two keys, the version token, and the
//! entity's JSON properties. Backends never see Rust entity types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};
use crate::constants::ENTITY_KEY_BYTES_MAX;

// =============================================================================
// Version Token
// =============================================================================

/// Opaque version token assigned by the store on every successful write.
///
/// Compared for equality only; its contents mean nothing to callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Wrap a backend-provided token.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mint a fresh, collision-improbable token.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("W/\"{}\"", uuid::Uuid::new_v4()))
    }

    /// Raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// TableEntity
// =============================================================================

/// A record that can be stored in a partitioned table.
///
/// Implementors should mark their version token field `#[serde(skip)]`; the
/// token is carried next to the properties, not inside them.
pub trait TableEntity: Serialize + DeserializeOwned + Send + Sync {
    /// Logical type name, resolved to a physical table by
    /// [`ResourceNaming`](super::ResourceNaming).
    const TYPE_NAME: &'static str;

    /// Partition key.
    fn partition_key(&self) -> &str;

    /// Row key, unique within the partition.
    fn row_key(&self) -> &str;

    /// Version token from the most recent read or write, if any.
    fn etag(&self) -> Option<&ETag>;

    /// Attach the token assigned by the store.
    fn set_etag(&mut self, etag: ETag);
}

// =============================================================================
// TableRecord
// =============================================================================

/// Backend-level representation of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    /// Partition key
    pub partition_key: String,
    /// Row key
    pub row_key: String,
    /// Version token; `None` only before the first write
    pub etag: Option<ETag>,
    /// Last write time, set by the backend
    pub timestamp: Option<DateTime<Utc>>,
    /// Entity properties as JSON
    pub properties: serde_json::Value,
}

impl TableRecord {
    /// Convert an entity into a record, validating its keys.
    ///
    /// # Errors
    /// Returns `InvalidName` for unusable keys and `Serialization` if the
    /// entity cannot be represented as JSON.
    pub fn from_entity<T: TableEntity>(entity: &T) -> StorageResult<Self> {
        validate_key(entity.partition_key())?;
        validate_key(entity.row_key())?;

        Ok(Self {
            partition_key: entity.partition_key().to_string(),
            row_key: entity.row_key().to_string(),
            etag: entity.etag().cloned(),
            timestamp: None,
            properties: serde_json::to_value(entity)?,
        })
    }

    /// Convert a stored record back into an entity with its token attached.
    ///
    /// # Errors
    /// Returns `Serialization` if the properties do not match `T`.
    pub fn into_entity<T: TableEntity>(self) -> StorageResult<T> {
        let mut entity: T = serde_json::from_value(self.properties)?;
        if let Some(etag) = self.etag {
            entity.set_etag(etag);
        }
        Ok(entity)
    }
}

/// Check a partition or row key against the characters tables reject.
///
/// # Errors
/// Returns `InvalidName` describing the violated rule.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.len() > ENTITY_KEY_BYTES_MAX {
        return Err(StorageError::invalid_name(
            key,
            format!("key is {} bytes, max {}", key.len(), ENTITY_KEY_BYTES_MAX),
        ));
    }
    if let Some(c) = key
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '#' | '?') || c.is_control())
    {
        return Err(StorageError::invalid_name(
            key,
            format!("key contains forbidden character {c:?}"),
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
