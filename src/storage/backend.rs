//! Storage Backend Traits
//!
//! TigerStyle: Abstract interface to the remote storage service.
//!
//! One trait per persistence primitive. [`StorageBackend`] is the union the
//! facade holds; every type implementing all four gets it for free.
//!
//! Contract shared by all implementations:
//! - `ensure_*` calls are idempotent and report whether they created anything
//! - operations against a resource that was never ensured fail with `NotFound`,
//!   except blob deletes, which report the blob as absent
//! - version checks happen atomically inside the backend

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::entity::{ETag, TableRecord};
use super::error::StorageResult;
use super::resource::AccessPolicy;

// =============================================================================
// Tables
// =============================================================================

/// Partitioned entity tables.
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Create `table` if missing. Returns true if it was created.
    async fn ensure_table(&self, table: &str) -> StorageResult<bool>;

    /// All records of `table`, in no particular order.
    async fn list_records(&self, table: &str) -> StorageResult<Vec<TableRecord>>;

    /// Record by key, `None` if absent.
    async fn get_record(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<Option<TableRecord>>;

    /// Insert a new record and return it with its assigned token.
    ///
    /// Fails with `Conflict` if the key exists; the stored record is untouched.
    async fn insert_record(&self, table: &str, record: TableRecord) -> StorageResult<TableRecord>;

    /// Replace a record only if its stored token equals `expected`.
    ///
    /// Fails with `StaleVersion` on mismatch and `NotFound` if the key does
    /// not exist. Returns the record with its fresh token.
    async fn replace_record(
        &self,
        table: &str,
        record: TableRecord,
        expected: &ETag,
    ) -> StorageResult<TableRecord>;

    /// Delete by key regardless of version. Returns true if a record existed.
    async fn delete_record(&self, table: &str, partition_key: &str, row_key: &str)
        -> StorageResult<bool>;
}

// =============================================================================
// Blobs
// =============================================================================

/// Flat blob containers.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Create `container` with `policy` if missing. An existing container
    /// keeps the policy it was created with. Returns true if it was created.
    async fn ensure_container(&self, container: &str, policy: AccessPolicy) -> StorageResult<bool>;

    /// Write a blob, overwriting any blob with the same name.
    async fn put_blob(&self, container: &str, name: &str, data: Bytes) -> StorageResult<()>;

    /// Read a blob, `None` if absent.
    async fn get_blob(&self, container: &str, name: &str) -> StorageResult<Option<Bytes>>;

    /// Delete a blob. Returns true if it existed; a missing container holds
    /// no blobs and yields false.
    async fn delete_blob(&self, container: &str, name: &str) -> StorageResult<bool>;

    /// Locator under which the blob can be fetched.
    fn blob_url(&self, container: &str, name: &str) -> String;
}

// =============================================================================
// Queues
// =============================================================================

/// A message handed out by [`QueueBackend::receive_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Backend message id
    pub id: String,
    /// Receipt proving this receive; required to delete the message
    pub pop_receipt: String,
    /// Message body
    pub text: String,
    /// Enqueue time
    pub inserted_at: DateTime<Utc>,
    /// Number of times the message has been received
    pub dequeue_count: u32,
}

/// Message queues.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Create `queue` if missing. Returns true if it was created.
    async fn ensure_queue(&self, queue: &str) -> StorageResult<bool>;

    /// Append a message.
    async fn send_message(&self, queue: &str, text: &str) -> StorageResult<()>;

    /// Take the oldest visible message and hide it for the visibility
    /// timeout. `None` if no message is visible.
    async fn receive_message(&self, queue: &str) -> StorageResult<Option<QueueMessage>>;

    /// Permanently remove a received message.
    async fn delete_message(&self, queue: &str, message_id: &str, pop_receipt: &str)
        -> StorageResult<()>;
}

// =============================================================================
// Shares
// =============================================================================

/// Hierarchical file shares.
#[async_trait]
pub trait ShareBackend: Send + Sync {
    /// Create `share` if missing. Returns true if it was created.
    async fn ensure_share(&self, share: &str) -> StorageResult<bool>;

    /// Create `directory` under `share` if missing. Returns true if created.
    async fn ensure_directory(&self, share: &str, directory: &str) -> StorageResult<bool>;

    /// Write a file into the share root or a directory, overwriting.
    async fn put_file(
        &self,
        share: &str,
        directory: Option<&str>,
        name: &str,
        data: Bytes,
    ) -> StorageResult<()>;

    /// Read a file, `None` if absent.
    async fn get_file(
        &self,
        share: &str,
        directory: Option<&str>,
        name: &str,
    ) -> StorageResult<Option<Bytes>>;
}

// =============================================================================
// Union
// =============================================================================

/// Everything the facade needs from a backend.
pub trait StorageBackend: TableBackend + BlobBackend + QueueBackend + ShareBackend {}

impl<T> StorageBackend for T where T: TableBackend + BlobBackend + QueueBackend + ShareBackend {}
