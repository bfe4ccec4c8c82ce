//! SimStorageBackend - In-Memory Simulation Backend
//!
//! TigerStyle: Deterministic in-process backend used by tests and by the
//! `memory://` connection string. Same contract as the production backend,
//! optional seeded fault injection.
//!
//! All state sits behind one lock, so every operation, including the
//! version compare-and-swap, is atomic with respect to every other.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::backend::{BlobBackend, QueueBackend, QueueMessage, ShareBackend, TableBackend};
use super::entity::{ETag, TableRecord};
use super::error::{StorageError, StorageResult};
use super::fault::{FaultInjector, FaultType};
use super::resource::{AccessPolicy, ResourceDescriptor};
use crate::constants::{MEMORY_SCHEME, QUEUE_VISIBILITY_TIMEOUT_MS};

// =============================================================================
// State
// =============================================================================

type RowKey = (String, String);

#[derive(Debug)]
struct SimContainer {
    policy: AccessPolicy,
    blobs: HashMap<String, Bytes>,
}

#[derive(Debug)]
struct SimMessage {
    id: String,
    text: String,
    inserted_at: DateTime<Utc>,
    dequeue_count: u32,
    pop_receipt: Option<String>,
    invisible_until: Option<Instant>,
}

#[derive(Debug, Default)]
struct SimShare {
    directories: BTreeSet<String>,
    files: HashMap<(Option<String>, String), Bytes>,
}

#[derive(Debug, Default)]
struct SimState {
    tables: HashMap<String, BTreeMap<RowKey, TableRecord>>,
    containers: HashMap<String, SimContainer>,
    queues: HashMap<String, VecDeque<SimMessage>>,
    shares: HashMap<String, SimShare>,
    next_message_id: u64,
}

// =============================================================================
// SimStorageBackend
// =============================================================================

/// In-memory storage backend.
#[derive(Debug)]
pub struct SimStorageBackend {
    state: RwLock<SimState>,
    faults: FaultInjector,
    visibility_timeout: Duration,
}

impl SimStorageBackend {
    /// Create an empty backend without fault injection.
    #[must_use]
    pub fn new() -> Self {
        Self::with_faults(FaultInjector::disabled())
    }

    /// Create an empty backend that injects faults from `faults`.
    #[must_use]
    pub fn with_faults(faults: FaultInjector) -> Self {
        Self {
            state: RwLock::new(SimState::default()),
            faults,
            visibility_timeout: Duration::from_millis(QUEUE_VISIBILITY_TIMEOUT_MS),
        }
    }

    /// Override how long received messages stay hidden.
    #[must_use]
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// The fault injector in use.
    #[must_use]
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Every resource that currently exists, sorted.
    pub async fn descriptors(&self) -> Vec<ResourceDescriptor> {
        let state = self.state.read().await;
        let mut descriptors: Vec<ResourceDescriptor> = state
            .tables
            .keys()
            .map(ResourceDescriptor::table)
            .chain(
                state
                    .containers
                    .iter()
                    .map(|(name, c)| ResourceDescriptor::container(name, c.policy)),
            )
            .chain(state.queues.keys().map(ResourceDescriptor::queue))
            .chain(state.shares.iter().flat_map(|(share, s)| {
                std::iter::once(ResourceDescriptor::share(share)).chain(
                    s.directories
                        .iter()
                        .map(move |dir| ResourceDescriptor::directory(share, dir)),
                )
            }))
            .collect();
        descriptors.sort_by(|a, b| (a.kind.as_str(), &a.name).cmp(&(b.kind.as_str(), &b.name)));
        descriptors
    }

    /// Access policy a container was created with.
    pub async fn container_policy(&self, container: &str) -> Option<AccessPolicy> {
        self.state
            .read()
            .await
            .containers
            .get(container)
            .map(|c| c.policy)
    }

    /// Number of messages in `queue`, visible or not.
    pub async fn queue_len(&self, queue: &str) -> usize {
        self.state
            .read()
            .await
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    fn check_fault(&self, fault_type: FaultType, operation: &str) -> StorageResult<()> {
        if self.faults.should_inject(fault_type) {
            return Err(StorageError::backend(operation, "injected fault"));
        }
        Ok(())
    }
}

impl Default for SimStorageBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(kind: &str, name: &str) -> StorageError {
    StorageError::not_found(format!("{kind} {name}"))
}

// =============================================================================
// TableBackend
// =============================================================================

#[async_trait]
impl TableBackend for SimStorageBackend {
    async fn ensure_table(&self, table: &str) -> StorageResult<bool> {
        self.check_fault(FaultType::ProvisionFail, "ensure_table")?;
        let mut state = self.state.write().await;
        if state.tables.contains_key(table) {
            return Ok(false);
        }
        state.tables.insert(table.to_string(), BTreeMap::new());
        Ok(true)
    }

    async fn list_records(&self, table: &str) -> StorageResult<Vec<TableRecord>> {
        self.check_fault(FaultType::TableReadFail, "list_records")?;
        let state = self.state.read().await;
        let rows = state.tables.get(table).ok_or_else(|| missing("table", table))?;
        Ok(rows.values().cloned().collect())
    }

    async fn get_record(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<Option<TableRecord>> {
        self.check_fault(FaultType::TableReadFail, "get_record")?;
        let state = self.state.read().await;
        let rows = state.tables.get(table).ok_or_else(|| missing("table", table))?;
        Ok(rows
            .get(&(partition_key.to_string(), row_key.to_string()))
            .cloned())
    }

    async fn insert_record(&self, table: &str, mut record: TableRecord) -> StorageResult<TableRecord> {
        self.check_fault(FaultType::TableWriteFail, "insert_record")?;
        let mut state = self.state.write().await;
        let rows = state
            .tables
            .get_mut(table)
            .ok_or_else(|| missing("table", table))?;

        let key = (record.partition_key.clone(), record.row_key.clone());
        if rows.contains_key(&key) {
            return Err(StorageError::Conflict {
                table: table.to_string(),
                partition_key: key.0,
                row_key: key.1,
            });
        }

        record.etag = Some(ETag::generate());
        record.timestamp = Some(Utc::now());
        rows.insert(key, record.clone());
        Ok(record)
    }

    async fn replace_record(
        &self,
        table: &str,
        mut record: TableRecord,
        expected: &ETag,
    ) -> StorageResult<TableRecord> {
        self.check_fault(FaultType::TableWriteFail, "replace_record")?;
        let mut state = self.state.write().await;
        let rows = state
            .tables
            .get_mut(table)
            .ok_or_else(|| missing("table", table))?;

        let key = (record.partition_key.clone(), record.row_key.clone());
        let Some(stored) = rows.get_mut(&key) else {
            return Err(missing(
                "entity",
                &format!("{table}({}, {})", key.0, key.1),
            ));
        };

        if stored.etag.as_ref() != Some(expected) {
            return Err(StorageError::StaleVersion {
                table: table.to_string(),
                partition_key: key.0,
                row_key: key.1,
            });
        }

        record.etag = Some(ETag::generate());
        record.timestamp = Some(Utc::now());
        *stored = record.clone();
        Ok(record)
    }

    async fn delete_record(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<bool> {
        self.check_fault(FaultType::TableWriteFail, "delete_record")?;
        let mut state = self.state.write().await;
        let rows = state
            .tables
            .get_mut(table)
            .ok_or_else(|| missing("table", table))?;
        Ok(rows
            .remove(&(partition_key.to_string(), row_key.to_string()))
            .is_some())
    }
}

// =============================================================================
// BlobBackend
// =============================================================================

#[async_trait]
impl BlobBackend for SimStorageBackend {
    async fn ensure_container(&self, container: &str, policy: AccessPolicy) -> StorageResult<bool> {
        self.check_fault(FaultType::ProvisionFail, "ensure_container")?;
        let mut state = self.state.write().await;
        if state.containers.contains_key(container) {
            return Ok(false);
        }
        state.containers.insert(
            container.to_string(),
            SimContainer {
                policy,
                blobs: HashMap::new(),
            },
        );
        Ok(true)
    }

    async fn put_blob(&self, container: &str, name: &str, data: Bytes) -> StorageResult<()> {
        self.check_fault(FaultType::BlobWriteFail, "put_blob")?;
        let mut state = self.state.write().await;
        let c = state
            .containers
            .get_mut(container)
            .ok_or_else(|| missing("container", container))?;
        c.blobs.insert(name.to_string(), data);
        Ok(())
    }

    async fn get_blob(&self, container: &str, name: &str) -> StorageResult<Option<Bytes>> {
        self.check_fault(FaultType::BlobReadFail, "get_blob")?;
        let state = self.state.read().await;
        let c = state
            .containers
            .get(container)
            .ok_or_else(|| missing("container", container))?;
        Ok(c.blobs.get(name).cloned())
    }

    async fn delete_blob(&self, container: &str, name: &str) -> StorageResult<bool> {
        self.check_fault(FaultType::BlobWriteFail, "delete_blob")?;
        let mut state = self.state.write().await;
        Ok(state
            .containers
            .get_mut(container)
            .is_some_and(|c| c.blobs.remove(name).is_some()))
    }

    fn blob_url(&self, container: &str, name: &str) -> String {
        format!("{MEMORY_SCHEME}{container}/{name}")
    }
}

// =============================================================================
// QueueBackend
// =============================================================================

#[async_trait]
impl QueueBackend for SimStorageBackend {
    async fn ensure_queue(&self, queue: &str) -> StorageResult<bool> {
        self.check_fault(FaultType::ProvisionFail, "ensure_queue")?;
        let mut state = self.state.write().await;
        if state.queues.contains_key(queue) {
            return Ok(false);
        }
        state.queues.insert(queue.to_string(), VecDeque::new());
        Ok(true)
    }

    async fn send_message(&self, queue: &str, text: &str) -> StorageResult<()> {
        self.check_fault(FaultType::QueueFail, "send_message")?;
        let mut state = self.state.write().await;
        state.next_message_id += 1;
        let id = state.next_message_id.to_string();
        let messages = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| missing("queue", queue))?;
        messages.push_back(SimMessage {
            id,
            text: text.to_string(),
            inserted_at: Utc::now(),
            dequeue_count: 0,
            pop_receipt: None,
            invisible_until: None,
        });
        Ok(())
    }

    async fn receive_message(&self, queue: &str) -> StorageResult<Option<QueueMessage>> {
        self.check_fault(FaultType::QueueFail, "receive_message")?;
        let mut state = self.state.write().await;
        let messages = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| missing("queue", queue))?;

        let now = Instant::now();
        let Some(message) = messages
            .iter_mut()
            .find(|m| m.invisible_until.map_or(true, |until| until <= now))
        else {
            return Ok(None);
        };

        let pop_receipt = uuid::Uuid::new_v4().to_string();
        message.dequeue_count += 1;
        message.pop_receipt = Some(pop_receipt.clone());
        message.invisible_until = Some(now + self.visibility_timeout);

        Ok(Some(QueueMessage {
            id: message.id.clone(),
            pop_receipt,
            text: message.text.clone(),
            inserted_at: message.inserted_at,
            dequeue_count: message.dequeue_count,
        }))
    }

    async fn delete_message(
        &self,
        queue: &str,
        message_id: &str,
        pop_receipt: &str,
    ) -> StorageResult<()> {
        self.check_fault(FaultType::QueueFail, "delete_message")?;
        let mut state = self.state.write().await;
        let messages = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| missing("queue", queue))?;

        let position = messages
            .iter()
            .position(|m| m.id == message_id && m.pop_receipt.as_deref() == Some(pop_receipt))
            .ok_or_else(|| missing("message", &format!("{queue}/{message_id}")))?;
        messages.remove(position);
        Ok(())
    }
}

// =============================================================================
// ShareBackend
// =============================================================================

#[async_trait]
impl ShareBackend for SimStorageBackend {
    async fn ensure_share(&self, share: &str) -> StorageResult<bool> {
        self.check_fault(FaultType::ProvisionFail, "ensure_share")?;
        let mut state = self.state.write().await;
        if state.shares.contains_key(share) {
            return Ok(false);
        }
        state.shares.insert(share.to_string(), SimShare::default());
        Ok(true)
    }

    async fn ensure_directory(&self, share: &str, directory: &str) -> StorageResult<bool> {
        self.check_fault(FaultType::ProvisionFail, "ensure_directory")?;
        let mut state = self.state.write().await;
        let s = state
            .shares
            .get_mut(share)
            .ok_or_else(|| missing("share", share))?;
        Ok(s.directories.insert(directory.to_string()))
    }

    async fn put_file(
        &self,
        share: &str,
        directory: Option<&str>,
        name: &str,
        data: Bytes,
    ) -> StorageResult<()> {
        self.check_fault(FaultType::ShareFail, "put_file")?;
        let mut state = self.state.write().await;
        let s = state
            .shares
            .get_mut(share)
            .ok_or_else(|| missing("share", share))?;
        if let Some(dir) = directory {
            if !s.directories.contains(dir) {
                return Err(missing("directory", &format!("{share}/{dir}")));
            }
        }
        s.files
            .insert((directory.map(str::to_string), name.to_string()), data);
        Ok(())
    }

    async fn get_file(
        &self,
        share: &str,
        directory: Option<&str>,
        name: &str,
    ) -> StorageResult<Option<Bytes>> {
        self.check_fault(FaultType::ShareFail, "get_file")?;
        let state = self.state.read().await;
        let s = state
            .shares
            .get(share)
            .ok_or_else(|| missing("share", share))?;
        Ok(s
            .files
            .get(&(directory.map(str::to_string), name.to_string()))
            .cloned())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fault::FaultConfig;

    fn record(pk: &str, rk: &str, value: i64) -> TableRecord {
        TableRecord {
            partition_key: pk.to_string(),
            row_key: rk.to_string(),
            etag: None,
            timestamp: None,
            properties: serde_json::json!({ "value": value }),
        }
    }

    async fn backend_with_table() -> SimStorageBackend {
        let backend = SimStorageBackend::new();
        backend.ensure_table("Things").await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let backend = SimStorageBackend::new();
        assert!(backend.ensure_table("Things").await.unwrap());
        assert!(!backend.ensure_table("Things").await.unwrap());
        assert!(backend.ensure_queue("jobs").await.unwrap());
        assert!(!backend.ensure_queue("jobs").await.unwrap());
    }

    #[tokio::test]
    async fn test_container_policy_fixed_at_creation() {
        let backend = SimStorageBackend::new();
        assert!(backend.ensure_container("pics", AccessPolicy::Blob).await.unwrap());
        assert!(!backend.ensure_container("pics", AccessPolicy::Private).await.unwrap());
        assert_eq!(backend.container_policy("pics").await, Some(AccessPolicy::Blob));
    }

    #[tokio::test]
    async fn test_insert_assigns_etag_and_rejects_duplicates() {
        let backend = backend_with_table().await;

        let stored = backend.insert_record("Things", record("p", "r", 1)).await.unwrap();
        assert!(stored.etag.is_some());
        assert!(stored.timestamp.is_some());

        let err = backend
            .insert_record("Things", record("p", "r", 2))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let current = backend.get_record("Things", "p", "r").await.unwrap().unwrap();
        assert_eq!(current.properties["value"], 1);
    }

    #[tokio::test]
    async fn test_replace_is_compare_and_swap() {
        let backend = backend_with_table().await;
        let v1 = backend
            .insert_record("Things", record("p", "r", 1))
            .await
            .unwrap()
            .etag
            .unwrap();

        let v2 = backend
            .replace_record("Things", record("p", "r", 2), &v1)
            .await
            .unwrap()
            .etag
            .unwrap();
        assert_ne!(v1, v2);

        let err = backend
            .replace_record("Things", record("p", "r", 3), &v1)
            .await
            .unwrap_err();
        assert!(err.is_stale_version());

        let current = backend.get_record("Things", "p", "r").await.unwrap().unwrap();
        assert_eq!(current.properties["value"], 2);
        assert_eq!(current.etag, Some(v2));
    }

    #[tokio::test]
    async fn test_replace_missing_record_is_not_found() {
        let backend = backend_with_table().await;
        let err = backend
            .replace_record("Things", record("p", "r", 1), &ETag::new("whatever"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_blob_in_unknown_container_is_absent() {
        let backend = SimStorageBackend::new();
        assert!(!backend.delete_blob("never-made", "x.png").await.unwrap());
        assert!(backend.get_blob("never-made", "x.png").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_operations_on_unknown_table_fail() {
        let backend = SimStorageBackend::new();
        let err = backend.get_record("Nope", "p", "r").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_queue_hides_received_message_until_deleted() {
        let backend = SimStorageBackend::new();
        backend.ensure_queue("jobs").await.unwrap();
        backend.send_message("jobs", "a").await.unwrap();
        backend.send_message("jobs", "b").await.unwrap();

        let first = backend.receive_message("jobs").await.unwrap().unwrap();
        assert_eq!(first.text, "a");
        assert_eq!(first.dequeue_count, 1);

        let second = backend.receive_message("jobs").await.unwrap().unwrap();
        assert_eq!(second.text, "b");
        assert!(backend.receive_message("jobs").await.unwrap().is_none());

        backend
            .delete_message("jobs", &first.id, &first.pop_receipt)
            .await
            .unwrap();
        assert_eq!(backend.queue_len("jobs").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_message_reappears_after_timeout() {
        let backend = SimStorageBackend::new().with_visibility_timeout(Duration::from_secs(5));
        backend.ensure_queue("jobs").await.unwrap();
        backend.send_message("jobs", "a").await.unwrap();

        let first = backend.receive_message("jobs").await.unwrap().unwrap();
        assert!(backend.receive_message("jobs").await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(6)).await;

        let again = backend.receive_message("jobs").await.unwrap().unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.dequeue_count, 2);
        assert!(backend
            .delete_message("jobs", &first.id, &first.pop_receipt)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_share_directory_must_exist() {
        let backend = SimStorageBackend::new();
        backend.ensure_share("docs").await.unwrap();

        let err = backend
            .put_file("docs", Some("reports"), "a.txt", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        backend.ensure_directory("docs", "reports").await.unwrap();
        backend
            .put_file("docs", Some("reports"), "a.txt", Bytes::from_static(b"x"))
            .await
            .unwrap();

        let root = backend.get_file("docs", None, "a.txt").await.unwrap();
        assert!(root.is_none());
        let nested = backend.get_file("docs", Some("reports"), "a.txt").await.unwrap();
        assert_eq!(nested, Some(Bytes::from_static(b"x")));
    }

    #[tokio::test]
    async fn test_injected_fault_surfaces_as_backend_error() {
        let faults = FaultInjector::builder(1)
            .with_fault(FaultConfig::new(FaultType::TableWriteFail, 1.0).with_max_injections(1))
            .build();
        let backend = SimStorageBackend::with_faults(faults);
        backend.ensure_table("Things").await.unwrap();

        let err = backend
            .insert_record("Things", record("p", "r", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend { .. }));

        backend.insert_record("Things", record("p", "r", 1)).await.unwrap();
        assert_eq!(backend.faults().injected_count(), 1);
    }
}
