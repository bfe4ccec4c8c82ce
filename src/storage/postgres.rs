//! PostgresBackend - Production Storage
//!
//! TigerStyle: Real database storage, explicit schema, version checks done
//! by the database in a single conditional statement.
//!
//! # Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PostgresBackend                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pool: sqlx::PgPool (connection pooling)                     │
//! │  Entity tables: one SQL table per physical table,            │
//! │    PRIMARY KEY (partition_key, row_key), etag column         │
//! │  depot_containers / depot_blobs                              │
//! │  depot_queues / depot_queue_messages                         │
//! │  depot_shares / depot_share_directories / depot_share_files  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::backend::{BlobBackend, QueueBackend, QueueMessage, ShareBackend, TableBackend};
use super::entity::{ETag, TableRecord};
use super::error::{StorageError, StorageResult};
use super::resource::{validate_resource_name, AccessPolicy, ResourceKind};
use crate::constants::{POSTGRES_SCHEMES, QUEUE_VISIBILITY_TIMEOUT_MS};

/// Maximum pooled connections
const POOL_CONNECTIONS_MAX: u32 = 10;

/// Default prefix of blob locators
const BLOB_BASE_URL_DEFAULT: &str = "/blobs";

/// Directory column value for files in the share root
const SHARE_ROOT_DIRECTORY: &str = "";

/// SQLSTATE: unique_violation
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE: foreign_key_violation
const SQLSTATE_FOREIGN_KEY_VIOLATION: &str = "23503";

/// SQLSTATE: undefined_table
const SQLSTATE_UNDEFINED_TABLE: &str = "42P01";

/// SQLSTATE: duplicate_table
const SQLSTATE_DUPLICATE_TABLE: &str = "42P07";

const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS depot_tables (
        name TEXT PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS depot_containers (
        name TEXT PRIMARY KEY,
        access_policy TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS depot_blobs (
        container TEXT NOT NULL REFERENCES depot_containers(name),
        name TEXT NOT NULL,
        data BYTEA NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (container, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS depot_queues (
        name TEXT PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS depot_queue_messages (
        id BIGSERIAL PRIMARY KEY,
        queue TEXT NOT NULL REFERENCES depot_queues(name),
        text TEXT NOT NULL,
        inserted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        visible_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        dequeue_count INTEGER NOT NULL DEFAULT 0,
        pop_receipt TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_depot_queue_messages_visible \
     ON depot_queue_messages(queue, visible_at, id)",
    r#"
    CREATE TABLE IF NOT EXISTS depot_shares (
        name TEXT PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS depot_share_directories (
        share TEXT NOT NULL REFERENCES depot_shares(name),
        path TEXT NOT NULL,
        PRIMARY KEY (share, path)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS depot_share_files (
        share TEXT NOT NULL REFERENCES depot_shares(name),
        directory TEXT NOT NULL,
        name TEXT NOT NULL,
        data BYTEA NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (share, directory, name)
    )
    "#,
];

// =============================================================================
// PostgresBackend
// =============================================================================

/// PostgreSQL storage backend for production use.
pub struct PostgresBackend {
    pool: PgPool,
    blob_base_url: String,
    visibility_timeout: Duration,
}

impl PostgresBackend {
    /// Connect with a `postgres://` connection string and create the
    /// bookkeeping schema.
    ///
    /// # Errors
    /// Returns `Configuration` for a non-Postgres URL and `Backend` if the
    /// connection or schema creation fails.
    pub async fn new(connection_string: &str) -> StorageResult<Self> {
        if !POSTGRES_SCHEMES
            .iter()
            .any(|scheme| connection_string.starts_with(scheme))
        {
            return Err(StorageError::configuration(
                "connection string must be a postgres:// URL",
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(POOL_CONNECTIONS_MAX)
            .connect(connection_string)
            .await
            .map_err(|e| StorageError::backend("connect", e.to_string()))?;

        Self::from_pool(pool).await
    }

    /// Create from an existing pool.
    ///
    /// # Errors
    /// Returns `Backend` if schema creation fails.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let backend = Self {
            pool,
            blob_base_url: BLOB_BASE_URL_DEFAULT.to_string(),
            visibility_timeout: Duration::from_millis(QUEUE_VISIBILITY_TIMEOUT_MS),
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Prefix blob locators with `base_url` instead of `/blobs`.
    #[must_use]
    pub fn with_blob_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.blob_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn init_schema(&self) -> StorageResult<()> {
        for statement in SCHEMA_STATEMENTS {
            if let Err(e) = sqlx::query(statement).execute(&self.pool).await {
                if !lost_create_race(&e) {
                    return Err(StorageError::backend("init_schema", e.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Get the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close all connections in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn exists(&self, sql: &str, params: &[&str]) -> StorageResult<bool> {
        let mut query = sqlx::query_scalar::<_, bool>(sql);
        for param in params {
            query = query.bind(*param);
        }
        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::backend("exists", e.to_string()))
    }

    async fn require(&self, kind: &str, sql: &str, params: &[&str]) -> StorageResult<()> {
        if self.exists(sql, params).await? {
            Ok(())
        } else {
            Err(StorageError::not_found(format!("{kind} {}", params.join("/"))))
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn sql_state(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

fn has_state(e: &sqlx::Error, state: &str) -> bool {
    sql_state(e).as_deref() == Some(state)
}

/// Concurrent `CREATE ... IF NOT EXISTS` can still collide in the catalog;
/// the loser sees the object already created.
fn lost_create_race(e: &sqlx::Error) -> bool {
    has_state(e, SQLSTATE_UNIQUE_VIOLATION) || has_state(e, SQLSTATE_DUPLICATE_TABLE)
}

/// Quoted identifier for an entity table. The name is validated first, so
/// it contains letters and digits only.
fn table_ident(table: &str) -> StorageResult<String> {
    validate_resource_name(ResourceKind::Table, table)?;
    Ok(format!("\"{table}\""))
}

fn table_error(operation: &str, table: &str, e: sqlx::Error) -> StorageError {
    if has_state(&e, SQLSTATE_UNDEFINED_TABLE) {
        StorageError::not_found(format!("table {table}"))
    } else {
        StorageError::backend(operation, e.to_string())
    }
}

fn row_to_record(row: &PgRow) -> StorageResult<TableRecord> {
    let get_err = |e: sqlx::Error| StorageError::backend("decode_record", e.to_string());

    let etag: String = row.try_get("etag").map_err(get_err)?;
    let timestamp: DateTime<Utc> = row.try_get("timestamp").map_err(get_err)?;

    Ok(TableRecord {
        partition_key: row.try_get("partition_key").map_err(get_err)?,
        row_key: row.try_get("row_key").map_err(get_err)?,
        etag: Some(ETag::new(etag)),
        timestamp: Some(timestamp),
        properties: row.try_get("properties").map_err(get_err)?,
    })
}

// =============================================================================
// TableBackend
// =============================================================================

#[async_trait]
impl TableBackend for PostgresBackend {
    async fn ensure_table(&self, table: &str) -> StorageResult<bool> {
        let ident = table_ident(table)?;

        let create = format!(
            "CREATE TABLE IF NOT EXISTS {ident} (
                partition_key TEXT NOT NULL,
                row_key TEXT NOT NULL,
                etag TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                properties JSONB NOT NULL,
                PRIMARY KEY (partition_key, row_key)
            )"
        );
        if let Err(e) = sqlx::query(&create).execute(&self.pool).await {
            if !lost_create_race(&e) {
                return Err(StorageError::backend("ensure_table", e.to_string()));
            }
        }

        let result = sqlx::query("INSERT INTO depot_tables (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(table)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::backend("ensure_table", e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_records(&self, table: &str) -> StorageResult<Vec<TableRecord>> {
        let ident = table_ident(table)?;
        let rows = sqlx::query(&format!(
            "SELECT partition_key, row_key, etag, timestamp, properties FROM {ident}"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| table_error("list_records", table, e))?;

        rows.iter().map(row_to_record).collect()
    }

    async fn get_record(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<Option<TableRecord>> {
        let ident = table_ident(table)?;
        let row = sqlx::query(&format!(
            "SELECT partition_key, row_key, etag, timestamp, properties FROM {ident} \
             WHERE partition_key = $1 AND row_key = $2"
        ))
        .bind(partition_key)
        .bind(row_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| table_error("get_record", table, e))?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn insert_record(&self, table: &str, mut record: TableRecord) -> StorageResult<TableRecord> {
        let ident = table_ident(table)?;
        let etag = ETag::generate();
        let timestamp = Utc::now();

        let result = sqlx::query(&format!(
            "INSERT INTO {ident} (partition_key, row_key, etag, timestamp, properties) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (partition_key, row_key) DO NOTHING"
        ))
        .bind(&record.partition_key)
        .bind(&record.row_key)
        .bind(etag.as_str())
        .bind(timestamp)
        .bind(&record.properties)
        .execute(&self.pool)
        .await
        .map_err(|e| table_error("insert_record", table, e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict {
                table: table.to_string(),
                partition_key: record.partition_key,
                row_key: record.row_key,
            });
        }

        record.etag = Some(etag);
        record.timestamp = Some(timestamp);
        Ok(record)
    }

    async fn replace_record(
        &self,
        table: &str,
        mut record: TableRecord,
        expected: &ETag,
    ) -> StorageResult<TableRecord> {
        let ident = table_ident(table)?;
        let etag = ETag::generate();
        let timestamp = Utc::now();

        let result = sqlx::query(&format!(
            "UPDATE {ident} SET etag = $1, timestamp = $2, properties = $3 \
             WHERE partition_key = $4 AND row_key = $5 AND etag = $6"
        ))
        .bind(etag.as_str())
        .bind(timestamp)
        .bind(&record.properties)
        .bind(&record.partition_key)
        .bind(&record.row_key)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| table_error("replace_record", table, e))?;

        if result.rows_affected() == 0 {
            let exists = self
                .exists(
                    &format!(
                        "SELECT EXISTS (SELECT 1 FROM {ident} WHERE partition_key = $1 AND row_key = $2)"
                    ),
                    &[record.partition_key.as_str(), record.row_key.as_str()],
                )
                .await?;
            if !exists {
                return Err(StorageError::not_found(format!(
                    "entity {table}({}, {})",
                    record.partition_key, record.row_key
                )));
            }
            return Err(StorageError::StaleVersion {
                table: table.to_string(),
                partition_key: record.partition_key,
                row_key: record.row_key,
            });
        }

        record.etag = Some(etag);
        record.timestamp = Some(timestamp);
        Ok(record)
    }

    async fn delete_record(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<bool> {
        let ident = table_ident(table)?;
        let result = sqlx::query(&format!(
            "DELETE FROM {ident} WHERE partition_key = $1 AND row_key = $2"
        ))
        .bind(partition_key)
        .bind(row_key)
        .execute(&self.pool)
        .await
        .map_err(|e| table_error("delete_record", table, e))?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// BlobBackend
// =============================================================================

const CONTAINER_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM depot_containers WHERE name = $1)";

#[async_trait]
impl BlobBackend for PostgresBackend {
    async fn ensure_container(&self, container: &str, policy: AccessPolicy) -> StorageResult<bool> {
        let result = sqlx::query(
            "INSERT INTO depot_containers (name, access_policy) VALUES ($1, $2) \
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(container)
        .bind(policy.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::backend("ensure_container", e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn put_blob(&self, container: &str, name: &str, data: Bytes) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO depot_blobs (container, name, data) VALUES ($1, $2, $3) \
             ON CONFLICT (container, name) DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
        )
        .bind(container)
        .bind(name)
        .bind(data.as_ref())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if has_state(&e, SQLSTATE_FOREIGN_KEY_VIOLATION) {
                StorageError::not_found(format!("container {container}"))
            } else {
                StorageError::backend("put_blob", e.to_string())
            }
        })?;
        Ok(())
    }

    async fn get_blob(&self, container: &str, name: &str) -> StorageResult<Option<Bytes>> {
        let data: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT data FROM depot_blobs WHERE container = $1 AND name = $2")
                .bind(container)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::backend("get_blob", e.to_string()))?;

        if data.is_none() {
            self.require("container", CONTAINER_EXISTS, &[container]).await?;
        }
        Ok(data.map(Bytes::from))
    }

    async fn delete_blob(&self, container: &str, name: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM depot_blobs WHERE container = $1 AND name = $2")
            .bind(container)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::backend("delete_blob", e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    fn blob_url(&self, container: &str, name: &str) -> String {
        format!("{}/{container}/{name}", self.blob_base_url)
    }
}

// =============================================================================
// QueueBackend
// =============================================================================

const QUEUE_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM depot_queues WHERE name = $1)";

#[async_trait]
impl QueueBackend for PostgresBackend {
    async fn ensure_queue(&self, queue: &str) -> StorageResult<bool> {
        let result =
            sqlx::query("INSERT INTO depot_queues (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(queue)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::backend("ensure_queue", e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn send_message(&self, queue: &str, text: &str) -> StorageResult<()> {
        sqlx::query("INSERT INTO depot_queue_messages (queue, text) VALUES ($1, $2)")
            .bind(queue)
            .bind(text)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if has_state(&e, SQLSTATE_FOREIGN_KEY_VIOLATION) {
                    StorageError::not_found(format!("queue {queue}"))
                } else {
                    StorageError::backend("send_message", e.to_string())
                }
            })?;
        Ok(())
    }

    async fn receive_message(&self, queue: &str) -> StorageResult<Option<QueueMessage>> {
        let pop_receipt = uuid::Uuid::new_v4().to_string();

        let row = sqlx::query(
            r#"
            UPDATE depot_queue_messages
            SET visible_at = now() + make_interval(secs => $2),
                dequeue_count = dequeue_count + 1,
                pop_receipt = $3
            WHERE id = (
                SELECT id FROM depot_queue_messages
                WHERE queue = $1 AND visible_at <= now()
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, text, inserted_at, dequeue_count
            "#,
        )
        .bind(queue)
        .bind(self.visibility_timeout.as_secs_f64())
        .bind(&pop_receipt)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::backend("receive_message", e.to_string()))?;

        let Some(row) = row else {
            self.require("queue", QUEUE_EXISTS, &[queue]).await?;
            return Ok(None);
        };

        let get_err = |e: sqlx::Error| StorageError::backend("decode_message", e.to_string());
        let id: i64 = row.try_get("id").map_err(get_err)?;
        let dequeue_count: i32 = row.try_get("dequeue_count").map_err(get_err)?;

        Ok(Some(QueueMessage {
            id: id.to_string(),
            pop_receipt,
            text: row.try_get("text").map_err(get_err)?,
            inserted_at: row.try_get("inserted_at").map_err(get_err)?,
            dequeue_count: u32::try_from(dequeue_count).unwrap_or(0),
        }))
    }

    async fn delete_message(
        &self,
        queue: &str,
        message_id: &str,
        pop_receipt: &str,
    ) -> StorageResult<()> {
        let not_found = || StorageError::not_found(format!("message {queue}/{message_id}"));
        let id: i64 = message_id.parse().map_err(|_| not_found())?;

        let result = sqlx::query(
            "DELETE FROM depot_queue_messages WHERE queue = $1 AND id = $2 AND pop_receipt = $3",
        )
        .bind(queue)
        .bind(id)
        .bind(pop_receipt)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::backend("delete_message", e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(not_found());
        }
        Ok(())
    }
}

// =============================================================================
// ShareBackend
// =============================================================================

const SHARE_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM depot_shares WHERE name = $1)";

const DIRECTORY_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM depot_share_directories WHERE share = $1 AND path = $2)";

#[async_trait]
impl ShareBackend for PostgresBackend {
    async fn ensure_share(&self, share: &str) -> StorageResult<bool> {
        let result =
            sqlx::query("INSERT INTO depot_shares (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(share)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::backend("ensure_share", e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn ensure_directory(&self, share: &str, directory: &str) -> StorageResult<bool> {
        let result = sqlx::query(
            "INSERT INTO depot_share_directories (share, path) VALUES ($1, $2) \
             ON CONFLICT (share, path) DO NOTHING",
        )
        .bind(share)
        .bind(directory)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if has_state(&e, SQLSTATE_FOREIGN_KEY_VIOLATION) {
                StorageError::not_found(format!("share {share}"))
            } else {
                StorageError::backend("ensure_directory", e.to_string())
            }
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn put_file(
        &self,
        share: &str,
        directory: Option<&str>,
        name: &str,
        data: Bytes,
    ) -> StorageResult<()> {
        match directory {
            Some(dir) => self.require("directory", DIRECTORY_EXISTS, &[share, dir]).await?,
            None => self.require("share", SHARE_EXISTS, &[share]).await?,
        }

        sqlx::query(
            "INSERT INTO depot_share_files (share, directory, name, data) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (share, directory, name) DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
        )
        .bind(share)
        .bind(directory.unwrap_or(SHARE_ROOT_DIRECTORY))
        .bind(name)
        .bind(data.as_ref())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::backend("put_file", e.to_string()))?;
        Ok(())
    }

    async fn get_file(
        &self,
        share: &str,
        directory: Option<&str>,
        name: &str,
    ) -> StorageResult<Option<Bytes>> {
        let data: Option<Vec<u8>> = sqlx::query_scalar(
            "SELECT data FROM depot_share_files WHERE share = $1 AND directory = $2 AND name = $3",
        )
        .bind(share)
        .bind(directory.unwrap_or(SHARE_ROOT_DIRECTORY))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::backend("get_file", e.to_string()))?;

        if data.is_none() {
            self.require("share", SHARE_EXISTS, &[share]).await?;
        }
        Ok(data.map(Bytes::from))
    }
}

// =============================================================================
// Tests (require running Postgres)
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Get test database URL from environment.
    fn test_db_url() -> Option<String> {
        env::var("TEST_POSTGRES_URL").ok()
    }

    /// Skip test if no database available.
    macro_rules! require_db {
        () => {
            match test_db_url() {
                Some(url) => url,
                None => {
                    eprintln!("Skipping test: TEST_POSTGRES_URL not set");
                    return;
                }
            }
        };
    }

    fn unique(prefix: &str) -> String {
        format!("{prefix}{}", uuid::Uuid::new_v4().simple())
    }

    fn record(pk: &str, rk: &str, name: &str) -> TableRecord {
        TableRecord {
            partition_key: pk.to_string(),
            row_key: rk.to_string(),
            etag: None,
            timestamp: None,
            properties: serde_json::json!({ "name": name }),
        }
    }

    #[tokio::test]
    async fn test_rejects_non_postgres_url() {
        let result = PostgresBackend::new("mysql://localhost/db").await;
        assert!(matches!(result, Err(StorageError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_postgres_table_crud_and_versioning() {
        let url = require_db!();
        let backend = PostgresBackend::new(&url).await.unwrap();
        let table = unique("T");

        assert!(backend.ensure_table(&table).await.unwrap());
        assert!(!backend.ensure_table(&table).await.unwrap());

        let v1 = backend
            .insert_record(&table, record("C", "1", "Alice"))
            .await
            .unwrap()
            .etag
            .unwrap();
        assert!(backend
            .insert_record(&table, record("C", "1", "Mallory"))
            .await
            .unwrap_err()
            .is_conflict());

        let v2 = backend
            .replace_record(&table, record("C", "1", "Alicia"), &v1)
            .await
            .unwrap()
            .etag
            .unwrap();
        assert_ne!(v1, v2);

        let stale = backend
            .replace_record(&table, record("C", "1", "Eve"), &v1)
            .await
            .unwrap_err();
        assert!(stale.is_stale_version());

        let current = backend.get_record(&table, "C", "1").await.unwrap().unwrap();
        assert_eq!(current.properties["name"], "Alicia");
        assert_eq!(backend.list_records(&table).await.unwrap().len(), 1);

        assert!(backend.delete_record(&table, "C", "1").await.unwrap());
        assert!(backend.get_record(&table, "C", "1").await.unwrap().is_none());

        backend.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_postgres_concurrent_connect_and_provision() {
        let url = require_db!();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let url = url.clone();
                tokio::spawn(async move {
                    let backend = PostgresBackend::new(&url).await?;
                    let created = backend.ensure_table("DepotConcurrentStart").await?;
                    backend.close().await;
                    Ok::<_, StorageError>(created)
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_postgres_queue_pop() {
        let url = require_db!();
        let backend = PostgresBackend::new(&url).await.unwrap();
        let queue = unique("q-");

        backend.ensure_queue(&queue).await.unwrap();
        backend.send_message(&queue, "order-42").await.unwrap();

        let message = backend.receive_message(&queue).await.unwrap().unwrap();
        assert_eq!(message.text, "order-42");
        backend
            .delete_message(&queue, &message.id, &message.pop_receipt)
            .await
            .unwrap();
        assert!(backend.receive_message(&queue).await.unwrap().is_none());

        backend.close().await;
    }

    #[tokio::test]
    async fn test_postgres_blobs_and_shares() {
        let url = require_db!();
        let backend = PostgresBackend::new(&url).await.unwrap();
        let container = unique("c-");
        let share = unique("s-");

        backend.ensure_container(&container, AccessPolicy::Blob).await.unwrap();
        backend
            .put_blob(&container, "a.png", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert_eq!(
            backend.get_blob(&container, "a.png").await.unwrap(),
            Some(Bytes::from_static(b"png"))
        );
        assert!(backend.delete_blob(&container, "a.png").await.unwrap());
        assert!(!backend.delete_blob(&container, "a.png").await.unwrap());
        assert!(!backend.delete_blob(&unique("c-"), "a.png").await.unwrap());

        backend.ensure_share(&share).await.unwrap();
        backend.ensure_directory(&share, "invoices").await.unwrap();
        backend
            .put_file(&share, Some("invoices"), "i.pdf", Bytes::from_static(b"pdf"))
            .await
            .unwrap();
        assert_eq!(
            backend.get_file(&share, Some("invoices"), "i.pdf").await.unwrap(),
            Some(Bytes::from_static(b"pdf"))
        );

        backend.close().await;
    }
}
