//! Entity CRUD with optimistic concurrency.
//!
//! The version token travels with the entity. `update` forwards it to the
//! backend's compare-and-swap and reports a mismatch as `StaleVersion`; the
//! caller decides whether to re-read and retry. `delete` takes no token.

use super::StorageService;
use crate::storage::{StorageError, StorageResult, TableBackend, TableEntity, TableRecord};

impl StorageService {
    /// Every entity of type `T`.
    ///
    /// # Errors
    /// Returns the backend error if the table cannot be read, or
    /// `Serialization` if a stored record does not match `T`.
    pub async fn list<T: TableEntity>(&self) -> StorageResult<Vec<T>> {
        let table = self.naming.table_name::<T>();
        let records = self.backend.list_records(&table).await.map_err(|e| {
            tracing::error!(entity_type = T::TYPE_NAME, table = %table, error = %e, "List failed");
            e
        })?;

        records.into_iter().map(TableRecord::into_entity::<T>).collect()
    }

    /// Entity by key, `None` if absent.
    ///
    /// # Errors
    /// Returns the backend error on read failure.
    pub async fn get<T: TableEntity>(&self, partition_key: &str, row_key: &str) -> StorageResult<Option<T>> {
        let table = self.naming.table_name::<T>();
        let record = self
            .backend
            .get_record(&table, partition_key, row_key)
            .await
            .map_err(|e| {
                tracing::error!(
                    entity_type = T::TYPE_NAME,
                    table = %table,
                    partition_key,
                    row_key,
                    error = %e,
                    "Get failed"
                );
                e
            })?;

        record.map(TableRecord::into_entity::<T>).transpose()
    }

    /// Store a new entity and return it with its assigned version token.
    ///
    /// # Errors
    /// Returns `Conflict` if the key already exists; the stored entity is
    /// left unchanged.
    pub async fn insert<T: TableEntity>(&self, entity: T) -> StorageResult<T> {
        let table = self.naming.table_name::<T>();
        let mut record = TableRecord::from_entity(&entity)?;
        record.etag = None;

        let stored = self
            .backend
            .insert_record(&table, record)
            .await
            .map_err(|e| log_write_failure::<T>("Insert", &table, &entity, e))?;

        tracing::debug!(
            entity_type = T::TYPE_NAME,
            table = %table,
            partition_key = entity.partition_key(),
            row_key = entity.row_key(),
            "Inserted entity"
        );
        with_token(entity, stored)
    }

    /// Replace an entity if nobody else wrote it since it was read.
    ///
    /// Returns the entity with its fresh version token. A failed update is
    /// never retried or merged here.
    ///
    /// # Errors
    /// - `MissingVersion` if `entity` carries no version token
    /// - `StaleVersion` if the stored token differs
    /// - `NotFound` if the key does not exist
    pub async fn update<T: TableEntity>(&self, entity: T) -> StorageResult<T> {
        let table = self.naming.table_name::<T>();
        let Some(expected) = entity.etag().cloned() else {
            return Err(StorageError::MissingVersion {
                partition_key: entity.partition_key().to_string(),
                row_key: entity.row_key().to_string(),
            });
        };
        let record = TableRecord::from_entity(&entity)?;

        let stored = self
            .backend
            .replace_record(&table, record, &expected)
            .await
            .map_err(|e| log_write_failure::<T>("Update", &table, &entity, e))?;

        tracing::debug!(
            entity_type = T::TYPE_NAME,
            table = %table,
            partition_key = entity.partition_key(),
            row_key = entity.row_key(),
            "Updated entity"
        );
        with_token(entity, stored)
    }

    /// Remove an entity regardless of its version. Returns true if it
    /// existed.
    ///
    /// # Errors
    /// Returns the backend error on write failure.
    pub async fn delete<T: TableEntity>(&self, partition_key: &str, row_key: &str) -> StorageResult<bool> {
        let table = self.naming.table_name::<T>();
        let removed = self
            .backend
            .delete_record(&table, partition_key, row_key)
            .await
            .map_err(|e| {
                tracing::error!(
                    entity_type = T::TYPE_NAME,
                    table = %table,
                    partition_key,
                    row_key,
                    error = %e,
                    "Delete failed"
                );
                e
            })?;

        tracing::debug!(
            entity_type = T::TYPE_NAME,
            table = %table,
            partition_key,
            row_key,
            removed,
            "Deleted entity"
        );
        Ok(removed)
    }
}

fn log_write_failure<T: TableEntity>(action: &str, table: &str, entity: &T, e: StorageError) -> StorageError {
    // Conflicts and stale versions are expected outcomes for the caller.
    if e.is_conflict() || e.is_stale_version() {
        tracing::warn!(
            entity_type = T::TYPE_NAME,
            table,
            partition_key = entity.partition_key(),
            row_key = entity.row_key(),
            error = %e,
            "{action} rejected"
        );
    } else {
        tracing::error!(
            entity_type = T::TYPE_NAME,
            table,
            partition_key = entity.partition_key(),
            row_key = entity.row_key(),
            error = %e,
            "{action} failed"
        );
    }
    e
}

fn with_token<T: TableEntity>(mut entity: T, stored: TableRecord) -> StorageResult<T> {
    let etag = stored
        .etag
        .ok_or_else(|| StorageError::backend("write", "backend returned a record without a version token"))?;
    entity.set_etag(etag);
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::models::{Customer, Product};
    use crate::provision::ResourceLayout;
    use crate::service::StorageService;
    use crate::storage::{ETag, SimStorageBackend, StorageError, TableEntity};

    async fn service() -> StorageService {
        StorageService::start(Arc::new(SimStorageBackend::new()), ResourceLayout::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_token() {
        let svc = service().await;
        let stored = svc.insert(Customer::new("C", "1", "Alice")).await.unwrap();
        assert!(stored.etag().is_some_and(|t| !t.as_str().is_empty()));

        let read: Customer = svc.get("C", "1").await.unwrap().unwrap();
        assert_eq!(read, stored);
    }

    #[tokio::test]
    async fn test_insert_ignores_caller_token() {
        let svc = service().await;
        let mut customer = Customer::new("C", "1", "Alice");
        customer.set_etag(ETag::new("made-up"));

        let stored = svc.insert(customer).await.unwrap();
        assert_ne!(stored.etag(), Some(&ETag::new("made-up")));
    }

    #[tokio::test]
    async fn test_update_without_token() {
        let svc = service().await;
        svc.insert(Customer::new("C", "1", "Alice")).await.unwrap();

        let err = svc.update(Customer::new("C", "1", "Alicia")).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingVersion { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_key() {
        let svc = service().await;
        let mut ghost = Customer::new("C", "404", "Nobody");
        ghost.set_etag(ETag::new("v1"));

        let err = svc.update(ghost).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_by_type() {
        let svc = service().await;
        svc.insert(Customer::new("C", "1", "Alice")).await.unwrap();
        svc.insert(Customer::new("C", "2", "Bob")).await.unwrap();
        svc.insert(Product::new("toys", "SKU-1", "Kite", 1299)).await.unwrap();

        let mut names: Vec<String> = svc
            .list::<Customer>()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(svc.list::<Product>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected_before_backend() {
        let svc = service().await;
        let err = svc.insert(Customer::new("C", "a/b", "Slash")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidName { .. }));
        assert!(svc.list::<Customer>().await.unwrap().is_empty());
    }
}
