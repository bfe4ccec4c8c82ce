//! Storage Service
//!
//! TigerStyle: One handle over four primitives, provisioned before use.
//!
//! [`StorageService`] is the only type callers hold. It is created by
//! [`StorageService::connect`] or [`StorageService::start`], both of which
//! run the [`Provisioner`] and hand the service out only on success. After
//! that it is cheap to clone and safe to share between tasks; every
//! operation is a single call into the backend.
//!
//! The operations are split by primitive:
//! - entities: generic CRUD with optimistic concurrency
//! - blobs: image and proof uploads
//! - queues: send and receive-with-immediate-ack
//! - shares: file upload and download

mod blobs;
mod entities;
mod queues;
mod shares;

use std::sync::Arc;

use crate::config::FacadeConfig;
use crate::constants::{MEMORY_SCHEME, POSTGRES_SCHEMES};
use crate::provision::{ProvisionReport, Provisioner, ResourceLayout};
use crate::storage::{ResourceNaming, SimStorageBackend, StorageBackend, StorageError, StorageResult};

pub use blobs::{BlobNaming, UploadedBlob};

/// Handle to the provisioned storage resources.
#[derive(Clone)]
pub struct StorageService {
    backend: Arc<dyn StorageBackend>,
    naming: ResourceNaming,
    layout: ResourceLayout,
}

impl std::fmt::Debug for StorageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageService")
            .field("naming", &self.naming)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl StorageService {
    /// Open the backend named by `config` and provision it.
    ///
    /// `memory://` selects the in-process backend; `postgres://` requires the
    /// `postgres` feature.
    ///
    /// # Errors
    /// Returns `Configuration` for an unsupported connection string and
    /// `Provisioning` if any resource could not be ensured.
    pub async fn connect(config: FacadeConfig) -> StorageResult<Self> {
        let backend = open_backend(&config.connection_string).await?;
        tracing::info!(
            connection = %config.redacted_connection_string(),
            "Connected to storage backend"
        );
        Self::start(backend, config.layout).await
    }

    /// Provision `layout` on `backend` and return the service.
    ///
    /// # Errors
    /// Returns `Provisioning` naming the first resource that failed.
    pub async fn start(backend: Arc<dyn StorageBackend>, layout: ResourceLayout) -> StorageResult<Self> {
        let service = Self {
            backend,
            naming: naming_for(&layout)?,
            layout,
        };
        service.initialize().await?;
        Ok(service)
    }

    /// Re-run provisioning. Existing resources are left as they are.
    ///
    /// # Errors
    /// Returns `Provisioning` naming the first resource that failed.
    pub async fn initialize(&self) -> StorageResult<ProvisionReport> {
        Provisioner::new(self.backend.clone(), self.layout.clone())
            .initialize()
            .await
    }

    /// Underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Physical resource names.
    #[must_use]
    pub fn layout(&self) -> &ResourceLayout {
        &self.layout
    }

    /// Entity type to table mapping.
    #[must_use]
    pub fn naming(&self) -> &ResourceNaming {
        &self.naming
    }
}

/// Naming policy with the built-in entity types registered to the tables
/// of `layout`.
fn naming_for(layout: &ResourceLayout) -> StorageResult<ResourceNaming> {
    use crate::models::{Customer, Order, Product};
    use crate::storage::TableEntity;

    let mut naming = ResourceNaming::default();
    for (type_name, table) in [
        (Customer::TYPE_NAME, &layout.customers_table),
        (Product::TYPE_NAME, &layout.products_table),
        (Order::TYPE_NAME, &layout.orders_table),
    ] {
        naming
            .register(type_name, table)
            .map_err(|e| StorageError::provisioning("resource layout", e))?;
    }
    Ok(naming)
}

async fn open_backend(connection_string: &str) -> StorageResult<Arc<dyn StorageBackend>> {
    if connection_string.starts_with(MEMORY_SCHEME) {
        return Ok(Arc::new(SimStorageBackend::new()));
    }

    if POSTGRES_SCHEMES
        .iter()
        .any(|scheme| connection_string.starts_with(scheme))
    {
        #[cfg(feature = "postgres")]
        {
            let backend = crate::storage::PostgresBackend::new(connection_string).await?;
            return Ok(Arc::new(backend));
        }
        #[cfg(not(feature = "postgres"))]
        {
            return Err(StorageError::configuration(
                "postgres connection strings require the `postgres` feature",
            ));
        }
    }

    Err(StorageError::configuration(format!(
        "unsupported connection string scheme; expected {MEMORY_SCHEME} or {}",
        POSTGRES_SCHEMES.join(" / ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let config = FacadeConfig::new("memory://").unwrap();
        let service = StorageService::connect(config).await.unwrap();
        assert_eq!(service.layout(), &ResourceLayout::default());

        // Already provisioned by connect.
        let report = service.initialize().await.unwrap();
        assert_eq!(report.created_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let config = FacadeConfig::new("ftp://example.com").unwrap();
        let err = StorageService::connect(config).await.unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_builtin_types_use_layout_tables() {
        use crate::models::{Customer, Order, Product};

        let service = StorageService::start(Arc::new(SimStorageBackend::new()), ResourceLayout::default())
            .await
            .unwrap();
        assert_eq!(service.naming().table_name::<Customer>(), "Customers");
        assert_eq!(service.naming().table_name::<Product>(), "Products");
        assert_eq!(service.naming().table_name::<Order>(), "Orders");
    }

    #[tokio::test]
    async fn test_custom_layout_drives_naming() {
        let layout = ResourceLayout {
            customers_table: "Clients".to_string(),
            ..ResourceLayout::default()
        };
        let service = StorageService::start(Arc::new(SimStorageBackend::new()), layout)
            .await
            .unwrap();
        assert_eq!(service.naming().table_name_for("Customer"), "Clients");
        assert_eq!(service.naming().table_name_for("Invoice"), "Invoices");
    }
}
