//! Provisioner
//!
//! TigerStyle: Ensure every physical resource exists before the service is
//! handed out. Idempotent, fail-fast.
//!
//! Later operations assume these resources exist and never re-create them,
//! so a single failed step aborts provisioning and the service does not
//! start.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CUSTOMERS_TABLE_NAME, DOCUMENTS_SHARE_NAME, IMAGES_CONTAINER_NAME, INVOICES_DIRECTORY_NAME,
    NOTIFICATIONS_QUEUE_NAME, ORDERS_QUEUE_NAME, ORDERS_TABLE_NAME, PRODUCTS_TABLE_NAME,
    PROOFS_CONTAINER_NAME,
};
use crate::storage::{
    validate_resource_name, AccessPolicy, BlobBackend, QueueBackend, ResourceDescriptor,
    ResourceKind, ShareBackend, StorageBackend, StorageError, StorageResult, TableBackend,
};

// =============================================================================
// Layout
// =============================================================================

/// Names of every physical resource the service depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLayout {
    /// Table for `Customer`
    pub customers_table: String,
    /// Table for `Product`
    pub products_table: String,
    /// Table for `Order`
    pub orders_table: String,
    /// Publicly readable image container
    pub images_container: String,
    /// Private proof container
    pub proofs_container: String,
    /// Order events queue
    pub orders_queue: String,
    /// Notifications queue
    pub notifications_queue: String,
    /// Document share
    pub documents_share: String,
    /// Invoice directory inside the document share
    pub invoices_directory: String,
}

impl Default for ResourceLayout {
    fn default() -> Self {
        Self {
            customers_table: CUSTOMERS_TABLE_NAME.to_string(),
            products_table: PRODUCTS_TABLE_NAME.to_string(),
            orders_table: ORDERS_TABLE_NAME.to_string(),
            images_container: IMAGES_CONTAINER_NAME.to_string(),
            proofs_container: PROOFS_CONTAINER_NAME.to_string(),
            orders_queue: ORDERS_QUEUE_NAME.to_string(),
            notifications_queue: NOTIFICATIONS_QUEUE_NAME.to_string(),
            documents_share: DOCUMENTS_SHARE_NAME.to_string(),
            invoices_directory: INVOICES_DIRECTORY_NAME.to_string(),
        }
    }
}

impl ResourceLayout {
    /// Access policy of the image container.
    pub const IMAGES_POLICY: AccessPolicy = AccessPolicy::Blob;

    /// Access policy of the proof container.
    pub const PROOFS_POLICY: AccessPolicy = AccessPolicy::Private;

    /// Every resource in provisioning order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        vec![
            ResourceDescriptor::table(&self.customers_table),
            ResourceDescriptor::table(&self.products_table),
            ResourceDescriptor::table(&self.orders_table),
            ResourceDescriptor::container(&self.images_container, Self::IMAGES_POLICY),
            ResourceDescriptor::container(&self.proofs_container, Self::PROOFS_POLICY),
            ResourceDescriptor::queue(&self.orders_queue),
            ResourceDescriptor::queue(&self.notifications_queue),
            ResourceDescriptor::share(&self.documents_share),
            ResourceDescriptor::directory(&self.documents_share, &self.invoices_directory),
        ]
    }

    /// Check every name against its kind's naming rules.
    ///
    /// # Errors
    /// Returns `InvalidName` for the first offending name.
    pub fn validate(&self) -> StorageResult<()> {
        let checks = [
            (ResourceKind::Table, &self.customers_table),
            (ResourceKind::Table, &self.products_table),
            (ResourceKind::Table, &self.orders_table),
            (ResourceKind::Container, &self.images_container),
            (ResourceKind::Container, &self.proofs_container),
            (ResourceKind::Queue, &self.orders_queue),
            (ResourceKind::Queue, &self.notifications_queue),
            (ResourceKind::Share, &self.documents_share),
            (ResourceKind::Directory, &self.invoices_directory),
        ];
        for (kind, name) in checks {
            validate_resource_name(kind, name)?;
        }
        Ok(())
    }
}

// =============================================================================
// Report
// =============================================================================

/// What an ensure call found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionOutcome {
    /// Resource was created by this call
    Created,
    /// Resource already existed and was left as is
    Existing,
}

/// Result of one provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionReport {
    /// Every ensured resource with its outcome, in provisioning order
    pub entries: Vec<(ResourceDescriptor, ProvisionOutcome)>,
}

impl ProvisionReport {
    /// The ensured resources.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        self.entries.iter().map(|(d, _)| d.clone()).collect()
    }

    /// How many resources this run created.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, outcome)| *outcome == ProvisionOutcome::Created)
            .count()
    }
}

// =============================================================================
// Provisioner
// =============================================================================

/// Ensures the [`ResourceLayout`] exists on a backend.
pub struct Provisioner {
    backend: Arc<dyn StorageBackend>,
    layout: ResourceLayout,
}

impl Provisioner {
    /// Create a provisioner for `layout` on `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, layout: ResourceLayout) -> Self {
        Self { backend, layout }
    }

    /// Ensure every resource exists.
    ///
    /// Safe to call again: existing resources are left untouched, including
    /// the access policy of existing containers.
    ///
    /// # Errors
    /// Returns `Provisioning` naming the first resource that could not be
    /// ensured; nothing after it is attempted.
    pub async fn initialize(&self) -> StorageResult<ProvisionReport> {
        let layout = &self.layout;
        layout
            .validate()
            .map_err(|e| StorageError::provisioning("resource layout", e))?;

        let mut report = ProvisionReport::default();

        for table in [&layout.customers_table, &layout.products_table, &layout.orders_table] {
            let result = self.backend.ensure_table(table).await;
            record(&mut report, ResourceDescriptor::table(table), result)?;
        }

        for (container, policy) in [
            (&layout.images_container, ResourceLayout::IMAGES_POLICY),
            (&layout.proofs_container, ResourceLayout::PROOFS_POLICY),
        ] {
            let result = self.backend.ensure_container(container, policy).await;
            record(&mut report, ResourceDescriptor::container(container, policy), result)?;
        }

        for queue in [&layout.orders_queue, &layout.notifications_queue] {
            let result = self.backend.ensure_queue(queue).await;
            record(&mut report, ResourceDescriptor::queue(queue), result)?;
        }

        let result = self.backend.ensure_share(&layout.documents_share).await;
        record(&mut report, ResourceDescriptor::share(&layout.documents_share), result)?;

        let result = self
            .backend
            .ensure_directory(&layout.documents_share, &layout.invoices_directory)
            .await;
        record(
            &mut report,
            ResourceDescriptor::directory(&layout.documents_share, &layout.invoices_directory),
            result,
        )?;

        tracing::info!(
            resources = report.entries.len(),
            created = report.created_count(),
            "Storage provisioned"
        );

        Ok(report)
    }
}

fn record(
    report: &mut ProvisionReport,
    descriptor: ResourceDescriptor,
    result: StorageResult<bool>,
) -> StorageResult<()> {
    match result {
        Ok(created) => {
            let outcome = if created {
                ProvisionOutcome::Created
            } else {
                ProvisionOutcome::Existing
            };
            tracing::debug!(resource = %descriptor, ?outcome, "Ensured resource");
            report.entries.push((descriptor, outcome));
            Ok(())
        }
        Err(e) => {
            tracing::error!(resource = %descriptor, error = %e, "Provisioning failed");
            Err(StorageError::provisioning(descriptor.to_string(), e))
        }
    }
}
