//! Depot - Storage Facade
//!
//! One service handle over four storage primitives:
//!
//! - entity tables with optimistic concurrency (`list`, `get`, `insert`,
//!   `update`, `delete`)
//! - blob containers for product images and payment proofs
//! - message queues with receive-and-acknowledge
//! - a hierarchical file share for documents
//!
//! Every resource is provisioned once by [`StorageService::start`] before
//! the service is handed out. Backends are pluggable through
//! [`storage::StorageBackend`]: an in-process simulation (`memory://`) and
//! Postgres (`postgres://`, feature `postgres`).
//!
//! ```no_run
//! # async fn demo() -> depot::storage::StorageResult<()> {
//! use depot::{models::Customer, FacadeConfig, StorageService};
//!
//! let service = StorageService::connect(FacadeConfig::new("memory://")?).await?;
//! let alice = service.insert(Customer::new("C", "1", "Alice")).await?;
//!
//! let mut renamed = alice.clone();
//! renamed.name = "Alicia".to_string();
//! service.update(renamed).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod models;
pub mod payload;
pub mod provision;
pub mod service;
pub mod storage;

pub use config::FacadeConfig;
pub use payload::Payload;
pub use provision::{ProvisionOutcome, ProvisionReport, Provisioner, ResourceLayout};
pub use service::{BlobNaming, StorageService, UploadedBlob};
pub use storage::{StorageError, StorageResult, TableEntity};

/// Application name
pub const APP_NAME: &str = "depot";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
