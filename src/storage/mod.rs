//! Storage - Backend Traits and Implementations
//!
//! TigerStyle: Abstract storage with simulation-first testing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StorageBackend = TableBackend + BlobBackend                 │
//! │                 + QueueBackend + ShareBackend                │
//! └─────────────────────────────────────────────────────────────┘
//!          ↑                              ↑
//!          │                              │
//! ┌────────┴────────┐           ┌────────┴────────┐
//! │SimStorageBackend│           │ PostgresBackend │
//! │   (memory://)   │           │  (postgres://)  │
//! └─────────────────┘           └─────────────────┘
//! ```

mod backend;
mod entity;
mod error;
mod fault;
mod naming;
mod resource;
mod sim;

#[cfg(feature = "postgres")]
mod postgres;

pub use backend::{
    BlobBackend, QueueBackend, QueueMessage, ShareBackend, StorageBackend, TableBackend,
};
pub use entity::{validate_key, ETag, TableEntity, TableRecord};
pub use error::{StorageError, StorageResult};
pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultType};
pub use naming::{pluralize, ResourceNaming};
pub use resource::{validate_resource_name, AccessPolicy, ResourceDescriptor, ResourceKind};
pub use sim::SimStorageBackend;

#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;
