//! Constants
//!
//! TigerStyle: Every name, limit and default lives here, named with units.
//!
//! The resource names below are the persisted-state layout of the service.
//! Renaming any of them orphans data that already lives under the old name.

// =============================================================================
// Configuration
// =============================================================================

/// Environment variable holding the backend connection string
pub const CONNECTION_STRING_ENV_VAR: &str = "DEPOT_CONNECTION_STRING";

/// Scheme of the in-process simulation backend
pub const MEMORY_SCHEME: &str = "memory://";

/// Schemes accepted by the Postgres backend
pub const POSTGRES_SCHEMES: &[&str] = &["postgres://", "postgresql://"];

// =============================================================================
// Tables
// =============================================================================

/// Physical table holding `Customer` entities
pub const CUSTOMERS_TABLE_NAME: &str = "Customers";

/// Physical table holding `Product` entities
pub const PRODUCTS_TABLE_NAME: &str = "Products";

/// Physical table holding `Order` entities
pub const ORDERS_TABLE_NAME: &str = "Orders";

// =============================================================================
// Containers
// =============================================================================

/// Publicly readable container for product images
pub const IMAGES_CONTAINER_NAME: &str = "images";

/// Private container for payment proofs
pub const PROOFS_CONTAINER_NAME: &str = "proofs";

// =============================================================================
// Queues
// =============================================================================

/// Queue carrying order events
pub const ORDERS_QUEUE_NAME: &str = "orders";

/// Queue carrying outbound notifications
pub const NOTIFICATIONS_QUEUE_NAME: &str = "notifications";

// =============================================================================
// Shares
// =============================================================================

/// Hierarchical file share for generated documents
pub const DOCUMENTS_SHARE_NAME: &str = "documents";

/// Subdirectory of the documents share holding invoices
pub const INVOICES_DIRECTORY_NAME: &str = "invoices";

// =============================================================================
// Limits
// =============================================================================

/// Minimum length of a table, container, queue or share name
pub const RESOURCE_NAME_LENGTH_MIN: usize = 3;

/// Maximum length of a table, container, queue or share name
pub const RESOURCE_NAME_LENGTH_MAX: usize = 63;

/// Maximum partition key or row key length in bytes
pub const ENTITY_KEY_BYTES_MAX: usize = 1024;

/// How long a received queue message stays invisible before redelivery
pub const QUEUE_VISIBILITY_TIMEOUT_MS: u64 = 30_000;

/// Timestamp prefix format for user-named uploads (UTC)
pub const UPLOAD_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
