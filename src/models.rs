//! Built-in Entity Types
//!
//! The three entity types the service provisions tables for. The service
//! registers their physical tables from its
//! [`ResourceLayout`](crate::provision::ResourceLayout) at startup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{ETag, TableEntity};

// =============================================================================
// Customer
// =============================================================================

/// A customer account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Partition key (e.g. region or tenant)
    pub partition_key: String,
    /// Row key (customer id)
    pub row_key: String,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: Option<String>,
    /// Version token, carried outside the stored properties
    #[serde(skip)]
    pub etag: Option<ETag>,
}

impl Customer {
    /// Create a customer that has not been stored yet.
    #[must_use]
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            name: name.into(),
            email: None,
            etag: None,
        }
    }

    /// Set contact email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl TableEntity for Customer {
    const TYPE_NAME: &'static str = "Customer";

    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn row_key(&self) -> &str {
        &self.row_key
    }

    fn etag(&self) -> Option<&ETag> {
        self.etag.as_ref()
    }

    fn set_etag(&mut self, etag: ETag) {
        self.etag = Some(etag);
    }
}

// =============================================================================
// Product
// =============================================================================

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Partition key (category)
    pub partition_key: String,
    /// Row key (SKU)
    pub row_key: String,
    /// Display name
    pub name: String,
    /// Unit price in cents
    pub price_cents: i64,
    /// Units in stock
    pub stock: u32,
    /// Locator of the product image, if uploaded
    pub image_url: Option<String>,
    #[serde(skip)]
    pub etag: Option<ETag>,
}

impl Product {
    /// Create a product that has not been stored yet.
    #[must_use]
    pub fn new(
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
        name: impl Into<String>,
        price_cents: i64,
    ) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            name: name.into(),
            price_cents,
            stock: 0,
            image_url: None,
            etag: None,
        }
    }
}

impl TableEntity for Product {
    const TYPE_NAME: &'static str = "Product";

    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn row_key(&self) -> &str {
        &self.row_key
    }

    fn etag(&self) -> Option<&ETag> {
        self.etag.as_ref()
    }

    fn set_etag(&mut self, etag: ETag) {
        self.etag = Some(etag);
    }
}

// =============================================================================
// Order
// =============================================================================

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, awaiting payment
    #[default]
    Pending,
    /// Payment proof received
    Paid,
    /// Handed to the carrier
    Shipped,
    /// Cancelled before shipping
    Cancelled,
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Partition key (customer row key)
    pub partition_key: String,
    /// Row key (order id)
    pub row_key: String,
    /// Ordered product SKU
    pub product_sku: String,
    /// Quantity ordered
    pub quantity: u32,
    /// Current status
    #[serde(default)]
    pub status: OrderStatus,
    /// Name of the payment proof blob, if uploaded
    pub proof_blob: Option<String>,
    /// When the order was placed
    pub placed_at: DateTime<Utc>,
    #[serde(skip)]
    pub etag: Option<ETag>,
}

impl Order {
    /// Create a pending order with a fresh id.
    #[must_use]
    pub fn new(customer_id: impl Into<String>, product_sku: impl Into<String>, quantity: u32) -> Self {
        Self {
            partition_key: customer_id.into(),
            row_key: uuid::Uuid::new_v4().to_string(),
            product_sku: product_sku.into(),
            quantity,
            status: OrderStatus::Pending,
            proof_blob: None,
            placed_at: Utc::now(),
            etag: None,
        }
    }
}

impl TableEntity for Order {
    const TYPE_NAME: &'static str = "Order";

    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn row_key(&self) -> &str {
        &self.row_key
    }

    fn etag(&self) -> Option<&ETag> {
        self.etag.as_ref()
    }

    fn set_etag(&mut self, etag: ETag) {
        self.etag = Some(etag);
    }
}
