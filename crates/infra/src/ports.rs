//! Contracts of the remote collaborators the purchasing client depends on.
//!
//! The hosted backend owns persistence, authentication and row-level
//! security; these traits describe only what the client asks of it. Each
//! call is one request/response round trip and may fail independently.

use chrono::{DateTime, Utc};
use thiserror::Error;

use invoria_core::{
    ExpectedVersion, OrderId, OrderItemId, ReceiptId, SupplierId, WarehouseId,
};
use invoria_purchasing::{
    PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus, ReceiptEntry, StockMovementRequest,
};

/// Failure of a single remote call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request never produced a response (connect error, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("record not found")]
    NotFound,

    /// A conditional write did not match the stored version.
    #[error("version conflict: {0}")]
    Conflict(String),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The backend refused the request on business grounds (e.g. RPC raised).
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Filter for listing purchase orders. `None` fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<PurchaseOrderStatus>,
    pub supplier_id: Option<SupplierId>,
    pub warehouse_id: Option<WarehouseId>,
    pub limit: Option<usize>,
}

impl OrderFilter {
    pub fn matches(&self, order: &PurchaseOrder) -> bool {
        self.status.is_none_or(|s| order.status == s)
            && self.supplier_id.is_none_or(|s| order.supplier_id == s)
            && self.warehouse_id.is_none_or(|w| order.warehouse_id == w)
    }
}

/// Remote store for purchase orders and their items.
#[async_trait::async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<Option<PurchaseOrder>, RemoteError>;

    /// Newest orders first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<PurchaseOrder>, RemoteError>;

    /// Items of an order enriched with product name/SKU, in line order.
    async fn list_order_items(&self, order_id: OrderId) -> Result<Vec<PurchaseOrderItem>, RemoteError>;

    async fn insert_order(&self, order: &PurchaseOrder) -> Result<PurchaseOrder, RemoteError>;

    async fn insert_order_items(&self, items: &[PurchaseOrderItem]) -> Result<(), RemoteError>;

    /// Delete every item of `order_id` (delete-by-filter).
    async fn delete_order_items(&self, order_id: OrderId) -> Result<(), RemoteError>;

    /// Conditional status write; returns the stored order with its new version.
    async fn update_order_status(
        &self,
        id: OrderId,
        status: PurchaseOrderStatus,
        updated_at: DateTime<Utc>,
        expected: ExpectedVersion,
    ) -> Result<PurchaseOrder, RemoteError>;

    /// Conditional total write; returns the stored order with its new version.
    async fn update_order_total(
        &self,
        id: OrderId,
        total_amount: u64,
        updated_at: DateTime<Utc>,
        expected: ExpectedVersion,
    ) -> Result<PurchaseOrder, RemoteError>;

    async fn update_item_received_quantity(
        &self,
        item_id: OrderItemId,
        received_quantity: i64,
    ) -> Result<(), RemoteError>;
}

/// Remote append-only store of receipt entries.
#[async_trait::async_trait]
pub trait ReceiptRecorder: Send + Sync {
    /// Entries whose `(commit_key, item_id)` already exist are ignored.
    async fn insert_receipt_entries(&self, entries: &[ReceiptEntry]) -> Result<(), RemoteError>;

    async fn list_receipt_entries(&self, order_id: OrderId) -> Result<Vec<ReceiptEntry>, RemoteError>;

    /// Only used to unwind a failed commit attempt.
    async fn delete_receipt_entries(&self, ids: &[ReceiptId]) -> Result<(), RemoteError>;
}

/// Remote procedure adjusting on-hand stock for a product/warehouse pair.
///
/// Atomic from the caller's point of view; records its own movement row and
/// ignores replays of an idempotency key it has already applied.
#[async_trait::async_trait]
pub trait StockMutator: Send + Sync {
    async fn apply_movement(&self, request: &StockMovementRequest) -> Result<(), RemoteError>;
}
