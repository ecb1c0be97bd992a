//! Purchasing domain module (purchase orders and goods receiving).
//!
//! This crate contains business rules for purchase orders, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Remote persistence
//! is orchestrated by `invoria-infra`.

pub mod compensation;
pub mod events;
pub mod item;
pub mod order;
pub mod receipt;
pub mod session;
pub mod status;

pub use compensation::{CompensationJournal, CompensationStep};
pub use events::{
    GoodsReceived, ItemsReplaced, OrderDrafted, OrderStatusChanged, PurchasingEvent,
};
pub use item::{
    NewOrderLine, PurchaseOrderItem, calculate_order_progress, calculate_remaining, order_total,
};
pub use order::{NewPurchaseOrder, PurchaseOrder, build_items};
pub use receipt::{MovementDirection, ReceiptEntry, StockMovementRequest};
pub use session::{PlannedReceipt, ReceivingPlan, ReceivingSession, recompute_status};
pub use status::PurchaseOrderStatus;
