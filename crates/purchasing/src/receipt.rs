//! Receipt audit trail and the stock movements receiving triggers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoria_core::{CommitKey, OrderId, OrderItemId, ProductId, ReceiptId, WarehouseId};

use crate::item::PurchaseOrderItem;
use crate::order::PurchaseOrder;

/// One product quantity received against an item in one receiving event.
///
/// Append-only. The item's `received_quantity` must equal the sum of its
/// entries' quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptEntry {
    pub id: ReceiptId,
    pub order_id: OrderId,
    pub item_id: OrderItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    /// Commit attempt that produced this entry (backend dedup key).
    pub commit_key: CommitKey,
    pub received_at: DateTime<Utc>,
}

impl ReceiptEntry {
    pub fn for_item(
        order: &PurchaseOrder,
        item: &PurchaseOrderItem,
        quantity: i64,
        commit_key: CommitKey,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReceiptId::new(),
            order_id: order.id,
            item_id: item.id,
            product_id: item.product_id,
            warehouse_id: order.warehouse_id,
            quantity,
            commit_key,
            received_at: at,
        }
    }
}

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementDirection {
    #[serde(rename = "entrada")]
    In,
    #[serde(rename = "salida")]
    Out,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::In => "entrada",
            MovementDirection::Out => "salida",
        }
    }
}

/// Request handed to the remote stock procedure.
///
/// The procedure records its own movement row; `idempotency_key` lets it
/// ignore a replay of the same request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovementRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    /// Always positive; `direction` carries the sign.
    pub quantity: i64,
    pub direction: MovementDirection,
    pub reference: String,
    pub idempotency_key: String,
}

impl StockMovementRequest {
    /// Incoming stock for a received item.
    pub fn receipt(
        order: &PurchaseOrder,
        item: &PurchaseOrderItem,
        quantity: i64,
        commit_key: CommitKey,
    ) -> Self {
        Self {
            product_id: item.product_id,
            warehouse_id: order.warehouse_id,
            quantity,
            direction: MovementDirection::In,
            reference: order.reference_label(),
            idempotency_key: format!("{commit_key}:{}:{}", item.id, MovementDirection::In.as_str()),
        }
    }

    /// The movement undoing `self`.
    pub fn reversal(&self) -> Self {
        let direction = match self.direction {
            MovementDirection::In => MovementDirection::Out,
            MovementDirection::Out => MovementDirection::In,
        };
        let key_base = self
            .idempotency_key
            .rsplit_once(':')
            .map(|(base, _)| base)
            .unwrap_or(&self.idempotency_key);

        Self {
            direction,
            reference: format!("{} (reversión)", self.reference),
            idempotency_key: format!("{key_base}:{}", direction.as_str()),
            ..self.clone()
        }
    }

    /// Signed delta applied to on-hand quantity.
    pub fn signed_quantity(&self) -> i64 {
        match self.direction {
            MovementDirection::In => self.quantity,
            MovementDirection::Out => -self.quantity,
        }
    }
}
