//! Wire shapes of the hosted data API's tables and procedures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoria_core::{ExpectedVersion, OrderId, OrderItemId, ProductId, WarehouseId};
use invoria_purchasing::{PurchaseOrderItem, PurchaseOrderStatus, StockMovementRequest};

pub const ORDERS_TABLE: &str = "purchase_orders";
pub const ITEMS_TABLE: &str = "purchase_order_items";
pub const RECEIPTS_TABLE: &str = "purchase_receipts";
pub const ADD_STOCK_RPC: &str = "add_stock";

/// Item columns plus the embedded product (`select=*,products(name,sku)`).
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRow {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
    pub total_price: u64,
    #[serde(default)]
    pub received_quantity: Option<i64>,
    #[serde(default)]
    pub products: Option<ProductRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRef {
    pub name: Option<String>,
    pub sku: Option<String>,
}

impl From<ItemRow> for PurchaseOrderItem {
    fn from(row: ItemRow) -> Self {
        let (product_name, product_sku) = match row.products {
            Some(p) => (p.name, p.sku),
            None => (None, None),
        };
        PurchaseOrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name,
            product_sku,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
            received_quantity: row.received_quantity.unwrap_or(0),
        }
    }
}

/// Insert body for an item (display-only fields are not columns).
#[derive(Debug, Clone, Serialize)]
pub struct ItemInsert {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
    pub total_price: u64,
    pub received_quantity: i64,
}

impl From<&PurchaseOrderItem> for ItemInsert {
    fn from(item: &PurchaseOrderItem) -> Self {
        ItemInsert {
            id: item.id,
            order_id: item.order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
            received_quantity: item.received_quantity,
        }
    }
}

/// Order status patch. A conditional write carries the version it moves the
/// row to; unconditional ones leave `version` untouched.
#[derive(Debug, Clone, Serialize)]
pub struct StatusPatch {
    pub status: PurchaseOrderStatus,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalPatch {
    pub total_amount: u64,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// Version written alongside a patch guarded by `expected`.
pub fn next_version(expected: ExpectedVersion) -> Option<u64> {
    match expected {
        ExpectedVersion::Exact(version) => Some(version + 1),
        ExpectedVersion::Any => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceivedPatch {
    pub received_quantity: i64,
}

/// `select=id` echo of a patched item.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemIdRow {
    pub id: OrderItemId,
}

/// Arguments of the `add_stock` procedure.
#[derive(Debug, Clone, Serialize)]
pub struct AddStockArgs {
    pub p_product_id: ProductId,
    pub p_warehouse_id: WarehouseId,
    /// Signed: negative for outgoing movements.
    pub p_quantity: i64,
    pub p_reference: String,
    pub p_movement_type: &'static str,
    pub p_idempotency_key: String,
}

impl From<&StockMovementRequest> for AddStockArgs {
    fn from(request: &StockMovementRequest) -> Self {
        AddStockArgs {
            p_product_id: request.product_id,
            p_warehouse_id: request.warehouse_id,
            p_quantity: request.signed_quantity(),
            p_reference: request.reference.clone(),
            p_movement_type: request.direction.as_str(),
            p_idempotency_key: request.idempotency_key.clone(),
        }
    }
}

/// Error body returned by the data API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl ApiErrorBody {
    pub fn describe(&self) -> Option<String> {
        let mut parts = Vec::new();
        for part in [&self.message, &self.details, &self.hint].into_iter().flatten() {
            if !part.is_empty() {
                parts.push(part.as_str());
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}
