//! Events describing purchasing writes that have already succeeded remotely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoria_core::{OrderId, OrderItemId, ProductId, WarehouseId};
use invoria_events::Event;

use crate::status::PurchaseOrderStatus;

/// Aggregate type used on envelopes of purchasing events.
pub const AGGREGATE_TYPE: &str = "purchasing.order";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDrafted {
    pub order_id: OrderId,
    pub total_amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsReplaced {
    pub order_id: OrderId,
    pub item_count: usize,
    pub total_amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Goods for one item arrived and were added to stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub order_id: OrderId,
    pub item_id: OrderItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub received_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub from: PurchaseOrderStatus,
    pub to: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchasingEvent {
    OrderDrafted(OrderDrafted),
    ItemsReplaced(ItemsReplaced),
    GoodsReceived(GoodsReceived),
    OrderStatusChanged(OrderStatusChanged),
}

impl PurchasingEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            PurchasingEvent::OrderDrafted(e) => e.order_id,
            PurchasingEvent::ItemsReplaced(e) => e.order_id,
            PurchasingEvent::GoodsReceived(e) => e.order_id,
            PurchasingEvent::OrderStatusChanged(e) => e.order_id,
        }
    }
}

impl Event for PurchasingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchasingEvent::OrderDrafted(_) => "purchasing.order.drafted",
            PurchasingEvent::ItemsReplaced(_) => "purchasing.order.items_replaced",
            PurchasingEvent::GoodsReceived(_) => "purchasing.order.goods_received",
            PurchasingEvent::OrderStatusChanged(_) => "purchasing.order.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchasingEvent::OrderDrafted(e) => e.occurred_at,
            PurchasingEvent::ItemsReplaced(e) => e.occurred_at,
            PurchasingEvent::GoodsReceived(e) => e.occurred_at,
            PurchasingEvent::OrderStatusChanged(e) => e.occurred_at,
        }
    }
}
