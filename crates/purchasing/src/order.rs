//! Purchase order header and its lifecycle rules.
//!
//! Orders live in the remote backend; this module only decides whether an
//! operation is allowed and what the record should look like afterwards.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use invoria_core::{DomainError, DomainResult, OrderId, SupplierId, Versioned, WarehouseId};

use crate::item::{NewOrderLine, PurchaseOrderItem, order_total};
use crate::status::PurchaseOrderStatus;

/// Purchase order placed with a supplier for delivery to one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: OrderId,
    pub supplier_id: SupplierId,
    /// Destination warehouse: receipts and stock go here.
    pub warehouse_id: WarehouseId,
    pub order_date: NaiveDate,
    pub status: PurchaseOrderStatus,
    /// Sum of line totals, smallest currency unit.
    pub total_amount: u64,
    #[serde(default)]
    pub notes: Option<String>,
    /// Row version, bumped by the backend on every write.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Versioned for PurchaseOrder {
    fn version(&self) -> u64 {
        self.version
    }
}

impl PurchaseOrder {
    /// Reference attached to stock movements caused by this order.
    pub fn reference_label(&self) -> String {
        format!("OC-{}", self.id)
    }

    pub fn ensure_receivable(&self) -> DomainResult<()> {
        if self.status.can_receive() {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "purchase order {} cannot receive goods while '{}'",
                self.id, self.status
            )))
        }
    }

    pub fn ensure_editable(&self) -> DomainResult<()> {
        if self.status.can_edit_items() {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "purchase order {} items can only be edited in draft (status '{}')",
                self.id, self.status
            )))
        }
    }

    /// The order as it should look after cancellation.
    pub fn cancelled(&self, at: DateTime<Utc>) -> DomainResult<PurchaseOrder> {
        let status = self.status.transition_to(PurchaseOrderStatus::Cancelled)?;
        Ok(PurchaseOrder {
            status,
            updated_at: at,
            ..self.clone()
        })
    }

    /// The order as it should look after being sent to the supplier.
    pub fn sent(&self, items: &[PurchaseOrderItem], at: DateTime<Utc>) -> DomainResult<PurchaseOrder> {
        if items.is_empty() {
            return Err(DomainError::validation(
                "cannot send purchase order without items",
            ));
        }
        let status = self.status.transition_to(PurchaseOrderStatus::Sent)?;
        Ok(PurchaseOrder {
            status,
            updated_at: at,
            ..self.clone()
        })
    }
}

/// Form data for a new draft order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub supplier_id: SupplierId,
    pub warehouse_id: WarehouseId,
    pub order_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<NewOrderLine>,
}

impl NewPurchaseOrder {
    /// Build the draft header and its items. The total is the sum of line totals.
    pub fn into_draft(self, at: DateTime<Utc>) -> DomainResult<(PurchaseOrder, Vec<PurchaseOrderItem>)> {
        let id = OrderId::new();
        let items = build_items(id, self.lines)?;

        let order = PurchaseOrder {
            id,
            supplier_id: self.supplier_id,
            warehouse_id: self.warehouse_id,
            order_date: self.order_date,
            status: PurchaseOrderStatus::Draft,
            total_amount: order_total(&items)?,
            notes: self.notes,
            version: 0,
            created_at: at,
            updated_at: at,
        };

        Ok((order, items))
    }
}

/// Validate form lines and materialize them as items of `order_id`.
pub fn build_items(order_id: OrderId, lines: Vec<NewOrderLine>) -> DomainResult<Vec<PurchaseOrderItem>> {
    lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
            line.into_item(order_id).map_err(|e| match e {
                DomainError::Validation(msg) => {
                    DomainError::validation(format!("line {}: {msg}", idx + 1))
                }
                other => other,
            })
        })
        .collect()
}
