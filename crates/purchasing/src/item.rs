//! Purchase order line items and quantity arithmetic.

use serde::{Deserialize, Serialize};

use invoria_core::{DomainError, DomainResult, OrderId, OrderItemId, ProductId};

/// One product line on a purchase order.
///
/// Invariant: `0 <= received_quantity <= quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Display enrichment joined in by the repository.
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub product_sku: Option<String>,
    pub quantity: i64,
    /// Smallest currency unit.
    pub unit_price: u64,
    pub total_price: u64,
    #[serde(default)]
    pub received_quantity: i64,
}

impl PurchaseOrderItem {
    /// Quantity still expected from the supplier.
    pub fn remaining(&self) -> i64 {
        calculate_remaining(self)
    }

    pub fn is_fully_received(&self) -> bool {
        self.received_quantity >= self.quantity
    }

    /// Label used in operator-facing messages.
    pub fn display_name(&self) -> String {
        match (&self.product_name, &self.product_sku) {
            (Some(name), Some(sku)) => format!("{name} ({sku})"),
            (Some(name), None) => name.clone(),
            (None, Some(sku)) => sku.clone(),
            (None, None) => self.product_id.to_string(),
        }
    }

    /// The item after receiving `quantity` more units.
    pub fn with_received(&self, quantity: i64) -> DomainResult<PurchaseOrderItem> {
        if quantity <= 0 {
            return Err(DomainError::validation("received quantity must be positive"));
        }
        if quantity > self.remaining() {
            return Err(DomainError::invariant(format!(
                "cannot receive {quantity} units of item {}: only {} remaining",
                self.id,
                self.remaining()
            )));
        }

        Ok(PurchaseOrderItem {
            received_quantity: self.received_quantity + quantity,
            ..self.clone()
        })
    }
}

/// A line as entered on the draft form, before it gets an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
}

impl NewOrderLine {
    pub fn line_total(&self) -> DomainResult<u64> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        (self.quantity as u64)
            .checked_mul(self.unit_price)
            .ok_or_else(|| DomainError::invariant("order line amount overflow"))
    }

    /// Materialize the line as a persisted item of `order_id`.
    pub fn into_item(self, order_id: OrderId) -> DomainResult<PurchaseOrderItem> {
        let total_price = self.line_total()?;
        Ok(PurchaseOrderItem {
            id: OrderItemId::new(),
            order_id,
            product_id: self.product_id,
            product_name: None,
            product_sku: None,
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_price,
            received_quantity: 0,
        })
    }
}

/// `quantity − received_quantity`.
pub fn calculate_remaining(item: &PurchaseOrderItem) -> i64 {
    item.quantity - item.received_quantity
}

/// Percentage of ordered units received so far; 0 for an order with no units.
pub fn calculate_order_progress(items: &[PurchaseOrderItem]) -> f64 {
    let ordered: i64 = items.iter().map(|i| i.quantity).sum();
    if ordered == 0 {
        return 0.0;
    }
    let received: i64 = items.iter().map(|i| i.received_quantity).sum();
    received as f64 / ordered as f64 * 100.0
}

/// Sum of line totals.
pub fn order_total(items: &[PurchaseOrderItem]) -> DomainResult<u64> {
    items.iter().try_fold(0u64, |acc, item| {
        acc.checked_add(item.total_price)
            .ok_or_else(|| DomainError::invariant("order total overflow"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i64, received: i64) -> PurchaseOrderItem {
        PurchaseOrderItem {
            id: OrderItemId::new(),
            order_id: OrderId::new(),
            product_id: ProductId::new(),
            product_name: None,
            product_sku: None,
            quantity,
            unit_price: 250,
            total_price: quantity as u64 * 250,
            received_quantity: received,
        }
    }

    #[test]
    fn remaining_is_ordered_minus_received() {
        assert_eq!(calculate_remaining(&item(10, 4)), 6);
        assert_eq!(item(5, 5).remaining(), 0);
        assert!(item(5, 5).is_fully_received());
    }

    #[test]
    fn progress_of_empty_order_is_zero() {
        let progress = calculate_order_progress(&[]);
        assert_eq!(progress, 0.0);
        assert!(!progress.is_nan());
    }

    #[test]
    fn progress_weights_by_units() {
        let items = vec![item(10, 4), item(5, 5), item(5, 1)];
        assert_eq!(calculate_order_progress(&items), 50.0);
    }

    #[test]
    fn receiving_beyond_remaining_is_rejected() {
        let line = item(10, 8);
        assert!(matches!(
            line.with_received(3),
            Err(DomainError::InvariantViolation(_))
        ));
        assert_eq!(line.with_received(2).unwrap().received_quantity, 10);
        assert!(line.with_received(0).is_err());
    }

    #[test]
    fn new_line_totals_and_validation() {
        let line = NewOrderLine {
            product_id: ProductId::new(),
            quantity: 3,
            unit_price: 1_999,
        };
        let item = line.clone().into_item(OrderId::new()).unwrap();
        assert_eq!(item.total_price, 5_997);
        assert_eq!(item.received_quantity, 0);

        let bad = NewOrderLine { quantity: 0, ..line };
        assert!(matches!(bad.line_total(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn order_total_sums_lines() {
        let items = vec![item(2, 0), item(4, 0)];
        assert_eq!(order_total(&items).unwrap(), 1_500);
    }

    #[test]
    fn display_name_prefers_name_and_sku() {
        let mut line = item(1, 0);
        line.product_name = Some("Tornillo 3/8".to_string());
        line.product_sku = Some("TRN-038".to_string());
        assert_eq!(line.display_name(), "Tornillo 3/8 (TRN-038)");
    }
}
