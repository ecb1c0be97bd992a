//! Inverse operations for the writes of a receiving commit.
//!
//! A commit journals one step per remote write it has made. If a later write
//! fails, the journal is replayed newest-first to put the backend back where
//! it was. Every step is safe to issue twice.

use serde::{Deserialize, Serialize};

use invoria_core::{OrderItemId, ReceiptId};

use crate::receipt::StockMovementRequest;
use crate::session::PlannedReceipt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompensationStep {
    /// Remove receipt entries appended by the failed attempt.
    DeleteReceipts(Vec<ReceiptId>),
    /// Apply the reversal of a stock movement that went through.
    RevertStock(StockMovementRequest),
    /// Put an item's received quantity back to its pre-commit value.
    RestoreItem {
        item_id: OrderItemId,
        received_quantity: i64,
    },
}

impl CompensationStep {
    pub fn describe(&self) -> String {
        match self {
            CompensationStep::DeleteReceipts(ids) => {
                format!("delete {} receipt entries", ids.len())
            }
            CompensationStep::RevertStock(m) => format!(
                "revert {} unit(s) of product {} in warehouse {}",
                m.quantity, m.product_id, m.warehouse_id
            ),
            CompensationStep::RestoreItem {
                item_id,
                received_quantity,
            } => format!("restore item {item_id} to {received_quantity} received"),
        }
    }
}

impl PlannedReceipt {
    pub fn undo_receipt(&self) -> CompensationStep {
        CompensationStep::DeleteReceipts(vec![self.receipt.id])
    }

    pub fn undo_stock(&self) -> CompensationStep {
        CompensationStep::RevertStock(self.stock.reversal())
    }

    pub fn undo_item(&self) -> CompensationStep {
        CompensationStep::RestoreItem {
            item_id: self.item_id,
            received_quantity: self.previous_received,
        }
    }
}

/// Steps applied so far by one commit attempt, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompensationJournal {
    steps: Vec<CompensationStep>,
}

impl CompensationJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: CompensationStep) {
        self.steps.push(step);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Steps in the order they must be undone (newest first).
    pub fn into_unwind_order(self) -> Vec<CompensationStep> {
        let mut steps = self.steps;
        steps.reverse();
        steps
    }
}
