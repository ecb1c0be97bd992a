//! Remote execution of compensation steps.

use invoria_purchasing::CompensationStep;

use crate::ports::{OrderRepository, ReceiptRecorder, RemoteError, StockMutator};

pub(crate) struct Compensator<'a> {
    pub orders: &'a dyn OrderRepository,
    pub receipts: &'a dyn ReceiptRecorder,
    pub stock: &'a dyn StockMutator,
}

impl Compensator<'_> {
    async fn apply(&self, step: &CompensationStep) -> Result<(), RemoteError> {
        match step {
            CompensationStep::DeleteReceipts(ids) => self.receipts.delete_receipt_entries(ids).await,
            CompensationStep::RevertStock(movement) => self.stock.apply_movement(movement).await,
            CompensationStep::RestoreItem {
                item_id,
                received_quantity,
            } => {
                self.orders
                    .update_item_received_quantity(*item_id, *received_quantity)
                    .await
            }
        }
    }

    /// Apply `steps` in the given order, continuing past failures.
    ///
    /// Returns the steps that failed, in the same relative order.
    pub async fn unwind(&self, steps: Vec<CompensationStep>) -> Vec<(CompensationStep, RemoteError)> {
        let mut failed = Vec::new();
        for step in steps {
            match self.apply(&step).await {
                Ok(()) => tracing::debug!("compensated: {}", step.describe()),
                Err(err) => {
                    tracing::warn!("compensation step failed ({}): {}", step.describe(), err);
                    failed.push((step, err));
                }
            }
        }
        failed
    }
}
