//! Receiving session: the operator's working state for one receiving screen.
//!
//! A session holds a snapshot of the order and its items plus the quantity
//! the operator intends to receive for each item. It performs no IO; turning
//! it into remote writes is the workflow's job (see `ReceivingPlan`).

use chrono::{DateTime, Utc};

use invoria_core::{CommitKey, DomainError, DomainResult, OrderItemId};

use crate::compensation::CompensationStep;
use crate::item::PurchaseOrderItem;
use crate::order::PurchaseOrder;
use crate::receipt::{ReceiptEntry, StockMovementRequest};
use crate::status::PurchaseOrderStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct ReceivingSession {
    order: PurchaseOrder,
    items: Vec<PurchaseOrderItem>,
    /// Pending quantity per item, index-aligned with `items`.
    pending: Vec<i64>,
    commit_key: CommitKey,
    /// Undo steps a failed commit could not apply, newest first.
    outstanding: Vec<CompensationStep>,
}

impl ReceivingSession {
    /// Start receiving against `order`. Every pending quantity starts at 0.
    pub fn begin(order: PurchaseOrder, items: Vec<PurchaseOrderItem>) -> DomainResult<Self> {
        order.ensure_receivable()?;
        if let Some(foreign) = items.iter().find(|i| i.order_id != order.id) {
            return Err(DomainError::invariant(format!(
                "item {} does not belong to purchase order {}",
                foreign.id, order.id
            )));
        }

        let pending = vec![0; items.len()];
        Ok(Self {
            order,
            items,
            pending,
            commit_key: CommitKey::new(),
            outstanding: Vec::new(),
        })
    }

    pub fn order(&self) -> &PurchaseOrder {
        &self.order
    }

    pub fn items(&self) -> &[PurchaseOrderItem] {
        &self.items
    }

    /// Idempotency key of the next commit attempt.
    pub fn commit_key(&self) -> CommitKey {
        self.commit_key
    }

    /// Start a fresh commit attempt (new idempotency key).
    pub fn rotate_commit_key(&mut self) {
        self.commit_key = CommitKey::new();
    }

    /// Undo steps left over from a commit whose rollback did not finish.
    pub fn outstanding_compensation(&self) -> &[CompensationStep] {
        &self.outstanding
    }

    pub fn set_outstanding_compensation(&mut self, steps: Vec<CompensationStep>) {
        self.outstanding = steps;
    }

    pub fn take_outstanding_compensation(&mut self) -> Vec<CompensationStep> {
        std::mem::take(&mut self.outstanding)
    }

    fn index_of(&self, item_id: OrderItemId) -> DomainResult<usize> {
        self.items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(DomainError::not_found)
    }

    /// Record the quantity the operator wants to receive for `item_id`.
    ///
    /// The request is clamped silently into `[0, remaining]`; the stored value
    /// is returned so the form can reflect it.
    pub fn set_pending(&mut self, item_id: OrderItemId, requested: i64) -> DomainResult<i64> {
        let idx = self.index_of(item_id)?;
        let remaining = self.items[idx].remaining().max(0);
        let clamped = requested.clamp(0, remaining);
        self.pending[idx] = clamped;
        Ok(clamped)
    }

    pub fn pending(&self, item_id: OrderItemId) -> Option<i64> {
        self.index_of(item_id).ok().map(|idx| self.pending[idx])
    }

    /// Items with their pending quantity, in item order.
    pub fn lines(&self) -> impl Iterator<Item = (&PurchaseOrderItem, i64)> {
        self.items.iter().zip(self.pending.iter().copied())
    }

    pub fn has_pending(&self) -> bool {
        self.pending.iter().any(|q| *q > 0)
    }

    pub fn total_pending(&self) -> i64 {
        self.pending.iter().sum()
    }

    pub fn clear_pending(&mut self) {
        self.pending.iter_mut().for_each(|q| *q = 0);
    }

    /// Replace the snapshot with freshly loaded records and clear pending input.
    pub fn reset(&mut self, order: PurchaseOrder, items: Vec<PurchaseOrderItem>) {
        self.pending = vec![0; items.len()];
        self.order = order;
        self.items = items;
    }

    /// Decide every write a commit of the current input requires.
    pub fn plan(&self, at: DateTime<Utc>) -> DomainResult<ReceivingPlan> {
        if !self.has_pending() {
            return Err(DomainError::validation("no items to receive"));
        }
        self.order.ensure_receivable()?;

        let mut lines = Vec::new();
        let mut items_after = Vec::with_capacity(self.items.len());

        for (item, quantity) in self.lines() {
            if quantity <= 0 {
                items_after.push(item.clone());
                continue;
            }

            let after = item.with_received(quantity)?;
            lines.push(PlannedReceipt {
                item_id: item.id,
                quantity,
                previous_received: item.received_quantity,
                received_after: after.received_quantity,
                receipt: ReceiptEntry::for_item(&self.order, item, quantity, self.commit_key, at),
                stock: StockMovementRequest::receipt(&self.order, item, quantity, self.commit_key),
            });
            items_after.push(after);
        }

        let next_status = self
            .order
            .status
            .transition_to(recompute_status(&items_after))?;

        Ok(ReceivingPlan {
            order: self.order.clone(),
            commit_key: self.commit_key,
            lines,
            items_after,
            next_status,
            planned_at: at,
        })
    }
}

/// Writes for one item with a positive pending quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReceipt {
    pub item_id: OrderItemId,
    pub quantity: i64,
    pub previous_received: i64,
    pub received_after: i64,
    pub receipt: ReceiptEntry,
    pub stock: StockMovementRequest,
}

/// Everything a commit will write, decided up front.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivingPlan {
    pub order: PurchaseOrder,
    pub commit_key: CommitKey,
    /// In item order.
    pub lines: Vec<PlannedReceipt>,
    /// Every item of the order as it will be after the commit.
    pub items_after: Vec<PurchaseOrderItem>,
    pub next_status: PurchaseOrderStatus,
    pub planned_at: DateTime<Utc>,
}

/// `completed` once every item is fully received, otherwise `partially_received`.
pub fn recompute_status(items: &[PurchaseOrderItem]) -> PurchaseOrderStatus {
    if items.iter().all(PurchaseOrderItem::is_fully_received) {
        PurchaseOrderStatus::Completed
    } else {
        PurchaseOrderStatus::PartiallyReceived
    }
}
