//! Receiving workflow (application-level orchestration).
//!
//! Turns an operator's `ReceivingSession` into remote writes:
//!
//! ```text
//! commit
//!   ↓
//! 1. Authorize + local validation (no remote call)
//!   ↓
//! 2. Finish any rollback left over from a previous attempt
//!   ↓
//! 3. Re-read order and items; stale snapshot → Conflict (no write)
//!   ↓
//! 4. Per item, in item order: receipt entry → stock → received quantity
//!   ↓
//! 5. Status write, conditional on the order version
//!   ↓
//! 6. Reload, publish events
//! ```
//!
//! Every write in step 4/5 is journaled. If one fails, the journal is
//! unwound newest-first; whatever cannot be undone stays on the session and
//! is retried before the next attempt.

use std::sync::Arc;

use chrono::Utc;

use invoria_auth::{Permission, Principal, authorize};
use invoria_core::{ExpectedVersion, OrderId};
use invoria_purchasing::{
    CompensationJournal, CompensationStep, GoodsReceived, OrderStatusChanged, PurchaseOrder,
    PurchaseOrderItem, PurchaseOrderStatus, PurchasingEvent, ReceiptEntry, ReceivingPlan,
    ReceivingSession,
};

use crate::event_bus::{PurchasingBus, publish_all};
use crate::ports::{OrderRepository, ReceiptRecorder, RemoteError, StockMutator};

use super::compensation::Compensator;
use crate::error::PurchasingError;

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivingOutcome {
    /// Order as stored after the commit.
    pub order: PurchaseOrder,
    pub items: Vec<PurchaseOrderItem>,
    /// Entries appended by this commit.
    pub receipts: Vec<ReceiptEntry>,
    pub previous_status: PurchaseOrderStatus,
}

impl ReceivingOutcome {
    pub fn status_changed(&self) -> bool {
        self.order.status != self.previous_status
    }
}

#[derive(Clone)]
pub struct ReceivingWorkflow {
    orders: Arc<dyn OrderRepository>,
    receipts: Arc<dyn ReceiptRecorder>,
    stock: Arc<dyn StockMutator>,
    bus: Arc<PurchasingBus>,
}

impl ReceivingWorkflow {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        receipts: Arc<dyn ReceiptRecorder>,
        stock: Arc<dyn StockMutator>,
        bus: Arc<PurchasingBus>,
    ) -> Self {
        Self {
            orders,
            receipts,
            stock,
            bus,
        }
    }

    /// Wire every port to one backend.
    pub fn from_backend<B>(backend: Arc<B>, bus: Arc<PurchasingBus>) -> Self
    where
        B: OrderRepository + ReceiptRecorder + StockMutator + 'static,
    {
        Self::new(backend.clone(), backend.clone(), backend, bus)
    }

    pub fn bus(&self) -> &Arc<PurchasingBus> {
        &self.bus
    }

    fn compensator(&self) -> Compensator<'_> {
        Compensator {
            orders: self.orders.as_ref(),
            receipts: self.receipts.as_ref(),
            stock: self.stock.as_ref(),
        }
    }

    /// Read an order with its items.
    pub async fn load(
        &self,
        order_id: OrderId,
    ) -> Result<(PurchaseOrder, Vec<PurchaseOrderItem>), PurchasingError> {
        let order = self
            .orders
            .get_order(order_id)
            .await
            .map_err(PurchasingError::read)?
            .ok_or(PurchasingError::NotFound)?;
        let items = self
            .orders
            .list_order_items(order_id)
            .await
            .map_err(PurchasingError::read)?;
        Ok((order, items))
    }

    /// Open a receiving session. Only reads; rejected unless the order is
    /// `sent` or `partially_received`.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn begin_receiving(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<ReceivingSession, PurchasingError> {
        authorize(principal, &Permission::ORDERS_RECEIVE)?;

        let (order, items) = self.load(order_id).await?;
        let session = ReceivingSession::begin(order, items)?;

        tracing::info!(
            "receiving session opened for order {} ({} item(s))",
            order_id,
            session.items().len()
        );
        Ok(session)
    }

    /// Commit the session's pending quantities.
    ///
    /// On success the session is reloaded from the backend and its pending
    /// quantities are cleared. On failure the pending input is kept so the
    /// operator can retry.
    #[tracing::instrument(
        skip(self, principal, session),
        fields(order_id = %session.order().id, user_id = %principal.user_id, commit_key = %session.commit_key())
    )]
    pub async fn commit(
        &self,
        principal: &Principal,
        session: &mut ReceivingSession,
    ) -> Result<ReceivingOutcome, PurchasingError> {
        authorize(principal, &Permission::ORDERS_RECEIVE)?;
        if !session.has_pending() {
            return Err(PurchasingError::Validation("no items to receive".to_string()));
        }
        session.order().ensure_receivable()?;

        self.finish_outstanding(session).await?;
        self.ensure_current(session).await?;

        let plan = session.plan(Utc::now())?;
        let previous_status = plan.order.status;

        let updated = self.apply(session, &plan).await?;
        session.rotate_commit_key();

        tracing::info!(
            "received {} line(s) on order {}: {} -> {}",
            plan.lines.len(),
            updated.id,
            previous_status,
            updated.status
        );

        let (order, items) = match self.load(updated.id).await {
            Ok(loaded) => loaded,
            Err(err) => {
                tracing::warn!("reload after commit failed, using local state: {}", err);
                (updated, plan.items_after.clone())
            }
        };
        session.reset(order.clone(), items.clone());

        publish_all(&self.bus, receiving_events(&plan, order.status));

        Ok(ReceivingOutcome {
            order,
            items,
            receipts: plan.lines.iter().map(|l| l.receipt.clone()).collect(),
            previous_status,
        })
    }

    /// Retry undo steps a previous attempt could not apply.
    async fn finish_outstanding(&self, session: &mut ReceivingSession) -> Result<(), PurchasingError> {
        if session.outstanding_compensation().is_empty() {
            return Ok(());
        }

        tracing::info!(
            "finishing {} outstanding compensation step(s) before retry",
            session.outstanding_compensation().len()
        );
        let steps = session.take_outstanding_compensation();
        let failed = self.compensator().unwind(steps).await;

        let Some(last_error) = failed.last().map(|(_, err)| err.clone()) else {
            session.rotate_commit_key();
            return Ok(());
        };
        Err(self.keep_outstanding(session, PurchasingError::RemoteWrite(last_error), failed))
    }

    /// Fail with `Conflict` if the order or its items moved since the
    /// session was loaded.
    async fn ensure_current(&self, session: &ReceivingSession) -> Result<(), PurchasingError> {
        let snapshot = session.order();
        let (current, items) = self.load(snapshot.id).await?;

        ExpectedVersion::of(snapshot).check(current.version)?;
        if current.status != snapshot.status {
            return Err(PurchasingError::Conflict(format!(
                "order status changed from '{}' to '{}'",
                snapshot.status, current.status
            )));
        }

        let unchanged = items.len() == session.items().len()
            && items.iter().zip(session.items()).all(|(now, then)| {
                now.id == then.id && now.received_quantity == then.received_quantity
            });
        if !unchanged {
            return Err(PurchasingError::Conflict(format!(
                "items of order {} changed since they were loaded",
                snapshot.id
            )));
        }
        Ok(())
    }

    /// Run every write of `plan`, unwinding on the first failure.
    async fn apply(
        &self,
        session: &mut ReceivingSession,
        plan: &ReceivingPlan,
    ) -> Result<PurchaseOrder, PurchasingError> {
        let mut journal = CompensationJournal::new();

        for line in &plan.lines {
            let item_label = session
                .items()
                .iter()
                .find(|i| i.id == line.item_id)
                .map(PurchaseOrderItem::display_name)
                .unwrap_or_else(|| line.item_id.to_string());

            if let Err(err) = self
                .receipts
                .insert_receipt_entries(std::slice::from_ref(&line.receipt))
                .await
            {
                if is_ambiguous(&err) {
                    journal.record(line.undo_receipt());
                }
                return Err(self.rollback(session, journal, PurchasingError::write(err)).await);
            }
            journal.record(line.undo_receipt());

            if let Err(err) = self.stock.apply_movement(&line.stock).await {
                let cause = PurchasingError::StockUpdate {
                    item: item_label,
                    source: err,
                };
                return Err(self.rollback(session, journal, cause).await);
            }
            journal.record(line.undo_stock());

            if let Err(err) = self
                .orders
                .update_item_received_quantity(line.item_id, line.received_after)
                .await
            {
                if is_ambiguous(&err) {
                    journal.record(line.undo_item());
                }
                return Err(self.rollback(session, journal, PurchasingError::write(err)).await);
            }
            journal.record(line.undo_item());

            tracing::debug!(
                "item {} received {} (now {})",
                line.item_id,
                line.quantity,
                line.received_after
            );
        }

        let err = match self
            .orders
            .update_order_status(
                plan.order.id,
                plan.next_status,
                plan.planned_at,
                ExpectedVersion::of(&plan.order),
            )
            .await
        {
            Ok(order) => return Ok(order),
            Err(err) => err,
        };

        if is_ambiguous(&err) {
            match self.orders.get_order(plan.order.id).await {
                Ok(Some(current)) if status_write_landed(plan, &current) => {
                    tracing::info!(
                        "status write for order {} was applied despite: {}",
                        plan.order.id,
                        err
                    );
                    return Ok(current);
                }
                Ok(_) => {}
                Err(read_err) => {
                    // The status may already be final; item writes stay and the
                    // next commit's freshness check reports them.
                    tracing::warn!(
                        "outcome of status write for order {} unknown ({}; re-read: {}); keeping item writes",
                        plan.order.id,
                        err,
                        read_err
                    );
                    session.rotate_commit_key();
                    return Err(PurchasingError::write(err));
                }
            }
        }
        Err(self.rollback(session, journal, PurchasingError::write(err)).await)
    }

    /// Undo what `journal` recorded and decide which error to surface.
    async fn rollback(
        &self,
        session: &mut ReceivingSession,
        journal: CompensationJournal,
        cause: PurchasingError,
    ) -> PurchasingError {
        tracing::warn!(
            "commit failed ({}); unwinding {} applied step(s)",
            cause,
            journal.len()
        );

        let failed = self.compensator().unwind(journal.into_unwind_order()).await;
        if failed.is_empty() {
            session.rotate_commit_key();
            return cause;
        }
        self.keep_outstanding(session, cause, failed)
    }

    fn keep_outstanding(
        &self,
        session: &mut ReceivingSession,
        cause: PurchasingError,
        failed: Vec<(CompensationStep, RemoteError)>,
    ) -> PurchasingError {
        let steps: Vec<CompensationStep> = failed.into_iter().map(|(step, _)| step).collect();
        let unreverted = steps.iter().map(CompensationStep::describe).collect();
        tracing::warn!("{} compensation step(s) left for retry", steps.len());
        session.set_outstanding_compensation(steps);

        PurchasingError::RollbackIncomplete {
            cause: Box::new(cause),
            unreverted,
        }
    }

    /// Cancel an order that has not received any goods.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn cancel_order(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<PurchaseOrder, PurchasingError> {
        authorize(principal, &Permission::ORDERS_CANCEL)?;

        let order = self
            .orders
            .get_order(order_id)
            .await
            .map_err(PurchasingError::read)?
            .ok_or(PurchasingError::NotFound)?;
        let cancelled = order.cancelled(Utc::now())?;

        let stored = self
            .orders
            .update_order_status(
                order_id,
                cancelled.status,
                cancelled.updated_at,
                ExpectedVersion::of(&order),
            )
            .await
            .map_err(PurchasingError::write)?;

        tracing::info!("order {} cancelled (was {})", order_id, order.status);
        publish_all(
            &self.bus,
            vec![PurchasingEvent::OrderStatusChanged(OrderStatusChanged {
                order_id,
                from: order.status,
                to: stored.status,
                occurred_at: stored.updated_at,
            })],
        );
        Ok(stored)
    }
}

/// The write may or may not have landed.
fn is_ambiguous(err: &RemoteError) -> bool {
    matches!(err, RemoteError::Transport(_))
}

/// `current` is exactly the order our conditional status write produces.
fn status_write_landed(plan: &ReceivingPlan, current: &PurchaseOrder) -> bool {
    current.status == plan.next_status && current.version == plan.order.version + 1
}

fn receiving_events(plan: &ReceivingPlan, status_after: PurchaseOrderStatus) -> Vec<PurchasingEvent> {
    let mut events: Vec<PurchasingEvent> = plan
        .lines
        .iter()
        .map(|line| {
            PurchasingEvent::GoodsReceived(GoodsReceived {
                order_id: plan.order.id,
                item_id: line.item_id,
                product_id: line.stock.product_id,
                warehouse_id: line.stock.warehouse_id,
                quantity: line.quantity,
                received_quantity: line.received_after,
                occurred_at: plan.planned_at,
            })
        })
        .collect();

    if status_after != plan.order.status {
        events.push(PurchasingEvent::OrderStatusChanged(OrderStatusChanged {
            order_id: plan.order.id,
            from: plan.order.status,
            to: status_after,
            occurred_at: plan.planned_at,
        }));
    }
    events
}
