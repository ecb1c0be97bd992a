//! In-memory backend implementing every collaborator port.
//!
//! Intended for tests/dev. Mirrors the behaviour the hosted backend is
//! expected to have: version-checked order writes, receipt deduplication on
//! `(commit_key, item_id)` and stock idempotency keys. Calls are logged and
//! failures can be scripted per operation.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use invoria_core::{
    CommitKey, ExpectedVersion, OrderId, OrderItemId, ProductId, ReceiptId, WarehouseId,
};
use invoria_purchasing::{
    PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus, ReceiptEntry, StockMovementRequest,
};

use crate::ports::{OrderFilter, OrderRepository, ReceiptRecorder, RemoteError, StockMutator};

/// Remote operation, as seen by the call log and failure scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetOrder,
    ListOrders,
    ListOrderItems,
    InsertOrder,
    InsertOrderItems,
    DeleteOrderItems,
    UpdateOrderStatus,
    UpdateOrderTotal,
    UpdateItemReceived,
    InsertReceipts,
    ListReceipts,
    DeleteReceipts,
    ApplyMovement,
}

impl Operation {
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Operation::GetOrder
                | Operation::ListOrders
                | Operation::ListOrderItems
                | Operation::ListReceipts
        )
    }
}

#[derive(Debug)]
struct ScriptedFailure {
    op: Operation,
    /// Matching calls to let through before failing.
    skip: usize,
    /// Apply the write, then report `error` (a lost response).
    after_write: bool,
    error: RemoteError,
}

#[derive(Debug, Default)]
struct State {
    orders: HashMap<OrderId, PurchaseOrder>,
    /// Insertion order is line order.
    items: Vec<PurchaseOrderItem>,
    receipts: Vec<ReceiptEntry>,
    stock: HashMap<(ProductId, WarehouseId), i64>,
    movements: Vec<StockMovementRequest>,
    applied_keys: HashSet<String>,
    calls: Vec<Operation>,
    failures: Vec<ScriptedFailure>,
}

impl State {
    fn enter(&mut self, op: Operation) -> Result<(), RemoteError> {
        self.calls.push(op);
        self.scripted(op, false)
    }

    /// Called once a write has been applied.
    fn leave(&mut self, op: Operation) -> Result<(), RemoteError> {
        self.scripted(op, true)
    }

    fn scripted(&mut self, op: Operation, after_write: bool) -> Result<(), RemoteError> {
        let Some(idx) = self
            .failures
            .iter()
            .position(|f| f.op == op && f.after_write == after_write)
        else {
            return Ok(());
        };
        if self.failures[idx].skip > 0 {
            self.failures[idx].skip -= 1;
            return Ok(());
        }
        Err(self.failures.remove(idx).error)
    }

    fn order_mut(&mut self, id: OrderId) -> Result<&mut PurchaseOrder, RemoteError> {
        self.orders.get_mut(&id).ok_or(RemoteError::NotFound)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, RemoteError> {
        self.state
            .lock()
            .map_err(|_| RemoteError::Transport("lock poisoned".to_string()))
    }

    /// Store an order and its items as-is (no call is logged).
    pub fn seed(&self, order: PurchaseOrder, items: Vec<PurchaseOrderItem>) {
        if let Ok(mut state) = self.state.lock() {
            state.items.retain(|i| i.order_id != order.id);
            state.items.extend(items);
            state.orders.insert(order.id, order);
        }
    }

    /// Fail the `nth` (1-based) next call of `op` with `error`.
    pub fn fail_on(&self, op: Operation, nth: usize, error: RemoteError) {
        self.script(op, nth, false, error);
    }

    /// Apply the `nth` (1-based) next call of `op`, then answer with `error`.
    pub fn fail_after(&self, op: Operation, nth: usize, error: RemoteError) {
        self.script(op, nth, true, error);
    }

    fn script(&self, op: Operation, nth: usize, after_write: bool, error: RemoteError) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.push(ScriptedFailure {
                op,
                skip: nth.saturating_sub(1),
                after_write,
                error,
            });
        }
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn write_calls(&self) -> usize {
        self.calls().iter().filter(|op| op.is_write()).count()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.clear();
        }
    }

    pub fn order(&self, id: OrderId) -> Option<PurchaseOrder> {
        self.state.lock().ok()?.orders.get(&id).cloned()
    }

    pub fn item(&self, id: OrderItemId) -> Option<PurchaseOrderItem> {
        self.state.lock().ok()?.items.iter().find(|i| i.id == id).cloned()
    }

    pub fn receipts(&self, order_id: OrderId) -> Vec<ReceiptEntry> {
        self.state
            .lock()
            .map(|s| s.receipts.iter().filter(|r| r.order_id == order_id).cloned().collect())
            .unwrap_or_default()
    }

    pub fn stock_level(&self, product_id: ProductId, warehouse_id: WarehouseId) -> i64 {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.stock.get(&(product_id, warehouse_id)).copied())
            .unwrap_or(0)
    }

    pub fn movements(&self) -> Vec<StockMovementRequest> {
        self.state.lock().map(|s| s.movements.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryBackend {
    async fn get_order(&self, id: OrderId) -> Result<Option<PurchaseOrder>, RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::GetOrder)?;
        Ok(state.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<PurchaseOrder>, RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::ListOrders)?;

        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            orders.truncate(limit);
        }
        Ok(orders)
    }

    async fn list_order_items(&self, order_id: OrderId) -> Result<Vec<PurchaseOrderItem>, RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::ListOrderItems)?;
        Ok(state
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn insert_order(&self, order: &PurchaseOrder) -> Result<PurchaseOrder, RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::InsertOrder)?;
        if state.orders.contains_key(&order.id) {
            return Err(RemoteError::Conflict(format!("order {} already exists", order.id)));
        }
        let stored = PurchaseOrder {
            version: 1,
            ..order.clone()
        };
        state.orders.insert(stored.id, stored.clone());
        state.leave(Operation::InsertOrder)?;
        Ok(stored)
    }

    async fn insert_order_items(&self, items: &[PurchaseOrderItem]) -> Result<(), RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::InsertOrderItems)?;
        if let Some(orphan) = items.iter().find(|i| !state.orders.contains_key(&i.order_id)) {
            return Err(RemoteError::Rejected(format!(
                "order {} does not exist",
                orphan.order_id
            )));
        }
        state.items.extend(items.iter().cloned());
        state.leave(Operation::InsertOrderItems)
    }

    async fn delete_order_items(&self, order_id: OrderId) -> Result<(), RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::DeleteOrderItems)?;
        state.items.retain(|i| i.order_id != order_id);
        state.leave(Operation::DeleteOrderItems)
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: PurchaseOrderStatus,
        updated_at: DateTime<Utc>,
        expected: ExpectedVersion,
    ) -> Result<PurchaseOrder, RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::UpdateOrderStatus)?;
        let order = state.order_mut(id)?;
        if !expected.matches(order.version) {
            return Err(RemoteError::Conflict(format!(
                "order {id} is at version {}, expected {expected:?}",
                order.version
            )));
        }
        order.status = status;
        order.updated_at = updated_at;
        order.version += 1;
        let stored = order.clone();
        state.leave(Operation::UpdateOrderStatus)?;
        Ok(stored)
    }

    async fn update_order_total(
        &self,
        id: OrderId,
        total_amount: u64,
        updated_at: DateTime<Utc>,
        expected: ExpectedVersion,
    ) -> Result<PurchaseOrder, RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::UpdateOrderTotal)?;
        let order = state.order_mut(id)?;
        if !expected.matches(order.version) {
            return Err(RemoteError::Conflict(format!(
                "order {id} is at version {}, expected {expected:?}",
                order.version
            )));
        }
        order.total_amount = total_amount;
        order.updated_at = updated_at;
        order.version += 1;
        let stored = order.clone();
        state.leave(Operation::UpdateOrderTotal)?;
        Ok(stored)
    }

    async fn update_item_received_quantity(
        &self,
        item_id: OrderItemId,
        received_quantity: i64,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::UpdateItemReceived)?;
        let item = state
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(RemoteError::NotFound)?;
        item.received_quantity = received_quantity;
        state.leave(Operation::UpdateItemReceived)
    }
}

#[async_trait::async_trait]
impl ReceiptRecorder for InMemoryBackend {
    async fn insert_receipt_entries(&self, entries: &[ReceiptEntry]) -> Result<(), RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::InsertReceipts)?;

        let existing: HashSet<(CommitKey, OrderItemId)> = state
            .receipts
            .iter()
            .map(|r| (r.commit_key, r.item_id))
            .collect();
        let fresh: Vec<_> = entries
            .iter()
            .filter(|e| !existing.contains(&(e.commit_key, e.item_id)))
            .cloned()
            .collect();
        state.receipts.extend(fresh);
        state.leave(Operation::InsertReceipts)
    }

    async fn list_receipt_entries(&self, order_id: OrderId) -> Result<Vec<ReceiptEntry>, RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::ListReceipts)?;
        Ok(state
            .receipts
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn delete_receipt_entries(&self, ids: &[ReceiptId]) -> Result<(), RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::DeleteReceipts)?;
        state.receipts.retain(|r| !ids.contains(&r.id));
        state.leave(Operation::DeleteReceipts)
    }
}

#[async_trait::async_trait]
impl StockMutator for InMemoryBackend {
    async fn apply_movement(&self, request: &StockMovementRequest) -> Result<(), RemoteError> {
        let mut state = self.lock()?;
        state.enter(Operation::ApplyMovement)?;
        if request.quantity <= 0 {
            return Err(RemoteError::Rejected("quantity must be positive".to_string()));
        }
        if !state.applied_keys.insert(request.idempotency_key.clone()) {
            return Ok(());
        }
        *state
            .stock
            .entry((request.product_id, request.warehouse_id))
            .or_insert(0) += request.signed_quantity();
        state.movements.push(request.clone());
        state.leave(Operation::ApplyMovement)
    }
}
