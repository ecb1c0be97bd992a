//! Purchase order drafting, sending and read access.

use std::sync::Arc;

use chrono::Utc;

use invoria_auth::{Permission, Principal, authorize};
use invoria_core::{ExpectedVersion, OrderId};
use invoria_purchasing::{
    ItemsReplaced, NewOrderLine, NewPurchaseOrder, OrderDrafted, OrderStatusChanged,
    PurchaseOrder, PurchaseOrderItem, PurchasingEvent, ReceiptEntry, build_items, order_total,
};

use crate::event_bus::{PurchasingBus, publish_all};
use crate::ports::{OrderFilter, OrderRepository, ReceiptRecorder};
use crate::error::PurchasingError;

#[derive(Clone)]
pub struct PurchaseOrderService {
    orders: Arc<dyn OrderRepository>,
    receipts: Arc<dyn ReceiptRecorder>,
    bus: Arc<PurchasingBus>,
}

impl PurchaseOrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        receipts: Arc<dyn ReceiptRecorder>,
        bus: Arc<PurchasingBus>,
    ) -> Self {
        Self {
            orders,
            receipts,
            bus,
        }
    }

    pub fn from_backend<B>(backend: Arc<B>, bus: Arc<PurchasingBus>) -> Self
    where
        B: OrderRepository + ReceiptRecorder + 'static,
    {
        Self::new(backend.clone(), backend, bus)
    }

    async fn require_order(&self, order_id: OrderId) -> Result<PurchaseOrder, PurchasingError> {
        self.orders
            .get_order(order_id)
            .await
            .map_err(PurchasingError::read)?
            .ok_or(PurchasingError::NotFound)
    }

    async fn items_of(&self, order_id: OrderId) -> Result<Vec<PurchaseOrderItem>, PurchasingError> {
        self.orders
            .list_order_items(order_id)
            .await
            .map_err(PurchasingError::read)
    }

    /// Create a draft order with its items.
    #[tracing::instrument(skip(self, principal, draft), fields(user_id = %principal.user_id))]
    pub async fn create_draft(
        &self,
        principal: &Principal,
        draft: NewPurchaseOrder,
    ) -> Result<(PurchaseOrder, Vec<PurchaseOrderItem>), PurchasingError> {
        authorize(principal, &Permission::ORDERS_WRITE)?;
        let (order, items) = draft.into_draft(Utc::now())?;

        let stored = self
            .orders
            .insert_order(&order)
            .await
            .map_err(PurchasingError::write)?;

        if let Err(err) = self.orders.insert_order_items(&items).await {
            // The header exists without lines; the operator can re-save them.
            tracing::warn!("order {} created but its items failed to save: {}", stored.id, err);
            return Err(PurchasingError::write(err));
        }

        tracing::info!(
            "draft order {} created with {} line(s), total {}",
            stored.id,
            items.len(),
            stored.total_amount
        );
        publish_all(
            &self.bus,
            vec![PurchasingEvent::OrderDrafted(OrderDrafted {
                order_id: stored.id,
                total_amount: stored.total_amount,
                occurred_at: stored.created_at,
            })],
        );

        let items = self.items_of(stored.id).await.unwrap_or(items);
        Ok((stored, items))
    }

    /// Replace every line of a draft and recompute its total.
    #[tracing::instrument(skip(self, principal, lines), fields(user_id = %principal.user_id))]
    pub async fn replace_items(
        &self,
        principal: &Principal,
        order_id: OrderId,
        lines: Vec<NewOrderLine>,
    ) -> Result<(PurchaseOrder, Vec<PurchaseOrderItem>), PurchasingError> {
        authorize(principal, &Permission::ORDERS_WRITE)?;

        let order = self.require_order(order_id).await?;
        order.ensure_editable()?;
        let items = build_items(order_id, lines)?;
        let total = order_total(&items)?;

        // The version check claims the draft before its lines are touched; a
        // concurrent send fails here with the items still intact.
        let stored = self
            .orders
            .update_order_total(order_id, total, Utc::now(), ExpectedVersion::of(&order))
            .await
            .map_err(PurchasingError::write)?;
        let swapped = match self.orders.delete_order_items(order_id).await {
            Ok(()) => self.orders.insert_order_items(&items).await,
            Err(err) => Err(err),
        };
        if let Err(err) = swapped {
            tracing::warn!(
                "order {} total updated to {} but its items failed to save: {}",
                order_id,
                total,
                err
            );
            return Err(PurchasingError::write(err));
        }

        tracing::info!("order {} items replaced ({} line(s))", order_id, items.len());
        publish_all(
            &self.bus,
            vec![PurchasingEvent::ItemsReplaced(ItemsReplaced {
                order_id,
                item_count: items.len(),
                total_amount: total,
                occurred_at: stored.updated_at,
            })],
        );

        let items = self.items_of(order_id).await.unwrap_or(items);
        Ok((stored, items))
    }

    /// Send a draft to the supplier.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn send(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<PurchaseOrder, PurchasingError> {
        authorize(principal, &Permission::ORDERS_SEND)?;

        let order = self.require_order(order_id).await?;
        let items = self.items_of(order_id).await?;
        let sent = order.sent(&items, Utc::now())?;

        let stored = self
            .orders
            .update_order_status(order_id, sent.status, sent.updated_at, ExpectedVersion::of(&order))
            .await
            .map_err(PurchasingError::write)?;

        tracing::info!("order {} sent to supplier {}", order_id, stored.supplier_id);
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

    pub async fn get(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<(PurchaseOrder, Vec<PurchaseOrderItem>), PurchasingError> {
        authorize(principal, &Permission::ORDERS_READ)?;
        let order = self.require_order(order_id).await?;
        let items = self.items_of(order_id).await?;
        Ok((order, items))
    }

    pub async fn list(
        &self,
        principal: &Principal,
        filter: &OrderFilter,
    ) -> Result<Vec<PurchaseOrder>, PurchasingError> {
        authorize(principal, &Permission::ORDERS_READ)?;
        self.orders
            .list_orders(filter)
            .await
            .map_err(PurchasingError::read)
    }

    /// Receipt entries of an order, oldest first.
    pub async fn receipt_history(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<Vec<ReceiptEntry>, PurchasingError> {
        authorize(principal, &Permission::ORDERS_READ)?;
        let mut entries = self
            .receipts
            .list_receipt_entries(order_id)
            .await
            .map_err(PurchasingError::read)?;
        entries.sort_by_key(|e| e.received_at);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate};
    use invoria_auth::Role;
    use invoria_core::{OrderItemId, ProductId, SupplierId, UserId, WarehouseId};
    use invoria_purchasing::PurchaseOrderStatus;

    use crate::event_bus::new_bus;
    use crate::memory::{InMemoryBackend, Operation};
    use crate::ports::RemoteError;

    fn buyer() -> Principal {
        Principal::new(UserId::new(), vec![Role::PURCHASING])
    }

    fn line(quantity: i64, unit_price: u64) -> NewOrderLine {
        NewOrderLine {
            product_id: ProductId::new(),
            quantity,
            unit_price,
        }
    }

    fn draft(lines: Vec<NewOrderLine>) -> NewPurchaseOrder {
        NewPurchaseOrder {
            supplier_id: SupplierId::new(),
            warehouse_id: WarehouseId::new(),
            order_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            notes: Some("entrega en rampa 2".to_string()),
            lines,
        }
    }

    fn service() -> (Arc<InMemoryBackend>, PurchaseOrderService) {
        let backend = Arc::new(InMemoryBackend::new());
        let service = PurchaseOrderService::from_backend(backend.clone(), new_bus());
        (backend, service)
    }

    #[tokio::test]
    async fn create_draft_stores_header_and_lines() {
        let (backend, service) = service();

        let (order, items) = service
            .create_draft(&buyer(), draft(vec![line(3, 1_000), line(2, 250)]))
            .await
            .unwrap();

        assert_eq!(order.status, PurchaseOrderStatus::Draft);
        assert_eq!(order.total_amount, 3_500);
        assert_eq!(items.len(), 2);
        assert_eq!(backend.order(order.id).unwrap().version, 1);
    }

    #[tokio::test]
    async fn invalid_lines_are_rejected_before_any_call() {
        let (backend, service) = service();

        let err = service
            .create_draft(&buyer(), draft(vec![line(3, 1_000), line(0, 10)]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PurchasingError::Validation("line 2: quantity must be positive".to_string())
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn replace_items_swaps_the_batch_and_recomputes_total() {
        let (backend, service) = service();
        let (order, _) = service
            .create_draft(&buyer(), draft(vec![line(3, 1_000)]))
            .await
            .unwrap();

        let (updated, items) = service
            .replace_items(&buyer(), order.id, vec![line(1, 99), line(4, 1)])
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(updated.total_amount, 103);
        assert_eq!(updated.version, 2);
        assert_eq!(backend.order(order.id).unwrap().total_amount, 103);
    }

    /// Sends the order on the inner store right after handing out the draft,
    /// like a second user pressing "send" while this one saves.
    struct SentMeanwhile {
        inner: Arc<InMemoryBackend>,
    }

    #[async_trait::async_trait]
    impl OrderRepository for SentMeanwhile {
        async fn get_order(&self, id: OrderId) -> Result<Option<PurchaseOrder>, RemoteError> {
            let order = self.inner.get_order(id).await?;
            self.inner
                .update_order_status(id, PurchaseOrderStatus::Sent, Utc::now(), ExpectedVersion::Any)
                .await?;
            Ok(order)
        }

        async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<PurchaseOrder>, RemoteError> {
            self.inner.list_orders(filter).await
        }

        async fn list_order_items(
            &self,
            order_id: OrderId,
        ) -> Result<Vec<PurchaseOrderItem>, RemoteError> {
            self.inner.list_order_items(order_id).await
        }

        async fn insert_order(&self, order: &PurchaseOrder) -> Result<PurchaseOrder, RemoteError> {
            self.inner.insert_order(order).await
        }

        async fn insert_order_items(&self, items: &[PurchaseOrderItem]) -> Result<(), RemoteError> {
            self.inner.insert_order_items(items).await
        }

        async fn delete_order_items(&self, order_id: OrderId) -> Result<(), RemoteError> {
            self.inner.delete_order_items(order_id).await
        }

        async fn update_order_status(
            &self,
            id: OrderId,
            status: PurchaseOrderStatus,
            updated_at: DateTime<Utc>,
            expected: ExpectedVersion,
        ) -> Result<PurchaseOrder, RemoteError> {
            self.inner
                .update_order_status(id, status, updated_at, expected)
                .await
        }

        async fn update_order_total(
            &self,
            id: OrderId,
            total_amount: u64,
            updated_at: DateTime<Utc>,
            expected: ExpectedVersion,
        ) -> Result<PurchaseOrder, RemoteError> {
            self.inner
                .update_order_total(id, total_amount, updated_at, expected)
                .await
        }

        async fn update_item_received_quantity(
            &self,
            item_id: OrderItemId,
            received_quantity: i64,
        ) -> Result<(), RemoteError> {
            self.inner
                .update_item_received_quantity(item_id, received_quantity)
                .await
        }
    }

    #[tokio::test]
    async fn replace_items_loses_to_a_concurrent_send_without_touching_lines() {
        let (backend, service) = service();
        let (order, before) = service
            .create_draft(&buyer(), draft(vec![line(3, 1_000)]))
            .await
            .unwrap();
        let racing = PurchaseOrderService::new(
            Arc::new(SentMeanwhile {
                inner: backend.clone(),
            }),
            backend.clone(),
            new_bus(),
        );
        backend.clear_calls();

        let err = racing
            .replace_items(&buyer(), order.id, vec![line(1, 99)])
            .await
            .unwrap_err();

        assert!(matches!(err, PurchasingError::Conflict(_)), "{err:?}");
        assert!(!backend.calls().contains(&Operation::DeleteOrderItems));
        assert!(!backend.calls().contains(&Operation::InsertOrderItems));
        let stored = backend.order(order.id).unwrap();
        assert_eq!(stored.status, PurchaseOrderStatus::Sent);
        assert_eq!(stored.total_amount, 3_000);
        let after = backend.list_order_items(order.id).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, before[0].id);
    }

    #[tokio::test]
    async fn sent_orders_cannot_be_edited() {
        let (backend, service) = service();
        let (order, _) = service
            .create_draft(&buyer(), draft(vec![line(3, 1_000)]))
            .await
            .unwrap();
        service.send(&buyer(), order.id).await.unwrap();
        backend.clear_calls();

        let err = service
            .replace_items(&buyer(), order.id, vec![line(1, 1)])
            .await
            .unwrap_err();

        assert!(matches!(err, PurchasingError::Validation(_)));
        assert_eq!(backend.write_calls(), 0);
    }

    #[tokio::test]
    async fn send_requires_lines() {
        let (_, service) = service();
        let (order, _) = service.create_draft(&buyer(), draft(vec![])).await.unwrap();

        let err = service.send(&buyer(), order.id).await.unwrap_err();
        assert_eq!(
            err,
            PurchasingError::Validation("cannot send purchase order without items".to_string())
        );
    }

    #[tokio::test]
    async fn warehouse_staff_cannot_draft() {
        let (backend, service) = service();
        let clerk = Principal::new(UserId::new(), vec![Role::WAREHOUSE]);

        let err = service
            .create_draft(&clerk, draft(vec![line(1, 1)]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PurchasingError::Forbidden("purchase_orders.write".to_string())
        );
        assert!(!backend.calls().contains(&Operation::InsertOrder));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let (_, service) = service();
        let (a, _) = service
            .create_draft(&buyer(), draft(vec![line(1, 1)]))
            .await
            .unwrap();
        service
            .create_draft(&buyer(), draft(vec![line(1, 1)]))
            .await
            .unwrap();
        service.send(&buyer(), a.id).await.unwrap();

        let sent = service
            .list(
                &buyer(),
                &OrderFilter {
                    status: Some(PurchaseOrderStatus::Sent),
                    ..OrderFilter::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, a.id);
    }
}
