//! Receiving screen controller.
//!
//! Owns the `ReceivingSession` for one visit to the receiving screen and
//! turns workflow results into what the view shows: rows, progress, the
//! inline error, notices and the print offer.

use std::num::IntErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use invoria_auth::Principal;
use invoria_core::{OrderId, OrderItemId};
use invoria_infra::{PurchasingError, ReceivingWorkflow};
use invoria_purchasing::{
    PurchaseOrder, PurchaseOrderItem, ReceivingSession, calculate_order_progress,
};

use crate::notifications::{NoticeLevel, NotificationCenter};
use crate::print::{PrintFormat, ReceiptDocument};

pub const SAVE_LABEL: &str = "Guardar Recepción";
pub const SAVING_LABEL: &str = "Guardando...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenMode {
    /// Quantities can be entered and saved.
    Receiving,
    /// Read-only view of the order.
    Detail,
}

/// One table row of the receiving form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivingRow {
    pub item_id: OrderItemId,
    pub product: String,
    pub ordered: i64,
    pub received: i64,
    pub remaining: i64,
    pub to_receive: i64,
}

/// Offered after a successful save.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrintOffer {
    pub formats: [PrintFormat; 2],
    pub document: ReceiptDocument,
}

#[derive(Debug)]
enum Loaded {
    Receiving(ReceivingSession),
    Detail {
        order: PurchaseOrder,
        items: Vec<PurchaseOrderItem>,
    },
}

pub struct ReceivingScreen {
    workflow: Arc<ReceivingWorkflow>,
    principal: Principal,
    loaded: Option<Loaded>,
    saving: Arc<AtomicBool>,
    inline_error: Option<String>,
    print_offer: Option<PrintOffer>,
    notices: NotificationCenter,
}

impl ReceivingScreen {
    pub fn new(workflow: Arc<ReceivingWorkflow>, principal: Principal) -> Self {
        Self {
            workflow,
            principal,
            loaded: None,
            saving: Arc::new(AtomicBool::new(false)),
            inline_error: None,
            print_offer: None,
            notices: NotificationCenter::new(),
        }
    }

    /// Load `order_id`. Orders that cannot receive goods (or operators who
    /// may not receive) get the read-only detail view and a notice.
    pub async fn open(&mut self, order_id: OrderId) -> Result<ScreenMode, PurchasingError> {
        self.close();

        match self.workflow.begin_receiving(&self.principal, order_id).await {
            Ok(session) => {
                self.loaded = Some(Loaded::Receiving(session));
                Ok(ScreenMode::Receiving)
            }
            Err(err @ (PurchasingError::Validation(_) | PurchasingError::Forbidden(_))) => {
                let (order, items) = match self.workflow.load(order_id).await {
                    Ok(loaded) => loaded,
                    Err(load_err) => return Err(self.fail(load_err)),
                };
                tracing::info!("order {} opened read-only: {}", order_id, err);
                let message = match err {
                    PurchasingError::Forbidden(_) => {
                        "No tiene permiso para recibir mercancía. Se muestra el detalle.".to_string()
                    }
                    _ => format!(
                        "La orden está '{}' y no admite recepción. Se muestra el detalle.",
                        order.status
                    ),
                };
                self.notices.push(NoticeLevel::Warning, message);
                self.loaded = Some(Loaded::Detail { order, items });
                Ok(ScreenMode::Detail)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    pub fn mode(&self) -> Option<ScreenMode> {
        self.loaded.as_ref().map(|l| match l {
            Loaded::Receiving(_) => ScreenMode::Receiving,
            Loaded::Detail { .. } => ScreenMode::Detail,
        })
    }

    pub fn order(&self) -> Option<&PurchaseOrder> {
        self.loaded.as_ref().map(|l| match l {
            Loaded::Receiving(session) => session.order(),
            Loaded::Detail { order, .. } => order,
        })
    }

    fn items(&self) -> &[PurchaseOrderItem] {
        match &self.loaded {
            Some(Loaded::Receiving(session)) => session.items(),
            Some(Loaded::Detail { items, .. }) => items,
            None => &[],
        }
    }

    fn session_mut(&mut self) -> Result<&mut ReceivingSession, PurchasingError> {
        match &mut self.loaded {
            Some(Loaded::Receiving(session)) => Ok(session),
            _ => Err(PurchasingError::Validation(
                "this order is not open for receiving".to_string(),
            )),
        }
    }

    /// Store the quantity to receive for an item; returns the clamped value.
    pub fn set_quantity(&mut self, item_id: OrderItemId, requested: i64) -> Result<i64, PurchasingError> {
        let session = self.session_mut()?;
        Ok(session.set_pending(item_id, requested)?)
    }

    /// Same as `set_quantity` for raw field input. Too many digits means
    /// "everything outstanding"; anything else unparseable is 0.
    pub fn set_quantity_text(&mut self, item_id: OrderItemId, text: &str) -> Result<i64, PurchasingError> {
        let requested = match text.trim().parse::<i64>() {
            Ok(quantity) => quantity,
            Err(err) if *err.kind() == IntErrorKind::PosOverflow => i64::MAX,
            Err(_) => 0,
        };
        self.set_quantity(item_id, requested)
    }

    pub fn rows(&self) -> Vec<ReceivingRow> {
        let pending_of = |item: &PurchaseOrderItem| match &self.loaded {
            Some(Loaded::Receiving(session)) => session.pending(item.id).unwrap_or(0),
            _ => 0,
        };

        self.items()
            .iter()
            .map(|item| ReceivingRow {
                item_id: item.id,
                product: item.display_name(),
                ordered: item.quantity,
                received: item.received_quantity,
                remaining: item.remaining(),
                to_receive: pending_of(item),
            })
            .collect()
    }

    /// Percentage of ordered units received so far.
    pub fn progress(&self) -> f64 {
        calculate_order_progress(self.items())
    }

    /// Shared flag the view can poll to disable the save button.
    pub fn saving_flag(&self) -> Arc<AtomicBool> {
        self.saving.clone()
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    pub fn save_label(&self) -> &'static str {
        if self.is_saving() { SAVING_LABEL } else { SAVE_LABEL }
    }

    pub fn can_save(&self) -> bool {
        !self.is_saving()
            && matches!(&self.loaded, Some(Loaded::Receiving(s)) if s.has_pending())
    }

    /// "Guardar Recepción": commit the entered quantities.
    ///
    /// On failure the entered quantities are kept so the operator can retry.
    pub async fn save(&mut self) -> Result<PrintOffer, PurchasingError> {
        if self
            .saving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PurchasingError::Validation("a save is already in progress".to_string()));
        }

        let result = self.commit().await;
        self.saving.store(false, Ordering::Release);
        result
    }

    async fn commit(&mut self) -> Result<PrintOffer, PurchasingError> {
        let workflow = self.workflow.clone();
        let principal = self.principal.clone();
        let session = match self.session_mut() {
            Ok(session) => session,
            Err(err) => return Err(self.fail(err)),
        };
        let order_id = session.order().id;
        let entered: Vec<(OrderItemId, i64)> = session
            .lines()
            .filter(|(_, quantity)| *quantity > 0)
            .map(|(item, quantity)| (item.id, quantity))
            .collect();

        let outcome = match workflow.commit(&principal, session).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if err.requires_reload() {
                    self.reload(order_id, &entered).await;
                }
                return Err(self.fail(err));
            }
        };

        self.inline_error = None;
        self.notices.push(
            NoticeLevel::Success,
            format!(
                "Recepción guardada. La orden quedó '{}' ({:.0}% recibido).",
                outcome.order.status,
                calculate_order_progress(&outcome.items)
            ),
        );

        if !outcome.order.status.can_receive() {
            self.loaded = Some(Loaded::Detail {
                order: outcome.order.clone(),
                items: outcome.items.clone(),
            });
        }

        let offer = PrintOffer {
            formats: PrintFormat::ALL,
            document: ReceiptDocument::from_outcome(&outcome),
        };
        self.print_offer = Some(offer.clone());
        Ok(offer)
    }

    /// Swap a stale session for a fresh one and re-enter what the operator
    /// typed, clamped to what is still outstanding.
    async fn reload(&mut self, order_id: OrderId, entered: &[(OrderItemId, i64)]) {
        match self.workflow.begin_receiving(&self.principal, order_id).await {
            Ok(mut session) => {
                for (item_id, quantity) in entered {
                    if session.set_pending(*item_id, *quantity).is_err() {
                        tracing::debug!("item {} is no longer on order {}", item_id, order_id);
                    }
                }
                self.loaded = Some(Loaded::Receiving(session));
            }
            Err(err @ (PurchasingError::Validation(_) | PurchasingError::Forbidden(_))) => {
                match self.workflow.load(order_id).await {
                    Ok((order, items)) => {
                        tracing::info!("order {} reloaded read-only: {}", order_id, err);
                        self.loaded = Some(Loaded::Detail { order, items });
                    }
                    Err(load_err) => {
                        tracing::warn!("order {} could not be reloaded: {}", order_id, load_err)
                    }
                }
            }
            Err(err) => tracing::warn!("order {} could not be reloaded: {}", order_id, err),
        }
    }

    fn fail(&mut self, err: PurchasingError) -> PurchasingError {
        let message = err.user_message();
        self.inline_error = Some(message.clone());
        self.notices.push(NoticeLevel::Error, message);
        err
    }

    pub fn inline_error(&self) -> Option<&str> {
        self.inline_error.as_deref()
    }

    pub fn print_offer(&self) -> Option<&PrintOffer> {
        self.print_offer.as_ref()
    }

    pub fn notices(&mut self) -> &mut NotificationCenter {
        &mut self.notices
    }

    /// Leave the screen; unsaved quantities are discarded.
    pub fn close(&mut self) {
        if let Some(Loaded::Receiving(session)) = &self.loaded {
            if session.has_pending() {
                tracing::debug!(
                    "discarding {} pending unit(s) for order {}",
                    session.total_pending(),
                    session.order().id
                );
            }
        }
        self.loaded = None;
        self.inline_error = None;
        self.print_offer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use invoria_auth::Role;
    use invoria_core::{ProductId, SupplierId, UserId, WarehouseId};
    use invoria_infra::InMemoryBackend;
    use invoria_infra::event_bus::new_bus;
    use invoria_infra::memory::Operation;
    use invoria_infra::RemoteError;
    use invoria_purchasing::PurchaseOrderStatus;

    fn seeded(status: PurchaseOrderStatus, lines: &[(i64, i64)]) -> (Arc<InMemoryBackend>, OrderId, Vec<OrderItemId>) {
        let backend = Arc::new(InMemoryBackend::new());
        let order = PurchaseOrder {
            id: OrderId::new(),
            supplier_id: SupplierId::new(),
            warehouse_id: WarehouseId::new(),
            order_date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            status,
            total_amount: 0,
            notes: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let items: Vec<_> = lines
            .iter()
            .map(|(q, r)| PurchaseOrderItem {
                id: OrderItemId::new(),
                order_id: order.id,
                product_id: ProductId::new(),
                product_name: Some("Bloque 15x20".to_string()),
                product_sku: Some("BLQ-1520".to_string()),
                quantity: *q,
                unit_price: 1_200,
                total_price: *q as u64 * 1_200,
                received_quantity: *r,
            })
            .collect();
        let ids = items.iter().map(|i| i.id).collect();
        let order_id = order.id;
        backend.seed(order, items);
        (backend, order_id, ids)
    }

    fn screen(backend: &Arc<InMemoryBackend>, role: Role) -> ReceivingScreen {
        let workflow = Arc::new(ReceivingWorkflow::from_backend(backend.clone(), new_bus()));
        ReceivingScreen::new(workflow, Principal::new(UserId::new(), vec![role]))
    }

    #[tokio::test]
    async fn save_commits_and_offers_both_print_formats() {
        let (backend, order_id, ids) = seeded(PurchaseOrderStatus::Sent, &[(10, 0), (5, 5)]);
        let mut screen = screen(&backend, Role::WAREHOUSE);

        assert_eq!(screen.open(order_id).await.unwrap(), ScreenMode::Receiving);
        assert_eq!(screen.set_quantity_text(ids[0], " 6 ").unwrap(), 6);
        assert_eq!(screen.set_quantity(ids[1], 2).unwrap(), 0);
        assert!(screen.can_save());
        assert_eq!(screen.save_label(), SAVE_LABEL);

        let offer = screen.save().await.unwrap();

        assert_eq!(offer.formats, [PrintFormat::Letter, PrintFormat::Roll]);
        assert_eq!(offer.document.lines[0].received_now, 6);
        assert_eq!(offer.document.status, PurchaseOrderStatus::PartiallyReceived);
        assert_eq!(screen.mode(), Some(ScreenMode::Receiving));
        assert_eq!(screen.rows()[0].received, 6);
        assert_eq!(screen.rows()[0].to_receive, 0);
        assert!(screen.inline_error().is_none());
        assert_eq!(
            screen.notices().latest().map(|n| n.level),
            Some(NoticeLevel::Success)
        );
        assert!(!screen.is_saving());
    }

    #[tokio::test]
    async fn completed_orders_switch_to_detail_after_save() {
        let (backend, order_id, ids) = seeded(PurchaseOrderStatus::Sent, &[(4, 0)]);
        let mut screen = screen(&backend, Role::WAREHOUSE);
        screen.open(order_id).await.unwrap();
        screen.set_quantity(ids[0], 4).unwrap();

        screen.save().await.unwrap();

        assert_eq!(screen.mode(), Some(ScreenMode::Detail));
        assert_eq!(screen.progress(), 100.0);
        assert!(screen.set_quantity(ids[0], 1).is_err());
    }

    #[tokio::test]
    async fn non_receivable_orders_open_read_only_with_a_notice() {
        let (backend, order_id, _) = seeded(PurchaseOrderStatus::Draft, &[(4, 0)]);
        let mut screen = screen(&backend, Role::WAREHOUSE);

        assert_eq!(screen.open(order_id).await.unwrap(), ScreenMode::Detail);
        assert_eq!(
            screen.notices().latest().map(|n| n.level),
            Some(NoticeLevel::Warning)
        );
        assert_eq!(backend.write_calls(), 0);
        assert!(!screen.can_save());
    }

    #[tokio::test]
    async fn viewers_get_the_detail_view() {
        let (backend, order_id, _) = seeded(PurchaseOrderStatus::Sent, &[(4, 0)]);
        let mut screen = screen(&backend, Role::VIEWER);

        assert_eq!(screen.open(order_id).await.unwrap(), ScreenMode::Detail);
        assert_eq!(screen.rows().len(), 1);
    }

    #[tokio::test]
    async fn failed_save_keeps_input_and_shows_the_error() {
        let (backend, order_id, ids) = seeded(PurchaseOrderStatus::Sent, &[(10, 0)]);
        let mut screen = screen(&backend, Role::WAREHOUSE);
        screen.open(order_id).await.unwrap();
        screen.set_quantity(ids[0], 3).unwrap();
        backend.fail_on(
            Operation::ApplyMovement,
            1,
            RemoteError::Rejected("almacén cerrado".to_string()),
        );

        let err = screen.save().await.unwrap_err();

        assert!(matches!(err, PurchasingError::StockUpdate { .. }));
        assert!(screen.inline_error().unwrap().contains("almacén cerrado"));
        assert_eq!(screen.rows()[0].to_receive, 3);
        assert!(screen.print_offer().is_none());

        screen.save().await.unwrap();
        assert_eq!(backend.item(ids[0]).unwrap().received_quantity, 3);
    }

    fn received_elsewhere(
        backend: &InMemoryBackend,
        order_id: OrderId,
        item_id: OrderItemId,
        received: i64,
        status: PurchaseOrderStatus,
    ) {
        let mut order = backend.order(order_id).unwrap();
        order.version += 1;
        order.status = status;
        let mut item = backend.item(item_id).unwrap();
        item.received_quantity = received;
        backend.seed(order, vec![item]);
    }

    #[tokio::test]
    async fn conflict_reloads_the_order_and_keeps_the_entered_quantity() {
        let (backend, order_id, ids) = seeded(PurchaseOrderStatus::Sent, &[(10, 0)]);
        let mut screen = screen(&backend, Role::WAREHOUSE);
        screen.open(order_id).await.unwrap();
        screen.set_quantity(ids[0], 2).unwrap();
        received_elsewhere(&backend, order_id, ids[0], 3, PurchaseOrderStatus::PartiallyReceived);

        let err = screen.save().await.unwrap_err();

        assert!(matches!(err, PurchasingError::Conflict(_)), "{err:?}");
        assert!(screen.inline_error().unwrap().contains("recargaron"));
        assert_eq!(screen.mode(), Some(ScreenMode::Receiving));
        assert_eq!(screen.order().unwrap().version, 2);
        assert_eq!(screen.rows()[0].received, 3);
        assert_eq!(screen.rows()[0].to_receive, 2);

        screen.save().await.unwrap();
        assert_eq!(backend.item(ids[0]).unwrap().received_quantity, 5);
    }

    #[tokio::test]
    async fn conflict_clamps_reentered_quantities_to_what_is_left() {
        let (backend, order_id, ids) = seeded(PurchaseOrderStatus::Sent, &[(10, 0)]);
        let mut screen = screen(&backend, Role::WAREHOUSE);
        screen.open(order_id).await.unwrap();
        screen.set_quantity(ids[0], 6).unwrap();
        received_elsewhere(&backend, order_id, ids[0], 7, PurchaseOrderStatus::PartiallyReceived);

        screen.save().await.unwrap_err();

        assert_eq!(screen.rows()[0].remaining, 3);
        assert_eq!(screen.rows()[0].to_receive, 3);
    }

    #[tokio::test]
    async fn conflict_on_a_finished_order_switches_to_detail() {
        let (backend, order_id, ids) = seeded(PurchaseOrderStatus::Sent, &[(10, 0)]);
        let mut screen = screen(&backend, Role::WAREHOUSE);
        screen.open(order_id).await.unwrap();
        screen.set_quantity(ids[0], 2).unwrap();
        received_elsewhere(&backend, order_id, ids[0], 10, PurchaseOrderStatus::Completed);

        let err = screen.save().await.unwrap_err();

        assert!(matches!(err, PurchasingError::Conflict(_)), "{err:?}");
        assert_eq!(screen.mode(), Some(ScreenMode::Detail));
        assert_eq!(screen.rows()[0].received, 10);
        assert!(!screen.can_save());
        assert_eq!(backend.item(ids[0]).unwrap().received_quantity, 10);
    }

    #[tokio::test]
    async fn save_in_flight_rejects_a_second_submission() {
        let (backend, order_id, ids) = seeded(PurchaseOrderStatus::Sent, &[(10, 0)]);
        let mut screen = screen(&backend, Role::WAREHOUSE);
        screen.open(order_id).await.unwrap();
        screen.set_quantity(ids[0], 3).unwrap();
        backend.clear_calls();

        let flag = screen.saving_flag();
        flag.store(true, Ordering::Release);
        assert_eq!(screen.save_label(), SAVING_LABEL);

        let err = screen.save().await.unwrap_err();
        assert_eq!(
            err,
            PurchasingError::Validation("a save is already in progress".to_string())
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn unparseable_input_counts_as_zero() {
        let (backend, order_id, ids) = seeded(PurchaseOrderStatus::Sent, &[(10, 0)]);
        let mut screen = screen(&backend, Role::WAREHOUSE);
        screen.open(order_id).await.unwrap();

        assert_eq!(screen.set_quantity_text(ids[0], "abc").unwrap(), 0);
        assert_eq!(screen.set_quantity_text(ids[0], "-4").unwrap(), 0);
        assert_eq!(screen.set_quantity_text(ids[0], "99").unwrap(), 10);
    }

    #[tokio::test]
    async fn oversized_input_means_everything_outstanding() {
        let (backend, order_id, ids) = seeded(PurchaseOrderStatus::Sent, &[(10, 4)]);
        let mut screen = screen(&backend, Role::WAREHOUSE);
        screen.open(order_id).await.unwrap();

        assert_eq!(screen.set_quantity_text(ids[0], "99999999999999999999").unwrap(), 6);
        assert_eq!(screen.set_quantity_text(ids[0], "-99999999999999999999").unwrap(), 0);
    }

    #[tokio::test]
    async fn close_discards_the_session() {
        let (backend, order_id, ids) = seeded(PurchaseOrderStatus::Sent, &[(10, 0)]);
        let mut screen = screen(&backend, Role::WAREHOUSE);
        screen.open(order_id).await.unwrap();
        screen.set_quantity(ids[0], 3).unwrap();

        screen.close();

        assert_eq!(screen.mode(), None);
        assert!(screen.rows().is_empty());
        assert_eq!(screen.progress(), 0.0);
    }
}
