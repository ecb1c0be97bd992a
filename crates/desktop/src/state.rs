//! Application state shared across screens.

use std::sync::Arc;

use anyhow::Context;

use invoria_auth::Principal;
use invoria_infra::event_bus::{PurchasingBus, new_bus};
use invoria_infra::{AppConfig, InMemoryBackend, PurchaseOrderService, ReceivingWorkflow, RestBackend};

use crate::controller::ReceivingScreen;

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<ReceivingWorkflow>,
    pub orders: Arc<PurchaseOrderService>,
    pub bus: Arc<PurchasingBus>,
    pub principal: Principal,
}

impl AppState {
    /// Read configuration from the environment, install logging and connect
    /// to the hosted backend.
    pub fn bootstrap(principal: Principal) -> anyhow::Result<Self> {
        let config = AppConfig::from_env().context("loading configuration")?;
        invoria_observability::init(config.log_format);
        Self::connect(&config, principal)
    }

    pub fn connect(config: &AppConfig, principal: Principal) -> anyhow::Result<Self> {
        let backend = RestBackend::new(&config.backend)
            .with_context(|| format!("creating HTTP client for {}", config.backend.base_url()))?;

        tracing::info!(
            "connected to {} as user {}",
            config.backend.base_url(),
            principal.user_id
        );
        Ok(Self::with_backend(Arc::new(backend), principal))
    }

    /// Wire everything to a local in-memory backend (demos, tests).
    pub fn in_memory(backend: Arc<InMemoryBackend>, principal: Principal) -> Self {
        Self::with_backend(backend, principal)
    }

    fn with_backend<B>(backend: Arc<B>, principal: Principal) -> Self
    where
        B: invoria_infra::OrderRepository
            + invoria_infra::ReceiptRecorder
            + invoria_infra::StockMutator
            + 'static,
    {
        let bus = new_bus();
        Self {
            workflow: Arc::new(ReceivingWorkflow::from_backend(backend.clone(), bus.clone())),
            orders: Arc::new(PurchaseOrderService::from_backend(backend, bus.clone())),
            bus,
            principal,
        }
    }

    /// A fresh receiving screen for the signed-in operator.
    pub fn receiving_screen(&self) -> ReceivingScreen {
        ReceivingScreen::new(self.workflow.clone(), self.principal.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::NaiveDate;
    use invoria_auth::Role;
    use invoria_core::{ProductId, SupplierId, UserId, WarehouseId};
    use invoria_purchasing::{NewOrderLine, NewPurchaseOrder, PurchaseOrderStatus};

    use crate::controller::ScreenMode;

    #[test]
    fn connect_builds_a_rest_backend_from_config() {
        let config = AppConfig::from_vars(HashMap::from([
            ("INVORIA_BACKEND__URL".to_string(), "http://localhost:54321".to_string()),
            ("INVORIA_BACKEND__API_KEY".to_string(), "anon".to_string()),
        ]))
        .unwrap();
        let principal = Principal::new(UserId::new(), vec![Role::VIEWER]);

        assert!(AppState::connect(&config, principal).is_ok());
    }

    #[tokio::test]
    async fn draft_send_and_receive_through_the_app_state() {
        let backend = Arc::new(InMemoryBackend::new());
        let admin = Principal::new(UserId::new(), vec![Role::ADMIN]);
        let state = AppState::in_memory(backend.clone(), admin.clone());

        let (order, items) = state
            .orders
            .create_draft(
                &admin,
                NewPurchaseOrder {
                    supplier_id: SupplierId::new(),
                    warehouse_id: WarehouseId::new(),
                    order_date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
                    notes: None,
                    lines: vec![NewOrderLine {
                        product_id: ProductId::new(),
                        quantity: 8,
                        unit_price: 4_500,
                    }],
                },
            )
            .await
            .unwrap();
        state.orders.send(&admin, order.id).await.unwrap();

        let mut screen = state.receiving_screen();
        assert_eq!(screen.open(order.id).await.unwrap(), ScreenMode::Receiving);
        screen.set_quantity(items[0].id, 8).unwrap();
        screen.save().await.unwrap();

        let (stored, _) = state.orders.get(&admin, order.id).await.unwrap();
        assert_eq!(stored.status, PurchaseOrderStatus::Completed);
        assert_eq!(
            state.orders.receipt_history(&admin, order.id).await.unwrap().len(),
            1
        );
    }
}
