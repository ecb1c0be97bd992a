//! Distribution of purchasing events after their writes have succeeded.
//!
//! The bus abstraction lives in `invoria-events` as pure mechanics. This
//! module fixes the message type used by the purchasing client and wraps
//! publishing so that a bus failure never fails the operation that caused it.

use std::sync::Arc;

use invoria_events::{EventBus, EventEnvelope, InMemoryEventBus};
use invoria_purchasing::PurchasingEvent;
use invoria_purchasing::events::AGGREGATE_TYPE;

pub type PurchasingEnvelope = EventEnvelope<PurchasingEvent>;
pub type PurchasingBus = InMemoryEventBus<PurchasingEnvelope>;

pub fn new_bus() -> Arc<PurchasingBus> {
    Arc::new(PurchasingBus::new())
}

/// Publish `events` in order. Failures are logged and otherwise ignored.
pub fn publish_all(bus: &PurchasingBus, events: Vec<PurchasingEvent>) -> usize {
    let mut published = 0;
    for event in events {
        let aggregate_id = *event.order_id().as_uuid();
        let envelope = EventEnvelope::wrap(aggregate_id, AGGREGATE_TYPE, event);
        let event_type = envelope.event_type().to_string();
        match bus.publish(envelope) {
            Ok(()) => published += 1,
            Err(err) => {
                tracing::warn!("failed to publish {} for order {}: {:?}", event_type, aggregate_id, err);
            }
        }
    }
    published
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use invoria_core::OrderId;
    use invoria_purchasing::{OrderStatusChanged, PurchaseOrderStatus};

    #[test]
    fn published_events_are_wrapped_with_the_order_id() {
        let bus = new_bus();
        let sub = bus.subscribe();
        let order_id = OrderId::new();

        let count = publish_all(
            &bus,
            vec![PurchasingEvent::OrderStatusChanged(OrderStatusChanged {
                order_id,
                from: PurchaseOrderStatus::Draft,
                to: PurchaseOrderStatus::Sent,
                occurred_at: Utc::now(),
            })],
        );

        assert_eq!(count, 1);
        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.aggregate_id(), *order_id.as_uuid());
        assert_eq!(envelope.aggregate_type(), AGGREGATE_TYPE);
        assert_eq!(envelope.event_type(), "purchasing.order.status_changed");
    }
}
