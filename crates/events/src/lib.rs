//! Domain events and their in-process distribution.
//!
//! Purchasing operations describe what happened as immutable events; the
//! desktop layer subscribes to them for operator notifications.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
