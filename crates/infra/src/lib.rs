//! Infrastructure layer: remote backend adapters, configuration and the
//! purchasing workflows that orchestrate them.

pub mod config;
pub mod error;
pub mod event_bus;
pub mod memory;
pub mod orders;
pub mod ports;
pub mod receiving;
pub mod rest;


pub use config::{AppConfig, BackendConfig, ConfigError};
pub use event_bus::{PurchasingBus, PurchasingEnvelope};
pub use memory::InMemoryBackend;
pub use orders::PurchaseOrderService;
pub use ports::{OrderFilter, OrderRepository, ReceiptRecorder, RemoteError, StockMutator};
pub use error::PurchasingError;
pub use receiving::{ReceivingOutcome, ReceivingWorkflow};
pub use rest::RestBackend;
