//! Goods receiving against sent purchase orders.

mod compensation;
mod workflow;

pub use workflow::{ReceivingOutcome, ReceivingWorkflow};
