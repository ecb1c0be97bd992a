//! `invoria-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model and optimistic concurrency expectations.

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{
    CommitKey, OrderId, OrderItemId, ProductId, ReceiptId, SupplierId, UserId, WarehouseId,
};
pub use version::{ExpectedVersion, Versioned};
