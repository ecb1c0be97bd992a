//! Remote backend adapter speaking the hosted data API.

mod client;
pub mod rows;

pub use client::RestBackend;
