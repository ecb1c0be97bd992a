//! `invoria-desktop`
//!
//! **Responsibility:** controllers behind the purchasing screens of the
//! desktop client.
//!
//! The hosted backend remains the authority; this crate holds per-screen
//! state (the receiving session), turns workflow results into rows, notices
//! and print offers, and wires the application at startup.

pub mod controller;
pub mod notifications;
pub mod print;
pub mod state;

pub use controller::{PrintOffer, ReceivingRow, ReceivingScreen, ScreenMode};
pub use notifications::{Notice, NoticeLevel, NotificationCenter};
pub use print::{PrintFormat, ReceiptDocument, ReceiptDocumentLine};
pub use state::AppState;
