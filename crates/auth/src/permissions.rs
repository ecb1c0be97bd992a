use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque `module.action` strings (e.g. "purchase_orders.receive").
/// The wildcard `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const ORDERS_READ: Permission = Permission(Cow::Borrowed("purchase_orders.read"));
    /// Create drafts and edit their item lists.
    pub const ORDERS_WRITE: Permission = Permission(Cow::Borrowed("purchase_orders.write"));
    pub const ORDERS_SEND: Permission = Permission(Cow::Borrowed("purchase_orders.send"));
    pub const ORDERS_RECEIVE: Permission = Permission(Cow::Borrowed("purchase_orders.receive"));
    pub const ORDERS_CANCEL: Permission = Permission(Cow::Borrowed("purchase_orders.cancel"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
