use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    /// Buyers: prepare, send and cancel orders.
    pub const PURCHASING: Role = Role(Cow::Borrowed("purchasing"));
    /// Warehouse staff: record goods arriving against sent orders.
    pub const WAREHOUSE: Role = Role(Cow::Borrowed("warehouse"));
    pub const VIEWER: Role = Role(Cow::Borrowed("viewer"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role → permission matrix. Unknown roles grant nothing.
pub fn role_permissions(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "admin" => vec![Permission::WILDCARD],
        "purchasing" => vec![
            Permission::ORDERS_READ,
            Permission::ORDERS_WRITE,
            Permission::ORDERS_SEND,
            Permission::ORDERS_CANCEL,
        ],
        "warehouse" => vec![Permission::ORDERS_READ, Permission::ORDERS_RECEIVE],
        "viewer" => vec![Permission::ORDERS_READ],
        _ => vec![],
    }
}
