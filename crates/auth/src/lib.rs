//! `invoria-auth`: role-based authorization for purchasing operations.
//!
//! Authentication itself is owned by the hosted backend; this crate only
//! decides whether an already-authenticated principal may perform an action.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize, explain_authorization};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::{Role, role_permissions};
