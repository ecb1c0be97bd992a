use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use invoria_core::{DomainError, UserId};

use crate::{Permission, Principal, role_permissions};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden(perm) => DomainError::forbidden(perm),
        }
    }
}

/// Effective permissions: role grants plus explicit grants, sorted.
fn effective_permissions(principal: &Principal) -> BTreeSet<String> {
    principal
        .roles
        .iter()
        .flat_map(role_permissions)
        .chain(principal.permissions.iter().cloned())
        .map(|p| p.as_str().to_string())
        .collect()
}

/// Authorize a principal for a single permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms = effective_permissions(principal);

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Detailed explanation of an authorization decision (audit trail).
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub user_id: UserId,
    pub required_permission: String,
    pub granted: bool,
    pub reason: String,
    pub roles: Vec<String>,
    pub effective_permissions: Vec<String>,
}

/// Explain why an authorization decision was made (or would be made).
pub fn explain_authorization(
    principal: &Principal,
    required: &Permission,
) -> AuthorizationExplanation {
    let perms = effective_permissions(principal);
    let has_wildcard = perms.contains("*");
    let granted = has_wildcard || perms.contains(required.as_str());

    let reason = if has_wildcard {
        "principal has wildcard permission '*'".to_string()
    } else if granted {
        format!("principal has permission '{required}'")
    } else {
        format!("principal does not have permission '{required}'")
    };

    AuthorizationExplanation {
        user_id: principal.user_id,
        required_permission: required.as_str().to_string(),
        granted,
        reason,
        roles: principal.roles.iter().map(|r| r.as_str().to_string()).collect(),
        effective_permissions: perms.into_iter().collect(),
    }
}
