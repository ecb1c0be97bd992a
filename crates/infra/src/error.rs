//! Errors of purchase order operations (drafting, sending, receiving).

use thiserror::Error;

use invoria_auth::AuthzError;
use invoria_core::DomainError;

use crate::ports::RemoteError;

/// Failure of a purchasing workflow operation, as shown to the operator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PurchasingError {
    /// Local input or lifecycle check failed; nothing was written.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("purchase order not found")]
    NotFound,

    /// Loading the order or its items failed.
    #[error("failed to load from backend: {0}")]
    RemoteRead(#[source] RemoteError),

    /// The stock procedure refused or failed for one item.
    #[error("stock update failed for {item}: {source}")]
    StockUpdate {
        item: String,
        #[source]
        source: RemoteError,
    },

    /// A receipt, item or order write failed.
    #[error("failed to save to backend: {0}")]
    RemoteWrite(#[source] RemoteError),

    /// The order changed since it was loaded. Reload and retry.
    #[error("purchase order was modified concurrently: {0}")]
    Conflict(String),

    /// A commit failed and some of its writes could not be reverted.
    #[error("{cause}; {} step(s) could not be reverted", .unreverted.len())]
    RollbackIncomplete {
        cause: Box<PurchasingError>,
        unreverted: Vec<String>,
    },
}

impl PurchasingError {
    /// Classify a failed write: version mismatches become `Conflict`.
    pub fn write(error: RemoteError) -> Self {
        match error {
            RemoteError::Conflict(msg) => PurchasingError::Conflict(msg),
            RemoteError::NotFound => PurchasingError::NotFound,
            other => PurchasingError::RemoteWrite(other),
        }
    }

    pub fn read(error: RemoteError) -> Self {
        match error {
            RemoteError::NotFound => PurchasingError::NotFound,
            other => PurchasingError::RemoteRead(other),
        }
    }

    /// Whether the screen should reload the order before the next attempt.
    ///
    /// Not after `RollbackIncomplete`: the session still holds the undo
    /// steps the retry has to finish.
    pub fn requires_reload(&self) -> bool {
        matches!(self, PurchasingError::Conflict(_))
    }

    /// Short message for the inline error and the notification.
    pub fn user_message(&self) -> String {
        match self {
            PurchasingError::Validation(msg) => msg.clone(),
            PurchasingError::Forbidden(_) => {
                "No tiene permiso para realizar esta acción.".to_string()
            }
            PurchasingError::NotFound => "La orden de compra no existe.".to_string(),
            PurchasingError::RemoteRead(e) => format!("No se pudo cargar la orden: {e}"),
            PurchasingError::StockUpdate { item, source } => {
                format!("Error al actualizar el stock de {item}: {source}")
            }
            PurchasingError::RemoteWrite(e) => format!("No se pudo guardar la recepción: {e}"),
            PurchasingError::Conflict(_) => {
                "La orden fue modificada por otro usuario. Se recargaron los datos; revise las cantidades y guarde de nuevo."
                    .to_string()
            }
            PurchasingError::RollbackIncomplete { cause, unreverted } => format!(
                "{} Quedaron {} cambio(s) sin revertir; reintente la recepción.",
                cause.user_message(),
                unreverted.len()
            ),
        }
    }
}

impl From<DomainError> for PurchasingError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => PurchasingError::Validation(msg),
            DomainError::InvalidTransition { from, to } => PurchasingError::Validation(format!(
                "purchase order cannot move from '{from}' to '{to}'"
            )),
            DomainError::InvariantViolation(msg) => PurchasingError::Validation(msg),
            DomainError::InvalidId(msg) => PurchasingError::Validation(msg),
            DomainError::NotFound => PurchasingError::NotFound,
            DomainError::Conflict(msg) => PurchasingError::Conflict(msg),
            DomainError::Forbidden(perm) => PurchasingError::Forbidden(perm),
        }
    }
}

impl From<AuthzError> for PurchasingError {
    fn from(value: AuthzError) -> Self {
        DomainError::from(value).into()
    }
}
