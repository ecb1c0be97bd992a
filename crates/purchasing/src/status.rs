//! Purchase order status lifecycle.

use serde::{Deserialize, Serialize};

use invoria_core::{DomainError, DomainResult};

/// Purchase order status.
///
/// Serialized with the values the backend stores (`borrador`, `enviada`, ...).
/// Parsing additionally accepts the English snake_case names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PurchaseOrderStatus {
    #[default]
    #[serde(rename = "borrador")]
    Draft,
    #[serde(rename = "enviada")]
    Sent,
    #[serde(rename = "recibida_parcialmente")]
    PartiallyReceived,
    #[serde(rename = "completada")]
    Completed,
    #[serde(rename = "cancelada")]
    Cancelled,
}

impl PurchaseOrderStatus {
    /// Value stored by the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "borrador",
            Self::Sent => "enviada",
            Self::PartiallyReceived => "recibida_parcialmente",
            Self::Completed => "completada",
            Self::Cancelled => "cancelada",
        }
    }

    /// Goods may be received only against sent or partially received orders.
    pub fn can_receive(&self) -> bool {
        matches!(self, Self::Sent | Self::PartiallyReceived)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, Self::Draft | Self::Sent)
    }

    /// The item list can only be edited while drafting.
    pub fn can_edit_items(&self) -> bool {
        matches!(self, Self::Draft)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `partially_received → partially_received` is allowed: a second partial
    /// receipt leaves the status unchanged.
    pub fn can_transition_to(&self, next: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;
        matches!(
            (self, next),
            (Draft, Sent)
                | (Draft, Cancelled)
                | (Sent, Cancelled)
                | (Sent, PartiallyReceived)
                | (Sent, Completed)
                | (PartiallyReceived, PartiallyReceived)
                | (PartiallyReceived, Completed)
        )
    }

    pub fn transition_to(&self, next: PurchaseOrderStatus) -> DomainResult<PurchaseOrderStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::invalid_transition(self, next))
        }
    }
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PurchaseOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "borrador" | "draft" => Ok(Self::Draft),
            "enviada" | "sent" => Ok(Self::Sent),
            "recibida_parcialmente" | "partially_received" => Ok(Self::PartiallyReceived),
            "completada" | "completed" => Ok(Self::Completed),
            "cancelada" | "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown purchase order status: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PurchaseOrderStatus::*;
    use super::*;

    const ALL: [PurchaseOrderStatus; 5] = [Draft, Sent, PartiallyReceived, Completed, Cancelled];

    #[test]
    fn only_sent_and_partially_received_accept_receipts() {
        let receivable: Vec<_> = ALL.into_iter().filter(|s| s.can_receive()).collect();
        assert_eq!(receivable, vec![Sent, PartiallyReceived]);
    }

    #[test]
    fn cancellation_only_from_draft_or_sent() {
        for status in ALL {
            assert_eq!(
                status.can_transition_to(Cancelled),
                matches!(status, Draft | Sent),
                "{status}"
            );
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for from in [Completed, Cancelled] {
            for to in ALL {
                assert!(from.transition_to(to).is_err(), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn lifecycle_never_moves_backwards() {
        assert!(PartiallyReceived.transition_to(Sent).is_err());
        assert!(Sent.transition_to(Draft).is_err());
        assert_eq!(
            Draft.transition_to(Completed),
            Err(DomainError::InvalidTransition {
                from: "borrador".to_string(),
                to: "completada".to_string(),
            })
        );
    }

    #[test]
    fn wire_values_round_trip_and_english_names_parse() {
        assert_eq!(
            serde_json::to_string(&PartiallyReceived).unwrap(),
            "\"recibida_parcialmente\""
        );
        assert_eq!("partially_received".parse::<PurchaseOrderStatus>().unwrap(), PartiallyReceived);
        assert_eq!("Canceled".parse::<PurchaseOrderStatus>().unwrap(), Cancelled);
        assert!("archived".parse::<PurchaseOrderStatus>().is_err());
    }
}
