//! Receipt printout data offered after a successful save.
//!
//! Only the content is decided here; the view owns the page layout.

use chrono::{DateTime, Utc};
use serde::Serialize;

use invoria_infra::ReceivingOutcome;
use invoria_purchasing::{PurchaseOrderStatus, calculate_order_progress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintFormat {
    /// Full page.
    Letter,
    /// Narrow thermal roll.
    Roll,
}

impl PrintFormat {
    pub const ALL: [PrintFormat; 2] = [PrintFormat::Letter, PrintFormat::Roll];

    /// Characters per line when rendered as plain text.
    pub fn line_width(&self) -> usize {
        match self {
            PrintFormat::Letter => 80,
            PrintFormat::Roll => 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptDocumentLine {
    pub product: String,
    pub ordered: i64,
    pub received_now: i64,
    pub received_total: i64,
    pub remaining: i64,
}

/// What a receiving printout shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptDocument {
    pub order_reference: String,
    pub status: PurchaseOrderStatus,
    pub printed_at: DateTime<Utc>,
    pub lines: Vec<ReceiptDocumentLine>,
    pub progress: f64,
}

impl ReceiptDocument {
    pub fn from_outcome(outcome: &ReceivingOutcome) -> Self {
        let lines = outcome
            .items
            .iter()
            .map(|item| ReceiptDocumentLine {
                product: item.display_name(),
                ordered: item.quantity,
                received_now: outcome
                    .receipts
                    .iter()
                    .filter(|r| r.item_id == item.id)
                    .map(|r| r.quantity)
                    .sum(),
                received_total: item.received_quantity,
                remaining: item.remaining(),
            })
            .collect();

        Self {
            order_reference: outcome.order.reference_label(),
            status: outcome.order.status,
            printed_at: Utc::now(),
            lines,
            progress: calculate_order_progress(&outcome.items),
        }
    }

    /// Plain-text rendition, one row per line that received goods now.
    pub fn render_text(&self, format: PrintFormat) -> String {
        let width = format.line_width();
        let rule = "-".repeat(width);
        let mut out = Vec::new();

        out.push("RECEPCIÓN".to_string());
        out.push(self.order_reference.clone());
        out.push(self.printed_at.format("%Y-%m-%d %H:%M").to_string());
        out.push(rule.clone());
        for line in self.lines.iter().filter(|l| l.received_now > 0) {
            let qty = format!("{} / {}", line.received_total, line.ordered);
            let name_width = width.saturating_sub(qty.len() + 1);
            let name: String = line.product.chars().take(name_width).collect();
            out.push(format!("{name:<name_width$} {qty}"));
            out.push(format!("  + {}", line.received_now));
        }
        out.push(rule);
        out.push(format!("Estado: {}", self.status));
        out.push(format!("Avance: {:.0}%", self.progress));
        out.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> ReceiptDocument {
        ReceiptDocument {
            order_reference: "OC-demo".to_string(),
            status: PurchaseOrderStatus::PartiallyReceived,
            printed_at: Utc::now(),
            lines: vec![
                ReceiptDocumentLine {
                    product: "Varilla corrugada 3/8 de pulgada, 12 metros".to_string(),
                    ordered: 10,
                    received_now: 6,
                    received_total: 6,
                    remaining: 4,
                },
                ReceiptDocumentLine {
                    product: "Alambre".to_string(),
                    ordered: 5,
                    received_now: 0,
                    received_total: 5,
                    remaining: 0,
                },
            ],
            progress: 73.3,
        }
    }

    #[test]
    fn roll_rendition_fits_the_paper() {
        let text = document().render_text(PrintFormat::Roll);
        assert!(text.lines().all(|l| l.chars().count() <= PrintFormat::Roll.line_width()));
        assert!(text.contains("6 / 10"));
        assert!(!text.contains("Alambre"));
        assert!(text.ends_with("Avance: 73%"));
    }

    #[test]
    fn formats_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(PrintFormat::ALL).unwrap(),
            serde_json::json!(["letter", "roll"])
        );
    }
}
