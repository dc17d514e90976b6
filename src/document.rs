//! Receipt summaries for downstream indexing.
//!
//! Each committed receipt is rendered into one plain-text sentence that the
//! indexing collaborator embeds. The rendering is pure and deterministic:
//! the same receipt always yields the same text, amounts are printed with
//! their full stored precision, and line items keep their fetch order.

use crate::models::{LineItemRecord, ReceiptRecord};

/// Renders the economically relevant facts of a receipt as text.
///
/// ```
/// # use chrono::{TimeZone, Utc};
/// # use rust_decimal::Decimal;
/// # use pos_sync::models::{LineItemRecord, ReceiptRecord};
/// # use pos_sync::document::build_summary;
/// let receipt = ReceiptRecord {
///     receipt_number: "R-100".into(),
///     created_at: Utc.with_ymd_and_hms(2025, 8, 2, 9, 30, 0).unwrap(),
///     total_money: Decimal::new(1250, 2),
///     total_tax: Decimal::ZERO,
///     source: None,
///     customer_id: None,
///     line_items: vec![],
/// };
/// let items = vec![LineItemRecord { item_name: "Latte".into(), quantity: 2, price: Decimal::new(450, 2) }];
/// assert_eq!(
///     build_summary(&receipt, &items),
///     "On 2025-08-02 09:30:00 UTC, receipt R-100 was created totaling $12.50. Items sold: 2 of Latte."
/// );
/// ```
pub fn build_summary(receipt: &ReceiptRecord, line_items: &[LineItemRecord]) -> String {
    let items = if line_items.is_empty() {
        "none".to_string()
    } else {
        line_items
            .iter()
            .map(|item| format!("{} of {}", item.quantity, item.item_name))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "On {}, receipt {} was created totaling ${}. Items sold: {}.",
        receipt.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        receipt.receipt_number,
        receipt.total_money,
        items
    )
}
