//! Human-readable receipt text for display clients
//!
//! All quantities shown here go through [`LineItem::reconciled_quantity`]: the
//! register's quantity field is known to drift from the printed breakdown, so the
//! receipt trusts the line total instead.

use crate::models::{ItemMap, LineItem};

/// Currency label appended to every amount
pub const CURRENCY: &str = "UAH";

/// Body shown when a return arrives without any cart context
pub const EMPTY_RETURN: &str = "=== RETURN ===\nReturn completed\n=== OPERATION CANCELLED ===\n";

fn breakdown(item: &LineItem) -> String {
    format!(
        "{} x {:.2} = {:.2} {}",
        item.reconciled_quantity(),
        item.unit_price,
        item.line_total,
        CURRENCY
    )
}

/// Sale receipt: item lines, total, thank-you trailer
pub fn format_success(items: &ItemMap, total: f64) -> String {
    let mut lines = vec!["=== RECEIPT ===".to_string()];

    for item in items.values() {
        lines.push(item.name.clone());
        lines.push(breakdown(item));
    }

    lines.push(String::new());
    lines.push(format!("TOTAL: {:.2} {}", total, CURRENCY));
    lines.push("=== PAID ===".to_string());
    lines.push("Thank you for your purchase!".to_string());

    lines.join("\n")
}

/// Return receipt: one block per returned item, return total, cancellation trailer
pub fn format_return(items: &ItemMap, total: f64) -> String {
    let mut lines = vec!["=== RETURN ===".to_string()];

    for item in items.values() {
        lines.push(format!("RETURNED: {}", item.name));
        lines.push(format!("Amount: {}", breakdown(item)));
    }

    lines.push(String::new());
    lines.push(format!("RETURN TOTAL: {:.2} {}", total, CURRENCY));
    lines.push("=== OPERATION CANCELLED ===".to_string());

    lines.join("\n")
}

/// Cancellation notice, no item detail
pub fn format_cancel() -> String {
    "=== OPERATION CANCELLED ===\nCart cleared".to_string()
}
