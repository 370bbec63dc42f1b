use posbridge_cart::receipt::{self, CURRENCY, EMPTY_RETURN};
use posbridge_cart::{CartSnapshot, LineItem};

/// Event types broadcast to display clients
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// First non-empty snapshot after idle
    TransactionStarted,

    /// New line in the cart
    ItemAdded(LineItem),

    /// Quantity or line total of an existing line changed
    ItemUpdated { previous: LineItem, current: LineItem },

    /// Line dropped from the cart (carries the last known values)
    ItemRemoved(LineItem),

    /// Running total moved by more than a cent
    TotalChanged { total: f64 },

    /// Payment confirmed on the status channel - sale receipt
    PaymentConfirmed(CartSnapshot),

    /// Return detected on the status channel; empty cart means no item context
    ReturnCompleted(CartSnapshot),

    /// Cart cleared while a transaction was active
    TransactionCancelled,
}

fn rule(width: usize) -> String {
    "=".repeat(width)
}

fn amount_line(item: &LineItem) -> String {
    format!(
        "{}x{:.2} = {:.2} {}",
        item.quantity, item.unit_price, item.line_total, CURRENCY
    )
}

impl BridgeEvent {
    /// Short event tag for logs
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeEvent::TransactionStarted => "transaction_started",
            BridgeEvent::ItemAdded(_) => "item_added",
            BridgeEvent::ItemUpdated { .. } => "item_updated",
            BridgeEvent::ItemRemoved(_) => "item_removed",
            BridgeEvent::TotalChanged { .. } => "total_changed",
            BridgeEvent::PaymentConfirmed(_) => "payment_confirmed",
            BridgeEvent::ReturnCompleted(_) => "return_completed",
            BridgeEvent::TransactionCancelled => "transaction_cancelled",
        }
    }

    /// Render the event as the text block a display client receives
    pub fn to_display_text(&self) -> String {
        match self {
            BridgeEvent::TransactionStarted => "=== TRANSACTION STARTED ===\n\n".to_string(),
            BridgeEvent::ItemAdded(item) => {
                format!("+ {}  {}\n", item.name, amount_line(item))
            }
            BridgeEvent::ItemRemoved(item) => {
                format!("- {}  {}\n", item.name, amount_line(item))
            }
            BridgeEvent::ItemUpdated { previous, current } => {
                let delta = current.quantity.saturating_sub(previous.quantity);
                let now = amount_line(current);
                if delta > 0 {
                    format!("+ {}  +{} (now: {})\n", current.name, delta, now)
                } else if delta < 0 {
                    format!("- {}  -{} (now: {})\n", current.name, delta.unsigned_abs(), now)
                } else {
                    format!("~ {}  (now: {})\n", current.name, now)
                }
            }
            BridgeEvent::TotalChanged { total } => {
                format!("TOTAL: {:.2} {}\n{}\n", total, CURRENCY, rule(30))
            }
            BridgeEvent::PaymentConfirmed(cart) => {
                format!(
                    "\n{}\n{}\n{}\n",
                    rule(40),
                    receipt::format_success(&cart.items, cart.total),
                    rule(40)
                )
            }
            BridgeEvent::ReturnCompleted(cart) if cart.is_empty() => EMPTY_RETURN.to_string(),
            BridgeEvent::ReturnCompleted(cart) => {
                format!("{}\n", receipt::format_return(&cart.items, cart.total))
            }
            BridgeEvent::TransactionCancelled => format!("{}\n\n", receipt::format_cancel()),
        }
    }
}

/// Greeting sent to every display client before it joins the broadcast list
pub fn welcome_banner() -> String {
    format!(
        "=== POS Bridge v{} ===\nReal-time updates enabled\nWaiting for transaction...\n{}\n",
        env!("CARGO_PKG_VERSION"),
        rule(40)
    )
}
