//! Register UDP document decoding
//!
//! Each datagram is a JSON document carrying the complete cart:
//!
//! ```json
//! {"cmd": {"cmd": ""},
//!  "goods": [{"fPName": "Milk", "fPrice": 15.5, "fQtty": 2, "fSum": 31.0}],
//!  "sum": {"sum": 31.0}}
//! ```
//!
//! `cmd.cmd == "clear"` resets the cart; any other command is a snapshot.

use posbridge_cart::{CartSnapshot, LineItem};
use serde::Deserialize;
use thiserror::Error;

/// Largest possible UDP payload
pub const MAX_DATAGRAM: usize = 65_535;

const CLEAR_COMMAND: &str = "clear";

/// Largest absolute quantity accepted for one line
pub const MAX_QUANTITY: f64 = 1_000_000.0;

/// Largest absolute money value (price, line total, cart total) accepted
pub const MAX_AMOUNT: f64 = 1e12;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Malformed cart document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} {value} is out of range")]
    OutOfRange { field: &'static str, value: f64 },
}

fn check_range(field: &'static str, value: f64, limit: f64) -> Result<f64, WireError> {
    if value.is_finite() && value.abs() <= limit {
        Ok(value)
    } else {
        Err(WireError::OutOfRange { field, value })
    }
}

/// Decoded UDP datagram
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    Clear,
    Snapshot(CartSnapshot),
}

#[derive(Debug, Default, Deserialize)]
struct WireDocument {
    #[serde(default)]
    cmd: Option<WireCommand>,
    #[serde(default)]
    goods: Option<Vec<WireGood>>,
    #[serde(default)]
    sum: Option<WireSum>,
}

#[derive(Debug, Default, Deserialize)]
struct WireCommand {
    #[serde(default)]
    cmd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireGood {
    #[serde(rename = "fPName", default)]
    name: Option<String>,
    #[serde(rename = "fPrice", default)]
    price: Option<f64>,
    #[serde(rename = "fQtty", default)]
    quantity: Option<f64>,
    #[serde(rename = "fSum", default)]
    sum: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct WireSum {
    #[serde(default)]
    sum: Option<f64>,
}

/// Parse one datagram.
///
/// Goods without a name are skipped; missing numbers count as zero. A number
/// outside [`MAX_QUANTITY`] / [`MAX_AMOUNT`] rejects the whole datagram.
pub fn parse_datagram(payload: &[u8]) -> Result<Datagram, WireError> {
    let document: WireDocument = serde_json::from_slice(payload)?;

    let command = document.cmd.and_then(|cmd| cmd.cmd).unwrap_or_default();
    if command == CLEAR_COMMAND {
        return Ok(Datagram::Clear);
    }

    let mut items = Vec::new();
    for good in document.goods.unwrap_or_default() {
        let Some(name) = good.name.filter(|name| !name.is_empty()) else {
            continue;
        };
        // Quantities arrive as integers or floats; round to the nearest unit
        let quantity = check_range("fQtty", good.quantity.unwrap_or(0.0), MAX_QUANTITY)?;
        items.push(LineItem::new(
            name,
            check_range("fPrice", good.price.unwrap_or(0.0), MAX_AMOUNT)?,
            quantity.round() as i64,
            check_range("fSum", good.sum.unwrap_or(0.0), MAX_AMOUNT)?,
        ));
    }

    let total = check_range("sum", document.sum.and_then(|sum| sum.sum).unwrap_or(0.0), MAX_AMOUNT)?;
    Ok(Datagram::Snapshot(CartSnapshot::from_items(items, total)))
}
