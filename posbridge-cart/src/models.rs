//! Cart data model shared by the daemon and the display broadcaster

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Totals closer than this are treated as unchanged (one kopiyka/cent).
pub const TOTAL_EPSILON: f64 = 0.01;

/// Item mapping keyed by display name, in the order the device reported them.
pub type ItemMap = IndexMap<String, LineItem>;

/// Transaction lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionPhase {
    /// No transaction in progress
    Idle,
    /// Items present, changes are being broadcast
    Active,
}

impl std::fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionPhase::Idle => write!(f, "idle"),
            TransactionPhase::Active => write!(f, "active"),
        }
    }
}

/// One cart line as reported by the register
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    /// Display name, also the de-duplication key
    pub name: String,
    pub unit_price: f64,
    /// Device-reported quantity. Not always consistent with `line_total`.
    pub quantity: i64,
    /// Authoritative amount for receipt math
    pub line_total: f64,
}

impl LineItem {
    pub fn new(name: impl Into<String>, unit_price: f64, quantity: i64, line_total: f64) -> Self {
        Self {
            name: name.into(),
            unit_price,
            quantity,
            line_total,
        }
    }

    /// Quantity to show on a receipt.
    ///
    /// Some register firmware reports a `quantity` that does not match the
    /// printed breakdown, while `line_total` is always right. When a unit price is
    /// known the quantity is recomputed as `line_total / unit_price`, rounded half
    /// away from zero. Without a positive unit price the device value is used as-is.
    pub fn reconciled_quantity(&self) -> i64 {
        if self.unit_price > 0.0 {
            (self.line_total / self.unit_price).round() as i64
        } else {
            self.quantity
        }
    }
}

/// Full cart report: every scanned item plus the running total
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartSnapshot {
    pub items: ItemMap,
    pub total: f64,
}

impl CartSnapshot {
    pub fn new(total: f64) -> Self {
        Self {
            items: ItemMap::new(),
            total,
        }
    }

    /// Build a snapshot from items in arrival order.
    ///
    /// A repeated name replaces the earlier values but keeps the earlier position.
    pub fn from_items(items: impl IntoIterator<Item = LineItem>, total: f64) -> Self {
        let mut snapshot = Self::new(total);
        for item in items {
            snapshot.insert(item);
        }
        snapshot
    }

    pub fn insert(&mut self, item: LineItem) {
        self.items.insert(item.name.clone(), item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct items
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Sum of device-reported quantities, saturating at the `i64` bounds
    pub fn unit_count(&self) -> i64 {
        self.items
            .values()
            .fold(0i64, |units, item| units.saturating_add(item.quantity))
    }
}
