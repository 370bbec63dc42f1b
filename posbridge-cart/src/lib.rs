//! Cart model for the posbridge register bridge
//!
//! Pure, I/O-free building blocks shared by the daemon and the display
//! broadcaster:
//!
//! - [`CartSnapshot`] / [`LineItem`] - full cart reports from the register
//! - [`diff_items`] / [`diff_snapshots`] - per-item deltas between two snapshots
//! - [`receipt`] - sale, return and cancellation receipt text

pub mod diff;
pub mod models;
pub mod receipt;

// Re-export main types
pub use diff::{diff_items, diff_snapshots, CartDiff, DiffEntry};
pub use models::{CartSnapshot, ItemMap, LineItem, TransactionPhase, TOTAL_EPSILON};
