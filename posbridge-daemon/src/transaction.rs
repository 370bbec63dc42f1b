//! Transaction state machine
//!
//! Owns the current cart, the active flag and the last total sent to displays.
//! Every input returns the ordered list of events to broadcast; callers apply
//! an input and publish its events outside their lock.

use posbridge_broadcaster::BridgeEvent;
use posbridge_cart::{diff_items, CartSnapshot, DiffEntry, TransactionPhase, TOTAL_EPSILON};

use crate::matcher::StatusClass;

#[derive(Debug, Clone, Default)]
pub struct TransactionMachine {
    snapshot: CartSnapshot,
    active: bool,
    last_broadcast_total: f64,
}

impl TransactionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a full cart snapshot from the register.
    ///
    /// The stored snapshot is always replaced, even when nothing is emitted.
    pub fn on_snapshot(&mut self, snapshot: CartSnapshot) -> Vec<BridgeEvent> {
        let mut events = Vec::new();
        let previous = std::mem::replace(&mut self.snapshot, snapshot);

        if !self.active && !self.snapshot.is_empty() {
            events.push(BridgeEvent::TransactionStarted);
            self.active = true;
            self.last_broadcast_total = 0.0;
        }

        if self.active {
            let entries = diff_items(&previous.items, &self.snapshot.items);
            let changed = !entries.is_empty();

            events.extend(entries.into_iter().map(|entry| match entry {
                DiffEntry::Added(item) => BridgeEvent::ItemAdded(item),
                DiffEntry::Updated { previous, current } => {
                    BridgeEvent::ItemUpdated { previous, current }
                }
                DiffEntry::Removed(item) => BridgeEvent::ItemRemoved(item),
            }));

            let total = self.snapshot.total;
            if changed && (total - self.last_broadcast_total).abs() > TOTAL_EPSILON {
                events.push(BridgeEvent::TotalChanged { total });
                self.last_broadcast_total = total;
            }
        }

        events
    }

    /// Clear command: cancels an active transaction, always resets.
    pub fn on_clear(&mut self) -> Vec<BridgeEvent> {
        let events = if self.active {
            vec![BridgeEvent::TransactionCancelled]
        } else {
            Vec::new()
        };
        self.reset();
        events
    }

    /// Classified status text from the register.
    pub fn on_status(&mut self, class: StatusClass) -> Vec<BridgeEvent> {
        match class {
            StatusClass::Return => {
                let cart = std::mem::take(&mut self.snapshot);
                self.reset();
                vec![BridgeEvent::ReturnCompleted(cart)]
            }
            StatusClass::ConfirmedPayment if !self.snapshot.is_empty() => {
                let cart = std::mem::take(&mut self.snapshot);
                self.reset();
                vec![BridgeEvent::PaymentConfirmed(cart)]
            }
            StatusClass::ConfirmedPayment | StatusClass::Unrecognized => Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.snapshot = CartSnapshot::default();
        self.active = false;
        self.last_broadcast_total = 0.0;
    }

    pub fn phase(&self) -> TransactionPhase {
        if self.active {
            TransactionPhase::Active
        } else {
            TransactionPhase::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn snapshot(&self) -> &CartSnapshot {
        &self.snapshot
    }

    pub fn item_count(&self) -> usize {
        self.snapshot.item_count()
    }

    pub fn total(&self) -> f64 {
        self.snapshot.total
    }

    pub fn last_broadcast_total(&self) -> f64 {
        self.last_broadcast_total
    }
}
