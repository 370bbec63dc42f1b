//! Shared state behind the ingress listeners
//!
//! One lock guards the transaction machine. Each input is applied and its
//! events decided while holding it. Before that lock is released the caller
//! queues on the publish lock, so event batches reach displays in the order
//! the machine produced them while the next input can already be applied.

use posbridge_broadcaster::{BridgeEvent, DisplayBroadcaster};
use posbridge_cart::TransactionPhase;
use tokio::sync::Mutex;

use crate::activity::{ActivityLog, Severity};
use crate::matcher::StatusClass;
use crate::transaction::TransactionMachine;
use crate::wire::Datagram;

/// Read-only view of the transaction for observers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartSummary {
    pub phase: TransactionPhase,
    pub item_count: usize,
    pub unit_count: i64,
    pub total: f64,
}

pub struct BridgeCore {
    machine: Mutex<TransactionMachine>,
    /// Held from the end of a machine step until its events are sent
    publish_order: Mutex<()>,
    broadcaster: DisplayBroadcaster,
    activity: ActivityLog,
}

impl BridgeCore {
    pub fn new(broadcaster: DisplayBroadcaster, activity: ActivityLog) -> Self {
        Self {
            machine: Mutex::new(TransactionMachine::new()),
            publish_order: Mutex::new(()),
            broadcaster,
            activity,
        }
    }

    pub fn broadcaster(&self) -> &DisplayBroadcaster {
        &self.broadcaster
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    /// Forget any cart left over from a previous run
    pub async fn reset(&self) {
        *self.machine.lock().await = TransactionMachine::new();
    }

    pub async fn summary(&self) -> CartSummary {
        let machine = self.machine.lock().await;
        let cart = machine.snapshot();
        CartSummary {
            phase: machine.phase(),
            item_count: cart.item_count(),
            unit_count: cart.unit_count(),
            total: cart.total,
        }
    }

    /// Apply a decoded UDP datagram and broadcast the resulting events.
    pub async fn handle_datagram(&self, datagram: Datagram) -> Vec<BridgeEvent> {
        let is_clear = datagram == Datagram::Clear;

        let mut machine = self.machine.lock().await;
        let events = match datagram {
            Datagram::Clear => machine.on_clear(),
            Datagram::Snapshot(snapshot) => machine.on_snapshot(snapshot),
        };
        let cart = machine.snapshot();
        let summary = (!cart.is_empty()).then(|| {
            format!(
                "Cart: {} item(s) ({} unit(s)) | Total: {:.2}",
                cart.item_count(),
                cart.unit_count(),
                cart.total
            )
        });
        // tokio's Mutex is fair: queueing here keeps machine order
        let _publishing = self.publish_order.lock().await;
        drop(machine);

        if is_clear && events.is_empty() {
            self.activity.info("Clear received - no active transaction");
        }
        self.report(&events);
        if let Some(summary) = summary {
            self.activity.info(summary);
        }

        self.broadcaster.publish(&events).await;
        events
    }

    /// Apply a classified status message and broadcast the resulting events.
    pub async fn handle_status(&self, class: StatusClass) -> Vec<BridgeEvent> {
        let mut machine = self.machine.lock().await;
        let events = machine.on_status(class);
        let _publishing = self.publish_order.lock().await;
        drop(machine);

        self.report(&events);
        self.broadcaster.publish(&events).await;
        events
    }

    fn report(&self, events: &[BridgeEvent]) {
        for event in events {
            let (severity, message) = describe(event);
            self.activity.record(severity, message);
        }
    }
}

fn describe(event: &BridgeEvent) -> (Severity, String) {
    match event {
        BridgeEvent::TransactionStarted => (Severity::Success, "New transaction started".to_string()),
        BridgeEvent::ItemAdded(item) => (Severity::Info, format!("+ ADDED: {}", item.name)),
        BridgeEvent::ItemUpdated { current, .. } => (
            Severity::Info,
            format!("~ UPDATED: {} (quantity: {})", current.name, current.quantity),
        ),
        BridgeEvent::ItemRemoved(item) => (Severity::Warning, format!("- REMOVED: {}", item.name)),
        BridgeEvent::TotalChanged { total } => (Severity::Info, format!("Total updated: {:.2}", total)),
        BridgeEvent::PaymentConfirmed(cart) => (
            Severity::Success,
            format!("Payment confirmed, transaction completed | Total: {:.2}", cart.total),
        ),
        BridgeEvent::ReturnCompleted(cart) if cart.is_empty() => {
            (Severity::Warning, "Return without items".to_string())
        }
        BridgeEvent::ReturnCompleted(cart) => (
            Severity::Warning,
            format!("Return completed | Total: {:.2}", cart.total),
        ),
        BridgeEvent::TransactionCancelled => (Severity::Warning, "Transaction cancelled".to_string()),
    }
}
