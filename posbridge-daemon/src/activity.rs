//! Operator-facing activity log
//!
//! Entries are mirrored to `tracing` and published on a broadcast channel so a
//! UI (or anything else) can show them live. Slow subscribers lose entries
//! rather than slowing the bridge down.

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ActivityLog {
    tx: broadcast::Sender<ActivityEntry>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEntry> {
        self.tx.subscribe()
    }

    pub fn record(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Info => tracing::info!("{}", message),
            Severity::Success => tracing::info!(severity = "success", "{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
        }

        // No subscribers is fine
        let _ = self.tx.send(ActivityEntry {
            timestamp: Local::now(),
            severity,
            message,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(Severity::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.record(Severity::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.record(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(Severity::Error, message);
    }
}
