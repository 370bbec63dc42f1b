//! POS bridge daemon library
//!
//! Listens for cart snapshots over UDP and payment / return status text over
//! TCP, tracks the current transaction, and streams its progress to display
//! clients through `posbridge-broadcaster`.
//!
//! ```no_run
//! use posbridge_daemon::{BridgeConfig, BridgeServer};
//!
//! # async fn run() -> posbridge_daemon::Result<()> {
//! let server = BridgeServer::new(BridgeConfig::default())?;
//! server.start().await?;
//! // ...
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod bridge;
pub mod config;
pub mod error;
pub mod matcher;
pub mod probe;
pub mod server;
pub mod status;
pub mod transaction;
pub mod udp;
pub mod wire;

pub use activity::{ActivityEntry, ActivityLog, Severity};
pub use bridge::{BridgeCore, CartSummary};
pub use config::{BridgeConfig, ConfigError, MatcherConfig, PortConfig};
pub use error::{BridgeError, Result};
pub use matcher::{StatusClass, StatusMatcher};
pub use server::{BridgeAddrs, BridgeServer, BridgeStatus};
pub use transaction::TransactionMachine;
pub use wire::{parse_datagram, Datagram, WireError};
