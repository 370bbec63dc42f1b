//! Display client broadcaster for posbridge
//!
//! This crate provides a TCP server that pushes human-readable transaction
//! events to customer-facing displays. It manages multiple concurrent clients,
//! greets each one with a banner, and prunes connections whose writes fail.
//!
//! # Features
//!
//! - TCP listener (default port 4002)
//! - Plain UTF-8 text protocol, one message per event
//! - Welcome banner sent before a client joins the broadcast list
//! - Per-client write timeout; failed clients are dropped after the pass
//! - No replay: late clients only see events broadcast after they joined
//!
//! # Example Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use posbridge_broadcaster::{BridgeEvent, DisplayBroadcaster};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let shutdown = CancellationToken::new();
//!     let broadcaster = DisplayBroadcaster::new(Duration::from_secs(2));
//!     broadcaster.start("0.0.0.0:4002".parse()?, &shutdown).await?;
//!
//!     broadcaster.publish(&[BridgeEvent::TransactionStarted]).await;
//!
//!     broadcaster.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod client;
pub mod error;
pub mod events;

// Re-exports
pub use broadcaster::DisplayBroadcaster;
pub use error::{BroadcasterError, Result};
pub use events::{welcome_banner, BridgeEvent};
