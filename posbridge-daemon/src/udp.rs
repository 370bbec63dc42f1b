//! UDP cart snapshot listener

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bridge::BridgeCore;
use crate::wire::{parse_datagram, MAX_DATAGRAM};

/// Receive datagrams until cancelled. Malformed payloads are logged and dropped.
pub async fn run(socket: UdpSocket, core: Arc<BridgeCore>, cancel: CancellationToken) {
    let mut buffer = vec![0u8; MAX_DATAGRAM];

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buffer) => received,
        };

        match received {
            Ok((len, peer)) => {
                debug!("UDP datagram from {} ({} bytes)", peer, len);
                match parse_datagram(&buffer[..len]) {
                    Ok(datagram) => {
                        core.handle_datagram(datagram).await;
                    }
                    Err(e) => core
                        .activity()
                        .warning(format!("Dropped datagram from {}: {}", peer, e)),
                }
            }
            Err(e) => core.activity().error(format!("UDP receive error: {}", e)),
        }
    }

    info!("UDP cart listener stopped");
}
