//! TCP status channel listener
//!
//! The register opens a connection, streams raw text with no framing and either
//! closes it or waits for us to close once a payment or return is recognized.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace};

use crate::bridge::BridgeCore;
use crate::matcher::{StatusClass, StatusMatcher};

const READ_CHUNK: usize = 1024;

/// Characters of undecoded text quoted in logs
const PREVIEW_CHARS: usize = 50;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept status connections until cancelled; each gets its own task on `connections`.
pub async fn run(
    listener: TcpListener,
    core: Arc<BridgeCore>,
    matcher: Arc<StatusMatcher>,
    connections: TaskTracker,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                core.activity().info(format!("Status connection from {}", peer));
                connections.spawn(handle_connection(
                    stream,
                    peer,
                    Arc::clone(&core),
                    Arc::clone(&matcher),
                    cancel.clone(),
                ));
            }
            Err(e) => {
                error!("Failed to accept status connection: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    info!("Status listener stopped");
}

/// Handle a single status connection
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    core: Arc<BridgeCore>,
    matcher: Arc<StatusMatcher>,
    cancel: CancellationToken,
) {
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = stream.read(&mut chunk) => read,
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                core.activity().error(format!("Status connection {} error: {}", peer, e));
                break;
            }
        };

        trace_chunk(&matcher, peer, &chunk[..n]);
        buffer.extend_from_slice(&chunk[..n]);

        let verdict = matcher.inspect(&buffer);
        if verdict.class == StatusClass::Unrecognized {
            if buffer.len() > matcher.max_buffer() {
                core.activity().warning(format!(
                    "Dropping {} unrecognized status bytes from {}",
                    buffer.len(),
                    peer
                ));
                buffer.clear();
            } else {
                let preview: String = verdict.text.chars().take(PREVIEW_CHARS).collect();
                core.activity()
                    .info(format!("Status data not recognized: {}", preview.trim()));
            }
            continue;
        }

        debug!(
            "Status {} via {:?} ({} decoding)",
            verdict.class, verdict.indicator, verdict.encoding
        );

        if core.handle_status(verdict.class).await.is_empty() {
            // Payment text with an empty cart: nothing to confirm yet
            debug!("Ignoring {} from {}: cart is empty", verdict.class, peer);
            continue;
        }
        break;
    }

    if let Err(e) = stream.shutdown().await {
        debug!("Status connection {} shutdown error: {}", peer, e);
    }
    core.activity().info(format!("Status connection closed: {}", peer));
}

fn trace_chunk(matcher: &StatusMatcher, peer: SocketAddr, chunk: &[u8]) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }

    trace!("Status chunk from {} ({} bytes): {}", peer, chunk.len(), hex::encode(chunk));
    for (encoding, text) in matcher.candidate_decodings(chunk) {
        trace!("  {}: {}", encoding, text);
    }
}
