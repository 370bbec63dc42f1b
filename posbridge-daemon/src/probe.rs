//! Operator test senders
//!
//! Stand-ins for the register: push a sample cart, a clear command or a status
//! text at a running bridge.

use std::net::SocketAddr;

use anyhow::{anyhow, Context, Result};
use encoding_rs::Encoding;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tracing::info;

/// Default text for `send_status_text`
pub const SAMPLE_STATUS_TEXT: &str = "дякуємо за покупку";

/// Default encoding for `send_status_text`
pub const SAMPLE_STATUS_ENCODING: &str = "windows-1251";

/// Two-item cart: 15.50 x 2 and 25.00 x 1, total 56.00
pub fn sample_snapshot() -> Value {
    json!({
        "cmd": {"cmd": ""},
        "goods": [
            {"fPName": "Test item 1", "fPrice": 15.50, "fQtty": 2, "fSum": 31.00},
            {"fPName": "Test item 2", "fPrice": 25.00, "fQtty": 1, "fSum": 25.00}
        ],
        "sum": {"sum": 56.00}
    })
}

pub fn clear_command() -> Value {
    json!({"cmd": {"cmd": "clear"}})
}

async fn send_datagram(addr: SocketAddr, document: &Value) -> Result<usize> {
    let local: SocketAddr = if addr.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await.context("Failed to bind UDP socket")?;

    let payload = serde_json::to_vec(document)?;
    let sent = socket
        .send_to(&payload, addr)
        .await
        .with_context(|| format!("Failed to send datagram to {}", addr))?;
    Ok(sent)
}

pub async fn send_sample_snapshot(addr: SocketAddr) -> Result<usize> {
    let sent = send_datagram(addr, &sample_snapshot()).await?;
    info!("Sent sample cart ({} bytes) to {}", sent, addr);
    Ok(sent)
}

pub async fn send_clear(addr: SocketAddr) -> Result<usize> {
    let sent = send_datagram(addr, &clear_command()).await?;
    info!("Sent clear command to {}", addr);
    Ok(sent)
}

/// Encode `text` with the WHATWG `encoding` label and write it to the status port
pub async fn send_status_text(addr: SocketAddr, text: &str, encoding: &str) -> Result<usize> {
    let encoding = Encoding::for_label(encoding.as_bytes())
        .ok_or_else(|| anyhow!("Unknown text encoding: {}", encoding))?;
    let (bytes, used, unmappable) = encoding.encode(text);
    if unmappable {
        return Err(anyhow!("Text cannot be represented in {}", used.name()));
    }

    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to status port {}", addr))?;
    stream.write_all(&bytes).await?;
    stream.shutdown().await?;

    info!("Sent {} status bytes ({}) to {}", bytes.len(), used.name(), addr);
    Ok(bytes.len())
}
