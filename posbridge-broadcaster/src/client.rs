use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use crate::error::{BroadcasterError, Result};

pub type ClientId = u64;

/// Display client connection wrapper (write side only)
pub struct Client {
    id: ClientId,
    addr: SocketAddr,
    writer: OwnedWriteHalf,
    alive: bool,
}

impl Client {
    pub fn new(id: ClientId, addr: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            id,
            addr,
            writer,
            alive: true,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send one text message, bounded by `timeout`
    pub async fn send_text(&mut self, text: &str, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.writer.write_all(text.as_bytes())).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(BroadcasterError::WriteTimeout),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("Client {} shutdown error: {}", self.addr, e);
        }
    }
}

fn remove_dead(clients: &mut Vec<Client>) -> usize {
    let before = clients.len();
    clients.retain(|client| client.alive);
    before - clients.len()
}

/// Thread-safe display client registry
pub struct ClientManager {
    clients: Arc<Mutex<Vec<Client>>>,
    next_id: AtomicU64,
    write_timeout: Duration,
}

impl ClientManager {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            clients: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            write_timeout,
        }
    }

    pub fn next_client_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Greet a new client, then add it to the broadcast list.
    ///
    /// Broadcasts issued before this returns are not delivered to the client.
    pub async fn register(&self, mut client: Client, banner: &str) -> Result<()> {
        client.send_text(banner, self.write_timeout).await?;

        let mut clients = self.clients.lock().await;
        clients.push(client);
        tracing::info!("New client connected. Total clients: {}", clients.len());
        Ok(())
    }

    /// Send `text` to every client, then drop the ones that failed.
    ///
    /// Returns the number of clients that received the message.
    pub async fn broadcast(&self, text: &str) -> usize {
        self.broadcast_all(&[text]).await
    }

    /// Send a batch of messages in one pass over the registry.
    ///
    /// Each client gets the whole batch in order before the next client is
    /// served; no other broadcast can interleave with it. A client whose write
    /// fails or times out is marked dead, skips the rest of the batch, and is
    /// dropped once the pass is over. Returns the number of clients that
    /// received every message.
    pub async fn broadcast_all<T: AsRef<str>>(&self, texts: &[T]) -> usize {
        let mut clients = self.clients.lock().await;
        let mut delivered = 0;

        for client in clients.iter_mut() {
            for text in texts {
                if let Err(e) = client.send_text(text.as_ref(), self.write_timeout).await {
                    tracing::warn!("Failed to send to client {}: {}", client.addr, e);
                    client.alive = false;
                    break;
                }
            }
            if client.alive {
                delivered += 1;
            }
        }

        let removed = remove_dead(&mut clients);
        if removed > 0 {
            tracing::info!("Removed {} dead client(s). Remaining: {}", removed, clients.len());
        }

        delivered
    }

    /// Remove a client whose peer disconnected
    pub async fn unregister(&self, id: ClientId) -> bool {
        let mut clients = self.clients.lock().await;
        match clients.iter().position(|client| client.id == id) {
            Some(idx) => {
                let mut client = clients.remove(idx);
                client.close().await;
                tracing::info!("Client {} disconnected. Remaining: {}", client.addr, clients.len());
                true
            }
            None => false,
        }
    }

    /// Close and forget every client
    pub async fn disconnect_all(&self) -> usize {
        let mut clients = self.clients.lock().await;
        let count = clients.len();
        for mut client in clients.drain(..) {
            client.close().await;
        }
        count
    }

    /// Get current client count
    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }
}
