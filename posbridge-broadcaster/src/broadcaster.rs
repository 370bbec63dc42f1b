use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::client::{Client, ClientId, ClientManager};
use crate::error::{BroadcasterError, Result};
use crate::events::{welcome_banner, BridgeEvent};

/// Pause after a failed accept so a persistent error does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

struct Running {
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// TCP endpoint that fans transaction events out to display clients
pub struct DisplayBroadcaster {
    client_manager: Arc<ClientManager>,
    banner: String,
    watchers: TaskTracker,
    running: Mutex<Option<Running>>,
}

impl DisplayBroadcaster {
    /// Create new broadcaster; `write_timeout` bounds every client write
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            client_manager: Arc::new(ClientManager::new(write_timeout)),
            banner: welcome_banner(),
            watchers: TaskTracker::new(),
            running: Mutex::new(None),
        }
    }

    /// Bind the client port and start accepting display clients.
    ///
    /// The accept loop also stops when `shutdown` is cancelled.
    pub async fn start(&self, addr: SocketAddr, shutdown: &CancellationToken) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(BroadcasterError::AlreadyRunning);
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BroadcasterError::Bind { port: addr.port(), source })?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Display broadcaster listening on {}", local_addr);

        let cancel = shutdown.child_token();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.client_manager),
            self.banner.clone(),
            self.watchers.clone(),
            cancel.clone(),
        ));

        *running = Some(Running {
            cancel,
            accept_task,
            local_addr,
        });

        Ok(local_addr)
    }

    /// Stop accepting, wait for client watchers, and close every client
    pub async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Err(BroadcasterError::NotStarted);
        };

        running.cancel.cancel();
        if let Err(e) = running.accept_task.await {
            tracing::error!("Client acceptance task failed: {}", e);
        }

        self.watchers.close();
        self.watchers.wait().await;
        self.watchers.reopen();

        let closed = self.client_manager.disconnect_all().await;
        tracing::info!("Display broadcaster stopped ({} client(s) closed)", closed);
        Ok(())
    }

    /// Broadcast events in order, one message per event, in a single registry pass
    pub async fn publish(&self, events: &[BridgeEvent]) {
        if events.is_empty() {
            return;
        }

        let texts: Vec<String> = events.iter().map(BridgeEvent::to_display_text).collect();
        let delivered = self.client_manager.broadcast_all(&texts).await;
        tracing::debug!("Broadcast {} event(s) to {} client(s)", events.len(), delivered);
    }

    /// Broadcast raw text to every registered client
    pub async fn broadcast_text(&self, text: &str) -> usize {
        self.client_manager.broadcast(text).await
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|running| running.local_addr)
    }

    /// Get current client count
    pub async fn client_count(&self) -> usize {
        self.client_manager.client_count().await
    }
}

async fn accept_loop(
    listener: TcpListener,
    client_manager: Arc<ClientManager>,
    banner: String,
    watchers: TaskTracker,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                tracing::info!("Display client connected: {}", addr);
                let (reader, writer) = stream.into_split();
                let id = client_manager.next_client_id();

                // A slow banner write must not hold up the next accept
                watchers.spawn(serve_client(
                    Client::new(id, addr, writer),
                    reader,
                    Arc::clone(&client_manager),
                    banner.clone(),
                    cancel.clone(),
                ));
            }
            Err(e) => {
                tracing::error!("Failed to accept display client: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
    tracing::info!("Client acceptance task stopped");
}

/// Greet and register a new client, then watch it until it goes away
async fn serve_client(
    client: Client,
    reader: OwnedReadHalf,
    client_manager: Arc<ClientManager>,
    banner: String,
    cancel: CancellationToken,
) {
    let (id, addr) = (client.id(), client.addr());
    if let Err(e) = client_manager.register(client, &banner).await {
        tracing::warn!("Failed to send welcome banner to {}: {}", addr, e);
        return;
    }
    watch_client(id, reader, client_manager, cancel).await;
}

/// Drain the (unused) inbound side until the peer hangs up, then unregister it
async fn watch_client(
    id: ClientId,
    mut reader: OwnedReadHalf,
    client_manager: Arc<ClientManager>,
    cancel: CancellationToken,
) {
    let mut scratch = [0u8; 256];
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = reader.read(&mut scratch) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("Display client read error: {}", e);
                break;
            }
        }
    }
    client_manager.unregister(id).await;
}
