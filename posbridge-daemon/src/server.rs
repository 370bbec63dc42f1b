//! Bridge lifecycle: binds the three endpoints and owns the listener tasks

use std::net::SocketAddr;
use std::sync::Arc;

use posbridge_broadcaster::DisplayBroadcaster;
use posbridge_cart::TransactionPhase;
use serde::Serialize;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use crate::activity::ActivityLog;
use crate::config::{BridgeConfig, PortConfig};
use crate::bridge::BridgeCore;
use crate::error::{BridgeError, Result};
use crate::matcher::StatusMatcher;
use crate::{status, udp};

/// Addresses the endpoints actually bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BridgeAddrs {
    pub status: SocketAddr,
    pub udp: SocketAddr,
    pub client: SocketAddr,
}

/// Snapshot of everything an operator view shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeStatus {
    pub running: bool,
    pub transaction_active: bool,
    pub item_count: usize,
    pub unit_count: i64,
    pub total: f64,
    pub connected_clients: usize,
    pub ports: PortConfig,
}

struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    connections: TaskTracker,
    addrs: BridgeAddrs,
}

pub struct BridgeServer {
    config: RwLock<BridgeConfig>,
    core: Arc<BridgeCore>,
    matcher: Arc<StatusMatcher>,
    running: Mutex<Option<Running>>,
}

impl BridgeServer {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let matcher = StatusMatcher::from_config(&config.matcher)?;

        let broadcaster = DisplayBroadcaster::new(config.client_write_timeout());
        let core = BridgeCore::new(broadcaster, ActivityLog::default());

        Ok(Self {
            config: RwLock::new(config),
            core: Arc::new(core),
            matcher: Arc::new(matcher),
            running: Mutex::new(None),
        })
    }

    /// Change the listening ports. Applies at the next `start()`.
    pub async fn configure(&self, status_port: u16, udp_port: u16, client_port: u16) -> Result<()> {
        let ports = PortConfig::new(status_port, udp_port, client_port);
        ports.validate()?;

        self.config.write().await.ports = ports;
        info!(
            "Ports configured: status={} udp={} client={}",
            status_port, udp_port, client_port
        );
        Ok(())
    }

    /// Bind all endpoints and spawn the listeners.
    ///
    /// Nothing stays bound if any endpoint fails.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(BridgeError::AlreadyRunning);
        }

        let config = self.config.read().await.clone();
        config.ports.validate()?;
        let ip = config.bind_address;

        let udp_socket = UdpSocket::bind(SocketAddr::new(ip, config.ports.udp_port))
            .await
            .map_err(|source| BridgeError::Bind {
                endpoint: "udp",
                port: config.ports.udp_port,
                source,
            })?;
        let status_listener = TcpListener::bind(SocketAddr::new(ip, config.ports.status_port))
            .await
            .map_err(|source| BridgeError::Bind {
                endpoint: "status",
                port: config.ports.status_port,
                source,
            })?;

        let bound = |endpoint: &'static str, port: u16, addr: std::io::Result<SocketAddr>| {
            addr.map_err(|source| BridgeError::Bind { endpoint, port, source })
        };
        let udp_addr = bound("udp", config.ports.udp_port, udp_socket.local_addr())?;
        let status_addr = bound("status", config.ports.status_port, status_listener.local_addr())?;

        let cancel = CancellationToken::new();
        let client_addr = self
            .core
            .broadcaster()
            .start(SocketAddr::new(ip, config.ports.client_port), &cancel)
            .await?;

        // Every endpoint is bound: only now forget the previous run's cart
        self.core.reset().await;

        let connections = TaskTracker::new();
        let tasks = vec![
            tokio::spawn(udp::run(udp_socket, Arc::clone(&self.core), cancel.clone())),
            tokio::spawn(status::run(
                status_listener,
                Arc::clone(&self.core),
                Arc::clone(&self.matcher),
                connections.clone(),
                cancel.clone(),
            )),
        ];

        let addrs = BridgeAddrs {
            status: status_addr,
            udp: udp_addr,
            client: client_addr,
        };

        self.core.activity().success(format!(
            "Bridge started: status TCP {}, cart UDP {}, display TCP {}",
            addrs.status.port(),
            addrs.udp.port(),
            addrs.client.port()
        ));

        *running = Some(Running {
            cancel,
            tasks,
            connections,
            addrs,
        });
        Ok(())
    }

    /// Stop every listener, wait for open connections, close all display clients
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        let Some(current) = running.take() else {
            return Err(BridgeError::NotRunning);
        };

        current.cancel.cancel();
        for task in current.tasks {
            if let Err(e) = task.await {
                error!("Listener task failed: {}", e);
            }
        }

        current.connections.close();
        current.connections.wait().await;

        self.core.broadcaster().stop().await?;
        self.core.activity().info("Bridge stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn is_transaction_active(&self) -> bool {
        self.core.summary().await.phase == TransactionPhase::Active
    }

    pub async fn current_item_count(&self) -> usize {
        self.core.summary().await.item_count
    }

    pub async fn current_total(&self) -> f64 {
        self.core.summary().await.total
    }

    pub async fn connected_client_count(&self) -> usize {
        self.core.broadcaster().client_count().await
    }

    pub async fn status(&self) -> BridgeStatus {
        let summary = self.core.summary().await;
        BridgeStatus {
            running: self.is_running().await,
            transaction_active: summary.phase == TransactionPhase::Active,
            item_count: summary.item_count,
            unit_count: summary.unit_count,
            total: summary.total,
            connected_clients: self.connected_client_count().await,
            ports: self.config.read().await.ports,
        }
    }

    /// Bound addresses while running
    pub async fn local_addrs(&self) -> Option<BridgeAddrs> {
        self.running.lock().await.as_ref().map(|running| running.addrs)
    }

    pub fn activity(&self) -> &ActivityLog {
        self.core.activity()
    }

    pub async fn config(&self) -> BridgeConfig {
        self.config.read().await.clone()
    }
}
