//! POS bridge daemon
//!
//! Receives the register's cart stream (UDP) and status text (TCP) and pushes
//! live transaction updates to connected display clients (TCP).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use posbridge_daemon::probe::{self, SAMPLE_STATUS_ENCODING, SAMPLE_STATUS_TEXT};
use posbridge_daemon::{BridgeConfig, BridgeServer, PortConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "posbridge")]
#[command(about = "Bridge a POS register to customer display clients", version)]
struct Cli {
    /// Config file (defaults to <config dir>/posbridge/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bridge until interrupted (default)
    Run {
        /// TCP port for status text
        #[arg(long)]
        status_port: Option<u16>,

        /// UDP port for cart snapshots
        #[arg(long)]
        udp_port: Option<u16>,

        /// TCP port for display clients
        #[arg(long)]
        client_port: Option<u16>,
    },

    /// Send the sample two-item cart to the UDP port
    SendSnapshot {
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        host: IpAddr,

        #[arg(long, default_value_t = PortConfig::default().udp_port)]
        port: u16,
    },

    /// Send a clear command to the UDP port
    SendClear {
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        host: IpAddr,

        #[arg(long, default_value_t = PortConfig::default().udp_port)]
        port: u16,
    },

    /// Send status text to the status port
    SendStatus {
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        host: IpAddr,

        #[arg(long, default_value_t = PortConfig::default().status_port)]
        port: u16,

        #[arg(long, default_value = SAMPLE_STATUS_TEXT)]
        text: String,

        /// WHATWG encoding label
        #[arg(long, default_value = SAMPLE_STATUS_ENCODING)]
        encoding: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run {
        status_port: None,
        udp_port: None,
        client_port: None,
    }) {
        Command::Run {
            status_port,
            udp_port,
            client_port,
        } => {
            let mut config = BridgeConfig::load(cli.config.as_deref())
                .context("Failed to load configuration")?;
            if let Some(port) = status_port {
                config.ports.status_port = port;
            }
            if let Some(port) = udp_port {
                config.ports.udp_port = port;
            }
            if let Some(port) = client_port {
                config.ports.client_port = port;
            }
            run(config).await
        }
        Command::SendSnapshot { host, port } => {
            probe::send_sample_snapshot(SocketAddr::new(host, port)).await?;
            Ok(())
        }
        Command::SendClear { host, port } => {
            probe::send_clear(SocketAddr::new(host, port)).await?;
            Ok(())
        }
        Command::SendStatus {
            host,
            port,
            text,
            encoding,
        } => {
            probe::send_status_text(SocketAddr::new(host, port), &text, &encoding).await?;
            Ok(())
        }
    }
}

async fn run(config: BridgeConfig) -> Result<()> {
    info!("Starting POS bridge v{}", env!("CARGO_PKG_VERSION"));
    match &config.config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    let server = BridgeServer::new(config).context("Invalid configuration")?;
    server.start().await.context("Failed to start bridge")?;

    shutdown_signal().await;

    server.stop().await.context("Failed to stop bridge")?;
    info!("POS bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
