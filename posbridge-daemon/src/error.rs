use posbridge_broadcaster::BroadcasterError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind {endpoint} port {port}: {source}")]
    Bind {
        endpoint: &'static str,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Broadcaster(#[from] BroadcasterError),

    #[error("Bridge already running")]
    AlreadyRunning,

    #[error("Bridge not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, BridgeError>;
