//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::matcher::StatusMatcher;

/// Lowest port the bridge will bind (privileged ports are refused)
pub const MIN_PORT: u16 = 1024;

/// Configuration problems, reported before any socket is bound
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} port {port} must be between 1024 and 65535")]
    PortOutOfRange { name: &'static str, port: u16 },

    #[error("{first} and {second} ports are both set to {port}")]
    DuplicatePort {
        first: &'static str,
        second: &'static str,
        port: u16,
    },

    #[error("At least one text encoding is required")]
    NoEncodings,

    #[error("Unknown text encoding: {0}")]
    UnknownEncoding(String),

    #[error("Phrase lists must not contain empty entries")]
    EmptyPhrase,

    #[error("Invalid byte pattern {pattern:?}: {reason}")]
    InvalidBytePattern { pattern: String, reason: String },

    #[error("Status buffer cap must be greater than zero")]
    ZeroStatusBuffer,

    #[error("Client write timeout must be greater than zero")]
    ZeroWriteTimeout,
}

/// Listening ports of the three endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// TCP port for the register's status text
    pub status_port: u16,

    /// UDP port for cart snapshots
    pub udp_port: u16,

    /// TCP port for display clients
    pub client_port: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            status_port: 4000,
            udp_port: 4001,
            client_port: 4002,
        }
    }
}

impl PortConfig {
    pub fn new(status_port: u16, udp_port: u16, client_port: u16) -> Self {
        Self {
            status_port,
            udp_port,
            client_port,
        }
    }

    fn named(&self) -> [(&'static str, u16); 3] {
        [
            ("status", self.status_port),
            ("udp", self.udp_port),
            ("client", self.client_port),
        ]
    }

    /// Every port in 1024-65535 and no two ports equal
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let named = self.named();

        for (name, port) in named {
            if port < MIN_PORT {
                return Err(ConfigError::PortOutOfRange { name, port });
            }
        }

        for (i, &(first, port)) in named.iter().enumerate() {
            if let Some(&(second, _)) = named[i + 1..].iter().find(|(_, other)| *other == port) {
                return Err(ConfigError::DuplicatePort {
                    first,
                    second,
                    port,
                });
            }
        }

        Ok(())
    }
}

/// Status channel classification data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Candidate encodings (WHATWG labels), tried in order
    pub encodings: Vec<String>,

    /// Phrases meaning the payment went through.
    /// Short entries such as "покупку" trade precision for recall.
    pub success_phrases: Vec<String>,

    /// Phrases meaning a return / refund
    pub return_phrases: Vec<String>,

    /// Hex-encoded byte sequences of greeting fragments, for when decoding fails
    pub byte_patterns: Vec<String>,

    /// Unrecognized bytes kept per status connection before they are dropped
    pub max_status_buffer: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            encodings: strings(&["utf-8", "windows-1251", "windows-1252"]),
            success_phrases: strings(&[
                "дякуємо за покупку",
                "дякуемо за покупку",
                "покупку",
                "сплачено",
                "оплачено",
            ]),
            return_phrases: strings(&["повернення", "возврат"]),
            byte_patterns: strings(&[
                "c4ffea",   // "Дяк" in windows-1251
                "d0b4d18f", // "дя" in UTF-8
                "efeeea",   // "пок" in windows-1251
            ]),
            max_status_buffer: 8192,
        }
    }
}

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// File this configuration was read from, if any
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Address all three endpoints bind to
    pub bind_address: IpAddr,

    pub ports: PortConfig,

    pub matcher: MatcherConfig,

    /// Upper bound for a single write to a display client (milliseconds)
    pub client_write_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ports: PortConfig::default(),
            matcher: MatcherConfig::default(),
            client_write_timeout_ms: 2000,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `path` (or the default location).
    ///
    /// A missing file yields the defaults; the file is never written back.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path(),
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
        config.config_path = Some(config_path);
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: BridgeConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Check ports and matcher data without starting anything
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.ports.validate()?;
        if self.client_write_timeout_ms == 0 {
            return Err(ConfigError::ZeroWriteTimeout);
        }
        StatusMatcher::from_config(&self.matcher)?;
        Ok(())
    }

    pub fn client_write_timeout(&self) -> Duration {
        Duration::from_millis(self.client_write_timeout_ms)
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("posbridge")
            .join("config.toml")
    }
}
