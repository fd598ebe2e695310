//! Client configuration.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::NetworkRange;
use crate::error::{Error, Result};

/// Port camera servers listen on for commands and downloads.
pub const DEFAULT_PORT: u16 = 5647;

/// Settings for a camfleet client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server port used when addresses are given without one, and for discovery.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Local address the command socket binds to.
    #[serde(default = "default_bind")]
    pub bind_addr: SocketAddr,
    /// Range discovery broadcasts into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkRange>,
    /// Per-server reply deadline for one dispatch round.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Extra sends allowed for idempotent queries within the deadline.
    #[serde(default = "default_retries")]
    pub query_retries: u32,
    /// Listen window for `find`.
    #[serde(default = "default_discovery_ms")]
    pub discovery_timeout_ms: u64,
    /// Connect and idle-read limit for downloads.
    #[serde(default = "default_download_ms")]
    pub download_timeout_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 0))
}
fn default_timeout_ms() -> u64 {
    1500
}
fn default_retries() -> u32 {
    2
}
fn default_discovery_ms() -> u64 {
    1000
}
fn default_download_ms() -> u64 {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_addr: default_bind(),
            network: None,
            timeout_ms: default_timeout_ms(),
            query_retries: default_retries(),
            discovery_timeout_ms: default_discovery_ms(),
            download_timeout_ms: default_download_ms(),
        }
    }
}

impl ClientConfig {
    /// Build configuration from `CAMFLEET_*` environment variables and defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("CAMFLEET_PORT") {
            config.port = parse_var("CAMFLEET_PORT", &v)?;
        }
        if let Some(v) = lookup("CAMFLEET_BIND") {
            config.bind_addr = parse_var("CAMFLEET_BIND", &v)?;
        }
        if let Some(v) = lookup("CAMFLEET_NETWORK") {
            config.network = Some(
                v.parse()
                    .map_err(|e| Error::Config(format!("CAMFLEET_NETWORK: {e}")))?,
            );
        }
        if let Some(v) = lookup("CAMFLEET_TIMEOUT_MS") {
            config.timeout_ms = parse_var("CAMFLEET_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("CAMFLEET_RETRIES") {
            config.query_retries = parse_var("CAMFLEET_RETRIES", &v)?;
        }
        if let Some(v) = lookup("CAMFLEET_DISCOVERY_TIMEOUT_MS") {
            config.discovery_timeout_ms = parse_var("CAMFLEET_DISCOVERY_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("CAMFLEET_DOWNLOAD_TIMEOUT_MS") {
            config.download_timeout_ms = parse_var("CAMFLEET_DOWNLOAD_TIMEOUT_MS", &v)?;
        }

        if config.timeout_ms == 0 {
            return Err(Error::Config("CAMFLEET_TIMEOUT_MS must be positive".into()));
        }
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: cannot parse {value:?}")))
}
