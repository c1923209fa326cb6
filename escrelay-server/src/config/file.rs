//! TOML file configuration structures.
//!
//! These structs directly map to the `escrelay.toml` file format.

use escrelay_core::config::{DEFAULT_BACKLOG, DEFAULT_KEEP_ALIVE, DEFAULT_SUBSCRIBER_CAPACITY};
use serde::Deserialize;
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Ingestion section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestConfig {
    /// Shared secret event producers sign request bodies with. May instead
    /// come from the command line or environment.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Event stream section.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Events queued per subscriber before it is closed as lagging.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    /// Recent events retained for `Last-Event-ID` replay.
    #[serde(default = "default_backlog")]
    pub backlog: usize,
    /// Seconds between keep-alive comments.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
            backlog: default_backlog(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

fn default_subscriber_capacity() -> usize {
    DEFAULT_SUBSCRIBER_CAPACITY
}

fn default_backlog() -> usize {
    DEFAULT_BACKLOG
}

fn default_keep_alive_secs() -> u64 {
    DEFAULT_KEEP_ALIVE.as_secs()
}
