//! Configuration types for the Escrow Event Relay.
//!
//! These types represent the validated runtime configuration used by the
//! server. The actual config loading/parsing is handled by the server crate.

mod ingest;
mod server;
mod stream;

pub use ingest::IngestConfig;
pub use server::ServerConfig;
pub use stream::{
    DEFAULT_BACKLOG, DEFAULT_KEEP_ALIVE, DEFAULT_SUBSCRIBER_CAPACITY, MAX_BACKLOG,
    MAX_SUBSCRIBER_CAPACITY, StreamConfig,
};

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared configuration state with separate locks for each section.
///
/// This allows independent access to different configuration sections
/// without blocking other readers/writers.
#[derive(Clone)]
pub struct SharedConfig {
    /// Server configuration (listen address, etc.).
    pub server: Arc<RwLock<ServerConfig>>,
    /// Ingestion authentication.
    pub ingest: Arc<RwLock<IngestConfig>>,
    /// Event stream tuning.
    pub stream: Arc<RwLock<StreamConfig>>,
}

impl SharedConfig {
    /// Create a new SharedConfig from individual configuration parts.
    pub fn new(server: ServerConfig, ingest: IngestConfig, stream: StreamConfig) -> Self {
        Self {
            server: Arc::new(RwLock::new(server)),
            ingest: Arc::new(RwLock::new(ingest)),
            stream: Arc::new(RwLock::new(stream)),
        }
    }
}
