//! Runtime configuration re-exports.
//!
//! The actual config types are defined in `escrelay-core::config`.
//! This module re-exports them for convenience.

pub use escrelay_core::config::{IngestConfig, ServerConfig, SharedConfig, StreamConfig};
