//! Event stream configuration.

use std::time::Duration;

/// Default per-subscriber queue length.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// Default number of recent events kept for `Last-Event-ID` replay.
pub const DEFAULT_BACKLOG: usize = 1024;

/// Largest accepted per-subscriber queue length.
pub const MAX_SUBSCRIBER_CAPACITY: usize = 65_536;

/// Largest accepted replay backlog.
pub const MAX_BACKLOG: usize = 1_000_000;

/// Default interval between keep-alive comments on idle streams.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Tuning for the event broadcast channel and SSE responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Events queued per subscriber before it is closed as lagging.
    pub subscriber_capacity: usize,
    /// Recent events retained for replay. Zero disables replay.
    pub backlog: usize,
    /// Keep-alive comment interval.
    pub keep_alive: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            backlog: DEFAULT_BACKLOG,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}
