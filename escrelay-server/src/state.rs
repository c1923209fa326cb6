//! Application state shared across all request handlers.

use crate::config::runtime::SharedConfig;
use escrelay_core::broadcast::EventBroadcaster;
use escrelay_core::events::{EventLogSender, RecentEvents};
use tokio::sync::watch;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration (sections can be reloaded via SIGHUP).
    pub config: SharedConfig,
    /// Subscriber registry for the event stream.
    pub broadcaster: EventBroadcaster,
    /// Ingestion channel feeding the relay.
    pub events: EventLogSender,
    /// Keys of recently accepted events, for duplicate suppression.
    pub recent: RecentEvents,
    /// Flips to `true` when the server starts shutting down.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Create a new AppState.
    pub fn new(
        config: SharedConfig,
        broadcaster: EventBroadcaster,
        events: EventLogSender,
        recent: RecentEvents,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            broadcaster,
            events,
            recent,
            shutdown,
        }
    }
}
