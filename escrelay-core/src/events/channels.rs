//! Event channel factories and handles.
//!
//! Provides the factory for the ingestion channel that connects event
//! producers (the HTTP ingestion route, or an in-process watcher) to the
//! [`EventRelay`](crate::processors::EventRelay).

use escrelay_sdk::objects::EventLog;
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for observed EventLog records.
pub type EventLogSender = mpsc::Sender<EventLog>;
/// Receiver handle for observed EventLog records.
pub type EventLogReceiver = mpsc::Receiver<EventLog>;

/// Create a new EventLog ingestion channel.
///
/// Returns a (sender, receiver) pair. Multiple producers can clone the
/// returned sender; the receiver belongs to the relay.
pub fn event_log_channel() -> (EventLogSender, EventLogReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
