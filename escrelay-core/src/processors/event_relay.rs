//! EventRelay processor.
//!
//! The EventRelay is responsible for:
//! - Receiving `EventLog` records from the ingestion channel
//! - Publishing each one to the `EventBroadcaster` in arrival order
//! - Flushing already-accepted events before exiting on shutdown

use crate::broadcast::{BroadcastError, EventBroadcaster, PublishReport};
use crate::events::EventLogReceiver;
use escrelay_sdk::objects::EventLog;
use kanau::processor::Processor;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Moves ingested events into the broadcaster.
///
/// The signal receivers are injected when calling [`run()`](EventRelay::run)
/// rather than owned by the struct.
pub struct EventRelay {
    broadcaster: EventBroadcaster,
}

impl EventRelay {
    /// Create a new EventRelay publishing to `broadcaster`.
    pub fn new(broadcaster: EventBroadcaster) -> Self {
        Self { broadcaster }
    }

    /// Run the EventRelay until shutdown is signaled or every sender is
    /// dropped.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut event_rx: EventLogReceiver) {
        info!("EventRelay started");

        loop {
            tokio::select! {
                biased;

                // Shutdown has highest priority.
                // A dropped sender counts as shutdown.
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("EventRelay received shutdown signal");
                        break;
                    }
                }

                event = event_rx.recv() => match event {
                    Some(event) => self.relay(event).await,
                    // All senders dropped.
                    None => {
                        info!("EventLog channel closed");
                        break;
                    }
                },
            }
        }

        // Stop accepting, then flush what producers already handed over.
        event_rx.close();
        let mut flushed = 0usize;
        while let Some(event) = event_rx.recv().await {
            self.relay(event).await;
            flushed += 1;
        }
        if flushed > 0 {
            debug!(flushed, "EventRelay flushed queued events");
        }

        info!("EventRelay shutdown complete");
    }

    async fn relay(&self, event: EventLog) {
        let event_id = event.id;
        if let Err(e) = self.process(event).await {
            error!(error = %e, event_id, "Failed to publish EventLog");
        }
    }
}

// ---------------------------------------------------------------------------
// Processor trait implementation
// ---------------------------------------------------------------------------

impl Processor<EventLog> for EventRelay {
    type Output = PublishReport;
    type Error = BroadcastError;

    async fn process(&self, event: EventLog) -> Result<PublishReport, BroadcastError> {
        debug!(
            event_id = event.id,
            escrow_addr = %event.escrow_addr,
            event_type = %event.event_type,
            "Relaying EventLog"
        );
        self.broadcaster.publish(event)
    }
}
