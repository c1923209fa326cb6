//! Subscriber handle.

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_stream::Stream;

use super::{Registry, StreamFrame, SubscriberId};

/// Receiving end of one subscription.
///
/// Yields frames in publish order and ends once the subscription is closed
/// (unsubscribed, lagging, or broadcaster dropped) and its queue is drained.
/// Dropping the handle unregisters it, which is how a disconnected HTTP
/// client releases its slot.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<StreamFrame>>,
    registry: Weak<Registry>,
    missed: u64,
}

impl Subscription {
    pub(super) fn new(
        id: SubscriberId,
        rx: mpsc::Receiver<Arc<StreamFrame>>,
        registry: Weak<Registry>,
        missed: u64,
    ) -> Self {
        Self {
            id,
            rx,
            registry,
            missed,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Events between the requested resume point and the oldest replayed
    /// frame that were no longer retained. Zero for a fresh subscription.
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Wait for the next frame. `None` once the subscription is closed and
    /// drained.
    pub async fn recv(&mut self) -> Option<Arc<StreamFrame>> {
        self.rx.recv().await
    }

    /// Take a queued frame without waiting.
    pub fn try_recv(&mut self) -> Result<Arc<StreamFrame>, TryRecvError> {
        self.rx.try_recv()
    }
}

impl Stream for Subscription {
    type Item = Arc<StreamFrame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("missed", &self.missed)
            .finish()
    }
}
