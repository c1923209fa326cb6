//! Event broadcast channel.
//!
//! [`EventBroadcaster`] keeps a registry of subscriber sinks and fans each
//! published [`EventLog`] out to all of them.
//!
//! - Each event gets a process-wide sequence number (starting at 1) and is
//!   serialized once; every sink receives the same `Arc<StreamFrame>`.
//! - Sinks are bounded queues. Delivery never waits: a sink whose client is
//!   gone is removed, and a sink whose queue is full is closed as lagging so
//!   it never silently skips an event. Its client may reconnect and resume
//!   from the backlog.
//! - The registry lock is held for the whole fan-out, so concurrent
//!   publishers are serialized and every subscriber observes the same order.
//!   The lock is never held across an `.await`.

mod subscription;

pub use subscription::Subscription;

use escrelay_sdk::objects::EventLog;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::config::{DEFAULT_BACKLOG, MAX_BACKLOG, MAX_SUBSCRIBER_CAPACITY, StreamConfig};

/// Identifier of one subscription. Never re-used within a broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Lifecycle of a subscription: `Active -> Closed`, one way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Closed,
}

/// One published event as delivered to subscribers.
#[derive(Debug)]
pub struct StreamFrame {
    /// Relay sequence number, strictly increasing per broadcaster.
    pub sequence: u64,
    pub event: EventLog,
    /// `event` serialized as JSON.
    pub json: String,
}

/// Outcome of a single [`EventBroadcaster::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub sequence: u64,
    /// Sinks the frame was queued on.
    pub delivered: usize,
    /// Sinks removed during this publish (disconnected or lagging).
    pub closed: usize,
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

type Sink = mpsc::Sender<Arc<StreamFrame>>;

struct RegistryState {
    next_id: u64,
    last_sequence: u64,
    sinks: BTreeMap<SubscriberId, Sink>,
    backlog: VecDeque<Arc<StreamFrame>>,
}

pub(crate) struct Registry {
    state: Mutex<RegistryState>,
    subscriber_capacity: usize,
    backlog_limit: usize,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.lock().sinks.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, "Subscriber removed");
        }
        removed
    }
}

/// Service-scoped subscriber registry and fan-out.
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<Registry>,
}

impl EventBroadcaster {
    /// Create a broadcaster using the queue and backlog sizes of `config`,
    /// clamped to [`MAX_SUBSCRIBER_CAPACITY`] and [`MAX_BACKLOG`].
    pub fn new(config: &StreamConfig) -> Self {
        let backlog_limit = config.backlog.min(MAX_BACKLOG);
        Self {
            inner: Arc::new(Registry {
                state: Mutex::new(RegistryState {
                    next_id: 1,
                    last_sequence: 0,
                    sinks: BTreeMap::new(),
                    // Grows on demand up to the limit.
                    backlog: VecDeque::with_capacity(backlog_limit.min(DEFAULT_BACKLOG)),
                }),
                subscriber_capacity: config.subscriber_capacity.clamp(1, MAX_SUBSCRIBER_CAPACITY),
                backlog_limit,
            }),
        }
    }

    /// Register a new sink that receives every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_after(None)
    }

    /// Register a new sink, first queueing every retained event with a
    /// sequence number greater than `last_sequence`.
    ///
    /// Replay and registration happen under the registry lock, so the
    /// subscriber sees the backlog tail followed by live events with no gap
    /// or duplicate between them. Events after `last_sequence` that have
    /// already left the backlog are counted in [`Subscription::missed`].
    pub fn subscribe_after(&self, last_sequence: Option<u64>) -> Subscription {
        let mut state = self.inner.lock();

        let (replay, missed) = match last_sequence {
            Some(last) => {
                let newest = state.last_sequence;
                let oldest = state.backlog.front().map_or(newest + 1, |f| f.sequence);
                let from = if last > newest {
                    // Id from before a restart, or not one of ours.
                    warn!(last, newest, "Resume id is ahead of the relay, replaying backlog");
                    0
                } else {
                    last
                };
                let missed = oldest.saturating_sub(from + 1);
                let replay: Vec<Arc<StreamFrame>> = state
                    .backlog
                    .iter()
                    .filter(|frame| frame.sequence > from)
                    .cloned()
                    .collect();
                (replay, missed)
            }
            None => (Vec::new(), 0),
        };

        let capacity = self.inner.subscriber_capacity.saturating_add(replay.len());
        let (tx, rx) = mpsc::channel(capacity);
        let replayed = replay.len();
        for frame in replay {
            // Capacity covers the whole replay, so this cannot be full.
            let _ = tx.try_send(frame);
        }

        let id = SubscriberId(state.next_id);
        state.next_id += 1;
        state.sinks.insert(id, tx);
        let active = state.sinks.len();
        drop(state);

        if missed > 0 {
            warn!(
                subscriber = %id,
                ?last_sequence,
                missed,
                "Resume point is older than the backlog, events were missed"
            );
        }
        debug!(subscriber = %id, replayed, active, "Subscriber registered");
        Subscription::new(id, rx, Arc::downgrade(&self.inner), missed)
    }

    /// Remove a subscriber. Returns `false` if it was already gone or never
    /// existed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.remove(id)
    }

    /// Deliver `event` to every registered sink.
    pub fn publish(&self, event: EventLog) -> Result<PublishReport, BroadcastError> {
        let json = serde_json::to_string(&event)?;

        let mut state = self.inner.lock();
        state.last_sequence += 1;
        let frame = Arc::new(StreamFrame {
            sequence: state.last_sequence,
            event,
            json,
        });

        if self.inner.backlog_limit > 0 {
            state.backlog.push_back(frame.clone());
            while state.backlog.len() > self.inner.backlog_limit {
                state.backlog.pop_front();
            }
        }

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sink) in &state.sinks {
            match sink.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = %id, "Subscriber disconnected");
                    dead.push(*id);
                }
                Err(TrySendError::Full(_)) => {
                    warn!(
                        subscriber = %id,
                        sequence = frame.sequence,
                        "Subscriber lagging, closing"
                    );
                    dead.push(*id);
                }
            }
        }
        for id in &dead {
            state.sinks.remove(id);
        }
        drop(state);

        debug!(
            sequence = frame.sequence,
            event_id = frame.event.id,
            delivered,
            closed = dead.len(),
            "Published event"
        );

        Ok(PublishReport {
            sequence: frame.sequence,
            delivered,
            closed: dead.len(),
        })
    }

    /// Current state of subscription `id`.
    pub fn state(&self, id: SubscriberId) -> SubscriptionState {
        if self.inner.lock().sinks.contains_key(&id) {
            SubscriptionState::Active
        } else {
            SubscriptionState::Closed
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().sinks.len()
    }

    /// Sequence number of the most recent event, or 0 if none.
    pub fn last_sequence(&self) -> u64 {
        self.inner.lock().last_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use time::macros::datetime;
    use tokio_stream::StreamExt;

    fn event(id: i64) -> EventLog {
        EventLog {
            id,
            escrow_addr: "0xescrow".to_string(),
            event_type: "Funded".into(),
            block_number: 100 + id as u64,
            tx_hash: format!("0x{id:04x}"),
            raw: serde_json::json!({ "n": id }),
            observed_at: datetime!(2024-01-01 00:00:00 UTC),
        }
    }

    fn broadcaster(subscriber_capacity: usize, backlog: usize) -> EventBroadcaster {
        EventBroadcaster::new(&StreamConfig {
            subscriber_capacity,
            backlog,
            keep_alive: Duration::from_secs(15),
        })
    }

    fn drain(sub: &mut Subscription) -> Vec<i64> {
        let mut ids = Vec::new();
        while let Ok(frame) = sub.try_recv() {
            ids.push(frame.event.id);
        }
        ids
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_publish_order() {
        let broadcaster = broadcaster(64, 0);
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        for id in 1..=20 {
            let report = broadcaster.publish(event(id)).unwrap();
            assert_eq!(report.sequence, id as u64);
            assert_eq!(report.delivered, 2);
        }

        let expected: Vec<i64> = (1..=20).collect();
        assert_eq!(drain(&mut a), expected);
        assert_eq!(drain(&mut b), expected);
    }

    #[tokio::test]
    async fn test_frames_share_serialized_json() {
        let broadcaster = broadcaster(4, 0);
        let mut sub = broadcaster.subscribe();
        broadcaster.publish(event(7)).unwrap();

        let frame = sub.recv().await.unwrap();
        assert_eq!(frame.sequence, 1);
        let decoded: EventLog = serde_json::from_str(&frame.json).unwrap();
        assert_eq!(decoded, event(7));
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_later_events() {
        let broadcaster = broadcaster(8, 16);
        broadcaster.publish(event(1)).unwrap();
        let mut sub = broadcaster.subscribe();
        broadcaster.publish(event(2)).unwrap();
        assert_eq!(drain(&mut sub), vec![2]);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let broadcaster = broadcaster(8, 0);
        let sub = broadcaster.subscribe();
        let id = sub.id();

        assert_eq!(broadcaster.state(id), SubscriptionState::Active);
        assert!(broadcaster.unsubscribe(id));
        assert!(!broadcaster.unsubscribe(id));
        assert_eq!(broadcaster.state(id), SubscriptionState::Closed);

        // Dropping the handle after an explicit unsubscribe is harmless.
        drop(sub);
        assert!(!broadcaster.unsubscribe(SubscriberId(9_999)));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribed_stream_ends() {
        let broadcaster = broadcaster(8, 0);
        let mut sub = broadcaster.subscribe();
        broadcaster.publish(event(1)).unwrap();
        broadcaster.unsubscribe(sub.id());
        broadcaster.publish(event(2)).unwrap();

        assert_eq!(sub.next().await.map(|f| f.event.id), Some(1));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_unregisters() {
        let broadcaster = broadcaster(8, 0);
        let sub = broadcaster.subscribe();
        let id = sub.id();
        assert_eq!(broadcaster.subscriber_count(), 1);
        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert_eq!(broadcaster.state(id), SubscriptionState::Closed);
    }

    #[tokio::test]
    async fn test_disconnected_sink_is_removed_on_publish() {
        let broadcaster = broadcaster(8, 0);
        let mut live = broadcaster.subscribe();

        // A sink whose receiving side vanished without unsubscribing.
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let ghost = SubscriberId(1_000);
        broadcaster.inner.lock().sinks.insert(ghost, tx);

        let report = broadcaster.publish(event(1)).unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.closed, 1);
        assert_eq!(broadcaster.state(ghost), SubscriptionState::Closed);
        assert_eq!(drain(&mut live), vec![1]);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_closed_without_affecting_others() {
        let broadcaster = broadcaster(2, 0);
        let mut slow = broadcaster.subscribe();
        let mut fast = broadcaster.subscribe();

        let mut fast_seen = Vec::new();
        for id in 1..=3 {
            let report = broadcaster.publish(event(id)).unwrap();
            if id == 3 {
                assert_eq!(report.closed, 1);
            }
            fast_seen.extend(drain(&mut fast));
        }

        assert_eq!(fast_seen, vec![1, 2, 3]);
        assert_eq!(broadcaster.state(slow.id()), SubscriptionState::Closed);
        assert_eq!(broadcaster.state(fast.id()), SubscriptionState::Active);

        // The slow subscriber keeps what was queued, then its stream ends.
        assert_eq!(slow.next().await.map(|f| f.event.id), Some(1));
        assert_eq!(slow.next().await.map(|f| f.event.id), Some(2));
        assert!(slow.next().await.is_none());
    }

    #[tokio::test]
    async fn test_resume_replays_backlog_tail_then_live() {
        let broadcaster = broadcaster(8, 3);
        for id in 1..=5 {
            broadcaster.publish(event(id)).unwrap();
        }

        let mut resumed = broadcaster.subscribe_after(Some(3));
        let mut from_start = broadcaster.subscribe_after(Some(0));
        let mut caught_up = broadcaster.subscribe_after(Some(5));
        broadcaster.publish(event(6)).unwrap();

        assert_eq!(drain(&mut resumed), vec![4, 5, 6]);
        // Only the last three events are retained.
        assert_eq!(drain(&mut from_start), vec![3, 4, 5, 6]);
        assert_eq!(drain(&mut caught_up), vec![6]);
        assert_eq!(resumed.missed(), 0);
        assert_eq!(from_start.missed(), 2);
        assert_eq!(caught_up.missed(), 0);
    }

    #[tokio::test]
    async fn test_resume_reports_events_outside_backlog() {
        let no_replay = broadcaster(8, 0);
        for id in 1..=5 {
            no_replay.publish(event(id)).unwrap();
        }
        let sub = no_replay.subscribe_after(Some(3));
        assert_eq!(sub.missed(), 2);
        assert_eq!(no_replay.subscribe().missed(), 0);

        // A resume id the relay never issued replays what it has.
        let retained = broadcaster(8, 8);
        for id in 1..=2 {
            retained.publish(event(id)).unwrap();
        }
        let mut ahead = retained.subscribe_after(Some(40));
        assert_eq!(ahead.missed(), 0);
        assert_eq!(drain(&mut ahead), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_oversized_config_is_clamped() {
        let broadcaster = EventBroadcaster::new(&StreamConfig {
            subscriber_capacity: usize::MAX,
            backlog: usize::MAX,
            keep_alive: Duration::from_secs(15),
        });
        assert_eq!(broadcaster.inner.subscriber_capacity, MAX_SUBSCRIBER_CAPACITY);
        assert_eq!(broadcaster.inner.backlog_limit, MAX_BACKLOG);

        let mut sub = broadcaster.subscribe();
        broadcaster.publish(event(1)).unwrap();
        let mut resumed = broadcaster.subscribe_after(Some(0));
        assert_eq!(drain(&mut sub), vec![1]);
        assert_eq!(drain(&mut resumed), vec![1]);
    }

    #[tokio::test]
    async fn test_replay_larger_than_queue_is_not_lagging() {
        let broadcaster = broadcaster(1, 10);
        for id in 1..=10 {
            broadcaster.publish(event(id)).unwrap();
        }
        let mut sub = broadcaster.subscribe_after(Some(0));
        assert_eq!(broadcaster.state(sub.id()), SubscriptionState::Active);
        assert_eq!(drain(&mut sub), (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_subscriber_ids_are_not_reused() {
        let broadcaster = broadcaster(1, 0);
        let first = broadcaster.subscribe().id();
        let second = broadcaster.subscribe().id();
        let third = broadcaster.subscribe().id();
        assert!(first < second && second < third);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_churn_during_publish_keeps_steady_subscribers_exact() {
        const EVENTS: i64 = 200;
        let broadcaster = broadcaster(EVENTS as usize, 0);
        let mut steady: Vec<Subscription> = (0..4).map(|_| broadcaster.subscribe()).collect();

        let churn = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    let sub = broadcaster.subscribe();
                    tokio::task::yield_now().await;
                    broadcaster.unsubscribe(sub.id());
                    drop(sub);
                }
            })
        };
        let publisher = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for id in 1..=EVENTS {
                    broadcaster.publish(event(id)).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        churn.await.unwrap();
        publisher.await.unwrap();

        let expected: Vec<i64> = (1..=EVENTS).collect();
        for sub in &mut steady {
            assert_eq!(drain(sub), expected);
        }
        assert_eq!(broadcaster.subscriber_count(), steady.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_resume_during_publish_has_no_gap_or_duplicate() {
        const EVENTS: u64 = 2_000;
        let broadcaster = broadcaster(EVENTS as usize, EVENTS as usize);

        let publisher = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for id in 1..=EVENTS as i64 {
                    broadcaster.publish(event(id)).unwrap();
                    if id % 16 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        // Resume from several points while the publisher is running.
        let mut resumed = Vec::new();
        for resume_from in [100u64, 400, 900] {
            while broadcaster.last_sequence() < resume_from + 50 {
                tokio::task::yield_now().await;
            }
            resumed.push((resume_from, broadcaster.subscribe_after(Some(resume_from))));
        }
        publisher.await.unwrap();

        for (resume_from, mut sub) in resumed {
            let mut sequences = Vec::new();
            while let Ok(frame) = sub.try_recv() {
                sequences.push(frame.sequence);
            }
            let expected: Vec<u64> = (resume_from + 1..=EVENTS).collect();
            assert_eq!(sequences, expected, "resumed after {resume_from}");
            assert_eq!(sub.missed(), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishers_agree_on_order() {
        let broadcaster = broadcaster(1_000, 0);
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let broadcaster = broadcaster.clone();
                tokio::spawn(async move {
                    for n in 0..50 {
                        broadcaster.publish(event(worker * 1_000 + n)).unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut seen_a = Vec::new();
        while let Ok(frame) = a.try_recv() {
            seen_a.push((frame.sequence, frame.event.id));
        }
        let mut seen_b = Vec::new();
        while let Ok(frame) = b.try_recv() {
            seen_b.push((frame.sequence, frame.event.id));
        }

        assert_eq!(seen_a.len(), 200);
        assert_eq!(seen_a, seen_b);
        assert!(seen_a.windows(2).all(|w| w[0].0 + 1 == w[1].0));
        assert_eq!(broadcaster.last_sequence(), 200);
    }
}
