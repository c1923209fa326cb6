//! Duplicate suppression for ingested events.
//!
//! A producer retry, or a captured request replayed while its signature is
//! still fresh, carries an event the relay has already accepted. Admitting
//! it again would reach every subscriber a second time under a new sequence
//! number, so the ingestion route checks each event against the keys seen
//! recently.
//!
//! Keys are kept for [`DEFAULT_RETENTION`], long enough that a signature
//! accepted at arrival can no longer pass the freshness check once its key
//! expires. The window is also capped at a fixed number of keys; when full,
//! the oldest key is dropped early.

use escrelay_sdk::objects::EventLog;
use escrelay_sdk::signature::MAX_CLOCK_SKEW;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

/// Default number of keys remembered.
pub const DEFAULT_DEDUP_CAPACITY: usize = 65_536;

/// How long a key is remembered. A signature may be up to
/// [`MAX_CLOCK_SKEW`] ahead of the relay clock on arrival and stays fresh
/// for the same span after that.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(2 * MAX_CLOCK_SKEW as u64);

/// Identity of an observed event: the transaction it came from and the
/// producer's log id. Hashes are compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub tx_hash: String,
    pub id: i64,
}

impl EventKey {
    pub fn of(event: &EventLog) -> Self {
        Self {
            tx_hash: event.tx_hash.to_ascii_lowercase(),
            id: event.id,
        }
    }
}

struct Window {
    keys: HashSet<EventKey>,
    order: VecDeque<(Instant, EventKey)>,
}

/// Shared window of recently admitted event keys. Cheap to clone.
#[derive(Clone)]
pub struct RecentEvents {
    window: Arc<Mutex<Window>>,
    capacity: usize,
    retention: Duration,
}

impl RecentEvents {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            window: Arc::new(Mutex::new(Window {
                keys: HashSet::new(),
                order: VecDeque::new(),
            })),
            capacity: capacity.max(1),
            retention,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `key`. Returns `false` if it was already admitted within the
    /// retention window.
    pub fn admit(&self, key: EventKey) -> bool {
        self.admit_at(key, Instant::now())
    }

    pub fn admit_at(&self, key: EventKey, now: Instant) -> bool {
        let mut window = self.lock();

        while let Some((seen_at, _)) = window.order.front() {
            if now.saturating_duration_since(*seen_at) < self.retention {
                break;
            }
            if let Some((_, expired)) = window.order.pop_front() {
                window.keys.remove(&expired);
            }
        }

        if window.keys.contains(&key) {
            return false;
        }

        if window.order.len() >= self.capacity {
            if let Some((_, evicted)) = window.order.pop_front() {
                warn!(
                    tx_hash = %evicted.tx_hash,
                    id = evicted.id,
                    capacity = self.capacity,
                    "Dedup window full, evicting key before retention elapsed"
                );
                window.keys.remove(&evicted);
            }
        }

        window.keys.insert(key.clone());
        window.order.push_back((now, key));
        true
    }

    /// Drop `key` so the same event can be admitted again, used when an
    /// admitted event could not be queued.
    pub fn forget(&self, key: &EventKey) {
        let mut window = self.lock();
        if window.keys.remove(key) {
            window.order.retain(|(_, k)| k != key);
        }
    }

    /// Number of keys currently remembered.
    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecentEvents {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY, DEFAULT_RETENTION)
    }
}
