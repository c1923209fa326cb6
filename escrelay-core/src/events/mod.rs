//! Event ingestion plumbing.
//!
//! # Event Flow
//!
//! 1. A producer sends an `EventLog` on the ingestion channel, once its key
//!    has been admitted by `RecentEvents`
//! 2. `EventRelay` receives it and publishes it to the `EventBroadcaster`
//! 3. The broadcaster fans it out to every stream subscriber

pub mod channels;
pub mod dedup;

pub use channels::{DEFAULT_CHANNEL_BUFFER, EventLogReceiver, EventLogSender, event_log_channel};
pub use dedup::{DEFAULT_DEDUP_CAPACITY, DEFAULT_RETENTION, EventKey, RecentEvents};
