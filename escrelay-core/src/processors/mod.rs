//! Event processors.
//!
//! - `EventRelay`: Receives `EventLog` from the ingestion channel, publishes
//!   to the `EventBroadcaster`

pub mod event_relay;

pub use event_relay::EventRelay;
