//! Escrow Event Relay SDK.
//!
//! Wire types shared by the relay server and its clients: escrow contract
//! and event log records, the validated product record, request signing,
//! and (behind the `client` feature) an HTTP client.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
pub mod signature;
pub mod validation;
