//! Producer authentication for the relay ingestion route.
//!
//! A chain watcher holding the shared ingest secret signs the exact bytes it
//! posts to `POST /api/events`:
//!
//! ```text
//! Escrelay-Signature: {unix_timestamp}.{base64(HMAC-SHA256("{unix_timestamp}.{body}", secret))}
//! ```
//!
//! The relay checks the timestamp against its own clock first (either
//! direction, [`MAX_CLOCK_SKEW`]), then the MAC over the raw body, and only
//! then parses the body. Freshness bounds how long a captured request stays
//! valid; replays inside the window are caught by event deduplication on the
//! server.

use std::fmt;
use std::str::FromStr;

use ring::hmac;

use crate::objects::EventLog;

/// Header name for the ingestion signature.
pub const SIGNATURE_HEADER: &str = "Escrelay-Signature";

/// Largest accepted distance, in seconds, between the signing timestamp and
/// the relay clock.
pub const MAX_CLOCK_SKEW: i64 = 5 * 60;

/// Errors produced while checking a producer signature.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("signature timestamp is {skew}s away from the relay clock")]
    Stale { skew: i64 },
    #[error("signature does not match body")]
    Mismatch,
}

/// Parsed `Escrelay-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub mac: Box<[u8]>,
}

impl FromStr for SignatureHeader {
    type Err = SignatureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (timestamp, encoded) = value
            .trim()
            .split_once('.')
            .ok_or(SignatureError::InvalidFormat)?;
        let timestamp = timestamp
            .parse()
            .map_err(|_| SignatureError::InvalidFormat)?;
        let mac = fast32::base64::RFC4648_NOPAD
            .decode_str(encoded)
            .map_err(|_| SignatureError::InvalidBase64)?
            .into_boxed_slice();
        Ok(Self { timestamp, mac })
    }
}

impl fmt::Display for SignatureHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.timestamp,
            fast32::base64::RFC4648_NOPAD.encode(&self.mac)
        )
    }
}

/// HMAC-SHA256 key derived from the shared ingest secret.
#[derive(Clone)]
pub struct IngestKey(hmac::Key);

impl IngestKey {
    pub fn new(secret: &[u8]) -> Self {
        Self(hmac::Key::new(hmac::HMAC_SHA256, secret))
    }

    /// Sign `body` as of `timestamp`.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> SignatureHeader {
        let tag = hmac::sign(&self.0, &signing_input(timestamp, body));
        SignatureHeader {
            timestamp,
            mac: tag.as_ref().into(),
        }
    }

    /// Check `header` against `body` with the relay clock at `now`.
    pub fn verify(
        &self,
        header: &SignatureHeader,
        body: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        check_freshness(header.timestamp, now)?;
        hmac::verify(&self.0, &signing_input(header.timestamp, body), &header.mac)
            .map_err(|_| SignatureError::Mismatch)
    }
}

impl fmt::Debug for IngestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IngestKey(..)")
    }
}

fn signing_input(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut input = format!("{timestamp}.").into_bytes();
    input.extend_from_slice(body);
    input
}

/// Reject timestamps more than [`MAX_CLOCK_SKEW`] seconds from `now`, in
/// the past or in the future.
pub fn check_freshness(timestamp: i64, now: i64) -> Result<(), SignatureError> {
    let skew = now.saturating_sub(timestamp);
    if skew.saturating_abs() > MAX_CLOCK_SKEW {
        return Err(SignatureError::Stale { skew });
    }
    Ok(())
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// An [`EventLog`] serialized and signed for posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEvent {
    pub header: SignatureHeader,
    pub body: String,
}

impl SignedEvent {
    /// Serialize and sign `event` with the current time.
    pub fn sign(event: &EventLog, key: &IngestKey) -> Result<Self, serde_json::Error> {
        Self::sign_at(event, key, unix_now())
    }

    pub fn sign_at(
        event: &EventLog,
        key: &IngestKey,
        timestamp: i64,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(event)?;
        let header = key.sign(timestamp, body.as_bytes());
        Ok(Self { header, body })
    }
}
