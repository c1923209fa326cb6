//! Server-sent events framing for `GET /api/events/stream`.
//!
//! # Protocol
//!
//! Each relayed [`EventLog`](super::EventLog) is one frame:
//!
//! ```text
//! id: 17
//! data: {"id":42,"escrow_addr":"0x..", ...}
//!
//! ```
//!
//! `id` is the relay sequence number. A client that reconnects sends it
//! back in the `Last-Event-ID` header to resume after that event. When some
//! of the events after that point are no longer retained, the stream opens
//! with a [`GAP_EVENT`] frame whose data is a [`StreamGap`]. Lines starting
//! with `:` are keep-alive comments.

use serde::{Deserialize, Serialize};

/// Header a reconnecting client uses to resume the stream.
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// SSE event name of the frame announcing missed events.
pub const GAP_EVENT: &str = "gap";

/// Longest line the decoder buffers. The rest of a longer line is dropped
/// along with the frame it belongs to.
pub const MAX_LINE_BYTES: usize = 2 * 1024 * 1024;

/// Payload of a [`GAP_EVENT`] frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamGap {
    /// Events after the resume point that could not be replayed.
    pub missed: u64,
}

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// The relay sequence number carried in `id`, if any.
    pub fn sequence(&self) -> Option<u64> {
        self.id.as_deref().and_then(|id| id.parse().ok())
    }
}

/// Incremental SSE decoder.
///
/// Feed raw body chunks with [`push`](SseDecoder::push); complete frames are
/// returned as soon as their terminating blank line arrives. Chunks may split
/// lines (and UTF-8 sequences) anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline.
    scanned: usize,
    /// Skipping the remainder of an over-long line.
    discarding: bool,
    pending: SseFrame,
    has_data: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start + self.scanned..]
            .iter()
            .position(|b| *b == b'\n')
        {
            let end = start + self.scanned + offset;
            self.scanned = 0;
            if std::mem::replace(&mut self.discarding, false) {
                start = end + 1;
                continue;
            }

            let mut line = &self.buffer[start..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let line = String::from_utf8_lossy(line).into_owned();
            start = end + 1;
            if let Some(frame) = self.feed_line(&line) {
                frames.push(frame);
            }
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        if self.buffer.len() > MAX_LINE_BYTES {
            self.buffer.clear();
            self.scanned = 0;
            self.discarding = true;
            self.pending = SseFrame::default();
            self.has_data = false;
        }

        frames
    }

    fn feed_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            let frame = std::mem::take(&mut self.pending);
            let dispatch = std::mem::replace(&mut self.has_data, false);
            return dispatch.then_some(frame);
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                if self.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_data = true;
            }
            "id" => self.pending.id = Some(value.to_string()),
            "event" => self.pending.event = Some(value.to_string()),
            _ => {}
        }
        None
    }
}
