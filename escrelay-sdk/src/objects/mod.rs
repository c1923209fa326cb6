pub mod escrow;
pub mod event_log;
pub mod product;
pub mod stream;

pub use escrow::{EscrowContract, EscrowStatus};
pub use event_log::EventLog;
pub use product::{Price, PriceError, Product};
pub use stream::{SseDecoder, SseFrame, StreamGap};

use serde::{Deserialize, Serialize};

/// Response body of the event ingestion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestAccepted {
    pub accepted: bool,
}
