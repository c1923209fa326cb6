//! Observed on-chain event record.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use super::escrow::EscrowContract;

/// One on-chain event tied to an escrow contract.
///
/// `escrow_addr` is a lookup key into [`EscrowContract::contract_addr`],
/// not an ownership edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    pub id: i64,
    pub escrow_addr: String,
    pub event_type: CompactString,
    pub block_number: u64,
    pub tx_hash: String,
    /// Decoded event payload as emitted by the watcher.
    pub raw: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: time::OffsetDateTime,
}

impl EventLog {
    /// Whether this event refers to `contract`.
    ///
    /// Hex addresses are compared case-insensitively since checksummed and
    /// lowercase forms name the same account.
    pub fn belongs_to(&self, contract: &EscrowContract) -> bool {
        self.escrow_addr
            .eq_ignore_ascii_case(&contract.contract_addr)
    }
}
