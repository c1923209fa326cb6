//! Escrow contract record.

use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One on-chain escrow agreement as observed by the relay.
///
/// This is a passive record: no status transitions are enforced and
/// addresses are not format-checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowContract {
    pub id: String,
    pub contract_addr: String,
    pub chain_id: u64,
    pub token_addr: String,
    pub token_symbol: CompactString,
    pub token_decimals: u8,
    /// Token amount in its decimal string form, kept as received so no
    /// precision is lost.
    pub amount: String,
    pub payer: String,
    pub payee: String,
    pub arbiter: String,
    pub status: EscrowStatus,
    /// Release/refund rule payload. No schema is defined yet.
    pub rule: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund_tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_tx_hash: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

impl EscrowContract {
    /// Parse `amount` as an exact decimal.
    pub fn amount_decimal(&self) -> Result<Decimal, rust_decimal::Error> {
        self.amount.trim().parse()
    }
}

/// Escrow status label.
///
/// The well-known labels get their own variant; anything else is kept
/// verbatim in [`EscrowStatus::Other`] so records round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EscrowStatus {
    Created,
    Funded,
    Released,
    Refunded,
    Disputed,
    Other(CompactString),
}

impl EscrowStatus {
    /// The wire label of this status.
    pub fn as_str(&self) -> &str {
        match self {
            EscrowStatus::Created => "created",
            EscrowStatus::Funded => "funded",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
            EscrowStatus::Disputed => "disputed",
            EscrowStatus::Other(label) => label.as_str(),
        }
    }
}

impl From<&str> for EscrowStatus {
    fn from(label: &str) -> Self {
        match label {
            "created" => EscrowStatus::Created,
            "funded" => EscrowStatus::Funded,
            "released" => EscrowStatus::Released,
            "refunded" => EscrowStatus::Refunded,
            "disputed" => EscrowStatus::Disputed,
            other => EscrowStatus::Other(CompactString::from(other)),
        }
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EscrowStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EscrowStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let label = CompactString::deserialize(deserializer)?;
        Ok(EscrowStatus::from(label.as_str()))
    }
}
