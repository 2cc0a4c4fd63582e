//! Primitive data types related to deposits observed on the source chain.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Height of a block on the source chain.
pub type BlockHeight = u64;

/// Globally unique identifier of a deposit.
///
/// This is the idempotency key for the whole relay pipeline: two [`DepositEvent`]s with the same
/// id must never both result in a payout. Ids derived from the source chain take the form
/// `<transaction_hash>:<log_index>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepositId(String);

/// Error returned when an identifier cannot be used as a [`DepositId`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DepositIdError {
    #[error("deposit id must not be empty")]
    Empty,
}

impl DepositId {
    /// Wraps an identifier that was already derived elsewhere (for example, read back from the
    /// ledger file).
    pub fn new(id: impl Into<String>) -> Result<Self, DepositIdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DepositIdError::Empty);
        }

        Ok(Self(id))
    }

    /// Derives the id of a deposit from the log that emitted it.
    pub fn from_log(transaction_hash: &str, log_index: u64) -> Self {
        Self(format!("{}:{log_index}", transaction_hash.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DepositId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A deposit event emitted by the bridge contract on the source chain.
///
/// Amounts are denominated in the smallest unit of the source chain's native asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    /// Source-chain account that made the deposit.
    pub sender: String,

    /// Amount locked before fees.
    pub gross_amount: u128,

    /// Fee retained by the bridge contract.
    pub fee_amount: u128,

    /// Amount locked after fees.
    pub net_amount: u128,

    /// Address on the destination ledger that should receive the payout. Opaque to the source
    /// side of the relayer.
    pub destination_address: String,

    /// Idempotency key of the deposit.
    pub deposit_id: DepositId,

    /// Source-chain height at which the event was emitted.
    pub block_number: BlockHeight,

    /// Source-chain transaction that emitted the event. Only used for auditing.
    pub transaction_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_id_from_log_is_lowercase() {
        let id = DepositId::from_log("0xABCDEF", 7);
        assert_eq!(id.as_str(), "0xabcdef:7");
    }

    #[test]
    fn test_deposit_id_rejects_empty() {
        assert_eq!(DepositId::new("  "), Err(DepositIdError::Empty));
        assert!(DepositId::new("dep-1").is_ok());
    }

    #[test]
    fn test_deposit_id_serializes_as_plain_string() {
        let ids = vec![DepositId::new("dep-1").unwrap(), DepositId::new("dep-2").unwrap()];
        let json = serde_json::to_string(&ids).unwrap();
        assert_eq!(json, r#"["dep-1","dep-2"]"#);
    }
}
