//! Primitive data types related to payouts on the destination chain.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The destination chains a payout can be made on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    /// XRP Ledger, paid through a `rippled` JSON-RPC endpoint.
    #[default]
    Xrpl,

    /// An EVM chain, paid from a node-managed account.
    Evm,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationKind::Xrpl => write!(f, "xrpl"),
            DestinationKind::Evm => write!(f, "evm"),
        }
    }
}

impl FromStr for DestinationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xrpl" | "xrp" => Ok(DestinationKind::Xrpl),
            "evm" | "eth" => Ok(DestinationKind::Evm),
            other => Err(format!(
                "unknown destination kind, expected: xrpl or evm, got: {other}"
            )),
        }
    }
}

/// Receipt of a payout accepted by the destination chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    /// Destination-chain transaction id.
    pub transaction_id: String,

    /// Account sequence (or nonce) consumed by the payout.
    pub sequence: u64,
}
