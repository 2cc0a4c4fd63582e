use relayer_common::rpc::ClientError;
use thiserror::Error;

/// XRPL engine results that mean the transaction's sequence did not match the account's.
const XRPL_SEQUENCE_RESULTS: &[&str] = &["tefPAST_SEQ", "terPRE_SEQ"];

#[derive(Debug, Error)]
pub enum PayoutError {
    /// Transport or protocol failure talking to the destination node.
    #[error("rpc: {0}")]
    Rpc(#[from] ClientError),

    /// The destination node refused the request or the transaction.
    #[error("rejected with {code}: {message}")]
    Rejected { code: String, message: String },

    #[error("invalid destination address '{0}'")]
    InvalidDestination(String),

    #[error("invalid account '{0}'")]
    InvalidAccount(String),

    #[error("payout amount {0} is out of range for the destination chain")]
    InvalidAmount(u128),

    #[error("connected to network {got}, expected {expected}")]
    WrongNetwork { expected: u64, got: u64 },

    #[error("network id is required for this destination chain")]
    MissingNetworkId,

    #[error("payout client has not been initialized")]
    NotInitialized,

    /// The node answered, but not in a shape we understand. Whether a submission went through is
    /// unknown.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl PayoutError {
    /// Whether the failure proves the payout never reached the destination chain, so the deposit
    /// can safely be paid later.
    ///
    /// Everything else (timeouts, lost connections, responses we could not read) is ambiguous.
    pub fn is_pre_submission(&self) -> bool {
        match self {
            Self::Rpc(err) => err.is_before_send(),
            Self::Rejected { code, .. } => !code.starts_with("tec") && !code.starts_with("ter"),
            Self::InvalidDestination(_)
            | Self::InvalidAccount(_)
            | Self::InvalidAmount(_)
            | Self::WrongNetwork { .. }
            | Self::MissingNetworkId
            | Self::NotInitialized => true,
            Self::UnexpectedResponse(_) => false,
        }
    }

    /// Whether the tracked sequence or nonce is likely out of sync with the chain, either because
    /// the node reported a mismatch or because a failed transaction still consumed it.
    pub fn needs_sequence_resync(&self) -> bool {
        match self {
            Self::Rejected { code, .. } => {
                XRPL_SEQUENCE_RESULTS.contains(&code.as_str()) || code.starts_with("tec")
            }
            Self::Rpc(ClientError::Server(_, message)) => {
                let message = message.to_lowercase();
                message.contains("nonce too low") || message.contains("nonce too high")
            }
            _ => false,
        }
    }
}

pub type PayoutResult<T> = Result<T, PayoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(code: &str) -> PayoutError {
        PayoutError::Rejected {
            code: code.to_string(),
            message: String::new(),
        }
    }

    #[test]
    fn test_classification() {
        assert!(rejected("temBAD_AMOUNT").is_pre_submission());
        assert!(rejected("tefPAST_SEQ").is_pre_submission());
        assert!(rejected("actNotFound").is_pre_submission());
        // claimed fee, the transaction is in a ledger
        assert!(!rejected("tecUNFUNDED_PAYMENT").is_pre_submission());
        assert!(!PayoutError::Rpc(ClientError::Timeout).is_pre_submission());
        assert!(!PayoutError::UnexpectedResponse("{}".into()).is_pre_submission());
    }

    #[test]
    fn test_sequence_resync() {
        assert!(rejected("tefPAST_SEQ").needs_sequence_resync());
        assert!(rejected("terPRE_SEQ").needs_sequence_resync());
        assert!(!rejected("temBAD_AMOUNT").needs_sequence_resync());
        assert!(
            PayoutError::Rpc(ClientError::Server(-32000, "nonce too low".into()))
                .needs_sequence_resync()
        );
    }
}
