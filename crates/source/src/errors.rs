use relayer_common::rpc::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rpc: {0}")]
    Rpc(#[from] ClientError),

    #[error("subscription: {0}")]
    Subscription(String),

    #[error("could not decode deposit log: {0}")]
    Decode(String),

    /// The receiving side of the event channel is gone, nobody is listening for deposits.
    #[error("deposit intake closed")]
    IntakeClosed,
}

impl From<jsonrpsee::core::ClientError> for SourceError {
    fn from(value: jsonrpsee::core::ClientError) -> Self {
        Self::Subscription(value.to_string())
    }
}

pub type SourceResult<T> = Result<T, SourceError>;
