//! Error types for the RPC client.
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// The error type for errors produced by [`JsonRpcClient`](super::JsonRpcClient).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// RPC server returned an error object.
    #[error("RPC server returned error '{1}' (code {0})")]
    Server(i64, String),

    #[error("Error parsing rpc response: {0}")]
    Parse(String),

    /// Error creating the RPC request
    #[error("Could not create RPC Param: {0}")]
    Param(String),

    /// Body error, unlikely to be recoverable by retrying
    #[error("{0}")]
    Body(String),

    /// HTTP status error, not retryable
    #[error("Obtained failure status({0}): {1}")]
    Status(String, String),

    /// Error decoding the response, retry might help
    #[error("Malformed Response: {0}")]
    MalformedResponse(String),

    /// Connection error, retry might help
    #[error("Could not connect: {0}")]
    Connection(String),

    /// Timeout error, retry might help
    #[error("Timeout")]
    Timeout,

    /// Redirect error, not retryable
    #[error("HttpRedirect: {0}")]
    HttpRedirect(String),

    /// Error building the request, unlikely to be recoverable
    #[error("Could not build request: {0}")]
    ReqBuilder(String),

    /// General request error, retry might help
    #[error("Could not create request: {0}")]
    Request(String),

    /// Unknown error, unlikely to be recoverable
    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// Whether the request provably never reached the server or was answered with an explicit
    /// rejection, as opposed to failing somewhere after being sent.
    pub fn is_before_send(&self) -> bool {
        matches!(
            self,
            Self::Server(..)
                | Self::Param(_)
                | Self::Connection(_)
                | Self::ReqBuilder(_)
                | Self::HttpRedirect(_)
        )
    }
}

impl From<SerdeJsonError> for ClientError {
    fn from(value: SerdeJsonError) -> Self {
        Self::Parse(format!("Could not parse {}", value))
    }
}

/// JSON-RPC error object.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC error {}: {}", self.code, self.message)
    }
}

impl From<RpcError> for ClientError {
    fn from(value: RpcError) -> Self {
        Self::Server(value.code, value.message)
    }
}
