//! Minimal JSON-RPC over HTTP transport shared by the source and destination chain clients.

mod client;
mod error;

pub use client::{ClientResult, JsonRpcClient};
pub use error::{ClientError, RpcError};
