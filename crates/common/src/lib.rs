//! Crate includes reusable utils for services that handle common behavior.
//! Such as initializing the tracing framework, parsing the environment, talking JSON-RPC over
//! HTTP and retrying operations with backoff.

pub mod env;
pub mod logging;
pub mod retry;
pub mod rpc;
