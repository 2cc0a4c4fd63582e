//! Destination chain payouts.
//!
//! A [`PayoutClient`] sends the flat compensating payment for one deposit. Which chain it pays on
//! is chosen by configuration through [`payout_client_from_config`]; the rest of the relayer
//! only talks to the trait, wrapped in a [`PayoutHandle`] that tracks whether the client has
//! finished initializing.

mod errors;
mod evm;
mod handle;
mod traits;
mod xrpl;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

use std::{sync::Arc, time::Duration};

pub use errors::{PayoutError, PayoutResult};
pub use evm::EvmPayoutClient;
pub use handle::{PayoutHandle, Readiness};
use relayer_common::rpc::JsonRpcClient;
use relayer_config::PayoutConfig;
use relayer_primitives::prelude::DestinationKind;
pub use traits::PayoutClient;
pub use xrpl::XrplPayoutClient;

/// Builds the payout client for the configured destination chain.
///
/// Submissions are never retried at the network level, a timed out submission may still have
/// been accepted.
pub fn payout_client_from_config(config: &PayoutConfig) -> PayoutResult<Arc<dyn PayoutClient>> {
    let rpc = JsonRpcClient::new(config.rpc_url.clone(), 0, Duration::ZERO)?;

    let client: Arc<dyn PayoutClient> = match config.kind {
        DestinationKind::Xrpl => Arc::new(XrplPayoutClient::new(
            rpc,
            config.account.clone(),
            config.secret.clone(),
            config.network_id,
        )),
        DestinationKind::Evm => {
            let network_id = config.network_id.ok_or(PayoutError::MissingNetworkId)?;
            Arc::new(EvmPayoutClient::new(
                rpc,
                &config.account,
                config.secret.clone(),
                network_id,
            )?)
        }
    };

    Ok(client)
}
