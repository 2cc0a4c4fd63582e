use async_trait::async_trait;
use relayer_primitives::prelude::{DestinationKind, PayoutReceipt};

use crate::errors::PayoutResult;

/// Sends payouts from a single account on a destination chain.
///
/// Implementations track the account's sequence (or nonce) themselves and must never hand the
/// same one to two submissions, whatever the number of concurrent callers.
#[async_trait]
pub trait PayoutClient: Send + Sync + 'static {
    /// Destination chain this client pays on.
    fn chain(&self) -> DestinationKind;

    /// Paying account.
    fn account(&self) -> &str;

    /// Loads the account state needed before the first payout. May be called again after a
    /// failure.
    async fn init(&self) -> PayoutResult<()>;

    /// Submits a payment of `amount` (smallest destination unit) to `destination`.
    ///
    /// Errors are returned as is, the submission is not retried.
    async fn pay(&self, destination: &str, amount: u128) -> PayoutResult<PayoutReceipt>;
}
