use std::sync::Arc;

use anyhow::Context;
use relayer_common::retry::{policies::ExponentialBackoff, retry_with_backoff};
use relayer_primitives::prelude::PayoutReceipt;
use relayer_tasks::TaskExecutor;
use tokio::sync::watch;
use tracing::*;

use crate::{errors::PayoutResult, traits::PayoutClient};

/// Initialization state of a payout client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    /// Initialization gave up. Terminal.
    Failed,
}

/// Shares one [`PayoutClient`] and publishes its one-shot readiness.
///
/// Initialization runs in the background so that deposits can be watched for while the
/// destination account is still loading. Callers either check [`ready`](Self::ready) or wait for
/// the outcome with [`wait_ready`](Self::wait_ready).
pub struct PayoutHandle {
    client: Arc<dyn PayoutClient>,
    readiness: watch::Sender<Readiness>,
}

impl std::fmt::Debug for PayoutHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayoutHandle")
            .field("chain", &self.client.chain())
            .field("account", &self.client.account())
            .field("readiness", &self.readiness())
            .finish()
    }
}

impl PayoutHandle {
    pub fn new(client: Arc<dyn PayoutClient>) -> Self {
        let (readiness, _) = watch::channel(Readiness::Pending);
        Self { client, readiness }
    }

    pub fn client(&self) -> &Arc<dyn PayoutClient> {
        &self.client
    }

    pub fn readiness(&self) -> Readiness {
        *self.readiness.borrow()
    }

    pub fn ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    /// Resolves once initialization finished: `true` if the client is ready, `false` if
    /// initialization failed.
    pub async fn wait_ready(&self) -> bool {
        let mut rx = self.readiness.subscribe();
        // the sender lives in `self`, so the channel cannot close while we wait
        let ready = match rx.wait_for(|r| *r != Readiness::Pending).await {
            Ok(r) => *r == Readiness::Ready,
            Err(_) => false,
        };
        ready
    }

    /// Initializes the client, retrying up to `retries` times with exponential backoff, and
    /// publishes the outcome.
    pub async fn initialize(&self, retries: u16, backoff: &ExponentialBackoff) -> PayoutResult<()> {
        let chain = self.client.chain();
        info!(%chain, account = %self.client.account(), "initializing payout client");

        let res = retry_with_backoff("payout-init", retries, backoff, || self.client.init()).await;

        match &res {
            Ok(()) => {
                info!(%chain, "payout client ready");
                self.readiness.send_replace(Readiness::Ready);
            }
            Err(err) => {
                error!(%chain, %err, "payout client initialization failed");
                self.readiness.send_replace(Readiness::Failed);
            }
        }
        res
    }

    /// Runs [`initialize`](Self::initialize) as a critical task. Exhausting the retries fails the
    /// task, which stops the process.
    pub fn start_init(self: &Arc<Self>, executor: &TaskExecutor, retries: u16) {
        let handle = self.clone();
        executor.spawn_critical_async("payout-init", async move {
            handle
                .initialize(retries, &ExponentialBackoff::default())
                .await
                .context("payout client could not be initialized")
        });
    }

    /// Pays `amount` to `destination` through the wrapped client.
    pub async fn pay(&self, destination: &str, amount: u128) -> PayoutResult<PayoutReceipt> {
        self.client.pay(destination, amount).await
    }
}
