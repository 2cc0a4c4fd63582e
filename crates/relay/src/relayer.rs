use std::sync::Arc;

use relayer_config::RelayerConfig;
use relayer_ledger::DedupLedger;
use relayer_payout::{payout_client_from_config, PayoutClient, PayoutHandle};
use relayer_primitives::prelude::DepositEvent;
use relayer_source::{
    ConfirmationGate, DepositSubscriber, EvmRpcClient, EvmSubscriptionClient, PollWatcher,
    PushWatcher, SourceClient,
};
use relayer_tasks::{ShutdownGuard, ShutdownSignal, TaskExecutor};
use tokio::sync::mpsc;
use tracing::*;

use crate::{
    errors::RelayResult,
    queue::{DispatchQueue, QueueStats},
};

/// Deposits detected but not yet taken in by the queue. A full channel makes the watcher wait.
pub const INTAKE_CAPACITY: usize = 1024;

/// Builds the relayer from configuration: HTTP source client, WebSocket subscription if a
/// `ws_url` is set, and the configured payout client.
pub async fn relayer_from_config(config: RelayerConfig) -> RelayResult<Relayer> {
    let source_cfg = &config.source;

    let source = Arc::new(EvmRpcClient::new(
        source_cfg.rpc_url.clone(),
        source_cfg.contract_address,
        source_cfg.rpc_retry_count,
        source_cfg.rpc_retry_interval(),
    )?);

    let subscriber: Option<Arc<dyn DepositSubscriber>> = match &source_cfg.ws_url {
        Some(url) => Some(Arc::new(
            EvmSubscriptionClient::connect(url, source_cfg.contract_address).await?,
        )),
        None => None,
    };

    let payout = payout_client_from_config(&config.payout)?;

    Relayer::new(config, source, subscriber, payout).await
}

/// Everything the relay pipeline needs, ready to be started.
pub struct Relayer {
    config: RelayerConfig,
    source: Arc<dyn SourceClient>,
    subscriber: Option<Arc<dyn DepositSubscriber>>,
    payout: Arc<PayoutHandle>,
    ledger: Arc<DedupLedger>,
}

impl Relayer {
    /// Loads the dedup ledger. Payouts left unresolved by an earlier run are reported; those
    /// deposits are not paid again.
    pub async fn new(
        config: RelayerConfig,
        source: Arc<dyn SourceClient>,
        subscriber: Option<Arc<dyn DepositSubscriber>>,
        payout_client: Arc<dyn PayoutClient>,
    ) -> RelayResult<Self> {
        let ledger = DedupLedger::load(config.ledger.path.clone()).await?;

        let unresolved = ledger.unresolved();
        if !unresolved.is_empty() {
            warn!(
                count = %unresolved.len(),
                ids = ?unresolved,
                ledger = %ledger.path().display(),
                "payouts with unknown outcome from a previous run, check them on the destination chain"
            );
        }

        Ok(Self {
            config,
            source,
            subscriber,
            payout: Arc::new(PayoutHandle::new(payout_client)),
            ledger: Arc::new(ledger),
        })
    }

    pub fn ledger(&self) -> &Arc<DedupLedger> {
        &self.ledger
    }

    pub fn payout(&self) -> &Arc<PayoutHandle> {
        &self.payout
    }

    /// Spawns the pipeline's tasks on `executor`:
    ///
    /// - `payout-init`, initializing the payout client in the background.
    /// - `deposit-push-watcher` or `deposit-poll-watcher`, depending on whether a subscription is
    ///   available.
    /// - `deposit-intake`, feeding detected deposits to the dispatch queue and draining it on
    ///   shutdown.
    ///
    /// All of them are critical: payout initialization running out of retries or the
    /// subscription dropping stops the process.
    pub fn start(self, executor: &TaskExecutor) -> RelayerHandle {
        let Self {
            config,
            source,
            subscriber,
            payout,
            ledger,
        } = self;
        let source_cfg = &config.source;

        payout.start_init(executor, config.payout.init_retries);

        let gate = ConfirmationGate::new(
            source.clone(),
            source_cfg.required_confirmations,
            source_cfg.poll_interval(),
        );
        let queue = DispatchQueue::new(
            ledger,
            payout,
            gate,
            config.payout.amount,
            config.dispatch.max_parallel_payouts,
            executor.handle().clone(),
        );

        let (events_tx, events_rx) = mpsc::channel(INTAKE_CAPACITY);

        let mode = match subscriber {
            Some(subscriber) => {
                let watcher = PushWatcher::new(subscriber, events_tx);
                executor.spawn_critical_async_with_shutdown("deposit-push-watcher", |shutdown| {
                    watcher.run(shutdown)
                });
                "push"
            }
            None => {
                let watcher = PollWatcher::new(
                    source,
                    events_tx,
                    source_cfg.poll_interval(),
                    source_cfg.poll_lookback_blocks,
                    source_cfg.max_block_range,
                );
                executor.spawn_critical_async_with_shutdown("deposit-poll-watcher", |shutdown| {
                    watcher.run(shutdown)
                });
                "poll"
            }
        };

        let intake_queue = queue.clone();
        executor.spawn_critical_async_with_shutdown("deposit-intake", |shutdown| {
            intake_task(intake_queue, events_rx, shutdown)
        });

        info!(
            %mode,
            contract = %source_cfg.contract_address,
            destination = %config.payout.kind,
            max_parallel_payouts = %config.dispatch.max_parallel_payouts,
            required_confirmations = %source_cfg.required_confirmations,
            "relayer started"
        );

        RelayerHandle {
            queue,
            shutdown: executor.shutdown_signal(),
        }
    }
}

/// Handle to a started relayer.
#[derive(Clone)]
pub struct RelayerHandle {
    queue: DispatchQueue,
    shutdown: ShutdownSignal,
}

impl RelayerHandle {
    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Asks every relayer task to stop. Detection stops, new deposits are refused and in-flight
    /// payouts are left to finish; the task manager waits for all of it.
    pub fn shutdown(&self) {
        info!("relayer shutdown requested");
        self.shutdown.send();
    }
}

async fn intake_task(
    queue: DispatchQueue,
    mut events_rx: mpsc::Receiver<DepositEvent>,
    shutdown: ShutdownGuard,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.wait_for_shutdown() => break,
            event = events_rx.recv() => match event {
                Some(event) => {
                    queue.enqueue(event);
                }
                None => {
                    debug!("deposit watcher gone");
                    break;
                }
            },
        }
    }

    drop(events_rx);
    queue.close();

    let stats = queue.stats();
    if stats.active > 0 {
        info!(active = %stats.active, "waiting for in-flight payouts");
    }
    queue.wait_idle().await;

    info!("relayer stopped");
    Ok(())
}
