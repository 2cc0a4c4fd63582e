//! Tasks feeding deposits from the source chain into the relayer.

use std::{sync::Arc, time::Duration};

use anyhow::bail;
use futures_util::StreamExt;
use relayer_primitives::prelude::{BlockHeight, DepositEvent};
use relayer_tasks::ShutdownGuard;
use tokio::sync::mpsc;
use tracing::*;

use crate::{
    errors::{SourceError, SourceResult},
    traits::{DepositSubscriber, SourceClient},
};

/// Cursor to start polling from on a cold start: `lookback` blocks behind the current head,
/// clamped at genesis.
pub async fn init_cursor(client: &dyn SourceClient, lookback: u64) -> SourceResult<BlockHeight> {
    let head = client.block_number().await?;
    Ok(head.saturating_sub(lookback))
}

/// Scans the source chain for deposits on a fixed interval.
///
/// The cursor is the last block whose deposits have all been handed to the intake. It lives in
/// memory only; after a restart the lookback window covers whatever was missed.
pub struct PollWatcher {
    client: Arc<dyn SourceClient>,
    events_tx: mpsc::Sender<DepositEvent>,
    poll_interval: Duration,
    lookback: u64,
    max_block_range: u64,
    cursor: Option<BlockHeight>,
}

impl PollWatcher {
    pub fn new(
        client: Arc<dyn SourceClient>,
        events_tx: mpsc::Sender<DepositEvent>,
        poll_interval: Duration,
        lookback: u64,
        max_block_range: u64,
    ) -> Self {
        Self {
            client,
            events_tx,
            poll_interval,
            lookback,
            max_block_range: max_block_range.max(1),
            cursor: None,
        }
    }

    /// Last fully scanned block, `None` before the cursor could be initialized.
    pub fn cursor(&self) -> Option<BlockHeight> {
        self.cursor
    }

    /// Runs one poll cycle, initializing the cursor first if needed.
    ///
    /// Scans `cursor + 1 ..= head` in chunks of at most `max_block_range` blocks and forwards
    /// the deposits found in log order. The cursor moves past each chunk once all its deposits
    /// were forwarded, so an error leaves it at the last completed chunk and the rest of the
    /// range is scanned again next cycle. Returns the number of deposits forwarded.
    pub async fn poll_once(&mut self) -> SourceResult<usize> {
        let cursor = match self.cursor {
            Some(cursor) => cursor,
            None => {
                let cursor = init_cursor(self.client.as_ref(), self.lookback).await?;
                info!(%cursor, lookback = %self.lookback, "initialized deposit poll cursor");
                self.cursor = Some(cursor);
                cursor
            }
        };

        let head = self.client.block_number().await?;
        let from = cursor.saturating_add(1);
        if from > head {
            trace!(%cursor, %head, "polled source chain, nothing to do");
            return Ok(0);
        }

        let mut forwarded = 0;
        let mut start = from;
        while start <= head {
            let end = start.saturating_add(self.max_block_range - 1).min(head);

            let deposits = self.client.get_deposits(start, end).await?;
            for deposit in deposits {
                debug!(
                    deposit_id = %deposit.deposit_id,
                    block = %deposit.block_number,
                    tx = %deposit.transaction_hash,
                    "deposit detected"
                );
                self.events_tx
                    .send(deposit)
                    .await
                    .map_err(|_| SourceError::IntakeClosed)?;
                forwarded += 1;
            }

            self.cursor = Some(end);
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }

        if forwarded > 0 {
            info!(%from, to = %head, %forwarded, "polled source chain");
        }
        Ok(forwarded)
    }

    /// Polls until shutdown. Transport errors, including failing to read the head for the
    /// initial cursor, are logged and retried on the next tick.
    pub async fn run(mut self, shutdown: ShutdownGuard) -> anyhow::Result<()> {
        info!(
            poll_interval_ms = %self.poll_interval.as_millis(),
            lookback = %self.lookback,
            "started deposit poll watcher"
        );

        loop {
            if shutdown.should_shutdown() {
                break;
            }

            let cursor = self.cursor;
            let poll_span = debug_span!("deposit_poll", ?cursor);

            match self.poll_once().instrument(poll_span).await {
                Ok(_) => {}
                Err(SourceError::IntakeClosed) => {
                    info!("deposit intake closed, stopping poll watcher");
                    break;
                }
                Err(err) => warn!(?cursor, %err, "failed to poll source chain"),
            }

            tokio::select! {
                _ = shutdown.wait_for_shutdown() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(cursor = ?self.cursor, "deposit poll watcher stopped");
        Ok(())
    }
}

/// Forwards deposits pushed by a log subscription.
///
/// Losing the subscription is an error: nothing resubscribes, and returning the error from a
/// critical task takes the process down so it can be restarted with a fresh lookback.
pub struct PushWatcher {
    subscriber: Arc<dyn DepositSubscriber>,
    events_tx: mpsc::Sender<DepositEvent>,
}

impl PushWatcher {
    pub fn new(subscriber: Arc<dyn DepositSubscriber>, events_tx: mpsc::Sender<DepositEvent>) -> Self {
        Self {
            subscriber,
            events_tx,
        }
    }

    pub async fn run(self, shutdown: ShutdownGuard) -> anyhow::Result<()> {
        let mut stream = self.subscriber.subscribe_deposits().await?;
        info!("subscribed to deposit events");

        loop {
            tokio::select! {
                _ = shutdown.wait_for_shutdown() => break,
                item = stream.next() => match item {
                    Some(Ok(deposit)) => {
                        debug!(
                            deposit_id = %deposit.deposit_id,
                            block = %deposit.block_number,
                            tx = %deposit.transaction_hash,
                            "deposit detected"
                        );
                        if self.events_tx.send(deposit).await.is_err() {
                            info!("deposit intake closed, stopping push watcher");
                            break;
                        }
                    }
                    Some(Err(err)) => bail!("deposit subscription failed: {err}"),
                    None => bail!("deposit subscription closed"),
                },
            }
        }

        // dropping the stream unsubscribes
        drop(stream);
        info!("deposit push watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use relayer_tasks::TaskManager;

    use super::*;
    use crate::test_utils::{deposit, TestSourceChain};

    fn watcher(
        chain: &Arc<TestSourceChain>,
        lookback: u64,
        max_block_range: u64,
    ) -> (PollWatcher, mpsc::Receiver<DepositEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let w = PollWatcher::new(
            chain.clone(),
            tx,
            Duration::from_millis(5),
            lookback,
            max_block_range,
        );
        (w, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<DepositEvent>) -> Vec<String> {
        let mut ids = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            ids.push(ev.deposit_id.to_string());
        }
        ids
    }

    #[tokio::test]
    async fn test_init_cursor() {
        let chain = TestSourceChain::new(100_000);
        assert_eq!(init_cursor(&chain, 2_000).await.unwrap(), 98_000);

        let chain = TestSourceChain::new(500);
        assert_eq!(init_cursor(&chain, 2_000).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_first_poll_finds_deposit_in_lookback() {
        let chain = Arc::new(TestSourceChain::new(100_000));
        chain.add_deposit(deposit("dep-1", 99_500, "rDest"));
        // before the lookback window, never seen
        chain.add_deposit(deposit("dep-old", 97_000, "rDest"));

        let (mut w, mut rx) = watcher(&chain, 2_000, 2_000);
        assert_eq!(w.poll_once().await.unwrap(), 1);

        assert_eq!(drain(&mut rx), vec!["dep-1"]);
        assert_eq!(w.cursor(), Some(100_000));
        assert_eq!(chain.scanned_ranges(), vec![(98_001, 100_000)]);
    }

    #[tokio::test]
    async fn test_cursor_is_monotonic_and_ranges_disjoint() {
        let chain = Arc::new(TestSourceChain::new(1_000));
        let (mut w, _rx) = watcher(&chain, 10, 2_000);

        w.poll_once().await.unwrap();
        // head did not move
        w.poll_once().await.unwrap();
        chain.set_head(1_005);
        w.poll_once().await.unwrap();
        chain.set_head(1_012);
        w.poll_once().await.unwrap();

        assert_eq!(w.cursor(), Some(1_012));
        assert_eq!(
            chain.scanned_ranges(),
            vec![(991, 1_000), (1_001, 1_005), (1_006, 1_012)]
        );
    }

    #[tokio::test]
    async fn test_wide_range_is_chunked() {
        let chain = Arc::new(TestSourceChain::new(250));
        chain.add_deposit(deposit("dep-a", 120, "rDest"));
        chain.add_deposit(deposit("dep-b", 10, "rDest"));
        let (mut w, mut rx) = watcher(&chain, 250, 100);

        assert_eq!(w.poll_once().await.unwrap(), 2);

        assert_eq!(
            chain.scanned_ranges(),
            vec![(1, 100), (101, 200), (201, 250)]
        );
        assert_eq!(drain(&mut rx), vec!["dep-b", "dep-a"]);
    }

    #[tokio::test]
    async fn test_failed_poll_does_not_advance_cursor() {
        let chain = Arc::new(TestSourceChain::new(1_000));
        let (mut w, mut rx) = watcher(&chain, 100, 2_000);
        w.poll_once().await.unwrap();
        assert_eq!(w.cursor(), Some(1_000));

        chain.set_head(1_050);
        chain.add_deposit(deposit("dep-1", 1_020, "rDest"));
        // head read succeeds, log query fails
        chain.fail_get_deposits_next(1);
        assert!(w.poll_once().await.is_err());
        assert_eq!(w.cursor(), Some(1_000));
        assert!(drain(&mut rx).is_empty());

        // same range retried
        assert_eq!(w.poll_once().await.unwrap(), 1);
        assert_eq!(w.cursor(), Some(1_050));
        assert_eq!(drain(&mut rx), vec!["dep-1"]);
    }

    #[tokio::test]
    async fn test_head_failure_at_startup_is_retried() {
        let chain = Arc::new(TestSourceChain::new(1_000));
        chain.fail_next_calls(2);
        let (mut w, _rx) = watcher(&chain, 100, 2_000);

        assert!(w.poll_once().await.is_err());
        assert_eq!(w.cursor(), None);
        assert!(w.poll_once().await.is_err());
        assert_eq!(w.poll_once().await.unwrap(), 0);
        assert_eq!(w.cursor(), Some(1_000));
    }

    #[tokio::test]
    async fn test_closed_intake_stops_poll() {
        let chain = Arc::new(TestSourceChain::new(1_000));
        chain.add_deposit(deposit("dep-1", 999, "rDest"));
        let (mut w, rx) = watcher(&chain, 100, 2_000);
        drop(rx);

        assert!(matches!(w.poll_once().await, Err(SourceError::IntakeClosed)));
        assert_eq!(w.cursor(), Some(900));
    }

    #[test]
    fn test_push_watcher_fails_when_subscription_drops() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let manager = TaskManager::new(runtime.handle().clone());
        let executor = manager.executor();

        let chain = Arc::new(TestSourceChain::new(0));
        let (tx, mut rx) = mpsc::channel(8);
        let push = PushWatcher::new(chain.clone(), tx);
        executor.spawn_critical_async_with_shutdown("push-watcher", |shutdown| push.run(shutdown));

        chain.push_deposit(deposit("dep-1", 5, "rDest"));
        let received = runtime.block_on(rx.recv()).unwrap();
        assert_eq!(received.deposit_id.as_str(), "dep-1");

        chain.close_subscription();

        let err = manager
            .monitor(Some(Duration::from_secs(5)))
            .expect_err("dropped subscription is fatal");
        assert_eq!(err.task_name(), "push-watcher");
    }
}
