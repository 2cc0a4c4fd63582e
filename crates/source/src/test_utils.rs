//! In-memory source chain for tests.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use parking_lot::Mutex;
use relayer_common::rpc::ClientError;
use relayer_primitives::prelude::{BlockHeight, DepositEvent, DepositId};
use tokio::sync::mpsc;

use crate::{
    errors::{SourceError, SourceResult},
    traits::{DepositStream, DepositSubscriber, SourceClient},
};

/// Builds a deposit paying `100` to `destination`, with `id` used verbatim as the deposit id.
pub fn deposit(id: &str, block: BlockHeight, destination: &str) -> DepositEvent {
    DepositEvent {
        sender: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
        gross_amount: 110,
        fee_amount: 10,
        net_amount: 100,
        destination_address: destination.to_string(),
        deposit_id: DepositId::new(id).expect("test deposit id"),
        block_number: block,
        transaction_hash: format!("0x{:064x}", block),
    }
}

/// A scriptable source chain implementing both [`SourceClient`] and [`DepositSubscriber`].
#[derive(Debug)]
pub struct TestSourceChain {
    head: AtomicU64,
    deposits: Mutex<Vec<DepositEvent>>,
    scanned: Mutex<Vec<(BlockHeight, BlockHeight)>>,
    head_calls: AtomicUsize,
    fail_calls: AtomicUsize,
    fail_get_deposits: AtomicUsize,
    push_tx: Mutex<Option<mpsc::UnboundedSender<DepositEvent>>>,
    push_rx: Mutex<Option<mpsc::UnboundedReceiver<DepositEvent>>>,
}

impl TestSourceChain {
    pub fn new(head: BlockHeight) -> Self {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        Self {
            head: AtomicU64::new(head),
            deposits: Mutex::new(Vec::new()),
            scanned: Mutex::new(Vec::new()),
            head_calls: AtomicUsize::new(0),
            fail_calls: AtomicUsize::new(0),
            fail_get_deposits: AtomicUsize::new(0),
            push_tx: Mutex::new(Some(push_tx)),
            push_rx: Mutex::new(Some(push_rx)),
        }
    }

    pub fn head(&self) -> BlockHeight {
        self.head.load(Ordering::SeqCst)
    }

    pub fn set_head(&self, head: BlockHeight) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn advance(&self, blocks: u64) {
        self.head.fetch_add(blocks, Ordering::SeqCst);
    }

    /// Makes a deposit visible to log queries.
    pub fn add_deposit(&self, deposit: DepositEvent) {
        self.deposits.lock().push(deposit);
    }

    /// Fails the next `n` calls, of either method.
    pub fn fail_next_calls(&self, n: usize) {
        self.fail_calls.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` log queries only.
    pub fn fail_get_deposits_next(&self, n: usize) {
        self.fail_get_deposits.store(n, Ordering::SeqCst);
    }

    /// Every range passed to a successful log query, in call order.
    pub fn scanned_ranges(&self) -> Vec<(BlockHeight, BlockHeight)> {
        self.scanned.lock().clone()
    }

    /// Number of head reads, failed ones included.
    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    /// Pushes a deposit to the subscription.
    pub fn push_deposit(&self, deposit: DepositEvent) {
        if let Some(tx) = self.push_tx.lock().as_ref() {
            let _ = tx.send(deposit);
        }
    }

    /// Ends the subscription stream, as if the connection dropped.
    pub fn close_subscription(&self) {
        self.push_tx.lock().take();
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn injected_error() -> SourceError {
        SourceError::Rpc(ClientError::Connection("injected failure".to_string()))
    }
}

#[async_trait]
impl SourceClient for TestSourceChain {
    async fn block_number(&self) -> SourceResult<BlockHeight> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fail_calls) {
            return Err(Self::injected_error());
        }
        Ok(self.head())
    }

    async fn get_deposits(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> SourceResult<Vec<DepositEvent>> {
        if Self::take_failure(&self.fail_calls) || Self::take_failure(&self.fail_get_deposits) {
            return Err(Self::injected_error());
        }
        self.scanned.lock().push((from, to));

        let mut found: Vec<_> = self
            .deposits
            .lock()
            .iter()
            .filter(|d| d.block_number >= from && d.block_number <= to)
            .cloned()
            .collect();
        found.sort_by_key(|d| d.block_number);
        Ok(found)
    }
}

#[async_trait]
impl DepositSubscriber for TestSourceChain {
    async fn subscribe_deposits(&self) -> SourceResult<DepositStream> {
        let rx = self
            .push_rx
            .lock()
            .take()
            .ok_or_else(|| SourceError::Subscription("already subscribed".to_string()))?;

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|ev| (Ok(ev), rx))
        });
        Ok(stream.boxed())
    }
}
