use std::{
    collections::{HashSet, VecDeque},
    panic::AssertUnwindSafe,
    sync::Arc,
};

use futures_util::FutureExt;
use parking_lot::Mutex;
use relayer_ledger::DedupLedger;
use relayer_payout::PayoutHandle;
use relayer_primitives::prelude::{DepositEvent, DepositId};
use relayer_source::ConfirmationGate;
use tokio::{runtime::Handle, sync::watch};
use tracing::*;

/// A deposit admitted to the queue.
#[derive(Clone, Debug)]
pub struct QueueItem {
    pub event: DepositEvent,
    /// Payout submissions attempted so far.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl QueueItem {
    fn new(event: DepositEvent) -> Self {
        Self {
            event,
            attempts: 0,
            last_error: None,
        }
    }
}

/// What [`DispatchQueue::enqueue`] did with a deposit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Already paid, or its payout has an unknown outcome.
    Duplicate,
    /// Already queued, parked or being paid.
    AlreadyInFlight,
    ShuttingDown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    /// Waiting for the payout client to become ready.
    pub parked: usize,
    pub active: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<QueueItem>,
    parked: Vec<QueueItem>,
    /// Ids that are queued, parked or have a running job.
    in_flight: HashSet<DepositId>,
    active_jobs: usize,
    readiness_waiter_armed: bool,
    closed: bool,
}

struct Inner {
    ledger: Arc<DedupLedger>,
    payout: Arc<PayoutHandle>,
    gate: ConfirmationGate,
    amount: u128,
    max_parallel: usize,
    runtime: Handle,
    state: Mutex<QueueState>,
    closing: watch::Sender<bool>,
    active: watch::Sender<usize>,
}

impl Inner {
    async fn closed(&self) {
        let mut rx = self.closing.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

enum JobOutcome {
    Done,
    Park(QueueItem),
}

/// FIFO of deposits waiting for their payout, drained by at most `max_parallel` concurrent
/// jobs.
///
/// Jobs are admitted in arrival order; they may complete in any order. Each job waits for the
/// deposit's confirmations, journals the submission, pays and records the outcome in the ledger.
/// A job that finds the payout client not ready yet parks its deposit, without counting an
/// attempt, until the client's readiness is known.
#[derive(Clone)]
pub struct DispatchQueue {
    inner: Arc<Inner>,
}

impl DispatchQueue {
    pub fn new(
        ledger: Arc<DedupLedger>,
        payout: Arc<PayoutHandle>,
        gate: ConfirmationGate,
        amount: u128,
        max_parallel: usize,
        runtime: Handle,
    ) -> Self {
        let (closing, _) = watch::channel(false);
        let (active, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                ledger,
                payout,
                gate,
                amount,
                max_parallel: max_parallel.max(1),
                runtime,
                state: Mutex::new(QueueState::default()),
                closing,
                active,
            }),
        }
    }

    /// Admits a deposit unless it was paid (or attempted) before, is already in the queue, or
    /// the queue is closed, and starts jobs up to the ceiling.
    pub fn enqueue(&self, event: DepositEvent) -> EnqueueOutcome {
        let deposit_id = event.deposit_id.clone();

        let admitted = {
            let mut state = self.inner.state.lock();
            if state.closed {
                debug!(%deposit_id, "queue closed, deposit ignored");
                return EnqueueOutcome::ShuttingDown;
            }

            if self.inner.ledger.is_known(&deposit_id) {
                info!(%deposit_id, "duplicate, skipped");
                return EnqueueOutcome::Duplicate;
            }

            if !state.in_flight.insert(deposit_id.clone()) {
                debug!(%deposit_id, "deposit already in flight, skipped");
                return EnqueueOutcome::AlreadyInFlight;
            }

            info!(
                %deposit_id,
                block = %event.block_number,
                destination = %event.destination_address,
                "deposit queued"
            );
            state.queue.push_back(QueueItem::new(event));
            self.admit(&mut state)
        };

        self.spawn_jobs(admitted);
        EnqueueOutcome::Queued
    }

    /// Starts jobs for queued deposits while there are free slots.
    pub fn drain(&self) {
        let admitted = {
            let mut state = self.inner.state.lock();
            self.admit(&mut state)
        };
        self.spawn_jobs(admitted);
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        QueueStats {
            queued: state.queue.len(),
            parked: state.parked.len(),
            active: state.active_jobs,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Stops admitting deposits. Queued and parked deposits are dropped, as are jobs still
    /// waiting for confirmations; none of them touched the ledger yet. Jobs already paying run
    /// to completion.
    pub fn close(&self) {
        let dropped = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;

            let queued = std::mem::take(&mut state.queue);
            let parked = std::mem::take(&mut state.parked);
            for item in queued.iter().chain(parked.iter()) {
                state.in_flight.remove(&item.event.deposit_id);
            }
            queued.len() + parked.len()
        };

        self.inner.closing.send_replace(true);
        info!(%dropped, "dispatch queue closed");
    }

    /// Resolves once no job is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.active.subscribe();
        let _ = rx.wait_for(|active| *active == 0).await;
    }

    /// Pops queued deposits into free slots. Must be called with the state locked so that the
    /// active count never drops to zero while deposits are still queued.
    fn admit(&self, state: &mut QueueState) -> Vec<QueueItem> {
        let mut admitted = Vec::new();
        if state.closed {
            return admitted;
        }

        while state.active_jobs < self.inner.max_parallel {
            let Some(item) = state.queue.pop_front() else {
                break;
            };
            state.active_jobs += 1;
            admitted.push(item);
        }

        if !admitted.is_empty() {
            self.inner.active.send_replace(state.active_jobs);
        }
        admitted
    }

    fn spawn_jobs(&self, items: Vec<QueueItem>) {
        for item in items {
            let mut slot = Slot {
                queue: self.clone(),
                deposit_id: item.event.deposit_id.clone(),
                keep_id: false,
            };
            let queue = self.clone();

            self.inner.runtime.spawn(async move {
                let deposit_id = slot.deposit_id.clone();
                match AssertUnwindSafe(queue.process_deposit(item))
                    .catch_unwind()
                    .await
                {
                    Ok(JobOutcome::Done) => {}
                    Ok(JobOutcome::Park(item)) => slot.keep_id = queue.park(item),
                    Err(_) => error!(%deposit_id, "payout job panicked"),
                }
                drop(slot);
            });
        }
    }

    async fn process_deposit(&self, mut item: QueueItem) -> JobOutcome {
        let inner = &self.inner;
        let deposit_id = item.event.deposit_id.clone();

        if !inner.payout.ready() {
            debug!(%deposit_id, "payout client not ready, parking deposit");
            return JobOutcome::Park(item);
        }

        let block = item.event.block_number;
        if inner.gate.required_confirmations() > 0 {
            debug!(
                %deposit_id,
                %block,
                required = %inner.gate.required_confirmations(),
                "waiting for confirmations"
            );
        }
        tokio::select! {
            biased;
            _ = inner.gate.wait_for(block) => {}
            _ = inner.closed() => {
                info!(%deposit_id, "shutting down, abandoning deposit awaiting confirmations");
                return JobOutcome::Done;
            }
        }

        // the ledger may have changed while this deposit waited
        if inner.ledger.is_known(&deposit_id) {
            info!(%deposit_id, "duplicate, skipped");
            return JobOutcome::Done;
        }

        if let Err(err) = inner.ledger.mark_submitting(&deposit_id).await {
            error!(%deposit_id, %err, "could not journal payout, deposit not paid");
            return JobOutcome::Done;
        }

        item.attempts += 1;
        let destination = item.event.destination_address.clone();

        match inner.payout.pay(&destination, inner.amount).await {
            Ok(receipt) => {
                if let Err(err) = inner.ledger.mark_processed(&deposit_id).await {
                    error!(
                        %deposit_id,
                        dest_tx = %receipt.transaction_id,
                        %err,
                        "payout submitted but could not be recorded as processed"
                    );
                }

                info!(
                    %deposit_id,
                    source_tx = %item.event.transaction_hash,
                    dest_tx = %receipt.transaction_id,
                    sequence = %receipt.sequence,
                    %destination,
                    amount = %inner.amount,
                    "payout submitted"
                );
            }
            Err(err) => {
                error!(
                    %deposit_id,
                    %destination,
                    attempts = %item.attempts,
                    %err,
                    "payout failed, deposit dropped"
                );

                if err.is_pre_submission() {
                    if let Err(err) = inner.ledger.clear_submitting(&deposit_id).await {
                        warn!(%deposit_id, %err, "could not clear payout journal entry");
                    }
                } else {
                    warn!(
                        %deposit_id,
                        "payout outcome unknown, deposit stays journaled until reconciled"
                    );
                }
                item.last_error = Some(err.to_string());
            }
        }

        trace!(%deposit_id, last_error = ?item.last_error, "payout job finished");
        JobOutcome::Done
    }

    /// Parks a deposit until the payout client's readiness is known, arming the readiness waiter
    /// if needed. Returns `false` if the queue closed in the meantime and the deposit was
    /// dropped.
    fn park(&self, item: QueueItem) -> bool {
        let arm_waiter = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return false;
            }

            state.parked.push(item);
            !std::mem::replace(&mut state.readiness_waiter_armed, true)
        };

        if arm_waiter {
            self.spawn_readiness_waiter();
        }
        true
    }

    fn spawn_readiness_waiter(&self) {
        let queue = self.clone();

        self.inner.runtime.spawn(async move {
            let inner = &queue.inner;
            let ready = tokio::select! {
                ready = inner.payout.wait_ready() => ready,
                _ = inner.closed() => return,
            };

            if !ready {
                // stays armed, nothing will ever release these
                warn!(
                    parked = %queue.stats().parked,
                    "payout client failed to initialize, parked deposits will not be paid"
                );
                return;
            }

            let released = {
                let mut state = inner.state.lock();
                state.readiness_waiter_armed = false;
                let parked = std::mem::take(&mut state.parked);
                let released = parked.len();
                state.queue.extend(parked);
                released
            };

            info!(%released, "payout client ready, releasing parked deposits");
            queue.drain();
        });
    }
}

/// A running job's hold on one concurrency slot. Released on drop, so a job that panics frees
/// its slot too.
struct Slot {
    queue: DispatchQueue,
    deposit_id: DepositId,
    /// Set when the deposit was parked and still counts as in flight.
    keep_id: bool,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let admitted = {
            let mut state = self.queue.inner.state.lock();
            state.active_jobs = state.active_jobs.saturating_sub(1);
            if !self.keep_id {
                state.in_flight.remove(&self.deposit_id);
            }

            let admitted = self.queue.admit(&mut state);
            self.queue.inner.active.send_replace(state.active_jobs);
            admitted
        };

        self.queue.spawn_jobs(admitted);
    }
}
