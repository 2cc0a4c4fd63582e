//! In-memory payout client for tests.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use relayer_common::rpc::ClientError;
use relayer_primitives::prelude::{DestinationKind, PayoutReceipt};

use crate::{
    errors::{PayoutError, PayoutResult},
    traits::PayoutClient,
};

/// A payment made through [`TestPayoutClient`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedPayment {
    pub destination: String,
    pub amount: u128,
    pub sequence: u64,
}

/// A test implementation of a payout client.
///
/// Records every successful payment and the highest number of payments in flight at once.
#[derive(Debug, Default)]
pub struct TestPayoutClient {
    init_failures: AtomicUsize,
    init_calls: AtomicUsize,
    pay_delay: Duration,
    /// Destinations whose payment fails, with whether the failure is pre-submission.
    failing: HashMap<String, bool>,
    sequence: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    payments: Mutex<Vec<RecordedPayment>>,
    attempts: AtomicUsize,
}

impl TestPayoutClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `n` calls to `init`.
    pub fn fail_init_times(self, n: usize) -> Self {
        self.init_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Makes each payment take `delay`.
    pub fn with_pay_delay(mut self, delay: Duration) -> Self {
        self.pay_delay = delay;
        self
    }

    /// Fails payments to `destination`. A pre-submission failure is an explicit rejection, any
    /// other is a timeout.
    pub fn fail_pay_to(mut self, destination: &str, pre_submission: bool) -> Self {
        self.failing.insert(destination.to_string(), pre_submission);
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Calls to `pay`, successful or not.
    pub fn pay_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn payments(&self) -> Vec<RecordedPayment> {
        self.payments.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PayoutClient for TestPayoutClient {
    fn chain(&self) -> DestinationKind {
        DestinationKind::Xrpl
    }

    fn account(&self) -> &str {
        "rTestAccount"
    }

    async fn init(&self) -> PayoutResult<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.init_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.init_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ClientError::Connection("connection refused".to_string()).into());
        }
        Ok(())
    }

    async fn pay(&self, destination: &str, amount: u128) -> PayoutResult<PayoutReceipt> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.pay_delay.is_zero() {
            tokio::time::sleep(self.pay_delay).await;
        }

        let res = match self.failing.get(destination) {
            Some(true) => Err(PayoutError::Rejected {
                code: "temBAD_AMOUNT".to_string(),
                message: "rejected by test client".to_string(),
            }),
            Some(false) => Err(ClientError::Timeout.into()),
            None => {
                let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
                self.payments.lock().push(RecordedPayment {
                    destination: destination.to_string(),
                    amount,
                    sequence,
                });
                Ok(PayoutReceipt {
                    transaction_id: format!("TESTTX{sequence:06}"),
                    sequence,
                })
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        res
    }
}
