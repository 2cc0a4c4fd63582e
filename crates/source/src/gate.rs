use std::{sync::Arc, time::Duration};

use relayer_primitives::prelude::BlockHeight;
use tracing::*;

use crate::traits::SourceClient;

/// Holds deposits back until they are buried under enough blocks.
#[derive(Clone)]
pub struct ConfirmationGate {
    client: Arc<dyn SourceClient>,
    required_confirmations: u64,
    poll_interval: Duration,
}

impl ConfirmationGate {
    pub fn new(
        client: Arc<dyn SourceClient>,
        required_confirmations: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            required_confirmations,
            poll_interval,
        }
    }

    pub fn required_confirmations(&self) -> u64 {
        self.required_confirmations
    }

    /// Whether a deposit at `block` is final with the chain at `head`.
    pub fn is_final(&self, head: BlockHeight, block: BlockHeight) -> bool {
        head.checked_sub(block)
            .is_some_and(|depth| depth >= self.required_confirmations)
    }

    /// Returns once the deposit at `block` has the required confirmations.
    ///
    /// Without required confirmations this returns immediately without touching the chain.
    /// Failures reading the head are logged and retried on the next tick.
    pub async fn wait_for(&self, block: BlockHeight) {
        if self.required_confirmations == 0 {
            return;
        }

        loop {
            match self.client.block_number().await {
                Ok(head) if self.is_final(head, block) => {
                    debug!(%block, %head, "deposit confirmed");
                    return;
                }
                Ok(head) => {
                    trace!(%block, %head, required = %self.required_confirmations, "waiting for confirmations");
                }
                Err(err) => {
                    warn!(%block, %err, "failed to read source head while waiting for confirmations");
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestSourceChain;

    #[tokio::test]
    async fn test_zero_confirmations_skips_chain() {
        let chain = Arc::new(TestSourceChain::new(10));
        let gate = ConfirmationGate::new(chain.clone(), 0, Duration::from_millis(5));

        gate.wait_for(1_000).await;

        assert_eq!(chain.head_calls(), 0);
    }

    #[tokio::test]
    async fn test_waits_until_final() {
        let chain = Arc::new(TestSourceChain::new(100));
        let gate = ConfirmationGate::new(chain.clone(), 6, Duration::from_millis(5));

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_for(100).await })
        };

        // head - block = 5 < 6
        chain.set_head(105);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        chain.advance(1);
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("gate should open")
            .unwrap();
    }

    #[tokio::test]
    async fn test_keeps_waiting_through_errors() {
        let chain = Arc::new(TestSourceChain::new(200));
        chain.fail_next_calls(3);
        let gate = ConfirmationGate::new(chain.clone(), 1, Duration::from_millis(5));

        tokio::time::timeout(Duration::from_secs(2), gate.wait_for(100))
            .await
            .expect("gate should open after errors");
        assert!(chain.head_calls() >= 4);
    }

    #[test]
    fn test_is_final_near_max_height() {
        let chain = Arc::new(TestSourceChain::new(0));
        let gate = ConfirmationGate::new(chain, 10, Duration::from_millis(5));
        assert!(!gate.is_final(u64::MAX - 1, u64::MAX - 5));
        assert!(!gate.is_final(u64::MAX, u64::MAX - 5));
        assert!(gate.is_final(u64::MAX, u64::MAX - 10));
        // head behind the deposit, e.g. a lagging node
        assert!(!gate.is_final(100, 105));
        assert!(gate.is_final(110, 100));
    }
}
