//! Runs a whole relayer against in-memory chains.

use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use relayer_config::RelayerConfig;
use relayer_ledger::DedupLedger;
use relayer_payout::test_utils::TestPayoutClient;
use relayer_primitives::prelude::DepositId;
use relayer_relay::{Relayer, RelayerHandle};
use relayer_source::{test_utils::TestSourceChain, DepositSubscriber};
use relayer_tasks::{TaskError, TaskManager};
use tokio::runtime::Runtime;
use tracing::debug;

pub(crate) const PAYOUT_AMOUNT: u128 = 1_000_000;

/// Environment of a relayer paying on XRPL, polling fast, with its ledger at `ledger`.
pub(crate) fn config(ledger: &Path, extra_env: &[(&'static str, String)]) -> RelayerConfig {
    let mut env: HashMap<&'static str, String> = HashMap::from([
        ("RELAYER_SOURCE_RPC_URL", "http://localhost:8545".to_string()),
        (
            "RELAYER_BRIDGE_CONTRACT",
            "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
        ),
        ("RELAYER_POLL_INTERVAL_MS", "10".to_string()),
        ("RELAYER_DEST_RPC_URL", "http://localhost:5005".to_string()),
        (
            "RELAYER_DEST_ACCOUNT",
            "rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe".to_string(),
        ),
        (
            "RELAYER_DEST_SECRET",
            "snoPBrXtMeMyMHUVTgbuqAfg1SUTb".to_string(),
        ),
        ("RELAYER_PAYOUT_AMOUNT", PAYOUT_AMOUNT.to_string()),
        ("RELAYER_PAYOUT_INIT_RETRIES", "0".to_string()),
        ("RELAYER_PROCESSED_FILE", ledger.display().to_string()),
    ]);
    env.extend(extra_env.iter().cloned());

    relayer_config::load_with(None, |var| env.get(var).cloned(), Vec::new())
        .expect("valid test config")
}

pub(crate) fn id(s: &str) -> DepositId {
    DepositId::new(s).expect("valid deposit id")
}

/// Writes a processed deposits file holding `ids`.
pub(crate) fn write_ledger_file(path: &Path, ids: &[&str]) {
    let contents = serde_json::to_string(ids).expect("serialize ids");
    std::fs::write(path, contents).expect("write ledger file");
}

/// A started relayer and the task manager running it.
pub(crate) struct RelayerRun {
    pub(crate) runtime: Runtime,
    manager: TaskManager,
    pub(crate) handle: RelayerHandle,
    pub(crate) ledger: Arc<DedupLedger>,
}

impl RelayerRun {
    /// Starts a relayer polling `chain`, or subscribed to it when `push` is set.
    pub(crate) fn start(
        config: RelayerConfig,
        chain: Arc<TestSourceChain>,
        push: bool,
        client: Arc<TestPayoutClient>,
    ) -> Self {
        let runtime = Runtime::new().expect("build runtime");
        let manager = TaskManager::new(runtime.handle().clone());
        let executor = manager.executor();

        let subscriber = push.then(|| chain.clone() as Arc<dyn DepositSubscriber>);
        let relayer = runtime
            .block_on(Relayer::new(config, chain, subscriber, client))
            .expect("relayer loads");
        let ledger = relayer.ledger().clone();
        let handle = relayer.start(&executor);
        debug!(%push, "test relayer started");

        Self {
            runtime,
            manager,
            handle,
            ledger,
        }
    }

    /// Blocks until `cond` holds, panicking after `timeout`.
    pub(crate) fn wait_until(&self, timeout: Duration, mut cond: impl FnMut() -> bool) {
        self.runtime.block_on(async {
            tokio::time::timeout(timeout, async {
                while !cond() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("condition not reached in time")
        });
    }

    /// Lets the relayer run for `duration`.
    pub(crate) fn run_for(&self, duration: Duration) {
        self.runtime.block_on(async { tokio::time::sleep(duration).await });
    }

    /// Requests shutdown and waits for every task to stop.
    pub(crate) fn stop(self) -> Result<(), TaskError> {
        self.handle.shutdown();
        self.manager.monitor(Some(Duration::from_secs(5)))
    }

    /// Waits for the relayer to stop on its own, e.g. after a critical task failed.
    pub(crate) fn join(self) -> Result<(), TaskError> {
        self.manager.monitor(Some(Duration::from_secs(5)))
    }
}
