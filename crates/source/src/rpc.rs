use std::time::Duration;

use alloy_primitives::{Address, U64};
use async_trait::async_trait;
use relayer_common::rpc::JsonRpcClient;
use relayer_primitives::prelude::{BlockHeight, DepositEvent};
use serde_json::json;
use tracing::*;

use crate::{
    errors::SourceResult,
    events::{decode_deposit_log, deposit_filter, RpcLog},
    traits::SourceClient,
};

/// Source chain client over HTTP JSON-RPC.
#[derive(Debug)]
pub struct EvmRpcClient {
    rpc: JsonRpcClient,
    contract: Address,
}

impl EvmRpcClient {
    pub fn new(
        url: impl Into<String>,
        contract: Address,
        max_retries: u8,
        retry_interval: Duration,
    ) -> SourceResult<Self> {
        let rpc = JsonRpcClient::new(url, max_retries, retry_interval)?;
        Ok(Self { rpc, contract })
    }

    pub fn contract(&self) -> Address {
        self.contract
    }
}

#[async_trait]
impl SourceClient for EvmRpcClient {
    async fn block_number(&self) -> SourceResult<BlockHeight> {
        let head: U64 = self.rpc.call("eth_blockNumber", json!([])).await?;
        Ok(head.to::<u64>())
    }

    async fn get_deposits(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> SourceResult<Vec<DepositEvent>> {
        let mut filter = deposit_filter(self.contract);
        filter["fromBlock"] = json!(format!("{from:#x}"));
        filter["toBlock"] = json!(format!("{to:#x}"));

        let logs: Vec<RpcLog> = self.rpc.call("eth_getLogs", json!([filter])).await?;
        trace!(%from, %to, count = logs.len(), "fetched deposit logs");

        Ok(decode_logs(logs))
    }
}

/// Decodes logs in chain order, skipping reorged and undecodable ones.
pub(crate) fn decode_logs(mut logs: Vec<RpcLog>) -> Vec<DepositEvent> {
    logs.sort_by_key(|log| (log.block_number, log.log_index));

    logs.iter()
        .filter(|log| {
            if log.removed {
                debug!(tx = ?log.transaction_hash, "skipping removed log");
            }
            !log.removed
        })
        .filter_map(|log| match decode_deposit_log(log) {
            Ok(ev) => Some(ev),
            Err(err) => {
                warn!(tx = ?log.transaction_hash, log_index = ?log.log_index, %err, "skipping deposit log");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use super::*;
    use crate::events::tests::encode_log;

    #[test]
    fn test_decode_logs_orders_and_skips() {
        let mut removed = encode_log(U256::from(5), "rRemoved", 10, 0);
        removed.removed = true;
        let oversized = encode_log(U256::MAX, "rBig", 10, 1);

        let logs = vec![
            encode_log(U256::from(300), "rLate", 12, 0),
            removed,
            encode_log(U256::from(200), "rSecond", 10, 2),
            oversized,
            encode_log(U256::from(100), "rFirst", 9, 7),
        ];

        let events = decode_logs(logs);
        let dests: Vec<_> = events.iter().map(|e| e.destination_address.as_str()).collect();

        assert_eq!(dests, vec!["rFirst", "rSecond", "rLate"]);
    }
}
