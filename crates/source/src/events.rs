//! The bridge contract's `Deposit` event and its decoding from RPC logs.

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_sol_types::{sol, SolEvent};
use relayer_primitives::prelude::{DepositEvent, DepositId};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{SourceError, SourceResult};

sol! {
    /// Emitted by the bridge contract for every locked deposit.
    event Deposit(
        address indexed sender,
        string destination,
        uint256 gross_amount,
        uint256 fee_amount,
        uint256 net_amount
    );
}

/// A log as returned by `eth_getLogs` and `eth_subscribe("logs")`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub log_index: Option<U64>,
    /// Set when the log was dropped by a reorg.
    #[serde(default)]
    pub removed: bool,
}

/// Log filter matching `Deposit` events of `contract`, without a block range.
pub fn deposit_filter(contract: Address) -> Value {
    json!({
        "address": contract,
        "topics": [Deposit::SIGNATURE_HASH],
    })
}

/// Turns a mined `Deposit` log into a [`DepositEvent`].
pub fn decode_deposit_log(log: &RpcLog) -> SourceResult<DepositEvent> {
    let (Some(block_number), Some(tx_hash), Some(log_index)) =
        (log.block_number, log.transaction_hash, log.log_index)
    else {
        return Err(SourceError::Decode("log is not mined yet".to_string()));
    };

    let event = Deposit::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(|e| SourceError::Decode(e.to_string()))?;

    let transaction_hash = tx_hash.to_string();

    Ok(DepositEvent {
        sender: event.sender.to_checksum(None),
        gross_amount: to_u128("gross_amount", event.gross_amount)?,
        fee_amount: to_u128("fee_amount", event.fee_amount)?,
        net_amount: to_u128("net_amount", event.net_amount)?,
        destination_address: event.destination,
        deposit_id: DepositId::from_log(&transaction_hash, log_index.to::<u64>()),
        block_number: block_number.to::<u64>(),
        transaction_hash,
    })
}

fn to_u128(field: &str, value: U256) -> SourceResult<u128> {
    if value > U256::from(u128::MAX) {
        return Err(SourceError::Decode(format!("{field} {value} exceeds u128")));
    }
    Ok(value.to::<u128>())
}

#[cfg(test)]
pub(crate) mod tests {
    use alloy_primitives::address;

    use super::*;

    pub(crate) const CONTRACT: Address = address!("5fbdb2315678afecb367f032d93f642f64180aa3");

    pub(crate) fn encode_log(
        gross: U256,
        destination: &str,
        block: u64,
        log_index: u64,
    ) -> RpcLog {
        let event = Deposit {
            sender: address!("70997970c51812dc3a010c7d01b50e0d17dc79c8"),
            destination: destination.to_string(),
            gross_amount: gross,
            fee_amount: U256::from(10),
            net_amount: gross - U256::from(10),
        };
        let data = event.encode_log_data();

        RpcLog {
            address: CONTRACT,
            topics: data.topics().to_vec(),
            data: data.data,
            block_number: Some(U64::from(block)),
            transaction_hash: Some(B256::repeat_byte(0xAB)),
            log_index: Some(U64::from(log_index)),
            removed: false,
        }
    }

    #[test]
    fn test_decode_deposit_log() {
        let log = encode_log(U256::from(1_000), "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh", 99_500, 3);

        let ev = decode_deposit_log(&log).unwrap();

        assert_eq!(ev.sender, "0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
        assert_eq!(ev.destination_address, "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh");
        assert_eq!(ev.gross_amount, 1_000);
        assert_eq!(ev.fee_amount, 10);
        assert_eq!(ev.net_amount, 990);
        assert_eq!(ev.block_number, 99_500);
        assert_eq!(
            ev.deposit_id.as_str(),
            format!("0x{}:3", "ab".repeat(32))
        );
    }

    #[test]
    fn test_decode_rejects_oversized_amount() {
        let log = encode_log(U256::MAX, "rDest", 1, 0);
        assert!(matches!(
            decode_deposit_log(&log),
            Err(SourceError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_pending_log() {
        let mut log = encode_log(U256::from(100), "rDest", 1, 0);
        log.block_number = None;
        assert!(decode_deposit_log(&log).is_err());
    }

    #[test]
    fn test_decode_rejects_foreign_event() {
        let mut log = encode_log(U256::from(100), "rDest", 1, 0);
        log.topics[0] = B256::repeat_byte(0x01);
        assert!(decode_deposit_log(&log).is_err());
    }

    #[test]
    fn test_rpc_log_from_json() {
        let raw = json!({
            "address": CONTRACT,
            "topics": [Deposit::SIGNATURE_HASH],
            "data": "0x",
            "blockNumber": "0x1",
            "transactionHash": B256::ZERO,
            "logIndex": "0x0",
            "removed": true
        });
        let log: RpcLog = serde_json::from_value(raw).unwrap();
        assert!(log.removed);
        assert_eq!(log.block_number, Some(U64::from(1)));
    }

    #[test]
    fn test_deposit_filter() {
        let filter = deposit_filter(CONTRACT);
        assert_eq!(
            filter["topics"][0],
            json!(Deposit::SIGNATURE_HASH)
        );
        assert_eq!(filter["address"], json!(CONTRACT));
    }
}
