//! Payouts on an EVM chain from an account managed (and unlocked per call) by the node.

use alloy_primitives::{Address, U64};
use async_trait::async_trait;
use relayer_common::rpc::JsonRpcClient;
use relayer_primitives::prelude::{DestinationKind, PayoutReceipt};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::*;

use crate::{
    errors::{PayoutError, PayoutResult},
    traits::PayoutClient,
};

#[derive(Debug)]
pub struct EvmPayoutClient {
    rpc: JsonRpcClient,
    account: Address,
    account_str: String,
    passphrase: String,
    network_id: u64,
    /// Next nonce to use, `None` until initialized.
    nonce: Mutex<Option<u64>>,
}

impl EvmPayoutClient {
    pub fn new(
        rpc: JsonRpcClient,
        account: &str,
        passphrase: String,
        network_id: u64,
    ) -> PayoutResult<Self> {
        let address = account
            .parse::<Address>()
            .map_err(|_| PayoutError::InvalidAccount(account.to_string()))?;

        Ok(Self {
            rpc,
            account: address,
            account_str: address.to_checksum(None),
            passphrase,
            network_id,
            nonce: Mutex::new(None),
        })
    }

    async fn fetch_nonce(&self) -> PayoutResult<u64> {
        let nonce: U64 = self
            .rpc
            .call(
                "eth_getTransactionCount",
                json!([self.account_str, "pending"]),
            )
            .await?;
        Ok(nonce.to::<u64>())
    }
}

#[async_trait]
impl PayoutClient for EvmPayoutClient {
    fn chain(&self) -> DestinationKind {
        DestinationKind::Evm
    }

    fn account(&self) -> &str {
        &self.account_str
    }

    async fn init(&self) -> PayoutResult<()> {
        let chain_id: U64 = self.rpc.call("eth_chainId", json!([])).await?;
        let chain_id = chain_id.to::<u64>();
        if chain_id != self.network_id {
            return Err(PayoutError::WrongNetwork {
                expected: self.network_id,
                got: chain_id,
            });
        }

        let mut nonce = self.nonce.lock().await;
        let fetched = self.fetch_nonce().await?;
        *nonce = Some(fetched);

        info!(account = %self.account_str, %chain_id, nonce = %fetched, "evm payout account loaded");
        Ok(())
    }

    async fn pay(&self, destination: &str, amount: u128) -> PayoutResult<PayoutReceipt> {
        let to = destination
            .parse::<Address>()
            .map_err(|_| PayoutError::InvalidDestination(destination.to_string()))?;
        if amount == 0 {
            return Err(PayoutError::InvalidAmount(amount));
        }

        // held for the whole submission, so two payouts never share a nonce
        let mut nonce = self.nonce.lock().await;
        let current = nonce.ok_or(PayoutError::NotInitialized)?;

        let params = send_transaction_params(self.account, to, amount, current, &self.passphrase);

        match self
            .rpc
            .call::<Value>("personal_sendTransaction", params)
            .await
        {
            Ok(result) => {
                let hash = parse_tx_hash(result)?;
                *nonce = Some(current + 1);
                debug!(%destination, %amount, nonce = %current, %hash, "evm payment submitted");
                Ok(PayoutReceipt {
                    transaction_id: hash,
                    sequence: current,
                })
            }
            Err(e) => {
                let err = PayoutError::from(e);
                if err.needs_sequence_resync() {
                    match self.fetch_nonce().await {
                        Ok(fresh) => {
                            warn!(old = %current, new = %fresh, "resynced evm account nonce");
                            *nonce = Some(fresh);
                        }
                        Err(e) => warn!(err = %e, "could not resync evm account nonce"),
                    }
                }
                Err(err)
            }
        }
    }
}

fn send_transaction_params(
    from: Address,
    to: Address,
    value: u128,
    nonce: u64,
    passphrase: &str,
) -> Value {
    json!([
        {
            "from": from.to_checksum(None),
            "to": to.to_checksum(None),
            "value": format!("{value:#x}"),
            "nonce": format!("{nonce:#x}"),
        },
        passphrase
    ])
}

fn parse_tx_hash(result: Value) -> PayoutResult<String> {
    match result.as_str() {
        Some(hash) if hash.starts_with("0x") && hash.len() == 66 => Ok(hash.to_lowercase()),
        _ => Err(PayoutError::UnexpectedResponse(result.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
    const DEST: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

    #[test]
    fn test_send_transaction_params() {
        let params = send_transaction_params(
            ACCOUNT.parse().unwrap(),
            DEST.parse().unwrap(),
            1_000_000_000_000_000_000,
            16,
            "hunter2",
        );

        assert_eq!(params[0]["from"], ACCOUNT);
        assert_eq!(params[0]["value"], "0xde0b6b3a7640000");
        assert_eq!(params[0]["nonce"], "0x10");
        assert_eq!(params[1], "hunter2");
    }

    #[test]
    fn test_parse_tx_hash() {
        let hash = format!("0x{}", "AB".repeat(32));
        assert_eq!(parse_tx_hash(json!(hash)).unwrap(), hash.to_lowercase());

        let err = parse_tx_hash(json!(null)).unwrap_err();
        assert!(!err.is_pre_submission());
    }

    #[test]
    fn test_rejects_bad_account() {
        let rpc = JsonRpcClient::new("http://127.0.0.1:1", 0, std::time::Duration::ZERO).unwrap();
        let err = EvmPayoutClient::new(rpc, "rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe", "p".into(), 1)
            .unwrap_err();
        assert!(matches!(err, PayoutError::InvalidAccount(_)));
    }

    #[tokio::test]
    async fn test_pay_validates_before_submitting() {
        let rpc = JsonRpcClient::new("http://127.0.0.1:1", 0, std::time::Duration::ZERO).unwrap();
        let client = EvmPayoutClient::new(rpc, ACCOUNT, "p".into(), 1).unwrap();

        let err = client.pay("nope", 1).await.unwrap_err();
        assert!(matches!(err, PayoutError::InvalidDestination(_)));

        let err = client.pay(DEST, 1).await.unwrap_err();
        assert!(matches!(err, PayoutError::NotInitialized));
    }
}
