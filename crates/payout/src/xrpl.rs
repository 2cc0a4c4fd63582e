//! Payouts on the XRP Ledger through a `rippled` JSON-RPC endpoint.
//!
//! Transactions are signed by the node with the account secret (`submit` in sign-and-submit
//! mode), so no signing code lives here.

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

/// Engine results meaning the transaction was accepted for inclusion.
const ACCEPTED_RESULTS: &[&str] = &["tesSUCCESS", "terQUEUED"];

/// Total XRP supply in drops, no single payment can exceed it.
const MAX_DROPS: u128 = 100_000_000_000_000_000;

/// Alphabet of XRPL base58 addresses.
const XRPL_ALPHABET: &str = "rpshnaf39wBUDNEGHJKLM4PQRST7VWXYZ2bcdeCg65jkm8oFqi1tuvAxyz";

/// Networks with an id above this must carry `NetworkID` in every transaction, below it the
/// field is rejected.
const NETWORK_ID_REQUIRED_ABOVE: u64 = 1024;

#[derive(Debug)]
pub struct XrplPayoutClient {
    rpc: JsonRpcClient,
    account: String,
    secret: String,
    network_id: Option<u64>,
    /// Next sequence to use, `None` until initialized.
    sequence: Mutex<Option<u64>>,
}

impl XrplPayoutClient {
    pub fn new(
        rpc: JsonRpcClient,
        account: String,
        secret: String,
        network_id: Option<u64>,
    ) -> Self {
        Self {
            rpc,
            account,
            secret,
            network_id,
            sequence: Mutex::new(None),
        }
    }

    async fn fetch_sequence(&self) -> PayoutResult<u64> {
        let result: Value = self
            .rpc
            .call("account_info", account_info_params(&self.account))
            .await?;
        parse_account_sequence(result)
    }
}

#[async_trait]
impl PayoutClient for XrplPayoutClient {
    fn chain(&self) -> DestinationKind {
        DestinationKind::Xrpl
    }

    fn account(&self) -> &str {
        &self.account
    }

    async fn init(&self) -> PayoutResult<()> {
        if !is_classic_address(&self.account) {
            return Err(PayoutError::InvalidAccount(self.account.clone()));
        }

        let mut sequence = self.sequence.lock().await;
        let seq = self.fetch_sequence().await?;
        *sequence = Some(seq);

        info!(account = %self.account, %seq, "xrpl payout account loaded");
        Ok(())
    }

    async fn pay(&self, destination: &str, amount: u128) -> PayoutResult<PayoutReceipt> {
        if !is_classic_address(destination) {
            return Err(PayoutError::InvalidDestination(destination.to_string()));
        }
        if amount == 0 || amount > MAX_DROPS {
            return Err(PayoutError::InvalidAmount(amount));
        }

        // held for the whole submission, so two payouts never share a sequence
        let mut sequence = self.sequence.lock().await;
        let seq = sequence.ok_or(PayoutError::NotInitialized)?;

        let params = payment_params(
            &self.secret,
            &self.account,
            destination,
            amount,
            seq,
            self.network_id,
        );

        let res = match self.rpc.call::<Value>("submit", params).await {
            Ok(result) => parse_submit_result(result),
            Err(e) => Err(e.into()),
        };

        match res {
            Ok(hash) => {
                *sequence = Some(seq + 1);
                debug!(%destination, %amount, %seq, %hash, "xrpl payment submitted");
                Ok(PayoutReceipt {
                    transaction_id: hash,
                    sequence: seq,
                })
            }
            Err(err) => {
                if err.needs_sequence_resync() {
                    match self.fetch_sequence().await {
                        Ok(fresh) => {
                            warn!(old = %seq, new = %fresh, "resynced xrpl account sequence");
                            *sequence = Some(fresh);
                        }
                        Err(e) => warn!(err = %e, "could not resync xrpl account sequence"),
                    }
                }
                Err(err)
            }
        }
    }
}

fn account_info_params(account: &str) -> Value {
    json!([{
        "account": account,
        "ledger_index": "current",
    }])
}

/// Builds the sign-and-submit request for a plain XRP payment.
fn payment_params(
    secret: &str,
    account: &str,
    destination: &str,
    drops: u128,
    sequence: u64,
    network_id: Option<u64>,
) -> Value {
    let mut tx_json = json!({
        "TransactionType": "Payment",
        "Account": account,
        "Destination": destination,
        "Amount": drops.to_string(),
        "Sequence": sequence,
    });

    if let Some(id) = network_id.filter(|id| *id > NETWORK_ID_REQUIRED_ABOVE) {
        tx_json["NetworkID"] = json!(id);
    }

    json!([{
        "secret": secret,
        "tx_json": tx_json,
    }])
}

/// `rippled` reports request failures inside `result` instead of a JSON-RPC error object.
fn check_status(result: &Value) -> PayoutResult<()> {
    if result.get("status").and_then(Value::as_str) == Some("error") {
        let code = result
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let message = result
            .get("error_message")
            .or_else(|| result.get("error_exception"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(PayoutError::Rejected { code, message });
    }
    Ok(())
}

fn parse_account_sequence(result: Value) -> PayoutResult<u64> {
    check_status(&result)?;
    result
        .pointer("/account_data/Sequence")
        .and_then(Value::as_u64)
        .ok_or_else(|| PayoutError::UnexpectedResponse(result.to_string()))
}

/// Returns the transaction hash if the engine accepted the payment.
fn parse_submit_result(result: Value) -> PayoutResult<String> {
    check_status(&result)?;

    let engine_result = result
        .get("engine_result")
        .and_then(Value::as_str)
        .ok_or_else(|| PayoutError::UnexpectedResponse(result.to_string()))?;

    if !ACCEPTED_RESULTS.contains(&engine_result) {
        let message = result
            .get("engine_result_message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(PayoutError::Rejected {
            code: engine_result.to_string(),
            message: message.to_string(),
        });
    }

    result
        .pointer("/tx_json/hash")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PayoutError::UnexpectedResponse(result.to_string()))
}

/// Shape check of a classic `r...` address. Checksums are verified by the node.
fn is_classic_address(address: &str) -> bool {
    (25..=35).contains(&address.len())
        && address.starts_with('r')
        && address.chars().all(|c| XRPL_ALPHABET.contains(c))
}
