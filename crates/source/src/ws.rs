use alloy_primitives::Address;
use async_trait::async_trait;
use futures_util::StreamExt;
use jsonrpsee::{
    core::{client::SubscriptionClientT, params::ArrayParams},
    ws_client::{WsClient, WsClientBuilder},
};
use tracing::*;

use crate::{
    errors::{SourceError, SourceResult},
    events::{decode_deposit_log, deposit_filter, RpcLog},
    traits::{DepositStream, DepositSubscriber},
};

/// Source chain client receiving deposit logs over a WebSocket subscription.
///
/// The connection is not re-established once lost; the stream returned by
/// [`subscribe_deposits`](DepositSubscriber::subscribe_deposits) simply ends.
pub struct EvmSubscriptionClient {
    client: WsClient,
    contract: Address,
}

impl EvmSubscriptionClient {
    pub async fn connect(url: &str, contract: Address) -> SourceResult<Self> {
        let client = WsClientBuilder::default().build(url).await?;
        info!(%url, "connected to source chain websocket");
        Ok(Self { client, contract })
    }
}

#[async_trait]
impl DepositSubscriber for EvmSubscriptionClient {
    async fn subscribe_deposits(&self) -> SourceResult<DepositStream> {
        if !self.client.is_connected() {
            return Err(SourceError::Subscription(
                "websocket connection is closed".to_string(),
            ));
        }

        let mut params = ArrayParams::new();
        params
            .insert("logs")
            .map_err(|e| SourceError::Subscription(e.to_string()))?;
        params
            .insert(deposit_filter(self.contract))
            .map_err(|e| SourceError::Subscription(e.to_string()))?;

        let sub = self
            .client
            .subscribe::<RpcLog, _>("eth_subscribe", params, "eth_unsubscribe")
            .await?;

        let stream = sub.filter_map(|item| async move {
            match item {
                Ok(log) if log.removed => {
                    debug!(tx = ?log.transaction_hash, "skipping removed log");
                    None
                }
                Ok(log) => match decode_deposit_log(&log) {
                    Ok(ev) => Some(Ok(ev)),
                    Err(err) => {
                        warn!(tx = ?log.transaction_hash, %err, "skipping deposit log");
                        None
                    }
                },
                Err(e) => Some(Err(SourceError::Subscription(e.to_string()))),
            }
        });

        Ok(stream.boxed())
    }
}
