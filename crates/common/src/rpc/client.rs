use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use reqwest::{
    header::{HeaderMap, CONTENT_TYPE},
    Client,
};
use serde::{de, Deserialize};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::*;

use super::error::{ClientError, RpcError};

/// This is an alias for the result type returned by the [`JsonRpcClient`].
pub type ClientResult<T> = Result<T, ClientError>;

/// Upper bound on a single HTTP round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An `async` JSON-RPC 2.0 client over HTTP.
///
/// Network level failures that might be transient are retried up to `max_retries` times; any
/// answer from the server, successful or not, is returned as is.
#[derive(Debug)]
pub struct JsonRpcClient {
    /// The URL of the RPC endpoint.
    url: String,
    /// The underlying `async` HTTP client.
    client: Client,
    /// The ID of the current request.
    id: AtomicUsize,
    /// Extra attempts after a transient failure.
    max_retries: u8,
    retry_interval: Duration,
}

/// Response returned by the RPC server.
#[derive(Debug, Clone, Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

impl JsonRpcClient {
    pub fn new(
        url: impl Into<String>,
        max_retries: u8,
        retry_interval: Duration,
    ) -> ClientResult<Self> {
        let url = url.into();

        let content_type = "application/json"
            .parse()
            .map_err(|_| ClientError::Other("Error parsing header".to_string()))?;
        let headers = HeaderMap::from_iter([(CONTENT_TYPE, content_type)]);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Other(format!("Could not create client: {e}")))?;

        trace!(url = %url, "Created rpc client");

        Ok(Self {
            url,
            client,
            id: AtomicUsize::new(0),
            max_retries,
            retry_interval,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> usize {
        self.id.fetch_add(1, Ordering::AcqRel)
    }

    /// Calls `method` with `params`, which should be a JSON array.
    pub async fn call<T: de::DeserializeOwned + fmt::Debug>(
        &self,
        method: &str,
        params: Value,
    ) -> ClientResult<T> {
        let mut retries = 0;
        loop {
            trace!(%method, ?params, %retries, "Calling rpc endpoint");

            let id = self.next_id();

            let response = self
                .client
                .post(&self.url)
                .json(&json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "method": method,
                    "params": params
                }))
                .send()
                .await;

            let err = match response {
                Ok(resp) => return decode_response(resp).await,
                Err(err) => err,
            };

            warn!(%method, err = %err, "Error calling rpc endpoint");

            let e = if err.is_body() {
                // Body error is unrecoverable
                return Err(ClientError::Body(err.to_string()));
            } else if err.is_status() {
                // Status error is unrecoverable
                return Err(match err.status() {
                    Some(code) => ClientError::Status(code.to_string(), err.to_string()),
                    _ => ClientError::Other(err.to_string()),
                });
            } else if err.is_builder() {
                // Request builder error is unrecoverable
                return Err(ClientError::ReqBuilder(err.to_string()));
            } else if err.is_redirect() {
                // Redirect error is unrecoverable
                return Err(ClientError::HttpRedirect(err.to_string()));
            } else if err.is_decode() {
                ClientError::MalformedResponse(err.to_string())
            } else if err.is_connect() {
                ClientError::Connection(err.to_string())
            } else if err.is_timeout() {
                ClientError::Timeout
            } else if err.is_request() {
                ClientError::Request(err.to_string())
            } else {
                // Unknown error is unrecoverable
                return Err(ClientError::Other(err.to_string()));
            };

            if retries >= self.max_retries {
                if self.max_retries > 0 {
                    warn!(%method, max_retries = %self.max_retries, "max retries exceeded");
                }
                return Err(e);
            }

            retries += 1;
            warn!(%method, %e, %retries, "retrying rpc call");
            sleep(self.retry_interval).await;
        }
    }
}

async fn decode_response<T: de::DeserializeOwned + fmt::Debug>(
    resp: reqwest::Response,
) -> ClientResult<T> {
    let status = resp.status();
    let data = match resp.json::<Response>().await {
        Ok(data) => data,
        Err(e) if !status.is_success() => {
            return Err(ClientError::Status(status.to_string(), e.to_string()))
        }
        Err(e) => return Err(ClientError::Parse(e.to_string())),
    };
    trace!(?data, "Response received");

    parse_response_body(data)
}

fn parse_response_body<T: de::DeserializeOwned>(data: Response) -> ClientResult<T> {
    if let Some(err) = data.error {
        return Err(err.into());
    }

    // a missing result is handed to `T` as null, so optional results decode to `None`
    Ok(serde_json::from_value(data.result.unwrap_or(Value::Null))?)
}
