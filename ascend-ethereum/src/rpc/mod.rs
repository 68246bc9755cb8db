use std::time::Duration;

use alloy::{
    primitives::{Address, Bytes, B256, U64},
    rpc::{
        client::{ClientBuilder, ReqwestClient},
        types::{BlockNumberOrTag, TransactionInput, TransactionRequest},
    },
    transports::{http::reqwest, RpcError},
};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::rpc::{
    config::RPCRetryConfig,
    errors::{RPCError, TransportResultExt},
    retry::RetryPolicy,
};

pub mod config;
pub mod errors;
mod retry;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-RPC access to an Ethereum node for pool reads, simulations and swap submission.
///
/// Cloning shares the underlying connection pool.
#[derive(Clone, Debug)]
pub struct EthereumRpcClient {
    inner: ReqwestClient,
    retry_policy: RetryPolicy,
    retry_config: RPCRetryConfig,
    url: String,
}

/// Fields of a transaction receipt that tell whether a swap landed.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptSummary {
    pub transaction_hash: B256,
    pub block_number: Option<U64>,
    pub status: Option<U64>,
}

impl ReceiptSummary {
    pub fn succeeded(&self) -> bool {
        self.status == Some(U64::from(1))
    }
}

impl EthereumRpcClient {
    /// Connects lazily to `rpc_url`. Reads use [`RPCRetryConfig::default`] until
    /// [`Self::with_retry`] replaces it.
    pub fn new(rpc_url: &str) -> Result<Self, RPCError> {
        let url = rpc_url
            .parse()
            .map_err(|e| RPCError::Setup(format!("invalid url {rpc_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| RPCError::Setup(format!("http client: {e}")))?;
        let retry_config = RPCRetryConfig::default();

        Ok(Self {
            inner: ClientBuilder::default().http_with_client(http, url),
            retry_policy: RetryPolicy::from(&retry_config),
            retry_config,
            url: rpc_url.to_string(),
        })
    }

    pub fn get_url(&self) -> &str {
        &self.url
    }

    pub fn get_retry_config(&self) -> RPCRetryConfig {
        self.retry_config.clone()
    }

    pub fn with_retry(mut self, retry_config: RPCRetryConfig) -> Self {
        self.retry_policy = RetryPolicy::from(&retry_config);
        self.retry_config = retry_config;
        self
    }

    /// `eth_call` against `block`. A revert is reported as [`RPCError::Reverted`] with the
    /// node's message, which carries the pool's `BAL#` code when there is one.
    #[instrument(level = "debug", skip(self, request))]
    pub(crate) async fn eth_call(
        &self,
        request: TransactionRequest,
        block: BlockNumberOrTag,
    ) -> Result<Bytes, RPCError> {
        let result = self
            .retry_policy
            .retry_request(|| async {
                self.inner
                    .request("eth_call", (&request, block))
                    .await
            })
            .await;
        match result {
            Err(RpcError::ErrorResp(payload)) if payload.message.contains("revert") => {
                Err(RPCError::Reverted(payload.message.to_string()))
            }
            other => other.describe(format_args!("eth_call at {block}")),
        }
    }

    /// Asks the node to sign and broadcast `request` from its unlocked `from` account. A failed
    /// submission is not retried since the node may already have broadcast it.
    #[instrument(level = "debug", skip(self, request))]
    pub(crate) async fn send_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<B256, RPCError> {
        let hash: B256 = self
            .inner
            .request("eth_sendTransaction", (&request,))
            .await
            .describe("eth_sendTransaction")?;
        debug!(%hash, "Transaction submitted");
        Ok(hash)
    }

    /// `None` while the transaction is pending.
    #[instrument(level = "debug", skip(self))]
    pub(crate) async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<ReceiptSummary>, RPCError> {
        self.retry_policy
            .retry_request(|| async {
                self.inner
                    .request("eth_getTransactionReceipt", (hash,))
                    .await
            })
            .await
            .describe(format_args!("eth_getTransactionReceipt {hash}"))
    }
}

/// Builds a call request with the given calldata. `from` is left unset for plain reads.
pub(crate) fn call_request(
    from: Option<Address>,
    to: Address,
    calldata: Vec<u8>,
) -> TransactionRequest {
    let mut request = TransactionRequest::default()
        .to(to)
        .input(TransactionInput::both(calldata.into()));
    if let Some(from) = from {
        request = request.from(from);
    }
    request
}


#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use mockito::{Matcher, Server};

    use super::*;

    #[tokio::test]
    async fn test_get_retry_config() {
        let client =
            EthereumRpcClient::new("https://example.com").expect("Failed to create client");
        let config = client.get_retry_config();

        assert_eq!(config, RPCRetryConfig::default());

        let custom_config =
            RPCRetryConfig { max_retries: 7, initial_backoff_ms: 200, max_backoff_ms: 10000 };
        let client = client.with_retry(custom_config.clone());

        assert_eq!(client.get_retry_config(), custom_config);
    }

    #[test]
    fn test_invalid_url() {
        let result = EthereumRpcClient::new("not a url");

        assert!(matches!(result, Err(RPCError::Setup(_))));
    }

    #[tokio::test]
    async fn test_eth_call_mocked() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"eth_call"}"#.to_string()))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":0,"result":"0x00000000000000000000000000000000000000000000000000000000000004d2"}"#)
            .expect(1)
            .create_async()
            .await;
        let client = EthereumRpcClient::new(&server.url()).expect("Failed to create client");

        let request = call_request(None, Address::ZERO, vec![0x70, 0xa0, 0x82, 0x31]);
        let result = client
            .eth_call(request, BlockNumberOrTag::Latest)
            .await
            .expect("eth_call failed");

        assert_eq!(result.len(), 32);
        assert_eq!(result[30..].to_vec(), vec![0x04, 0xd2]);
        m.assert();
    }

    #[tokio::test]
    async fn test_eth_call_revert() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(
                r#"{"jsonrpc":"2.0","id":0,"error":{"code":3,"message":"execution reverted: BAL#507"}}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let client = EthereumRpcClient::new(&server.url()).expect("Failed to create client");

        let result = client
            .eth_call(call_request(None, Address::ZERO, vec![]), BlockNumberOrTag::Latest)
            .await;

        match result {
            Err(RPCError::Reverted(msg)) => assert!(msg.contains("BAL#507")),
            other => panic!("expected a revert, got {other:?}"),
        }
        m.assert();
    }

    #[tokio::test]
    async fn test_send_transaction_is_not_retried() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/")
            .with_status(503)
            .with_body("service unavailable")
            .expect(1)
            .create_async()
            .await;
        let client = EthereumRpcClient::new(&server.url()).expect("Failed to create client");

        let result = client
            .send_transaction(call_request(Some(Address::ZERO), Address::ZERO, vec![]))
            .await;

        assert!(matches!(result, Err(RPCError::Transport { .. })));
        m.assert();
    }

    #[tokio::test]
    async fn test_get_transaction_receipt() {
        let hash =
            B256::from_str("0x5c2b5c6a4f0f3e5f8e1fd52f7d0d1b6b1a0a9f8e7d6c5b4a3928170605040302")
                .unwrap();
        let mut server = Server::new_async().await;
        let _pending = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":0,"result":null}"#)
            .expect(1)
            .create_async()
            .await;
        let _mined = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(format!(
                r#"{{"jsonrpc":"2.0","id":1,"result":{{"transactionHash":"{hash}","blockNumber":"0x10","status":"0x1"}}}}"#
            ))
            .create_async()
            .await;
        let client = EthereumRpcClient::new(&server.url()).expect("Failed to create client");

        let pending = client
            .get_transaction_receipt(hash)
            .await
            .expect("receipt request failed");
        let mined = client
            .get_transaction_receipt(hash)
            .await
            .expect("receipt request failed")
            .expect("receipt missing");

        assert_eq!(pending, None);
        assert_eq!(mined.block_number, Some(U64::from(16)));
        assert!(mined.succeeded());
    }
}
