//! Backoff for idempotent reads.
//!
//! Reads (`eth_call`, receipts) are retried while the node reports overload or a gateway error.
//! Reverts and malformed responses fail on the first attempt. Submissions never go through here.

use std::{future::Future, time::Duration};

use alloy::transports::{RpcError, TransportErrorKind};
use backoff::{exponential::ExponentialBackoffBuilder, ExponentialBackoff};
use tracing::debug;

use crate::rpc::config::RPCRetryConfig;

/// JSON-RPC codes nodes and providers use for throttling.
const THROTTLED_CODES: [i64; 2] = [429, -32005];

/// HTTP statuses of an overloaded node or an unavailable gateway in front of it.
const TRANSIENT_HTTP_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// Whether a failed read should be attempted again.
pub(crate) fn is_transient(err: &RpcError<TransportErrorKind>) -> bool {
    match err {
        RpcError::Transport(TransportErrorKind::HttpError(http)) => {
            TRANSIENT_HTTP_STATUSES.contains(&http.status)
        }
        RpcError::Transport(kind) => kind.is_retry_err(),
        RpcError::ErrorResp(payload) => {
            if payload
                .message
                .to_lowercase()
                .contains("revert")
            {
                return false;
            }
            THROTTLED_CODES.contains(&payload.code) || payload.is_retry_err()
        }
        // Load balanced nodes can answer before they have seen the latest block.
        RpcError::NullResp => true,
        _ => false,
    }
}

fn classify(err: RpcError<TransportErrorKind>) -> backoff::Error<RpcError<TransportErrorKind>> {
    if is_transient(&err) {
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy(ExponentialBackoff);

impl From<&RPCRetryConfig> for RetryPolicy {
    fn from(config: &RPCRetryConfig) -> Self {
        Self(
            ExponentialBackoffBuilder::new()
                .with_initial_interval(Duration::from_millis(config.initial_backoff_ms))
                .with_multiplier(2.0)
                .with_randomization_factor(0.0)
                .with_max_interval(Duration::from_millis(config.max_backoff_ms))
                .with_max_elapsed_time(Some(config.max_elapsed()))
                .build(),
        )
    }
}

impl RetryPolicy {
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self(
            ExponentialBackoffBuilder::new()
                .with_initial_interval(Duration::from_millis(1))
                .with_max_interval(Duration::from_millis(5))
                .with_max_elapsed_time(Some(Duration::from_secs(1)))
                .build(),
        )
    }

    /// Runs `operation` until it succeeds, fails permanently or the policy gives up. The last
    /// error is returned in the latter two cases.
    pub(crate) async fn retry_request<F, Fut, T>(
        &self,
        mut operation: F,
    ) -> Result<T, RpcError<TransportErrorKind>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        backoff::future::retry_notify(
            self.0.clone(),
            || {
                let attempt = operation();
                async move { attempt.await.map_err(classify) }
            },
            |err, wait: Duration| debug!(error = %err, ?wait, "Retrying rpc read"),
        )
        .await
    }
}
