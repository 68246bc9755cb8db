//! Errors of the JSON-RPC layer and how they surface at the chain boundary.
use std::{fmt::Display, time::Duration};

use alloy::{
    primitives::B256,
    transports::{RpcError, TransportErrorKind},
};
use ascend_common::errors::ChainError;
use thiserror::Error;

pub(crate) type TransportError = RpcError<TransportErrorKind>;

#[derive(Error, Debug)]
pub enum RPCError {
    #[error("Invalid RPC setup: {0}")]
    Setup(String),
    /// The node could not be reached or answered with an error.
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: TransportError,
    },
    #[error("Could not decode response: {0}")]
    Decode(String),
    #[error("Execution reverted: {0}")]
    Reverted(String),
    #[error("No receipt for transaction {hash} after {}s", .waited.as_secs())]
    ReceiptTimeout { hash: B256, waited: Duration },
}

impl From<RPCError> for ChainError {
    fn from(error: RPCError) -> Self {
        match error {
            RPCError::Decode(msg) => ChainError::Decode(msg),
            RPCError::Reverted(msg) => ChainError::Reverted(msg),
            other => ChainError::Request(other.to_string()),
        }
    }
}

/// Attaches a description of the failed request to a transport error.
pub(crate) trait TransportResultExt<T> {
    fn describe<C: Display>(self, context: C) -> Result<T, RPCError>;
}

impl<T> TransportResultExt<T> for Result<T, TransportError> {
    fn describe<C: Display>(self, context: C) -> Result<T, RPCError> {
        self.map_err(|source| RPCError::Transport { context: context.to_string(), source })
    }
}
