use thiserror::Error;

/// Errors returned by the external chain capabilities: pool reads, swap simulation, swap
/// submission and transaction confirmation.
///
/// Variants:
/// - `Request`: the call did not reach the node or the node answered with an error. Retrying later
///   may succeed.
/// - `Decode`: the node answered but the payload could not be interpreted.
/// - `Reverted`: the transaction was mined (or simulated) and reverted.
/// - `NotConnected`: the capability requires a connected account and there is none.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Failed to decode response: {0}")]
    Decode(String),
    #[error("Transaction reverted: {0}")]
    Reverted(String),
    #[error("No wallet connected")]
    NotConnected,
}

/// Raised by the pricing functions when invoked on a pool without liquidity or with nonsensical
/// parameters. Callers must make sure the pool is funded before asking for a price.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    #[error("Invalid pool state: {0}")]
    InvalidPoolState(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Negative amount: {0}")]
    Negative(String),
    #[error("Amount out of range: {0}")]
    Overflow(String),
}
