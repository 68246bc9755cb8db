//! Capabilities the trading engine consumes from the outside world. Every call is an
//! asynchronous suspension point; none of them is abortable once issued.
use alloy_primitives::{Address, B256, I256, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    errors::ChainError,
    models::{PoolTokens, SwapReceipt, SwapRequest, Weight},
};

/// Read access to the pool and its vault.
///
/// All reads are eventually consistent snapshots of chain state as of the latest block the node
/// has seen. There is no read-your-writes guarantee.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait PoolReader: Send + Sync {
    /// Address of the vault holding the pool's tokens. Never changes for a given pool.
    async fn get_vault(&self) -> Result<Address, ChainError>;

    async fn get_paused_state(&self) -> Result<bool, ChainError>;

    /// Current normalized weights, ordered by token index.
    async fn get_normalized_weights(&self) -> Result<Vec<Weight>, ChainError>;

    /// Swap fee as a fraction, e.g. `0.01` for 1%.
    async fn get_swap_fee_percentage(&self) -> Result<Decimal, ChainError>;

    /// Tokens and raw balances the vault holds for `pool_id`.
    async fn get_pool_tokens(&self, vault: Address, pool_id: B256) -> Result<PoolTokens, ChainError>;
}

#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait TokenBalanceReader: Send + Sync {
    /// Raw balance of `token` held by `account`.
    async fn balance_of(&self, account: Address, token: Address) -> Result<U256, ChainError>;
}

/// Dry-run of a swap against the pool's pricing function. Must not mutate chain state and must
/// price exactly like [`SwapExecutor::swap`] would.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait SwapSimulator: Send + Sync {
    /// Returns one signed delta per pool asset, ordered by token index. Negative deltas leave the
    /// pool towards the trader, positive deltas enter the pool from the trader.
    async fn simulate_swap(
        &self,
        amount: U256,
        asset_in_index: usize,
        asset_out_index: usize,
        trader: Address,
    ) -> Result<Vec<I256>, ChainError>;
}

#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    /// Submits the swap and returns the transaction hash. Once submitted a swap cannot be
    /// cancelled.
    async fn swap(&self, request: SwapRequest) -> Result<B256, ChainError>;

    /// Waits until the transaction is mined.
    async fn wait(&self, transaction: B256) -> Result<SwapReceipt, ChainError>;
}

/// Allowance management of the vault over the trader's tokens.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait TokenApprover: Send + Sync {
    async fn allowance(&self, token: Address, owner: Address) -> Result<U256, ChainError>;

    /// Approves the vault to pull `amount` of `token` from `owner`. Returns the transaction hash.
    async fn approve(&self, token: Address, owner: Address, amount: U256) -> Result<B256, ChainError>;
}
