//! On-chain implementation of the pool, simulation, execution and approval boundaries for a
//! single liquidity bootstrapping pool.
use std::time::Duration;

use alloy::{
    primitives::{Address, Bytes, B256, I256, U256},
    rpc::types::BlockNumberOrTag,
    sol_types::SolCall,
};
use ascend_common::{
    errors::ChainError,
    models::{token::from_raw_amount, PoolTokens, SwapKind, SwapReceipt, SwapRequest, Weight},
    traits::{PoolReader, SwapExecutor, SwapSimulator, TokenApprover, TokenBalanceReader},
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::{
    abi::{
        IVault::{self, BatchSwapStep, FundManagement, SingleSwap},
        ILiquidityBootstrappingPool, IERC20,
    },
    rpc::call_request,
    EthereumRpcClient, RPCError,
};

/// Weights and fees are 18 decimal fixed point numbers on chain.
const FIXED_POINT_DECIMALS: u32 = 18;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LbpClientConfig {
    /// How often to ask the node for a receipt while waiting on a swap.
    pub receipt_poll_interval: Duration,
    /// Give up waiting on a receipt after this long. The transaction may still be mined later.
    pub receipt_timeout: Duration,
}

impl Default for LbpClientConfig {
    fn default() -> Self {
        Self { receipt_poll_interval: Duration::from_secs(1), receipt_timeout: Duration::from_secs(300) }
    }
}

/// Talks to one pool and its vault through an [`EthereumRpcClient`].
///
/// Transactions are sent with `eth_sendTransaction`, so the sending account must be unlocked on
/// the node.
#[derive(Clone, Debug)]
pub struct LbpPoolClient {
    rpc: EthereumRpcClient,
    pool: Address,
    pool_id: B256,
    vault: Address,
    /// Pool tokens ordered by token index.
    assets: Vec<Address>,
    config: LbpClientConfig,
}

impl LbpPoolClient {
    pub fn new(
        rpc: EthereumRpcClient,
        pool: Address,
        pool_id: B256,
        vault: Address,
        assets: Vec<Address>,
        config: LbpClientConfig,
    ) -> Self {
        Self { rpc, pool, pool_id, vault, assets, config }
    }

    /// Reads the pool id, the vault and the token list from chain.
    #[instrument(skip(rpc, config))]
    pub async fn connect(
        rpc: EthereumRpcClient,
        pool: Address,
        config: LbpClientConfig,
    ) -> Result<Self, RPCError> {
        let pool_id = call(&rpc, None, pool, ILiquidityBootstrappingPool::getPoolIdCall {}).await?;
        let vault = call(&rpc, None, pool, ILiquidityBootstrappingPool::getVaultCall {}).await?;
        let tokens = call(&rpc, None, vault, IVault::getPoolTokensCall { poolId: pool_id }).await?;
        debug!(%pool_id, %vault, n_tokens = tokens.tokens.len(), "Connected to pool");

        Ok(Self::new(rpc, pool, pool_id, vault, tokens.tokens, config))
    }

    pub fn pool_id(&self) -> B256 {
        self.pool_id
    }

    pub fn vault(&self) -> Address {
        self.vault
    }

    pub fn assets(&self) -> &[Address] {
        &self.assets
    }

    fn check_index(&self, index: usize) -> Result<(), ChainError> {
        if index >= self.assets.len() {
            return Err(ChainError::Request(format!(
                "Asset index {index} out of range for a pool with {} tokens",
                self.assets.len()
            )));
        }
        Ok(())
    }

    fn funds(trader: Address) -> FundManagement {
        FundManagement {
            sender: trader,
            fromInternalBalance: false,
            recipient: trader,
            toInternalBalance: false,
        }
    }
}

/// Runs a read-only contract call against the latest block and decodes its return data.
async fn call<C: SolCall>(
    rpc: &EthereumRpcClient,
    from: Option<Address>,
    to: Address,
    call: C,
) -> Result<C::Return, RPCError> {
    let data = rpc
        .eth_call(call_request(from, to, call.abi_encode()), BlockNumberOrTag::Latest)
        .await?;
    C::abi_decode_returns(&data)
        .map_err(|e| RPCError::Decode(format!("{} returned {data}: {e}", C::SIGNATURE)))
}

fn fixed_point(raw: U256) -> Result<Decimal, ChainError> {
    from_raw_amount(raw, FIXED_POINT_DECIMALS).map_err(|e| ChainError::Decode(e.to_string()))
}

#[async_trait]
impl PoolReader for LbpPoolClient {
    async fn get_vault(&self) -> Result<Address, ChainError> {
        Ok(call(&self.rpc, None, self.pool, ILiquidityBootstrappingPool::getVaultCall {}).await?)
    }

    async fn get_paused_state(&self) -> Result<bool, ChainError> {
        let state =
            call(&self.rpc, None, self.pool, ILiquidityBootstrappingPool::getPausedStateCall {})
                .await?;
        Ok(state.paused)
    }

    async fn get_normalized_weights(&self) -> Result<Vec<Weight>, ChainError> {
        call(&self.rpc, None, self.pool, ILiquidityBootstrappingPool::getNormalizedWeightsCall {})
            .await?
            .into_iter()
            .map(fixed_point)
            .collect()
    }

    async fn get_swap_fee_percentage(&self) -> Result<Decimal, ChainError> {
        let fee =
            call(&self.rpc, None, self.pool, ILiquidityBootstrappingPool::getSwapFeePercentageCall {})
                .await?;
        fixed_point(fee)
    }

    async fn get_pool_tokens(&self, vault: Address, pool_id: B256) -> Result<PoolTokens, ChainError> {
        let tokens = call(&self.rpc, None, vault, IVault::getPoolTokensCall { poolId: pool_id }).await?;
        if tokens.tokens.len() != tokens.balances.len() {
            return Err(ChainError::Decode(format!(
                "getPoolTokens returned {} tokens but {} balances",
                tokens.tokens.len(),
                tokens.balances.len()
            )));
        }
        Ok(PoolTokens { tokens: tokens.tokens, balances: tokens.balances })
    }
}

#[async_trait]
impl TokenBalanceReader for LbpPoolClient {
    async fn balance_of(&self, account: Address, token: Address) -> Result<U256, ChainError> {
        Ok(call(&self.rpc, None, token, IERC20::balanceOfCall { owner: account }).await?)
    }
}

#[async_trait]
impl SwapSimulator for LbpPoolClient {
    /// Prices the swap with the vault's `queryBatchSwap`, which runs the full swap logic and
    /// reverts with the resulting deltas.
    #[instrument(level = "debug", skip(self))]
    async fn simulate_swap(
        &self,
        amount: U256,
        asset_in_index: usize,
        asset_out_index: usize,
        trader: Address,
    ) -> Result<Vec<I256>, ChainError> {
        self.check_index(asset_in_index)?;
        self.check_index(asset_out_index)?;

        let query = IVault::queryBatchSwapCall {
            kind: SwapKind::GivenIn as u8,
            swaps: vec![BatchSwapStep {
                poolId: self.pool_id,
                assetInIndex: U256::from(asset_in_index),
                assetOutIndex: U256::from(asset_out_index),
                amount,
                userData: Bytes::new(),
            }],
            assets: self.assets.clone(),
            funds: Self::funds(trader),
        };
        let deltas = call(&self.rpc, Some(trader), self.vault, query).await?;

        if deltas.len() != self.assets.len() {
            return Err(ChainError::Decode(format!(
                "queryBatchSwap returned {} deltas for {} assets",
                deltas.len(),
                self.assets.len()
            )));
        }
        Ok(deltas)
    }
}

#[async_trait]
impl SwapExecutor for LbpPoolClient {
    #[instrument(skip(self, request), fields(sender = %request.sender))]
    async fn swap(&self, request: SwapRequest) -> Result<B256, ChainError> {
        let swap = IVault::swapCall {
            singleSwap: SingleSwap {
                poolId: self.pool_id,
                kind: request.kind as u8,
                assetIn: request.asset_in,
                assetOut: request.asset_out,
                amount: request.amount,
                userData: Bytes::new(),
            },
            funds: FundManagement {
                sender: request.sender,
                fromInternalBalance: false,
                recipient: request.recipient,
                toInternalBalance: false,
            },
            limit: request.limit,
            deadline: request.deadline,
        };

        let hash = self
            .rpc
            .send_transaction(call_request(Some(request.sender), self.vault, swap.abi_encode()))
            .await?;
        info!(%hash, amount = %request.amount, limit = %request.limit, "Swap submitted");
        Ok(hash)
    }

    async fn wait(&self, transaction: B256) -> Result<SwapReceipt, ChainError> {
        let poll = async {
            let mut interval = tokio::time::interval(self.config.receipt_poll_interval);
            loop {
                interval.tick().await;
                if let Some(receipt) = self
                    .rpc
                    .get_transaction_receipt(transaction)
                    .await?
                {
                    return Ok::<_, RPCError>(receipt);
                }
                debug!(%transaction, "Transaction still pending");
            }
        };

        let receipt = tokio::time::timeout(self.config.receipt_timeout, poll)
            .await
            .map_err(|_| RPCError::ReceiptTimeout {
                hash: transaction,
                waited: self.config.receipt_timeout,
            })??;

        if !receipt.succeeded() {
            warn!(%transaction, "Transaction mined with failed status");
        }
        Ok(SwapReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt
                .block_number
                .map(|n| n.to::<u64>()),
            success: receipt.succeeded(),
        })
    }
}

#[async_trait]
impl TokenApprover for LbpPoolClient {
    async fn allowance(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        Ok(call(&self.rpc, None, token, IERC20::allowanceCall { owner, spender: self.vault }).await?)
    }

    #[instrument(skip(self))]
    async fn approve(&self, token: Address, owner: Address, amount: U256) -> Result<B256, ChainError> {
        let approval = IERC20::approveCall { spender: self.vault, amount };
        let hash = self
            .rpc
            .send_transaction(call_request(Some(owner), token, approval.abi_encode()))
            .await?;
        info!(%hash, "Approval submitted");
        Ok(hash)
    }
}
