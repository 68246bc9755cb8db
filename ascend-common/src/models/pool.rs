use std::collections::HashMap;

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{token::TokenRef, Amount, Weight};
use crate::{errors::PriceError, price};

/// A scheduled window over which the pool weights interpolate from `start_weights` to
/// `end_weights`. The weights are ordered by token index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightUpdate {
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub start_weights: Vec<Weight>,
    pub end_weights: Vec<Weight>,
}

/// A pool token as last indexed by the subgraph, together with its static weight and balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolToken {
    pub token: TokenRef,
    pub weight: Weight,
    pub balance: Amount,
}

/// Static description of a pool, sourced from its last indexed subgraph record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolMetadata {
    pub pool_id: B256,
    pub address: Address,
    pub swap_fee: Decimal,
    pub tokens: Vec<PoolToken>,
    pub weight_updates: Vec<WeightUpdate>,
}

impl PoolMetadata {
    pub fn token_by_index(&self, token_index: usize) -> Option<&TokenRef> {
        self.tokens
            .iter()
            .map(|t| &t.token)
            .find(|t| t.token_index == token_index)
    }

    pub fn token_by_address(&self, address: &Address) -> Option<&TokenRef> {
        self.tokens
            .iter()
            .map(|t| &t.token)
            .find(|t| &t.address == address)
    }

    /// Case-insensitive lookup by symbol.
    pub fn token_by_symbol(&self, symbol: &str) -> Option<&TokenRef> {
        self.tokens
            .iter()
            .map(|t| &t.token)
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Returns the pair that sells `sell` and buys the other pool token. `None` if the symbol is
    /// unknown or the pool does not have exactly two tokens.
    pub fn trading_pair(&self, sell: &str) -> Option<(TokenRef, TokenRef)> {
        if self.tokens.len() != 2 {
            return None;
        }
        let sell = self.token_by_symbol(sell)?.clone();
        let buy = self
            .tokens
            .iter()
            .map(|t| &t.token)
            .find(|t| t.token_index != sell.token_index)?
            .clone();
        Some((sell, buy))
    }

    /// Builds a snapshot out of the indexed weights and balances. Used while no wallet is
    /// connected and live reads are skipped.
    pub fn indexed_snapshot(&self, vault_address: Option<Address>) -> PoolSnapshot {
        let mut tokens = self.tokens.iter().collect::<Vec<_>>();
        tokens.sort_by_key(|t| t.token.token_index);
        PoolSnapshot {
            vault_address,
            is_paused: false,
            swap_fee: self.swap_fee,
            weights: tokens
                .iter()
                .map(|t| (t.token.address, t.weight))
                .collect(),
            balances: tokens
                .iter()
                .map(|t| (t.token.address, t.balance))
                .collect(),
            account_balances: HashMap::new(),
            source: SnapshotSource::Indexed,
            fetched_at: Utc::now(),
        }
    }
}

/// Raw token list and balances held by the vault for a pool, ordered by token index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolTokens {
    pub tokens: Vec<Address>,
    pub balances: Vec<U256>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    /// Read from the chain during the last poll.
    Live,
    /// Taken from the last indexed subgraph record.
    Indexed,
}

/// Consistent view of the pool as of one poll tick. A new snapshot is built on every tick and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub vault_address: Option<Address>,
    pub is_paused: bool,
    pub swap_fee: Decimal,
    pub weights: HashMap<Address, Weight>,
    pub balances: HashMap<Address, Amount>,
    /// Balances of the connected account, empty while disconnected.
    pub account_balances: HashMap<Address, Amount>,
    pub source: SnapshotSource,
    pub fetched_at: DateTime<Utc>,
}

impl PoolSnapshot {
    /// Spot price of `buy` denominated in `sell`, fee included.
    pub fn spot_price(&self, sell: &TokenRef, buy: &TokenRef) -> Result<Decimal, PriceError> {
        let lookup = |map: &HashMap<Address, Decimal>, token: &TokenRef, what: &str| {
            map.get(&token.address)
                .copied()
                .ok_or_else(|| {
                    PriceError::InvalidPoolState(format!("missing {what} for {}", token.symbol))
                })
        };
        price::spot_price(
            lookup(&self.balances, sell, "balance")?,
            lookup(&self.balances, buy, "balance")?,
            lookup(&self.weights, sell, "weight")?,
            lookup(&self.weights, buy, "weight")?,
            self.swap_fee,
        )
    }

    pub fn account_balance(&self, token: &TokenRef) -> Option<Amount> {
        self.account_balances
            .get(&token.address)
            .copied()
    }
}
