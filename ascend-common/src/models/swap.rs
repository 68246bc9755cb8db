use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::token::TokenRef;

/// User configurable execution parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSettings {
    /// Maximum adverse movement between quote and execution, in basis points.
    pub slippage_tolerance_bps: u32,
    pub deadline_minutes: u64,
}

impl TransactionSettings {
    pub const MAX_SLIPPAGE_BPS: u32 = 10_000;

    pub fn new(slippage_tolerance_bps: u32, deadline_minutes: u64) -> Self {
        Self { slippage_tolerance_bps, deadline_minutes }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.slippage_tolerance_bps > Self::MAX_SLIPPAGE_BPS {
            return Err(format!(
                "slippage tolerance of {} bps exceeds {} bps",
                self.slippage_tolerance_bps,
                Self::MAX_SLIPPAGE_BPS
            ));
        }
        if self.deadline_minutes == 0 {
            return Err("deadline must be at least one minute".to_string());
        }
        Ok(())
    }

    /// Unix timestamp in seconds after which the swap must not execute anymore.
    pub fn deadline(&self, now: DateTime<Utc>) -> U256 {
        let now = u64::try_from(now.timestamp()).unwrap_or_default();
        U256::from(now.saturating_add(self.deadline_minutes.saturating_mul(60)))
    }
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self { slippage_tolerance_bps: 50, deadline_minutes: 20 }
    }
}

/// Identifies the intent behind a quote request. A resolved quote is only applied while its key
/// is still the most recently requested one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuoteRequestKey {
    /// Raw amount of `sell_asset` to swap.
    pub amount: U256,
    pub sell_asset: TokenRef,
    pub buy_asset: TokenRef,
}

impl QuoteRequestKey {
    pub fn new(amount: U256, sell_asset: TokenRef, buy_asset: TokenRef) -> Self {
        Self { amount, sell_asset, buy_asset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SwapKind {
    GivenIn = 0,
    GivenOut = 1,
}

/// Parameters of a single pool swap: the swap details, the fund management and the limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub kind: SwapKind,
    pub asset_in: Address,
    pub asset_out: Address,
    /// Raw amount of `asset_in` sold.
    pub amount: U256,
    pub sender: Address,
    pub recipient: Address,
    /// Minimum raw amount of `asset_out` to receive.
    pub limit: U256,
    /// Unix timestamp in seconds.
    pub deadline: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub success: bool,
}
