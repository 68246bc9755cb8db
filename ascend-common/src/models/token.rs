use std::{fmt, str::FromStr};

use alloy_primitives::{Address, U256};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::ConversionError;

/// One side of the pool.
///
/// `token_index` is the position of the token in the pool's canonical token ordering. It is the
/// index used in the weight and balance arrays returned by the pool and in swap simulations, so
/// it must never be reassigned once the pool is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenRef {
    pub name: String,
    pub symbol: String,
    pub address: Address,
    pub decimals: u32,
    pub token_index: usize,
}

impl TokenRef {
    pub fn new(name: &str, symbol: &str, address: Address, decimals: u32, token_index: usize) -> Self {
        Self { name: name.to_string(), symbol: symbol.to_string(), address, decimals, token_index }
    }

    /// Converts a human denominated amount into raw token units. Digits beyond the token's
    /// decimals are truncated.
    pub fn to_raw(&self, amount: Decimal) -> Result<U256, ConversionError> {
        to_raw_amount(amount, self.decimals)
    }

    /// Converts raw token units into a human denominated amount.
    pub fn from_raw(&self, raw: U256) -> Result<Decimal, ConversionError> {
        from_raw_amount(raw, self.decimals)
    }
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.symbol, self.token_index)
    }
}

/// Parses user text input into an amount. Surrounding whitespace is ignored, an empty string is
/// zero.
pub fn parse_amount(text: &str) -> Result<Decimal, ConversionError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let amount =
        Decimal::from_str(text).map_err(|e| ConversionError::InvalidAmount(format!("{text}: {e}")))?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ConversionError::Negative(text.to_string()));
    }
    Ok(amount)
}

pub fn to_raw_amount(amount: Decimal, decimals: u32) -> Result<U256, ConversionError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ConversionError::Negative(amount.to_string()));
    }
    let truncated = amount.round_dp_with_strategy(decimals, RoundingStrategy::ToZero);
    // after truncation the scale never exceeds `decimals`
    let missing_scale = decimals.saturating_sub(truncated.scale());
    let mantissa = u128::try_from(truncated.mantissa())
        .map_err(|_| ConversionError::Negative(amount.to_string()))?;
    U256::from(10u64)
        .checked_pow(U256::from(missing_scale))
        .and_then(|factor| U256::from(mantissa).checked_mul(factor))
        .ok_or_else(|| ConversionError::Overflow(amount.to_string()))
}

pub fn from_raw_amount(raw: U256, decimals: u32) -> Result<Decimal, ConversionError> {
    if raw > U256::from(i128::MAX as u128) {
        return Err(ConversionError::Overflow(raw.to_string()));
    }
    let value = raw.to::<u128>() as i128;
    Decimal::try_from_i128_with_scale(value, decimals)
        .map(|d| d.normalize())
        .map_err(|_| ConversionError::Overflow(format!("{raw} with {decimals} decimals")))
}
