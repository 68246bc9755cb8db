//! Stateless pricing functions over weighted pool data.
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    errors::PriceError,
    models::{Amount, Weight, WeightUpdate},
};

const BPS_SCALE: u32 = 4;

/// Spot price of the out token denominated in the in token, for a weighted constant product
/// pool:
///
/// ```text
/// (balance_in / weight_in) / (balance_out / weight_out) / (1 - swap_fee)
/// ```
///
/// All arithmetic is exact decimal arithmetic, nothing is rounded between the divisions.
///
/// # Errors
///
/// `PriceError::InvalidPoolState` if any balance or weight is zero, if the fee is outside
/// `[0, 1)` or if an intermediate result overflows. Callers must only ask for a price once the
/// pool holds liquidity.
///
/// # Example
///
/// ```
/// use ascend_common::price::spot_price;
/// use rust_decimal::Decimal;
///
/// let price = spot_price(
///     Decimal::from(80),
///     Decimal::from(20),
///     Decimal::new(8, 1),
///     Decimal::new(2, 1),
///     Decimal::ZERO,
/// )
/// .unwrap();
/// assert_eq!(price, Decimal::ONE);
/// ```
pub fn spot_price(
    balance_in: Amount,
    balance_out: Amount,
    weight_in: Weight,
    weight_out: Weight,
    swap_fee: Decimal,
) -> Result<Decimal, PriceError> {
    for (name, value) in [
        ("balance_in", balance_in),
        ("balance_out", balance_out),
        ("weight_in", weight_in),
        ("weight_out", weight_out),
    ] {
        if value <= Decimal::ZERO {
            return Err(PriceError::InvalidPoolState(format!("{name} must be positive, got {value}")));
        }
    }
    if swap_fee < Decimal::ZERO || swap_fee >= Decimal::ONE {
        return Err(PriceError::InvalidPoolState(format!("swap fee {swap_fee} outside of [0, 1)")));
    }

    let overflow = || PriceError::InvalidPoolState("spot price overflow".to_string());
    let numerator = balance_in
        .checked_div(weight_in)
        .ok_or_else(overflow)?;
    let denominator = balance_out
        .checked_div(weight_out)
        .ok_or_else(overflow)?;
    numerator
        .checked_div(denominator)
        .and_then(|price| price.checked_div(Decimal::ONE - swap_fee))
        .ok_or_else(overflow)
}

/// Time left until the auction starts, i.e. until the start of the last weight update
/// checkpoint. `None` once that moment has passed or if there is no schedule.
///
/// Always derive the value from a fresh `now`, never count down a stored duration.
pub fn remaining_time(schedule: &[WeightUpdate], now: DateTime<Utc>) -> Option<Duration> {
    let last = schedule.last()?;
    (last.start_timestamp - now)
        .to_std()
        .ok()
        .filter(|remaining| !remaining.is_zero())
}

/// Minimum amount the trader accepts to receive for a quoted `estimate`:
/// `estimate * (1 - tolerance)`. Tolerances above 100% are clamped.
pub fn min_amount_out(estimate: Amount, slippage_tolerance_bps: u32) -> Amount {
    let tolerance = Decimal::new(i64::from(slippage_tolerance_bps.min(10_000)), BPS_SCALE);
    estimate * (Decimal::ONE - tolerance)
}
