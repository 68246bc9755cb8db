//! Shared models, pricing math and boundary traits of the Ascend liquidity bootstrapping pool
//! trading engine.
pub mod errors;
pub mod models;
pub mod price;
pub mod traits;

pub use alloy_primitives::{Address, B256, I256, U256};
pub use rust_decimal::Decimal;
