pub mod pool;
pub mod swap;
pub mod token;

use rust_decimal::Decimal;

/// Human denominated token amount (already divided by the token decimals).
pub type Amount = Decimal;

/// Normalized pool weight, the weights of a pool sum up to one.
pub type Weight = Decimal;

pub use pool::{PoolMetadata, PoolSnapshot, PoolToken, PoolTokens, SnapshotSource, WeightUpdate};
pub use swap::{QuoteRequestKey, SwapKind, SwapReceipt, SwapRequest, TransactionSettings};
pub use token::TokenRef;
