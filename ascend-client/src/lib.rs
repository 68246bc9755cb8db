//! Trading engine for Ascend liquidity bootstrapping pools: a deduplicating quote pipeline, the
//! trade state machine, a polling pool state store and the subgraph metadata client.
pub mod cli;
pub mod config;
pub mod feed;
pub mod quote;
pub mod subgraph;
pub mod task;
pub mod trade;
pub mod wallet;

pub use feed::{countdown::AuctionCountdown, PoolStateStore, PoolStateSubscription};
pub use quote::{QuoteManager, QuoteOutcome};
pub use subgraph::SubgraphClient;
pub use trade::{state::TradeState, TradeController, TradeError, TradeNotification};
pub use wallet::{WalletConnection, WalletHandle};
