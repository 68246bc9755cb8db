use std::{str::FromStr, sync::Arc, time::Duration};

use alloy_primitives::{Address, B256};
use anyhow::{anyhow, Context};
use ascend_common::models::{PoolMetadata, PoolSnapshot, TokenRef, TransactionSettings};
use ascend_ethereum::{EthereumRpcClient, LbpClientConfig, LbpPoolClient};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use tracing_appender::rolling;

use crate::{
    config::{PollingConfig, TradeConfig},
    feed::{countdown::AuctionCountdown, PoolStateStore, PoolStateSubscription},
    subgraph::SubgraphClient,
    trade::TradeController,
    wallet::WalletConnection,
};

/// Ascend Client CLI - Track and trade on a liquidity bootstrapping pool
///
/// Loads the pool record from the subgraph, polls the pool state from chain and prints every
/// snapshot as a JSON line. Optionally quotes a sell amount and executes the swap.
#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct CliArgs {
    /// Ethereum JSON-RPC endpoint.
    #[clap(long, env = "ASCEND_RPC_URL")]
    rpc_url: String,

    /// Subgraph GraphQL endpoint indexing the pool.
    #[clap(long, env = "ASCEND_SUBGRAPH_URL")]
    subgraph_url: String,

    /// Balancer pool id (32 bytes, hex).
    #[clap(long)]
    pool_id: String,

    /// Trader account. Must be unlocked on the node to execute swaps. Without it only indexed
    /// data is shown.
    #[clap(long)]
    account: Option<String>,

    /// Symbol of the token to sell. The other pool token is bought.
    #[clap(long, default_value = "USDC")]
    sell: String,

    /// Human denominated amount of the sell token to quote.
    #[clap(long)]
    amount: Option<String>,

    #[clap(long, default_value = "50")]
    slippage_bps: u32,

    #[clap(long, default_value = "20")]
    deadline_minutes: u64,

    /// Seconds between two pool state polls.
    #[clap(long, default_value = "20")]
    poll_interval: u64,

    /// Seconds after which a pending quote is reported as failed.
    #[clap(long)]
    quote_timeout: Option<u64>,

    /// Approve if needed and execute the swap once the quote resolves.
    #[clap(long)]
    execute: bool,

    /// Stop after printing this many pool snapshots.
    #[clap(long)]
    max_updates: Option<usize>,

    /// Logging folder path.
    #[clap(long, default_value = "logs")]
    log_folder: String,

    /// Enable debug logging.
    #[clap(long)]
    verbose: bool,
}

impl CliArgs {
    fn validate(&self) -> Result<(), String> {
        self.pool_id()?;
        self.account()?;
        self.settings().validate()?;
        if self.poll_interval == 0 {
            return Err("poll_interval must be at least one second".to_string());
        }
        if self.execute {
            if self.amount.is_none() {
                return Err("--execute requires --amount".to_string());
            }
            if self.account.is_none() {
                return Err("--execute requires --account".to_string());
            }
        }
        Ok(())
    }

    fn pool_id(&self) -> Result<B256, String> {
        B256::from_str(&self.pool_id).map_err(|e| format!("Invalid pool id {}: {e}", self.pool_id))
    }

    fn account(&self) -> Result<Option<Address>, String> {
        self.account
            .as_deref()
            .map(|account| {
                Address::from_str(account).map_err(|e| format!("Invalid account {account}: {e}"))
            })
            .transpose()
    }

    fn settings(&self) -> TransactionSettings {
        TransactionSettings::new(self.slippage_bps, self.deadline_minutes)
    }

    fn polling_config(&self) -> PollingConfig {
        PollingConfig { poll_interval: Duration::from_secs(self.poll_interval), ..Default::default() }
    }

    fn trade_config(&self) -> TradeConfig {
        TradeConfig {
            default_settings: self.settings(),
            quote_timeout: self.quote_timeout.map(Duration::from_secs),
        }
    }
}

/// One line of output per pool snapshot.
#[derive(Serialize)]
struct SnapshotLine<'a> {
    snapshot: &'a PoolSnapshot,
    sell: &'a str,
    buy: &'a str,
    spot_price: Option<Decimal>,
    auction_starts_in_secs: Option<u64>,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => error!(error = %e, "Failed to serialize output"),
    }
}

pub async fn run_cli() -> Result<(), String> {
    let args: CliArgs = CliArgs::parse();
    args.validate()?;

    let log_level = if args.verbose { "debug" } else { "info" };
    let (non_blocking, _guard) =
        tracing_appender::non_blocking(rolling::never(&args.log_folder, "ascend_client.log"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(non_blocking)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to set up logging subscriber: {e}"))?;

    run(args)
        .await
        .map_err(|e| format!("{e:#}"))
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    let pool_id = args.pool_id().map_err(|e| anyhow!(e))?;
    let account = args.account().map_err(|e| anyhow!(e))?;

    let subgraph = SubgraphClient::new(&args.subgraph_url).context("creating subgraph client")?;
    let metadata = Arc::new(
        subgraph
            .get_pool(pool_id)
            .await
            .context("loading pool metadata")?,
    );
    let (sell, buy) = metadata
        .trading_pair(&args.sell)
        .ok_or_else(|| anyhow!("pool {pool_id} has no two-token pair selling {}", args.sell))?;
    info!(%pool_id, pool = %metadata.address, %sell, %buy, "Loaded pool metadata");

    let rpc = EthereumRpcClient::new(&args.rpc_url).context("creating rpc client")?;
    let pool = Arc::new(
        LbpPoolClient::connect(rpc, metadata.address, LbpClientConfig::default())
            .await
            .context("connecting to pool")?,
    );
    if pool.pool_id() != metadata.pool_id {
        return Err(anyhow!(
            "pool at {} reports id {}, subgraph has {}",
            metadata.address,
            pool.pool_id(),
            metadata.pool_id
        ));
    }

    let wallet = match account {
        Some(account) => WalletConnection::connected(account),
        None => WalletConnection::new(),
    };
    let polling = args.polling_config();
    let mut subscription =
        PoolStateStore::new(pool.clone(), metadata.clone(), wallet.handle(), polling).activate();
    let countdown = AuctionCountdown::start(metadata.weight_updates.clone(), polling.countdown_tick);

    if let Some(amount) = &args.amount {
        let controller = TradeController::new(
            sell.clone(),
            buy.clone(),
            pool.clone(),
            pool.clone(),
            wallet.handle(),
            args.trade_config(),
        )
        .context("setting up trade")?;
        quote_and_trade(&controller, amount, args.execute).await?;
    }

    let result =
        print_snapshots(&mut subscription, &metadata, &countdown, (&sell, &buy), args.max_updates)
            .await;

    countdown.stop().await;
    subscription.deactivate().await;
    wallet.disconnect();
    result
}

async fn quote_and_trade(
    controller: &TradeController<LbpPoolClient, LbpPoolClient>,
    amount: &str,
    execute: bool,
) -> anyhow::Result<()> {
    let mut states = controller.subscribe();
    controller
        .set_sell_amount(amount)
        .context("setting sell amount")?;
    let state = states
        .wait_for(|state| !state.quote.loading)
        .await
        .context("trade state closed")?
        .clone();
    print_json(&state);

    if !execute {
        return Ok(());
    }
    if state.quote.estimate.is_none() {
        warn!(%amount, "No quote, skipping swap");
        return Ok(());
    }
    if controller
        .needs_approval()
        .await
        .context("reading allowance")?
    {
        let hash = controller
            .approve()
            .await
            .context("approving sell token")?;
        debug!(%hash, "Approved vault");
    }
    let receipt = controller
        .swap()
        .await
        .context("executing swap")?;
    print_json(&receipt);
    Ok(())
}

async fn print_snapshots(
    subscription: &mut PoolStateSubscription,
    metadata: &PoolMetadata,
    countdown: &AuctionCountdown,
    (sell, buy): (&TokenRef, &TokenRef),
    max_updates: Option<usize>,
) -> anyhow::Result<()> {
    let mut printed = 0;
    while max_updates.map_or(true, |max| printed < max) {
        let snapshot = subscription
            .changed()
            .await
            .context("pool state feed ended")?;
        let spot_price = match snapshot.spot_price(sell, buy) {
            Ok(price) => Some(price),
            Err(e) => {
                warn!(pool_id = %metadata.pool_id, error = %e, "No spot price for snapshot");
                None
            }
        };
        print_json(&SnapshotLine {
            snapshot: &snapshot,
            sell: &sell.symbol,
            buy: &buy.symbol,
            spot_price,
            auction_starts_in_secs: countdown
                .remaining()
                .map(|remaining| remaining.as_secs()),
        });
        printed += 1;
    }
    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;

    const POOL_ID: &str = "0x8a6b9e0e1a4d5f3c0e4f7b1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f";

    fn base_args() -> Vec<&'static str> {
        vec![
            "ascend-client",
            "--rpc-url",
            "http://localhost:8545",
            "--subgraph-url",
            "http://localhost:8000/subgraphs/name/ascend",
            "--pool-id",
            POOL_ID,
        ]
    }

    #[test]
    fn test_cli_args() {
        let mut argv = base_args();
        argv.extend([
            "--account",
            "0x1111111111111111111111111111111111111111",
            "--sell",
            "ASC",
            "--amount",
            "12.5",
            "--slippage-bps",
            "100",
            "--deadline-minutes",
            "5",
            "--poll-interval",
            "3",
            "--quote-timeout",
            "10",
            "--execute",
            "--max-updates",
            "2",
            "--log-folder",
            "test_logs",
        ]);
        let args = CliArgs::parse_from(argv);

        assert_eq!(args.validate(), Ok(()));
        assert_eq!(args.sell, "ASC");
        assert_eq!(args.amount.as_deref(), Some("12.5"));
        assert_eq!(args.account(), Ok(Some(Address::repeat_byte(0x11))));
        assert_eq!(args.settings(), TransactionSettings::new(100, 5));
        assert_eq!(args.polling_config().poll_interval, Duration::from_secs(3));
        assert_eq!(args.trade_config().quote_timeout, Some(Duration::from_secs(10)));
        assert_eq!(args.max_updates, Some(2));
        assert_eq!(args.log_folder, "test_logs");
        assert!(args.execute);
        assert!(!args.verbose);
    }

    #[test]
    fn test_cli_defaults() {
        let args = CliArgs::parse_from(base_args());

        assert_eq!(args.validate(), Ok(()));
        assert_eq!(args.sell, "USDC");
        assert_eq!(args.settings(), TransactionSettings::default());
        assert_eq!(args.polling_config(), PollingConfig::default());
        assert_eq!(args.trade_config(), TradeConfig::default());
        assert_eq!(args.account(), Ok(None));
    }

    #[test]
    fn test_execute_requires_account() {
        let mut argv = base_args();
        argv.extend(["--amount", "1", "--execute"]);
        let args = CliArgs::parse_from(argv);

        assert_eq!(args.validate(), Err("--execute requires --account".to_string()));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut argv = base_args();
        argv.extend(["--slippage-bps", "10001"]);
        let args = CliArgs::parse_from(argv);

        assert!(args.validate().is_err());
    }

    #[test]
    fn test_snapshot_line_reports_seconds_until_last_checkpoint() {
        let snapshot = PoolSnapshot {
            vault_address: None,
            is_paused: false,
            swap_fee: Decimal::ZERO,
            weights: Default::default(),
            balances: Default::default(),
            account_balances: Default::default(),
            source: ascend_common::models::SnapshotSource::Indexed,
            fetched_at: chrono::Utc::now(),
        };
        let line = SnapshotLine {
            snapshot: &snapshot,
            sell: "USDC",
            buy: "ASC",
            spot_price: None,
            auction_starts_in_secs: Some(90),
        };

        let json = serde_json::to_value(&line).unwrap();

        assert_eq!(json["auction_starts_in_secs"], 90);
        assert_eq!(json["sell"], "USDC");
        assert_eq!(json["snapshot"]["source"], "indexed");
    }

    #[test]
    fn test_invalid_pool_id_rejected() {
        let args = CliArgs::parse_from([
            "ascend-client",
            "--rpc-url",
            "http://localhost:8545",
            "--subgraph-url",
            "http://localhost:8000",
            "--pool-id",
            "0x1234",
        ]);

        assert!(args.validate().is_err());
    }
}
