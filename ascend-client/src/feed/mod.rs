//! Polling store for the live pool state.
//!
//! [`PoolStateStore::activate`] polls once immediately and then on every tick of the configured
//! interval, publishing each complete [`PoolSnapshot`] through a watch channel. Snapshots are
//! immutable and shared behind an `Arc`, a poll never exposes partial results.
use std::{collections::HashMap, sync::Arc};

use alloy_primitives::Address;
use ascend_common::{
    errors::{ChainError, ConversionError},
    models::{PoolMetadata, PoolSnapshot, SnapshotSource},
    traits::{PoolReader, TokenBalanceReader},
};
use chrono::Utc;
use futures03::future::try_join_all;
use thiserror::Error;
use tokio::{select, sync::watch, time::MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::{config::PollingConfig, task::ScopedTask, wallet::WalletHandle};

pub mod countdown;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolStoreError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("Inconsistent pool state: {0}")]
    Inconsistent(String),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("Pool state store was deactivated")]
    Closed,
}

pub struct PoolStateStore<R> {
    reader: Arc<R>,
    metadata: Arc<PoolMetadata>,
    wallet: WalletHandle,
    config: PollingConfig,
}

impl<R> PoolStateStore<R>
where
    R: PoolReader + TokenBalanceReader + 'static,
{
    pub fn new(
        reader: Arc<R>,
        metadata: Arc<PoolMetadata>,
        wallet: WalletHandle,
        config: PollingConfig,
    ) -> Self {
        Self { reader, metadata, wallet, config }
    }

    /// Starts polling. Polling stops when the returned subscription is deactivated or dropped.
    pub fn activate(self) -> PoolStateSubscription {
        let (tx, rx) = watch::channel(None);
        let interval = self.config.poll_interval;
        let mut wallet_changes = self.wallet.clone();
        let mut poller = Poller {
            reader: self.reader,
            metadata: self.metadata,
            wallet: self.wallet,
            vault: None,
        };

        let task = ScopedTask::spawn("pool-state-poller", async move {
            info!(pool_id = %poller.metadata.pool_id, ?interval, "Starting pool state polling");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut follow_wallet = true;
            loop {
                select! {
                    _ = ticker.tick() => {},
                    changed = wallet_changes.changed(), if follow_wallet => {
                        match changed {
                            Ok(account) => {
                                debug!(?account, "Wallet changed, polling now");
                                ticker.reset();
                            }
                            Err(_) => {
                                follow_wallet = false;
                                continue;
                            }
                        }
                    }
                }

                match poller.poll().await {
                    Ok(snapshot) => {
                        trace!(source = %snapshot.source, "Publishing pool snapshot");
                        tx.send_replace(Some(Arc::new(snapshot)));
                    }
                    Err(error) => {
                        warn!(%error, "Pool state poll failed, keeping previous snapshot");
                    }
                }
            }
        });

        PoolStateSubscription { task, rx }
    }
}

struct Poller<R> {
    reader: Arc<R>,
    metadata: Arc<PoolMetadata>,
    wallet: WalletHandle,
    vault: Option<Address>,
}

impl<R> Poller<R>
where
    R: PoolReader + TokenBalanceReader,
{
    async fn poll(&mut self) -> Result<PoolSnapshot, PoolStoreError> {
        let Some(account) = self.wallet.account() else {
            return Ok(self
                .metadata
                .indexed_snapshot(self.vault));
        };

        let vault = match self.vault {
            Some(vault) => vault,
            None => {
                let vault = self.reader.get_vault().await?;
                debug!(%vault, "Resolved pool vault");
                self.vault = Some(vault);
                vault
            }
        };

        let (is_paused, weights, swap_fee, pool_tokens) = tokio::try_join!(
            self.reader.get_paused_state(),
            self.reader.get_normalized_weights(),
            self.reader.get_swap_fee_percentage(),
            self.reader
                .get_pool_tokens(vault, self.metadata.pool_id),
        )?;

        if weights.len() != pool_tokens.tokens.len() ||
            pool_tokens.balances.len() != pool_tokens.tokens.len()
        {
            return Err(PoolStoreError::Inconsistent(format!(
                "{} weights and {} balances for {} tokens",
                weights.len(),
                pool_tokens.balances.len(),
                pool_tokens.tokens.len()
            )));
        }

        let mut balances = HashMap::with_capacity(pool_tokens.tokens.len());
        for (address, raw) in pool_tokens
            .tokens
            .iter()
            .zip(&pool_tokens.balances)
        {
            let token = self
                .metadata
                .token_by_address(address)
                .ok_or_else(|| {
                    PoolStoreError::Inconsistent(format!("vault reports unknown token {address}"))
                })?;
            balances.insert(*address, token.from_raw(*raw)?);
        }
        let weights = pool_tokens
            .tokens
            .iter()
            .copied()
            .zip(weights)
            .collect();

        let reader = &self.reader;
        let account_balances = try_join_all(self.metadata.tokens.iter().map(|pool_token| {
            let token = &pool_token.token;
            async move {
                let raw = reader
                    .balance_of(account, token.address)
                    .await?;
                Ok::<_, PoolStoreError>((token.address, token.from_raw(raw)?))
            }
        }))
        .await?
        .into_iter()
        .collect();

        Ok(PoolSnapshot {
            vault_address: Some(vault),
            is_paused,
            swap_fee,
            weights,
            balances,
            account_balances,
            source: SnapshotSource::Live,
            fetched_at: Utc::now(),
        })
    }
}

/// Keeps the poller alive. Readers always see the latest complete snapshot.
pub struct PoolStateSubscription {
    task: ScopedTask,
    rx: watch::Receiver<Option<Arc<PoolSnapshot>>>,
}

impl PoolStateSubscription {
    /// The latest snapshot, `None` until the first poll succeeded.
    pub fn latest(&self) -> Option<Arc<PoolSnapshot>> {
        self.rx.borrow().clone()
    }

    pub fn receiver(&self) -> watch::Receiver<Option<Arc<PoolSnapshot>>> {
        self.rx.clone()
    }

    /// Waits for the next published snapshot.
    pub async fn changed(&mut self) -> Result<Arc<PoolSnapshot>, PoolStoreError> {
        loop {
            self.rx
                .changed()
                .await
                .map_err(|_| PoolStoreError::Closed)?;
            if let Some(snapshot) = self.rx.borrow_and_update().clone() {
                return Ok(snapshot);
            }
        }
    }

    /// Stops polling and releases the timer.
    pub async fn deactivate(self) {
        self.task.stop().await;
    }
}
