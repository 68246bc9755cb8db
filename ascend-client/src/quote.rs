//! Deduplicated, supersession-ordered swap quotes.
//!
//! The [`QuoteManager`] remembers the key of the most recent request. A request for the same key
//! is a no-op, a request for a new key supersedes everything issued before it: the older task is
//! aborted and, should its simulation still resolve, its result is discarded instead of being
//! delivered. Results are therefore applied in the order requests were issued, never in the order
//! simulations happen to resolve.
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use alloy_primitives::{Address, I256};
use ascend_common::{errors::ChainError, models::QuoteRequestKey, traits::SwapSimulator};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::wallet::WalletHandle;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("Quote simulation failed: {0}")]
    FetchFailed(#[from] ChainError),
    #[error("Quote simulation timed out after {0:?}")]
    TimedOut(Duration),
}

/// What the completion callback of a still current request receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteOutcome {
    /// Signed per asset deltas, ordered by token index.
    Resolved(Vec<I256>),
    Failed(QuoteError),
}

#[derive(Debug, Default)]
struct QuoteSlot {
    current_key: Option<QuoteRequestKey>,
    result: Option<Vec<I256>>,
    in_flight: Option<JoinHandle<()>>,
}

fn lock(slot: &Mutex<QuoteSlot>) -> MutexGuard<'_, QuoteSlot> {
    // the slot holds plain data, a panic in another holder cannot leave it half written
    slot.lock()
        .unwrap_or_else(PoisonError::into_inner)
}

pub struct QuoteManager<S> {
    simulator: Arc<S>,
    wallet: WalletHandle,
    slot: Arc<Mutex<QuoteSlot>>,
    timeout: Option<Duration>,
}

impl<S> QuoteManager<S>
where
    S: SwapSimulator + 'static,
{
    pub fn new(simulator: Arc<S>, wallet: WalletHandle, timeout: Option<Duration>) -> Self {
        Self { simulator, wallet, slot: Arc::new(Mutex::new(QuoteSlot::default())), timeout }
    }

    /// Issues a simulation for `key` unless `key` is already the current request. Returns whether
    /// a new simulation was started.
    ///
    /// `on_complete` is called at most once, and only if no other request was issued and the
    /// manager was not invalidated in the meantime. It runs while the manager is locked and must
    /// not call back into it.
    pub fn request_quote<F>(&self, key: QuoteRequestKey, on_complete: F) -> bool
    where
        F: FnOnce(QuoteOutcome) + Send + 'static,
    {
        self.request_quote_with(key, || {}, on_complete)
    }

    /// Like [`Self::request_quote`], and runs `on_start` once the new key has replaced the old
    /// one, still under the manager lock. No result of an older request can be delivered after
    /// `on_start` ran.
    pub fn request_quote_with<B, F>(
        &self,
        key: QuoteRequestKey,
        on_start: B,
        on_complete: F,
    ) -> bool
    where
        B: FnOnce(),
        F: FnOnce(QuoteOutcome) + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        if slot.current_key.as_ref() == Some(&key) {
            trace!(amount = %key.amount, "Quote already requested");
            return false;
        }

        slot.current_key = Some(key.clone());
        slot.result = None;
        if let Some(previous) = slot.in_flight.take() {
            previous.abort();
        }
        on_start();

        // Simulating from the zero address still prices the swap while no wallet is connected.
        let trader = self.wallet.account().unwrap_or(Address::ZERO);
        let simulator = self.simulator.clone();
        let shared = self.slot.clone();
        let timeout = self.timeout;
        debug!(amount = %key.amount, sell = %key.sell_asset, buy = %key.buy_asset, "Requesting quote");

        slot.in_flight = Some(tokio::spawn(async move {
            let simulation = simulator.simulate_swap(
                key.amount,
                key.sell_asset.token_index,
                key.buy_asset.token_index,
                trader,
            );
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, simulation).await {
                    Ok(res) => res.map_err(QuoteError::from),
                    Err(_) => Err(QuoteError::TimedOut(limit)),
                },
                None => simulation
                    .await
                    .map_err(QuoteError::from),
            };

            let mut slot = lock(&shared);
            if slot.current_key.as_ref() != Some(&key) {
                debug!(amount = %key.amount, "Discarding stale quote");
                return;
            }
            slot.in_flight = None;
            let outcome = match result {
                Ok(deltas) => {
                    slot.result = Some(deltas.clone());
                    QuoteOutcome::Resolved(deltas)
                }
                Err(error) => {
                    warn!(amount = %key.amount, %error, "Quote failed");
                    // a failed key must not block asking again for the same amount
                    slot.current_key = None;
                    QuoteOutcome::Failed(error)
                }
            };
            on_complete(outcome);
        }));
        true
    }

    /// Forgets the current request. Any in-flight simulation is aborted and its result will not
    /// be delivered.
    pub fn invalidate(&self) {
        let mut slot = lock(&self.slot);
        slot.current_key = None;
        slot.result = None;
        if let Some(task) = slot.in_flight.take() {
            task.abort();
        }
    }

    pub fn is_current(&self, key: &QuoteRequestKey) -> bool {
        lock(&self.slot).current_key.as_ref() == Some(key)
    }

    /// Deltas of the current request, if it resolved successfully.
    pub fn latest_result(&self) -> Option<Vec<I256>> {
        lock(&self.slot).result.clone()
    }
}

impl<S> Drop for QuoteManager<S> {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.slot).in_flight.take() {
            task.abort();
        }
    }
}
