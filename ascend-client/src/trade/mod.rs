//! Trade controller: owns the [`TradeState`], runs the network side effects of user intents and
//! folds their results back into the state through [`TradeAction`]s.
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use ascend_common::{
    errors::{ChainError, ConversionError},
    models::{
        Amount, PoolSnapshot, QuoteRequestKey, SwapKind, SwapReceipt, SwapRequest, TokenRef,
        TransactionSettings,
    },
    traits::{SwapExecutor, SwapSimulator, TokenApprover},
};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::{
    config::TradeConfig,
    quote::{QuoteManager, QuoteOutcome},
    trade::state::{
        ApprovalState, SwapExecutionState, TradeAction, TradeSetupError, TradeState,
    },
    wallet::WalletHandle,
};

pub mod state;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradeError {
    #[error("Enter an amount to swap")]
    MissingAmount,
    #[error("A swap is already in progress")]
    SwapInProgress,
    #[error("No wallet connected")]
    WalletNotConnected,
    #[error("No quote available for the current amount")]
    QuoteUnavailable,
    #[error("Invalid transaction settings: {0}")]
    InvalidSettings(String),
    #[error("Swap failed: {0}")]
    SwapExecutionFailed(String),
    #[error("Approval failed: {0}")]
    ApprovalFailed(String),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TradeNotification {
    SwapConfirmed { hash: B256, sold: Amount, bought: Amount },
    ApprovalConfirmed { hash: B256 },
}

const NOTIFICATION_CAPACITY: usize = 16;

pub struct TradeController<S, E> {
    state: Arc<watch::Sender<TradeState>>,
    quotes: QuoteManager<S>,
    executor: Arc<E>,
    wallet: WalletHandle,
    notifications: broadcast::Sender<TradeNotification>,
}

impl<S, E> TradeController<S, E>
where
    S: SwapSimulator + 'static,
    E: SwapExecutor + TokenApprover + 'static,
{
    pub fn new(
        sell: TokenRef,
        buy: TokenRef,
        simulator: Arc<S>,
        executor: Arc<E>,
        wallet: WalletHandle,
        config: TradeConfig,
    ) -> Result<Self, TradeSetupError> {
        let state = TradeState::new(sell, buy, config.default_settings)?;
        let (state_tx, _) = watch::channel(state);
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Ok(Self {
            state: Arc::new(state_tx),
            quotes: QuoteManager::new(simulator, wallet.clone(), config.quote_timeout),
            executor,
            wallet,
            notifications,
        })
    }

    pub fn state(&self) -> TradeState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TradeState> {
        self.state.subscribe()
    }

    pub fn notifications(&self) -> broadcast::Receiver<TradeNotification> {
        self.notifications.subscribe()
    }

    fn dispatch(&self, action: TradeAction) {
        self.state
            .send_modify(|state| state.apply(action));
    }

    /// Stores the new input and refreshes the quote for it. Zero, empty and unparsable input
    /// clears the quote without a simulation.
    pub fn set_sell_amount(&self, amount: impl Into<String>) -> Result<(), TradeError> {
        self.dispatch(TradeAction::SetSellAmount(amount.into()));
        self.update_quote()
    }

    fn update_quote(&self) -> Result<(), TradeError> {
        let (amount, sell, buy) = {
            let state = self.state.borrow();
            (state.sell_amount(), state.sell_token().clone(), state.buy_token().clone())
        };
        let raw = sell.to_raw(amount)?;
        if raw.is_zero() {
            self.clear_quote();
            return Ok(());
        }

        let key = QuoteRequestKey::new(raw, sell, buy.clone());
        let starting = self.state.clone();
        let state = self.state.clone();
        // Loading flips under the manager lock, so an older request can no longer complete
        // in between and leave the new one looking settled.
        self.quotes.request_quote_with(
            key,
            move || {
                starting.send_modify(|state| {
                    state.apply(TradeAction::SetSwapQuote(None));
                    state.apply(TradeAction::SetSwapQuoteLoading(true));
                });
            },
            move |outcome| {
                let estimate = match outcome {
                    QuoteOutcome::Resolved(deltas) => received_amount(&deltas, &buy),
                    QuoteOutcome::Failed(_) => None,
                };
                state.send_modify(|state| {
                    state.apply(TradeAction::SetSwapQuote(estimate));
                    state.apply(TradeAction::SetSwapQuoteLoading(false));
                });
            },
        );
        Ok(())
    }

    fn clear_quote(&self) {
        self.quotes.invalidate();
        self.state.send_modify(|state| {
            state.apply(TradeAction::SetSwapQuote(None));
            state.apply(TradeAction::SetSwapQuoteLoading(false));
        });
    }

    /// Swaps the sell and buy side. Rejected while a swap is in flight.
    pub fn toggle_pair(&self) -> Result<(), TradeError> {
        if self.state.borrow().swap.is_loading {
            return Err(TradeError::SwapInProgress);
        }
        self.quotes.invalidate();
        self.dispatch(TradeAction::TogglePair);
        Ok(())
    }

    /// Applies new settings. The slippage adjusted estimate is recomputed from the current
    /// estimate, no new quote is requested.
    pub fn set_transaction_settings(&self, settings: TransactionSettings) -> Result<(), TradeError> {
        settings
            .validate()
            .map_err(TradeError::InvalidSettings)?;
        self.dispatch(TradeAction::SetTransactionSettings(settings));
        Ok(())
    }

    /// Fills in the connected account's whole balance of the sell token.
    pub fn set_max_amount(&self, snapshot: &PoolSnapshot) -> Result<Amount, TradeError> {
        if !self.wallet.is_connected() {
            return Err(TradeError::WalletNotConnected);
        }
        let balance = {
            let state = self.state.borrow();
            snapshot
                .account_balance(state.sell_token())
                .unwrap_or_default()
        };
        self.set_sell_amount(balance.normalize().to_string())?;
        Ok(balance)
    }

    /// Executes the swap at the current quote and waits for its confirmation.
    ///
    /// On success the amount and the quote are cleared and a [`TradeNotification::SwapConfirmed`]
    /// is broadcast. On failure the amount and quote are kept so the swap can be retried.
    pub async fn swap(&self) -> Result<SwapReceipt, TradeError> {
        let snapshot = self.state();
        if snapshot.swap.is_loading {
            return Err(TradeError::SwapInProgress);
        }
        let amount = snapshot.sell_amount();
        if amount.is_zero() {
            return Err(TradeError::MissingAmount);
        }
        let account = self
            .wallet
            .account()
            .ok_or(TradeError::WalletNotConnected)?;
        let (Some(estimate), Some(min_out), false) = (
            snapshot.quote.estimate,
            snapshot.quote.estimate_with_slippage,
            snapshot.quote.loading,
        ) else {
            return Err(TradeError::QuoteUnavailable);
        };

        let sell = snapshot.sell_token();
        let buy = snapshot.buy_token();
        let request = SwapRequest {
            kind: SwapKind::GivenIn,
            asset_in: sell.address,
            asset_out: buy.address,
            amount: sell.to_raw(amount)?,
            sender: account,
            recipient: account,
            limit: buy.to_raw(min_out)?,
            deadline: snapshot.settings.deadline(Utc::now()),
        };

        let claimed = self.state.send_if_modified(|state| {
            if state.swap.is_loading {
                return false;
            }
            state.apply(TradeAction::UpdateSwapState(SwapExecutionState::loading()));
            true
        });
        if !claimed {
            return Err(TradeError::SwapInProgress);
        }

        match self.execute(request).await {
            Ok(receipt) => {
                info!(
                    hash = %receipt.transaction_hash,
                    block = ?receipt.block_number,
                    sold = %amount,
                    "Swap confirmed"
                );
                self.quotes.invalidate();
                self.state.send_modify(|state| {
                    state.apply(TradeAction::UpdateSwapState(SwapExecutionState::idle()));
                    state.apply(TradeAction::ResetQuoteState);
                });
                let _ = self
                    .notifications
                    .send(TradeNotification::SwapConfirmed {
                        hash: receipt.transaction_hash,
                        sold: amount,
                        bought: estimate,
                    });
                Ok(receipt)
            }
            Err(e) => {
                error!(error = %e, sold = %amount, "Swap failed");
                let message = e.to_string();
                self.dispatch(TradeAction::UpdateSwapState(SwapExecutionState::failed(
                    message.clone(),
                )));
                Err(TradeError::SwapExecutionFailed(message))
            }
        }
    }

    async fn execute(&self, request: SwapRequest) -> Result<SwapReceipt, ChainError> {
        let hash = self.executor.swap(request).await?;
        debug!(%hash, "Waiting for swap confirmation");
        let receipt = self.executor.wait(hash).await?;
        if !receipt.success {
            return Err(ChainError::Reverted(format!("transaction {hash} reverted")));
        }
        Ok(receipt)
    }

    /// Whether the vault's allowance over the sell token is below the entered amount.
    pub async fn needs_approval(&self) -> Result<bool, TradeError> {
        let (owner, token, raw) = self.approval_target()?;
        let allowance = self
            .executor
            .allowance(token.address, owner)
            .await
            .map_err(|e| TradeError::ApprovalFailed(e.to_string()))?;
        Ok(allowance < raw)
    }

    /// Approves the vault for exactly the entered sell amount and waits for confirmation.
    pub async fn approve(&self) -> Result<B256, TradeError> {
        let (owner, token, raw) = self.approval_target()?;
        self.dispatch(TradeAction::UpdateApprovalState(ApprovalState {
            is_loading: true,
            error: None,
        }));

        let result = async {
            let hash = self
                .executor
                .approve(token.address, owner, raw)
                .await?;
            let receipt = self.executor.wait(hash).await?;
            if !receipt.success {
                return Err(ChainError::Reverted(format!("approval {hash} reverted")));
            }
            Ok(hash)
        }
        .await;

        match result {
            Ok(hash) => {
                info!(%hash, token = %token, "Approval confirmed");
                self.dispatch(TradeAction::UpdateApprovalState(ApprovalState::default()));
                let _ = self
                    .notifications
                    .send(TradeNotification::ApprovalConfirmed { hash });
                Ok(hash)
            }
            Err(e) => {
                warn!(error = %e, token = %token, "Approval failed");
                let message = e.to_string();
                self.dispatch(TradeAction::UpdateApprovalState(ApprovalState {
                    is_loading: false,
                    error: Some(message.clone()),
                }));
                Err(TradeError::ApprovalFailed(message))
            }
        }
    }

    fn approval_target(&self) -> Result<(Address, TokenRef, U256), TradeError> {
        let owner = self
            .wallet
            .account()
            .ok_or(TradeError::WalletNotConnected)?;
        let state = self.state.borrow();
        let amount = state.sell_amount();
        if amount.is_zero() {
            return Err(TradeError::MissingAmount);
        }
        let token = state.sell_token().clone();
        let raw = token.to_raw(amount)?;
        Ok((owner, token, raw))
    }
}

/// Amount of `buy` leaving the pool according to the simulated deltas.
fn received_amount(deltas: &[alloy_primitives::I256], buy: &TokenRef) -> Option<Amount> {
    let delta = deltas.get(buy.token_index)?;
    match buy.from_raw(delta.unsigned_abs()) {
        Ok(amount) => Some(amount),
        Err(e) => {
            warn!(error = %e, token = %buy, "Could not convert quoted amount");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        str::FromStr,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use alloy_primitives::I256;
    use ascend_common::{
        models::{PoolSnapshot, SnapshotSource},
        traits::MockSwapSimulator,
    };
    use async_trait::async_trait;
    use mockall::mock;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    use super::*;
    use crate::{quote::tests::GatedSimulator, trade::state::QuoteState, wallet::WalletConnection};

    mock! {
        Executor {}

        #[async_trait]
        impl SwapExecutor for Executor {
            async fn swap(&self, request: SwapRequest) -> Result<B256, ChainError>;
            async fn wait(&self, transaction: B256) -> Result<SwapReceipt, ChainError>;
        }

        #[async_trait]
        impl TokenApprover for Executor {
            async fn allowance(&self, token: Address, owner: Address) -> Result<U256, ChainError>;
            async fn approve(
                &self,
                token: Address,
                owner: Address,
                amount: U256,
            ) -> Result<B256, ChainError>;
        }
    }

    const ACCOUNT: Address = Address::repeat_byte(0xaa);
    const TX: B256 = B256::repeat_byte(0x99);

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn usdc() -> TokenRef {
        TokenRef::new("USD Coin", "USDC", Address::repeat_byte(0x01), 6, 0)
    }

    fn asc() -> TokenRef {
        TokenRef::new("Ascend", "ASC", Address::repeat_byte(0x02), 18, 1)
    }

    /// Quotes 50 ASC per USDC sold.
    fn simulator(expected_calls: usize) -> MockSwapSimulator {
        let mut simulator = MockSwapSimulator::new();
        simulator
            .expect_simulate_swap()
            .times(expected_calls)
            .returning(|amount, _, _, _| {
                let sold = I256::from_raw(amount);
                let bought = I256::from_raw(amount * U256::from(50_000_000_000_000u64));
                Ok(vec![sold, -bought])
            });
        simulator
    }

    fn confirmed(hash: B256) -> SwapReceipt {
        SwapReceipt { transaction_hash: hash, block_number: Some(1), success: true }
    }

    fn controller<S: SwapSimulator + 'static>(
        simulator: S,
        executor: MockExecutor,
        connection: &WalletConnection,
    ) -> TradeController<S, MockExecutor> {
        TradeController::new(
            usdc(),
            asc(),
            Arc::new(simulator),
            Arc::new(executor),
            connection.handle(),
            TradeConfig::default(),
        )
        .unwrap()
    }

    async fn wait_for_quote<S: SwapSimulator + 'static>(
        controller: &TradeController<S, MockExecutor>,
    ) -> TradeState {
        let mut rx = controller.subscribe();
        let state = tokio::time::timeout(
            Duration::from_secs(1),
            rx.wait_for(|state| !state.quote.loading),
        )
        .await
        .expect("quote did not resolve")
        .expect("state channel closed")
        .clone();
        state
    }

    #[tokio::test]
    async fn test_zero_amount_never_quotes() {
        let connection = WalletConnection::connected(ACCOUNT);
        let controller = controller(simulator(0), MockExecutor::new(), &connection);

        for input in ["0", "", "0.0000000", "abc"] {
            controller.set_sell_amount(input).unwrap();

            let state = controller.state();
            assert_eq!(state.quote, QuoteState::default());
        }
    }

    #[tokio::test]
    async fn test_quote_takes_abs_of_buy_delta() {
        let connection = WalletConnection::connected(ACCOUNT);
        let controller = controller(simulator(1), MockExecutor::new(), &connection);

        controller.set_sell_amount("2").unwrap();
        assert!(controller.state().quote.loading);
        let state = wait_for_quote(&controller).await;

        assert_eq!(state.quote.estimate, Some(dec("100")));
        assert_eq!(state.quote.estimate_with_slippage, Some(dec("99.5")));
        assert_eq!(state.effective_price(), Some(dec("50")));
    }

    #[tokio::test]
    async fn test_unchanged_amount_is_not_requoted() {
        let connection = WalletConnection::connected(ACCOUNT);
        let controller = controller(simulator(1), MockExecutor::new(), &connection);

        controller.set_sell_amount("2").unwrap();
        wait_for_quote(&controller).await;
        controller.set_sell_amount("2.0").unwrap();

        assert!(!controller.state().quote.loading);
    }

    #[tokio::test]
    async fn test_same_amount_is_quoted_again_after_failure() {
        let connection = WalletConnection::connected(ACCOUNT);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut simulator = MockSwapSimulator::new();
        simulator
            .expect_simulate_swap()
            .times(2)
            .returning(move |amount, _, _, _| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(ChainError::Request("header not found".to_string()));
                }
                let bought = I256::from_raw(amount * U256::from(50_000_000_000_000u64));
                Ok(vec![I256::from_raw(amount), -bought])
            });
        let controller = controller(simulator, MockExecutor::new(), &connection);

        controller.set_sell_amount("2").unwrap();
        let failed = wait_for_quote(&controller).await;
        controller.set_sell_amount("2").unwrap();
        assert!(controller.state().quote.loading);
        let retried = wait_for_quote(&controller).await;

        assert_eq!(failed.quote.estimate, None);
        assert_eq!(retried.quote.estimate, Some(dec("100")));
    }

    #[tokio::test]
    async fn test_superseded_quote_never_settles_newer_request() {
        let connection = WalletConnection::connected(ACCOUNT);
        let simulator = GatedSimulator::default();
        let gate_2 = simulator.gate(2_000_000);
        let gate_3 = simulator.gate(3_000_000);
        let controller = controller(simulator, MockExecutor::new(), &connection);

        controller.set_sell_amount("2").unwrap();
        controller.set_sell_amount("3").unwrap();
        // the first task is aborted, so its gate may already be gone
        let _ = gate_2.send(vec![
            I256::from_raw(U256::from(2_000_000u64)),
            -I256::from_raw(U256::from(100_000_000_000_000_000_000u128)),
        ]);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let pending = controller.state();
        assert!(pending.quote.loading);
        assert_eq!(pending.quote.estimate, None);

        gate_3
            .send(vec![
                I256::from_raw(U256::from(3_000_000u64)),
                -I256::from_raw(U256::from(150_000_000_000_000_000_000u128)),
            ])
            .unwrap();
        let state = wait_for_quote(&controller).await;

        assert_eq!(state.pair.sell.amount, "3");
        assert_eq!(state.quote.estimate, Some(dec("150")));
    }

    #[tokio::test]
    async fn test_toggle_drops_in_flight_quote() {
        let connection = WalletConnection::connected(ACCOUNT);
        let simulator = GatedSimulator::default();
        let gate = simulator.gate(2_000_000);
        let controller = controller(simulator, MockExecutor::new(), &connection);

        controller.set_sell_amount("2").unwrap();
        assert!(controller.state().quote.loading);
        controller.toggle_pair().unwrap();
        let _ = gate.send(vec![
            I256::from_raw(U256::from(2_000_000u64)),
            -I256::from_raw(U256::from(100_000_000_000_000_000_000u128)),
        ]);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = controller.state();
        assert_eq!(state.pair.sell.token, asc());
        assert_eq!(state.pair.sell.amount, "");
        assert_eq!(state.quote, QuoteState::default());
    }

    #[tokio::test]
    async fn test_settings_change_recomputes_without_refetch() {
        let connection = WalletConnection::connected(ACCOUNT);
        let controller = controller(simulator(1), MockExecutor::new(), &connection);
        controller.set_sell_amount("2").unwrap();
        wait_for_quote(&controller).await;

        controller
            .set_transaction_settings(TransactionSettings::new(200, 20))
            .unwrap();

        let state = controller.state();
        assert_eq!(state.quote.estimate, Some(dec("100")));
        assert_eq!(state.quote.estimate_with_slippage, Some(dec("98")));
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let connection = WalletConnection::connected(ACCOUNT);
        let controller = controller(simulator(0), MockExecutor::new(), &connection);

        let result = controller.set_transaction_settings(TransactionSettings::new(10_001, 20));

        assert!(matches!(result, Err(TradeError::InvalidSettings(_))));
        assert_eq!(controller.state().settings, TransactionSettings::default());
    }

    #[tokio::test]
    async fn test_toggle_resets_quote() {
        let connection = WalletConnection::connected(ACCOUNT);
        let controller = controller(simulator(1), MockExecutor::new(), &connection);
        controller.set_sell_amount("2").unwrap();
        wait_for_quote(&controller).await;

        controller.toggle_pair().unwrap();

        let state = controller.state();
        assert_eq!(state.pair.sell.token, asc());
        assert_eq!(state.pair.sell.amount, "");
        assert_eq!(state.quote, QuoteState::default());
    }

    #[tokio::test]
    async fn test_swap_preconditions() {
        let connection = WalletConnection::new();
        let mut simulator = MockSwapSimulator::new();
        simulator
            .expect_simulate_swap()
            .times(0..=1)
            .returning(|_, _, _, _| Err(ChainError::Request("not scheduled".to_string())));
        let controller = controller(simulator, MockExecutor::new(), &connection);

        assert_eq!(controller.swap().await, Err(TradeError::MissingAmount));

        controller.set_sell_amount("2").unwrap();
        assert_eq!(controller.swap().await, Err(TradeError::WalletNotConnected));

        connection.connect(ACCOUNT);
        assert_eq!(controller.swap().await, Err(TradeError::QuoteUnavailable));
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_swap_keeps_amount_and_retry_clears_it() {
        let connection = WalletConnection::connected(ACCOUNT);
        let mut executor = MockExecutor::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        executor
            .expect_swap()
            .withf(|request| {
                request.amount == U256::from(2_000_000u64) &&
                    request.limit == U256::from(99_500_000_000_000_000_000u128) &&
                    request.sender == ACCOUNT
            })
            .times(2)
            .returning(move |_| {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ChainError::Request("nonce too low".to_string()))
                } else {
                    Ok(TX)
                }
            });
        executor
            .expect_wait()
            .times(1)
            .returning(|hash| Ok(confirmed(hash)));
        let controller = controller(simulator(1), executor, &connection);
        let mut notifications = controller.notifications();
        controller.set_sell_amount("2").unwrap();
        wait_for_quote(&controller).await;

        let failed = controller.swap().await;

        let state = controller.state();
        assert!(matches!(failed, Err(TradeError::SwapExecutionFailed(_))));
        assert_eq!(state.pair.sell.amount, "2");
        assert_eq!(state.swap.error, Some("Request failed: nonce too low".to_string()));
        assert!(!state.swap.is_loading);
        assert_eq!(state.quote.estimate, Some(dec("100")));

        let receipt = controller.swap().await.unwrap();

        let state = controller.state();
        assert_eq!(receipt, confirmed(TX));
        assert_eq!(state.pair.sell.amount, "");
        assert_eq!(state.swap, SwapExecutionState::idle());
        assert_eq!(state.quote, QuoteState::default());
        assert_eq!(
            notifications.try_recv().unwrap(),
            TradeNotification::SwapConfirmed { hash: TX, sold: dec("2"), bought: dec("100") }
        );
    }

    #[tokio::test]
    async fn test_reverted_swap_is_a_failure() {
        let connection = WalletConnection::connected(ACCOUNT);
        let mut executor = MockExecutor::new();
        executor
            .expect_swap()
            .returning(|_| Ok(TX));
        executor
            .expect_wait()
            .returning(|hash| {
                Ok(SwapReceipt { transaction_hash: hash, block_number: Some(3), success: false })
            });
        let controller = controller(simulator(1), executor, &connection);
        controller.set_sell_amount("2").unwrap();
        wait_for_quote(&controller).await;

        let result = controller.swap().await;

        assert!(
            matches!(result, Err(TradeError::SwapExecutionFailed(msg)) if msg.contains("reverted"))
        );
        assert_eq!(controller.state().pair.sell.amount, "2");
    }

    #[tokio::test]
    async fn test_set_max_amount_uses_account_balance() {
        let connection = WalletConnection::connected(ACCOUNT);
        let controller = controller(simulator(1), MockExecutor::new(), &connection);
        let snapshot = PoolSnapshot {
            vault_address: None,
            is_paused: false,
            swap_fee: Decimal::ZERO,
            weights: Default::default(),
            balances: Default::default(),
            account_balances: [(usdc().address, dec("12.5"))].into_iter().collect(),
            source: SnapshotSource::Live,
            fetched_at: Utc::now(),
        };

        let amount = controller.set_max_amount(&snapshot).unwrap();

        assert_eq!(amount, dec("12.5"));
        assert_eq!(controller.state().pair.sell.amount, "12.5");
        wait_for_quote(&controller).await;
    }

    #[tokio::test]
    async fn test_approval_flow() {
        let connection = WalletConnection::connected(ACCOUNT);
        let mut executor = MockExecutor::new();
        executor
            .expect_allowance()
            .withf(|token, owner| *token == usdc().address && *owner == ACCOUNT)
            .returning(|_, _| Ok(U256::from(1_000_000u64)));
        executor
            .expect_approve()
            .withf(|_, _, amount| *amount == U256::from(2_000_000u64))
            .times(1)
            .returning(|_, _, _| Ok(TX));
        executor
            .expect_wait()
            .returning(|hash| Ok(confirmed(hash)));
        let controller = controller(simulator(1), executor, &connection);
        controller.set_sell_amount("2").unwrap();
        wait_for_quote(&controller).await;

        assert!(controller.needs_approval().await.unwrap());
        assert_eq!(controller.approve().await, Ok(TX));
        assert_eq!(controller.state().approval, ApprovalState::default());
    }
}
