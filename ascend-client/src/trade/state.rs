//! The trade view as a single record transformed by named transitions.
//!
//! Every transition is synchronous. Network side effects (quoting, swapping) live in
//! [`super::TradeController`], which dispatches transitions as their results come in.
use ascend_common::{
    models::{token::parse_amount, Amount, TokenRef, TransactionSettings},
    price::min_amount_out,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradeSetupError {
    #[error("Sell and buy token must differ, both have token index {0}")]
    IdenticalTokens(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SellSide {
    pub token: TokenRef,
    /// Raw user input, empty when nothing was entered.
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapPairState {
    pub sell: SellSide,
    pub buy: TokenRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuoteState {
    /// Simulated amount of the buy token received for the current sell amount.
    pub estimate: Option<Amount>,
    /// `estimate` reduced by the slippage tolerance. Only ever set together with `estimate`.
    pub estimate_with_slippage: Option<Amount>,
    pub loading: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwapExecutionState {
    pub is_loading: bool,
    pub error: Option<String>,
}

impl SwapExecutionState {
    pub fn loading() -> Self {
        Self { is_loading: true, error: None }
    }

    pub fn idle() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { is_loading: false, error: Some(error.into()) }
    }
}

/// Lifecycle of an allowance transaction. Tracked independently of the swap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApprovalState {
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeAction {
    SetSellAmount(String),
    SetSwapQuote(Option<Amount>),
    SetSwapQuoteLoading(bool),
    /// Ignored while a swap is in flight.
    TogglePair,
    SetTransactionSettings(TransactionSettings),
    ResetQuoteState,
    UpdateSwapState(SwapExecutionState),
    UpdateApprovalState(ApprovalState),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeState {
    pub pair: SwapPairState,
    pub quote: QuoteState,
    pub settings: TransactionSettings,
    pub swap: SwapExecutionState,
    pub approval: ApprovalState,
}

impl TradeState {
    pub fn new(
        sell: TokenRef,
        buy: TokenRef,
        settings: TransactionSettings,
    ) -> Result<Self, TradeSetupError> {
        if sell.token_index == buy.token_index {
            return Err(TradeSetupError::IdenticalTokens(sell.token_index));
        }
        Ok(Self {
            pair: SwapPairState { sell: SellSide { token: sell, amount: String::new() }, buy },
            quote: QuoteState::default(),
            settings,
            swap: SwapExecutionState::default(),
            approval: ApprovalState::default(),
        })
    }

    pub fn apply(&mut self, action: TradeAction) {
        match action {
            TradeAction::SetSellAmount(amount) => {
                self.pair.sell.amount = amount;
            }
            TradeAction::SetSwapQuote(estimate) => {
                self.quote.estimate = estimate;
                self.recompute_slippage();
            }
            TradeAction::SetSwapQuoteLoading(loading) => {
                self.quote.loading = loading;
            }
            TradeAction::TogglePair => {
                if self.swap.is_loading {
                    debug!("Ignoring pair toggle while a swap is in flight");
                    return;
                }
                let SwapPairState { sell, buy } = &mut self.pair;
                std::mem::swap(&mut sell.token, buy);
                sell.amount.clear();
                self.quote = QuoteState::default();
                self.approval = ApprovalState::default();
            }
            TradeAction::SetTransactionSettings(settings) => {
                self.settings = settings;
                self.recompute_slippage();
            }
            TradeAction::ResetQuoteState => {
                self.pair.sell.amount.clear();
                self.quote = QuoteState::default();
            }
            TradeAction::UpdateSwapState(swap) => {
                self.swap = swap;
            }
            TradeAction::UpdateApprovalState(approval) => {
                self.approval = approval;
            }
        }
    }

    pub fn reduce(mut self, action: TradeAction) -> Self {
        self.apply(action);
        self
    }

    fn recompute_slippage(&mut self) {
        self.quote.estimate_with_slippage = self
            .quote
            .estimate
            .map(|estimate| min_amount_out(estimate, self.settings.slippage_tolerance_bps));
    }

    /// Parsed sell amount. Input that is not a non-negative decimal counts as zero.
    pub fn sell_amount(&self) -> Amount {
        parse_amount(&self.pair.sell.amount).unwrap_or(Decimal::ZERO)
    }

    pub fn sell_token(&self) -> &TokenRef {
        &self.pair.sell.token
    }

    pub fn buy_token(&self) -> &TokenRef {
        &self.pair.buy
    }

    pub fn can_swap(&self) -> bool {
        !self.sell_amount().is_zero() &&
            self.quote.estimate.is_some() &&
            !self.quote.loading &&
            !self.swap.is_loading
    }

    /// Buy tokens received per sell token at the current quote.
    pub fn effective_price(&self) -> Option<Decimal> {
        let estimate = self.quote.estimate?;
        estimate.checked_div(self.sell_amount())
    }
}
