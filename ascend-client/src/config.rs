use std::time::Duration;

use ascend_common::models::TransactionSettings;

/// Timing of the background tasks that keep the trade view fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    /// Interval between two pool state polls. The first poll runs immediately on activation.
    pub poll_interval: Duration,
    /// Interval at which the auction countdown is re-evaluated.
    pub countdown_tick: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(20), countdown_tick: Duration::from_secs(1) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TradeConfig {
    pub default_settings: TransactionSettings,
    /// Give up on a quote simulation after this long. `None` waits until the simulation resolves
    /// or a newer request supersedes it.
    pub quote_timeout: Option<Duration>,
}

impl TradeConfig {
    pub fn with_quote_timeout(mut self, timeout: Duration) -> Self {
        self.quote_timeout = Some(timeout);
        self
    }
}
