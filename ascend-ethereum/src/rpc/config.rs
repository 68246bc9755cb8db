use std::time::Duration;

/// Backoff for reads that hit an overloaded node. The delay starts at `initial_backoff_ms` and
/// doubles up to `max_backoff_ms`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RPCRetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RPCRetryConfig {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self { max_retries, initial_backoff_ms, max_backoff_ms }
    }

    /// Upper bound of the total time spent backing off when every attempt is retried, assuming
    /// the delay doubles after each attempt.
    pub fn max_elapsed(&self) -> Duration {
        let mut delay = self.initial_backoff_ms;
        let mut total = 0u64;
        for _ in 0..self.max_retries {
            total = total.saturating_add(delay.min(self.max_backoff_ms));
            delay = delay.saturating_mul(2);
        }
        Duration::from_millis(total)
    }
}

impl Default for RPCRetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, initial_backoff_ms: 100, max_backoff_ms: 5000 }
    }
}
