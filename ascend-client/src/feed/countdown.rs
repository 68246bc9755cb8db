use std::time::Duration;

use ascend_common::{models::WeightUpdate, price::remaining_time};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::info;

use crate::task::ScopedTask;

/// Time left until the auction starts, re-evaluated from the clock on every tick.
///
/// Publishes `None` once the last checkpoint has started, after which the countdown ends.
pub struct AuctionCountdown {
    task: ScopedTask,
    rx: watch::Receiver<Option<Duration>>,
}

impl AuctionCountdown {
    pub fn start(schedule: Vec<WeightUpdate>, tick: Duration) -> Self {
        Self::start_with_clock(schedule, tick, Utc::now)
    }

    fn start_with_clock<C>(schedule: Vec<WeightUpdate>, tick: Duration, clock: C) -> Self
    where
        C: Fn() -> DateTime<Utc> + Send + 'static,
    {
        let (tx, rx) = watch::channel(remaining_time(&schedule, clock()));
        let task = ScopedTask::spawn("auction-countdown", async move {
            let mut ticker = tokio::time::interval(tick);
            loop {
                ticker.tick().await;
                let remaining = remaining_time(&schedule, clock());
                tx.send_if_modified(|current| {
                    if *current == remaining {
                        return false;
                    }
                    *current = remaining;
                    true
                });
                if remaining.is_none() {
                    info!("Auction started");
                    break;
                }
            }
        });
        Self { task, rx }
    }

    pub fn remaining(&self) -> Option<Duration> {
        *self.rx.borrow()
    }

    pub fn receiver(&self) -> watch::Receiver<Option<Duration>> {
        self.rx.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn stop(self) {
        self.task.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use tokio::time::Instant;

    use super::*;

    fn schedule(start: DateTime<Utc>) -> Vec<WeightUpdate> {
        vec![WeightUpdate {
            start_timestamp: start,
            end_timestamp: start + chrono::Duration::hours(72),
            start_weights: vec![Decimal::new(99, 2), Decimal::new(1, 2)],
            end_weights: vec![Decimal::new(50, 2), Decimal::new(50, 2)],
        }]
    }

    /// Wall clock driven by the paused tokio clock.
    fn paused_clock(base: DateTime<Utc>) -> impl Fn() -> DateTime<Utc> + Send + 'static {
        let origin = Instant::now();
        move || {
            base + chrono::Duration::from_std(origin.elapsed()).unwrap_or_else(|_| chrono::Duration::zero())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_down_until_start() {
        let base = Utc
            .timestamp_opt(1_700_000_000, 0)
            .unwrap();
        let countdown = AuctionCountdown::start_with_clock(
            schedule(base + chrono::Duration::seconds(3)),
            Duration::from_secs(1),
            paused_clock(base),
        );
        assert_eq!(countdown.remaining(), Some(Duration::from_secs(3)));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(countdown.remaining(), Some(Duration::from_secs(2)));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(countdown.remaining(), None);
        assert!(!countdown.is_running());
    }

    #[tokio::test]
    async fn test_started_auction_has_no_countdown() {
        let countdown = AuctionCountdown::start(
            schedule(Utc::now() - chrono::Duration::hours(1)),
            Duration::from_secs(1),
        );

        assert_eq!(countdown.remaining(), None);
        countdown.stop().await;
    }
}
