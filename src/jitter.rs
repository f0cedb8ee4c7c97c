//! Backoff with decorrelated jitter.
//!
//! A slightly modified version of the "Decorrelated Jitter" strategy from the
//! AWS architecture blog (<https://www.awsarchitectureblog.com/2015/03/backoff.html>):
//! the next interval is drawn uniformly from `0..=min(MAX_POLL_INTERVAL, previous * 3)`
//! and then raised to `min_wait`. Drawing inside the cap (rather than capping the
//! draw) keeps the waits random once enough time has passed instead of pinning
//! them to the maximum.

use rand::Rng;
use std::time::Duration;

/// Upper bound for a single backoff interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default lower bound for a single backoff interval.
pub const DEFAULT_MIN_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct Jitter {
    min_wait: Duration,
    previous_interval: Duration,
    time_passed: Duration,
}

impl Jitter {
    pub fn new(min_wait: Duration) -> Self {
        Self {
            min_wait,
            previous_interval: Duration::ZERO,
            time_passed: Duration::ZERO,
        }
    }

    /// Pick the next interval and record it, without sleeping.
    pub fn next_interval(&mut self) -> Duration {
        let ceiling = MAX_POLL_INTERVAL.min(self.previous_interval.saturating_mul(3));
        let ceiling_ms = ceiling.as_millis() as u64;
        let drawn = if ceiling_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=ceiling_ms)
        };
        let interval = Duration::from_millis(drawn).max(self.min_wait);

        self.time_passed += interval;
        self.previous_interval = interval;
        interval
    }

    /// Sleep for the next interval. Returns the total time spent backing off so far.
    pub async fn backoff(&mut self) -> Duration {
        let interval = self.next_interval();
        tokio::time::sleep(interval).await;
        self.time_passed
    }

    pub fn time_passed(&self) -> Duration {
        self.time_passed
    }

    pub fn min_wait(&self) -> Duration {
        self.min_wait
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_WAIT)
    }
}
