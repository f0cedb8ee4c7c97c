//! Retry helpers for cloud SDK calls.
//!
//! [`throttled_call`] is the helper most callers want: it only retries calls that
//! failed because the service throttled them (or because a waiter or read timed
//! out). [`keep_trying`] retries on any error, so an unrecoverable failure costs
//! the full `max_time` before it is reported.
//!
//! ```rust,no_run
//! use amplify_aws_utils::retry::throttled_call;
//! # async fn describe() -> amplify_aws_utils::Result<u32> { Ok(1) }
//! # async fn run() -> amplify_aws_utils::Result<()> {
//! let count = throttled_call(|| describe()).await?;
//! # Ok(())
//! # }
//! ```

use crate::jitter::{Jitter, DEFAULT_MIN_WAIT};
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Default time budget for a throttled call.
pub const DEFAULT_MAX_TIME: Duration = Duration::from_secs(5 * 60);

/// Configuration for retry logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Stop retrying once this much time has been spent backing off.
    pub max_time: Duration,
    /// Lower bound of each backoff interval.
    pub min_wait: Duration,
}

impl RetryConfig {
    pub fn new(max_time: Duration, min_wait: Duration) -> Self {
        Self { max_time, min_wait }
    }

    /// Defaults, overridable via env:
    /// - `AWS_UTILS_RETRY_MAX_SECS` (default 300)
    /// - `AWS_UTILS_RETRY_MIN_WAIT_MS` (default 3000)
    pub fn from_env() -> Self {
        let max_time = std::env::var("AWS_UTILS_RETRY_MAX_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_MAX_TIME);
        let min_wait = std::env::var("AWS_UTILS_RETRY_MIN_WAIT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MIN_WAIT);
        Self { max_time, min_wait }
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn with_min_wait(mut self, min_wait: Duration) -> Self {
        self.min_wait = min_wait;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_time: DEFAULT_MAX_TIME,
            min_wait: DEFAULT_MIN_WAIT,
        }
    }
}

/// Decides which failures deserve another attempt.
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, error: &Error) -> bool;

    /// Short label used in log lines.
    fn name(&self) -> &'static str;
}

/// Retries throttled service calls, waiter failures and read timeouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrottlePolicy;

impl RetryPolicy for ThrottlePolicy {
    fn should_retry(&self, error: &Error) -> bool {
        error.is_throttling() || error.is_transient()
    }

    fn name(&self) -> &'static str {
        "throttled_call"
    }
}

/// Retries every failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyError;

impl RetryPolicy for AnyError {
    fn should_retry(&self, _error: &Error) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "keep_trying"
    }
}

/// Run `op` until it succeeds, `policy` rejects its error, or more than
/// `config.max_time` has been spent backing off. The last error is returned.
pub async fn retry_with<T, F, Fut, P>(policy: &P, config: &RetryConfig, mut op: F) -> Result<T>
where
    P: RetryPolicy + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut jitter = Jitter::new(config.min_wait);
    let mut time_passed = Duration::ZERO;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::debug!(
                    policy = policy.name(),
                    attempt,
                    time_passed_ms = time_passed.as_millis() as u64,
                    error = %err,
                    "Call failed"
                );
                if !policy.should_retry(&err) || time_passed > config.max_time {
                    return Err(err);
                }
                time_passed = jitter.backoff().await;
            }
        }
    }
}

/// Retry `op` while the service throttles it, for up to five minutes.
pub async fn throttled_call<T, F, Fut>(op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with(&ThrottlePolicy, &RetryConfig::default(), op).await
}

/// [`throttled_call`] with a caller-provided time budget.
pub async fn throttled_call_with<T, F, Fut>(config: &RetryConfig, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with(&ThrottlePolicy, config, op).await
}

/// Retry `op` on any error until more than `max_time` has been spent backing off.
pub async fn keep_trying<T, F, Fut>(max_time: Duration, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let config = RetryConfig::default().with_max_time(max_time);
    retry_with(&AnyError, &config, op).await
}
