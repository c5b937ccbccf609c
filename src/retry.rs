use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::core::DriverError;

/// Default retry budget applied when the caller does not supply a policy.
pub const DEFAULT_MAX_RETRIES: u32 = 4;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(10);
const DEFAULT_DELAY_CAP: Duration = Duration::from_secs(5);

/// Inputs available to a backoff strategy before each retry.
#[derive(Debug)]
pub struct RetryContext<'a> {
    /// Attempts performed so far (the failed attempt included).
    pub retries_attempted: u32,
    /// The error that failed the last attempt.
    pub last_error: &'a DriverError,
}

/// Pure delay function consulted between attempts.
pub trait BackoffStrategy: Send + Sync {
    fn delay(&self, ctx: &RetryContext<'_>) -> Duration;
}

/// Exponentially growing delay with full jitter.
///
/// The raw delay doubles per attempt from `base` up to `cap`; the slept
/// value is drawn uniformly from `[raw / 2, raw]` so that concurrent
/// retries spread out instead of stampeding.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    cap: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_DELAY_CAP)
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay(&self, ctx: &RetryContext<'_>) -> Duration {
        let exponent = ctx.retries_attempted.saturating_sub(1).min(16);
        let raw = self
            .base
            .saturating_mul(1u32 << exponent)
            .min(self.cap)
            .max(Duration::from_micros(1));
        let raw_micros = raw.as_micros() as u64;
        let jittered = rand::thread_rng().gen_range(raw_micros / 2..=raw_micros);
        Duration::from_micros(jittered)
    }
}

/// Fixed delay between attempts. Useful for tests and callers that manage
/// pacing elsewhere.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff(pub Duration);

impl BackoffStrategy for ConstantBackoff {
    fn delay(&self, _ctx: &RetryContext<'_>) -> Duration {
        self.0
    }
}

/// Retry budget and backoff curve for one `execute` call.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ledger_driver::retry::{ConstantBackoff, RetryPolicy};
///
/// let policy = RetryPolicy::new(2).with_backoff(ConstantBackoff(Duration::from_millis(50)));
/// assert_eq!(policy.max_retries(), 2);
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Arc<dyn BackoffStrategy>,
}

impl RetryPolicy {
    /// Policy with the given retry budget and the default jittered
    /// exponential backoff.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Arc::new(ExponentialBackoff::default()),
        }
    }

    /// Replace the backoff strategy.
    pub fn with_backoff(mut self, backoff: impl BackoffStrategy + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// A policy that never sleeps between retries.
    pub fn no_delay(max_retries: u32) -> Self {
        Self::new(max_retries).with_backoff(ConstantBackoff(Duration::ZERO))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub(crate) fn delay_for(&self, retries_attempted: u32, last_error: &DriverError) -> Duration {
        self.backoff.delay(&RetryContext {
            retries_attempted,
            last_error,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_error() -> DriverError {
        DriverError::OccConflict("conflict".into())
    }

    #[test]
    fn test_default_policy_budget() {
        assert_eq!(RetryPolicy::default().max_retries(), DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_exponential_backoff_grows_and_caps() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(80));
        let error = sample_error();

        for attempt in 1..=10u32 {
            let delay = backoff.delay(&RetryContext {
                retries_attempted: attempt,
                last_error: &error,
            });
            // Raw delay is 10ms * 2^(attempt-1), capped at 80ms; jitter
            // keeps the slept value in [raw/2, raw].
            let raw = Duration::from_millis(10)
                .saturating_mul(1 << (attempt - 1).min(16))
                .min(Duration::from_millis(80));
            assert!(delay <= raw, "attempt {attempt}: {delay:?} > {raw:?}");
            assert!(delay >= raw / 2, "attempt {attempt}: {delay:?} < {:?}", raw / 2);
        }
    }

    #[test]
    fn test_constant_backoff_is_constant() {
        let backoff = ConstantBackoff(Duration::from_millis(7));
        let error = sample_error();
        for attempt in [1, 3, 9] {
            assert_eq!(
                backoff.delay(&RetryContext {
                    retries_attempted: attempt,
                    last_error: &error,
                }),
                Duration::from_millis(7)
            );
        }
    }

    #[test]
    fn test_no_delay_policy() {
        let policy = RetryPolicy::no_delay(3);
        assert_eq!(policy.delay_for(1, &sample_error()), Duration::ZERO);
    }
}
