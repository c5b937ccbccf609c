use std::time::Duration;

use crate::retry::RetryPolicy;

/// Pool size applied when `max_concurrent_transactions` is left at 0.
pub const DEFAULT_MAX_CONCURRENT_TRANSACTIONS: usize = 10;

/// Default wait for a pool permit. Deliberately short so that a saturated
/// pool surfaces an immediate "pool empty" error instead of a hang.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(1);

/// Driver configuration
///
/// Built in the same builder style as a SQL client's connection config.
///
/// # Examples
///
/// ```
/// use ledger_driver::DriverConfig;
///
/// let config = DriverConfig::new("vehicle-registration")
///     .max_concurrent_transactions(4);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Name of the ledger to open sessions against. Required, non-empty.
    pub ledger_name: String,

    /// Upper bound on concurrently checked-out sessions. `0` selects the
    /// driver default of [`DEFAULT_MAX_CONCURRENT_TRANSACTIONS`].
    pub max_concurrent_transactions: usize,

    /// How long `acquire` waits for a pool permit before failing.
    pub acquire_timeout: Duration,

    /// Retry policy applied by `execute` when the caller supplies none.
    pub retry_policy: RetryPolicy,
}

impl DriverConfig {
    pub fn new(ledger_name: impl Into<String>) -> Self {
        Self {
            ledger_name: ledger_name.into(),
            max_concurrent_transactions: 0,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Set the concurrent-transaction limit. `0` keeps the default.
    pub fn max_concurrent_transactions(mut self, max: usize) -> Self {
        self.max_concurrent_transactions = max;
        self
    }

    /// Set the pool permit acquisition timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the default retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Effective pool capacity after applying the `0 => default` rule.
    pub fn pool_capacity(&self) -> usize {
        if self.max_concurrent_transactions == 0 {
            DEFAULT_MAX_CONCURRENT_TRANSACTIONS
        } else {
            self.max_concurrent_transactions
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.ledger_name.is_empty() {
            return Err("ledger_name cannot be empty".to_string());
        }
        Ok(())
    }
}
