//! Queue configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use artgen_core::job::DEFAULT_MAX_ATTEMPTS;

/// Read `key` and parse it, falling back to `default` when the variable is
/// unset or unparseable. An unparseable value is logged.
pub fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Tuning for every queue a [`QueueManager`](crate::QueueManager) creates.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Jobs run in parallel per queue.
    pub concurrency: usize,
    /// Attempts for jobs added without an explicit limit.
    pub max_attempts: u32,
    /// Retry backoff base: the delay after the n-th failure is `base * 2^n`.
    pub retry_base: Duration,
    /// Upper bound on one retry delay.
    pub retry_max: Duration,
    /// How long `shutdown` waits for in-flight jobs.
    pub shutdown_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base: Duration::from_millis(1000),
            retry_max: Duration::from_millis(60_000),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl QueueConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `QUEUE_CONCURRENCY`           | `2`     |
    /// | `QUEUE_MAX_ATTEMPTS`          | `3`     |
    /// | `QUEUE_RETRY_BASE_MS`         | `1000`  |
    /// | `QUEUE_RETRY_MAX_MS`          | `60000` |
    /// | `QUEUE_SHUTDOWN_TIMEOUT_SECS` | `30`    |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_or("QUEUE_CONCURRENCY", defaults.concurrency).max(1),
            max_attempts: env_or("QUEUE_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            retry_base: Duration::from_millis(env_or("QUEUE_RETRY_BASE_MS", 1000u64)),
            retry_max: Duration::from_millis(env_or("QUEUE_RETRY_MAX_MS", 60_000u64)),
            shutdown_timeout: Duration::from_secs(env_or("QUEUE_SHUTDOWN_TIMEOUT_SECS", 30u64)),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base = base;
        self.retry_max = max;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
