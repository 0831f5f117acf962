//! Polling budget for long-running provider tasks.
//!
//! Every adapter declares a [`PollPolicy`]; the poll loop in the providers
//! crate sleeps between checks and gives up once either the attempt count
//! or the wall-clock budget is exhausted.

use std::time::Duration;

/// Default number of status checks before giving up.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;

/// Default delay between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default wall-clock budget for one generation.
pub const DEFAULT_MAX_POLL_ELAPSED: Duration = Duration::from_secs(300);

/// Tunable parameters for a provider's polling loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the second status check.
    pub initial_interval: Duration,
    /// Upper bound on the delay between checks.
    pub max_interval: Duration,
    /// Factor by which the delay grows after each pending check.
    /// `1.0` gives a fixed interval.
    pub multiplier: f64,
    /// Maximum number of status checks.
    pub max_attempts: u32,
    /// Maximum wall-clock time from the first check.
    pub max_elapsed: Duration,
}

impl PollPolicy {
    /// Check every `interval`, at most `max_attempts` times.
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            max_attempts,
            max_elapsed: interval.saturating_mul(max_attempts.max(1)),
        }
    }

    /// Start at `initial` and multiply by `multiplier` up to `max_interval`.
    pub fn exponential(
        initial: Duration,
        max_interval: Duration,
        multiplier: f64,
        max_attempts: u32,
        max_elapsed: Duration,
    ) -> Self {
        Self {
            initial_interval: initial,
            max_interval,
            multiplier,
            max_attempts,
            max_elapsed,
        }
    }

    /// Override the wall-clock budget.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Calculate the next delay from the current one, clamped to
    /// [`PollPolicy::max_interval`].
    pub fn next_interval(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier.max(1.0)) as u64;
        Duration::from_millis(next_ms).min(self.max_interval)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_POLL_ATTEMPTS)
            .with_max_elapsed(DEFAULT_MAX_POLL_ELAPSED)
    }
}
