//! Job queue status, retry backoff, and priority ordering rules.
//!
//! The queue crate owns the runtime; these are the pure decisions it makes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Attempts a job gets when the caller does not say otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Priority of jobs added without one.
pub const DEFAULT_PRIORITY: i32 = 0;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle of a queued job.
///
/// `Failed` is terminal (dead-letter): it is only left through an explicit
/// administrative retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Whether a job that has failed `attempts` times gets another run.
pub fn should_retry(attempts: u32, max_attempts: u32) -> bool {
    attempts < max_attempts
}

/// Backoff before the next run of a job that has failed `attempts` times:
/// `base * 2^attempts`, clamped to `max`.
pub fn retry_delay(base: Duration, max: Duration, attempts: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempts.min(31));
    base.saturating_mul(factor).min(max)
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Where a job of `priority` goes in a waiting list whose priorities are
/// `waiting` (front first).
///
/// Higher priority is dequeued first. A new job lands behind every job of
/// equal priority (FIFO). A retried job (`ahead_of_equal = true`) lands in
/// front of equal-priority jobs but still behind higher-priority ones.
pub fn insertion_index<I>(waiting: I, priority: i32, ahead_of_equal: bool) -> usize
where
    I: IntoIterator<Item = i32>,
{
    let mut index = 0;
    for existing in waiting {
        let goes_before = if ahead_of_equal {
            existing <= priority
        } else {
            existing < priority
        };
        if goes_before {
            return index;
        }
        index += 1;
    }
    index
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
