//! Drives a submitted task to a terminal state.
//!
//! Sleeps between checks with `tokio::time::sleep`, so a waiting task never
//! occupies a runtime thread. Transient check errors are logged and retried
//! until the policy's attempt or wall-clock budget runs out. A single check
//! is never allowed to outlive the remaining wall-clock budget.

use std::time::Duration;

use artgen_core::generation::OutputDescriptor;
use artgen_core::polling::PollPolicy;
use tokio::time::Instant;

use crate::adapter::{PollOutcome, ProviderAdapter, TaskHandle};

/// Why polling ended without an output.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The provider reported the task as failed.
    #[error("Generation failed: {0}")]
    Failed(String),

    /// The budget ran out before the task finished. `last_error` holds the
    /// final check's error when that check did not succeed.
    #[error(
        "Generation timed out after {attempts} checks ({elapsed:?}){}",
        last_error_suffix(.last_error)
    )]
    TimedOut {
        attempts: u32,
        elapsed: Duration,
        last_error: Option<String>,
    },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|e| format!(", last check: {e}"))
        .unwrap_or_default()
}

/// Poll `task` until it succeeds, fails, or `policy` is exhausted.
pub async fn poll_until_terminal(
    adapter: &dyn ProviderAdapter,
    task: &TaskHandle,
    policy: &PollPolicy,
) -> Result<OutputDescriptor, PollError> {
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_interval;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = policy.max_elapsed.saturating_sub(started.elapsed());
        let last_error = match tokio::time::timeout(remaining, adapter.poll(task)).await {
            Ok(Ok(PollOutcome::Success(output))) => {
                tracing::debug!(
                    provider = adapter.name(),
                    task_id = %task.task_id,
                    attempts,
                    "Provider task ready",
                );
                return Ok(output);
            }
            Ok(Ok(PollOutcome::Failure(message))) => return Err(PollError::Failed(message)),
            Ok(Ok(PollOutcome::Pending)) => None,
            Ok(Err(err)) => {
                tracing::warn!(
                    provider = adapter.name(),
                    task_id = %task.task_id,
                    attempt = attempts,
                    error = %err,
                    "Status check failed, will retry",
                );
                Some(err.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    provider = adapter.name(),
                    task_id = %task.task_id,
                    attempt = attempts,
                    "Status check outlived the polling budget",
                );
                return Err(PollError::TimedOut {
                    attempts,
                    elapsed: started.elapsed(),
                    last_error: Some("status check did not respond".to_string()),
                });
            }
        };

        if attempts >= max_attempts || started.elapsed() + delay > policy.max_elapsed {
            return Err(PollError::TimedOut {
                attempts,
                elapsed: started.elapsed(),
                last_error,
            });
        }
        tokio::time::sleep(delay).await;
        delay = policy.next_interval(delay);
    }
}
