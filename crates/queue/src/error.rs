use artgen_core::job::JobStatus;
use artgen_core::types::JobId;

/// Errors from queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// `shutdown` has been called; no new jobs are accepted.
    #[error("Queue '{0}' is shutting down")]
    ShuttingDown(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// Only failed jobs can be retried by hand.
    #[error("Job {id} is {status}, only failed jobs can be retried")]
    NotRetryable { id: JobId, status: JobStatus },
}
