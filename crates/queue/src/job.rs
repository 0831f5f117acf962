//! Job records and per-queue statistics.

use artgen_core::job::JobStatus;
use artgen_core::types::{JobId, Timestamp};
use chrono::Utc;
use serde::Serialize;

/// Options for [`JobQueue::add`](crate::JobQueue::add).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOptions {
    /// Higher runs first. Defaults to 0.
    pub priority: Option<i32>,
    /// Defaults to the queue's configured limit.
    pub max_attempts: Option<u32>,
}

impl JobOptions {
    pub fn priority(priority: i32) -> Self {
        Self {
            priority: Some(priority),
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// A unit of work and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Failed attempts so far.
    pub attempts: u32,
    pub max_attempts: u32,
    pub priority: i32,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Set while a retry is scheduled and the job is not yet back in line.
    pub next_attempt_at: Option<Timestamp>,
}

impl Job {
    pub(crate) fn new(
        queue: &str,
        job_type: &str,
        payload: serde_json::Value,
        priority: i32,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            queue: queue.to_string(),
            job_type: job_type.to_string(),
            payload,
            status: JobStatus::Waiting,
            attempts: 0,
            max_attempts,
            priority,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            failed_at: None,
            result: None,
            error: None,
            next_attempt_at: None,
        }
    }

    /// Waiting, but parked on a retry timer.
    pub fn is_retry_scheduled(&self) -> bool {
        self.status == JobStatus::Waiting && self.next_attempt_at.is_some()
    }
}

/// Point-in-time counts for one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queue: String,
    /// Ready to run.
    pub waiting: usize,
    /// Parked on a retry timer.
    pub delayed: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    pub concurrency: usize,
}
