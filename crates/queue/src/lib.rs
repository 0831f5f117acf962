//! In-memory priority job queue with retry and exponential backoff.
//!
//! A [`JobQueue`] runs registered [`JobHandler`]s for queued [`Job`]s with a
//! bounded number of concurrent workers. Failed jobs are retried on a timer
//! that does not hold a worker slot; jobs that exhaust their attempts stay
//! `failed` until an explicit [`JobQueue::retry_job`]. Named queues are
//! owned by a [`QueueManager`].

pub mod config;
pub mod error;
pub mod handler;
pub mod job;
pub mod manager;
pub mod queue;

pub use config::QueueConfig;
pub use error::QueueError;
pub use handler::JobHandler;
pub use job::{Job, JobOptions, QueueStats};
pub use manager::QueueManager;
pub use queue::JobQueue;
