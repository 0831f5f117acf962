//! The handler port a queue dispatches jobs to.

use async_trait::async_trait;

use crate::job::Job;

/// Work for one job type.
///
/// Returning `Err` counts as a failed attempt; the rendered error chain is
/// stored on the job. Handlers must be idempotent with respect to
/// side effects they complete before failing, since a failed attempt may
/// be retried.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> anyhow::Result<serde_json::Value>;
}
