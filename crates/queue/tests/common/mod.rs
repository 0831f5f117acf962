//! Shared fakes for queue integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use artgen_core::job::JobStatus;
use artgen_core::types::JobId;
use artgen_events::EventBus;
use artgen_queue::{Job, JobHandler, JobQueue, QueueConfig};
use async_trait::async_trait;

/// Fast-retry config so paused-clock tests do not wait long.
pub fn test_config() -> QueueConfig {
    QueueConfig::default()
        .with_retry_backoff(Duration::from_millis(100), Duration::from_secs(5))
        .with_shutdown_timeout(Duration::from_secs(5))
}

pub fn new_queue(config: QueueConfig) -> (JobQueue, Arc<EventBus>) {
    let events = Arc::new(EventBus::default());
    (JobQueue::new("test", config, Arc::clone(&events)), events)
}

/// Poll until the job reaches `status`, panicking after a generous bound.
pub async fn wait_for_status(queue: &JobQueue, id: JobId, status: JobStatus) -> Job {
    for _ in 0..2_000 {
        if let Some(job) = queue.get_job(id) {
            if job.status == status && job.next_attempt_at.is_none() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached {status}: {:?}", queue.get_job(id));
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Returns the payload as the result.
pub struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        Ok(job.payload.clone())
    }
}

/// Fails a fixed number of times, then succeeds.
pub struct FlakyHandler {
    failures_left: AtomicU32,
    pub calls: AtomicU32,
}

impl FlakyHandler {
    pub fn new(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for FlakyHandler {
    async fn handle(&self, _job: &Job) -> anyhow::Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("transient failure ({remaining} left)");
        }
        Ok(serde_json::json!({ "ok": true }))
    }
}

/// Records `payload.n` of every job it runs, in order.
#[derive(Default)]
pub struct RecordingHandler {
    pub order: Mutex<Vec<i64>>,
}

impl RecordingHandler {
    pub fn order(&self) -> Vec<i64> {
        self.order.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        let n = job.payload["n"].as_i64().unwrap_or(-1);
        self.order.lock().unwrap().push(n);
        Ok(serde_json::Value::Null)
    }
}

/// Blocks until the test opens the gate.
pub struct GateHandler {
    pub gate: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl JobHandler for GateHandler {
    async fn handle(&self, _job: &Job) -> anyhow::Result<serde_json::Value> {
        self.gate.notified().await;
        Ok(serde_json::Value::Null)
    }
}

/// Sleeps, tracking the peak number of concurrent invocations.
#[derive(Default)]
pub struct SlowHandler {
    running: AtomicUsize,
    pub peak: AtomicUsize,
}

#[async_trait]
impl JobHandler for SlowHandler {
    async fn handle(&self, _job: &Job) -> anyhow::Result<serde_json::Value> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(serde_json::Value::Null)
    }
}

pub struct PanicHandler;

#[async_trait]
impl JobHandler for PanicHandler {
    async fn handle(&self, _job: &Job) -> anyhow::Result<serde_json::Value> {
        panic!("handler bug");
    }
}
