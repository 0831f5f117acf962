//! A single named job queue.
//!
//! One dispatcher task per queue pulls waiting jobs in priority order and
//! spawns a task per job, never exceeding the concurrency limit. Retry
//! timers are separate tasks so a job waiting out its backoff does not
//! hold a worker slot. All state lives behind one mutex that is only held
//! for synchronous bookkeeping.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use artgen_core::job::{insertion_index, retry_delay, should_retry, JobStatus, DEFAULT_PRIORITY};
use artgen_core::types::JobId;
use artgen_events::{names, EventBus, PlatformEvent};
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::handler::JobHandler;
use crate::job::{Job, JobOptions, QueueStats};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct QueueState {
    jobs: HashMap<JobId, Job>,
    /// Ids ready to run, front first.
    waiting: VecDeque<JobId>,
    active: usize,
    concurrency: usize,
    accepting: bool,
}

impl QueueState {
    /// Put `id` in line according to its priority.
    fn enqueue(&mut self, id: JobId, priority: i32, ahead_of_equal: bool) {
        let jobs = &self.jobs;
        let priorities = self
            .waiting
            .iter()
            .map(|waiting_id| jobs.get(waiting_id).map_or(DEFAULT_PRIORITY, |j| j.priority));
        let index = insertion_index(priorities, priority, ahead_of_equal);
        self.waiting.insert(index, id);
    }
}

struct Inner {
    name: String,
    config: QueueConfig,
    state: Mutex<QueueState>,
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    events: Arc<EventBus>,
    wake: Notify,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event_type: &str, job: &Job, extra: serde_json::Value) {
        let mut payload = serde_json::json!({
            "queue": self.name,
            "job_type": job.job_type,
            "priority": job.priority,
            "attempts": job.attempts,
        });
        if let (Some(target), serde_json::Value::Object(extra)) = (payload.as_object_mut(), extra) {
            target.extend(extra);
        }
        self.events.publish(
            PlatformEvent::new(event_type)
                .with_source("job", job.id)
                .with_payload(payload),
        );
    }
}

// ---------------------------------------------------------------------------
// JobQueue
// ---------------------------------------------------------------------------

/// Handle to a running queue. Cheap to clone.
///
/// Must be created inside a Tokio runtime: construction spawns the
/// dispatcher task.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl JobQueue {
    pub fn new(name: impl Into<String>, config: QueueConfig, events: Arc<EventBus>) -> Self {
        let concurrency = config.concurrency.max(1);
        let inner = Arc::new(Inner {
            name: name.into(),
            config,
            state: Mutex::new(QueueState {
                jobs: HashMap::new(),
                waiting: VecDeque::new(),
                active: 0,
                concurrency,
                accepting: true,
            }),
            handlers: RwLock::new(HashMap::new()),
            events,
            wake: Notify::new(),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        tokio::spawn(dispatch_loop(Arc::clone(&inner)));
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register the handler for `job_type`, replacing any previous one.
    pub fn register_handler(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        tracing::debug!(queue = %self.inner.name, job_type = %job_type, "Registered job handler");
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_type, handler);
        // Jobs may already be waiting for this type.
        self.inner.wake.notify_one();
    }

    /// Queue a job. Higher priority runs first; equal priorities run in
    /// insertion order.
    pub fn add(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<Job, QueueError> {
        let job = {
            let mut state = self.inner.state();
            if !state.accepting {
                return Err(QueueError::ShuttingDown(self.inner.name.clone()));
            }
            let job = Job::new(
                &self.inner.name,
                job_type,
                payload,
                options.priority.unwrap_or(DEFAULT_PRIORITY),
                options
                    .max_attempts
                    .unwrap_or(self.inner.config.max_attempts)
                    .max(1),
            );
            state.jobs.insert(job.id, job.clone());
            state.enqueue(job.id, job.priority, false);
            job
        };

        tracing::info!(
            queue = %self.inner.name,
            job_id = %job.id,
            job_type,
            priority = job.priority,
            "Job added",
        );
        self.inner.publish(names::JOB_ADDED, &job, serde_json::json!({}));
        self.inner.wake.notify_one();
        Ok(job)
    }

    pub fn get_job(&self, id: JobId) -> Option<Job> {
        self.inner.state().jobs.get(&id).cloned()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state();
        let mut stats = QueueStats {
            queue: self.inner.name.clone(),
            total: state.jobs.len(),
            concurrency: state.concurrency,
            ..Default::default()
        };
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Waiting if job.next_attempt_at.is_some() => stats.delayed += 1,
                JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Drop completed jobs from memory. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        self.clear_with_status(JobStatus::Completed)
    }

    /// Drop failed jobs from memory. Returns how many were removed.
    pub fn clear_failed(&self) -> usize {
        self.clear_with_status(JobStatus::Failed)
    }

    fn clear_with_status(&self, status: JobStatus) -> usize {
        let mut state = self.inner.state();
        let before = state.jobs.len();
        state.jobs.retain(|_, job| job.status != status);
        let removed = before - state.jobs.len();
        tracing::debug!(queue = %self.inner.name, status = %status, removed, "Cleared jobs");
        removed
    }

    /// Put a failed job back in line with a fresh attempt budget.
    pub fn retry_job(&self, id: JobId) -> Result<Job, QueueError> {
        let job = {
            let mut state = self.inner.state();
            if !state.accepting {
                return Err(QueueError::ShuttingDown(self.inner.name.clone()));
            }
            let job = state.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
            if job.status != JobStatus::Failed {
                return Err(QueueError::NotRetryable {
                    id,
                    status: job.status,
                });
            }
            job.status = JobStatus::Waiting;
            job.attempts = 0;
            job.error = None;
            job.failed_at = None;
            job.completed_at = None;
            let job = job.clone();
            state.enqueue(id, job.priority, false);
            job
        };

        tracing::info!(queue = %self.inner.name, job_id = %id, "Failed job re-queued");
        self.inner.publish(names::JOB_ADDED, &job, serde_json::json!({ "manual_retry": true }));
        self.inner.wake.notify_one();
        Ok(job)
    }

    /// Change the number of parallel workers. Values below 1 become 1.
    pub fn set_concurrency(&self, concurrency: usize) {
        let concurrency = concurrency.max(1);
        self.inner.state().concurrency = concurrency;
        tracing::info!(queue = %self.inner.name, concurrency, "Queue concurrency changed");
        self.inner.wake.notify_one();
    }

    /// Stop accepting jobs, cancel pending retry timers, and wait up to the
    /// configured timeout for in-flight jobs. Returns `true` when every
    /// in-flight job finished in time.
    pub async fn shutdown(&self) -> bool {
        let in_flight = {
            let mut state = self.inner.state();
            state.accepting = false;
            state.active
        };
        tracing::info!(queue = %self.inner.name, in_flight, "Queue shutting down");

        self.inner.cancel.cancel();
        self.inner.tasks.close();

        let drained = tokio::time::timeout(self.inner.config.shutdown_timeout, self.inner.tasks.wait())
            .await
            .is_ok();
        if !drained {
            tracing::warn!(
                queue = %self.inner.name,
                in_flight = self.inner.state().active,
                "Shutdown timed out with jobs still running",
            );
        }
        drained
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

async fn dispatch_loop(inner: Arc<Inner>) {
    tracing::debug!(queue = %inner.name, "Queue dispatcher started");
    loop {
        while let Some(job) = claim_next(&inner) {
            inner.tasks.spawn(run_job(Arc::clone(&inner), job));
        }

        tokio::select! {
            _ = inner.cancel.cancelled() => {
                tracing::debug!(queue = %inner.name, "Queue dispatcher stopped");
                break;
            }
            _ = inner.wake.notified() => {}
        }
    }
}

/// Move the front waiting job to `Processing` if a worker slot is free.
fn claim_next(inner: &Inner) -> Option<Job> {
    let mut state = inner.state();
    if !state.accepting || state.active >= state.concurrency {
        return None;
    }
    while let Some(id) = state.waiting.pop_front() {
        let Some(job) = state.jobs.get_mut(&id) else {
            continue;
        };
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        let job = job.clone();
        state.active += 1;
        return Some(job);
    }
    None
}

async fn run_job(inner: Arc<Inner>, job: Job) {
    tracing::info!(
        queue = %inner.name,
        job_id = %job.id,
        job_type = %job.job_type,
        attempt = job.attempts + 1,
        "Processing job",
    );
    inner.publish(names::JOB_PROCESSING, &job, serde_json::json!({}));

    let handler = inner
        .handlers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&job.job_type)
        .cloned();

    let outcome = match handler {
        Some(handler) => match AssertUnwindSafe(handler.handle(&job)).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(_) => Err("Job handler panicked".to_string()),
        },
        None => Err(format!("No handler registered for job type '{}'", job.job_type)),
    };

    match outcome {
        Ok(result) => complete(&inner, job.id, result),
        Err(error) => fail(&inner, job.id, error),
    }
    inner.wake.notify_one();
}

fn complete(inner: &Inner, id: JobId, result: serde_json::Value) {
    let job = {
        let mut state = inner.state();
        state.active = state.active.saturating_sub(1);
        let Some(job) = state.jobs.get_mut(&id) else {
            return;
        };
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.result = Some(result);
        job.error = None;
        job.clone()
    };

    tracing::info!(queue = %inner.name, job_id = %id, "Job completed");
    inner.publish(names::JOB_COMPLETED, &job, serde_json::json!({}));
}

fn fail(inner: &Arc<Inner>, id: JobId, error: String) {
    let (job, delay) = {
        let mut state = inner.state();
        state.active = state.active.saturating_sub(1);
        let Some(job) = state.jobs.get_mut(&id) else {
            return;
        };
        job.attempts += 1;
        job.error = Some(error.clone());

        if should_retry(job.attempts, job.max_attempts) {
            let delay = retry_delay(inner.config.retry_base, inner.config.retry_max, job.attempts);
            job.status = JobStatus::Waiting;
            job.next_attempt_at = chrono::Duration::from_std(delay)
                .ok()
                .map(|d| Utc::now() + d);
            (job.clone(), Some(delay))
        } else {
            job.status = JobStatus::Failed;
            job.failed_at = Some(Utc::now());
            (job.clone(), None)
        }
    };

    match delay {
        Some(delay) => {
            tracing::warn!(
                queue = %inner.name,
                job_id = %id,
                attempts = job.attempts,
                max_attempts = job.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Job failed, retry scheduled",
            );
            inner.publish(
                names::JOB_RETRYING,
                &job,
                serde_json::json!({ "delay_ms": delay.as_millis() as u64, "error": error }),
            );
            inner.tasks.spawn(requeue_after(Arc::clone(inner), id, delay));
        }
        None => {
            tracing::error!(
                queue = %inner.name,
                job_id = %id,
                attempts = job.attempts,
                error = %error,
                "Job failed permanently",
            );
            inner.publish(names::JOB_FAILED, &job, serde_json::json!({ "error": error }));
        }
    }
}

/// Wait out a retry backoff, then put the job back in line ahead of jobs of
/// equal priority.
async fn requeue_after(inner: Arc<Inner>, id: JobId, delay: Duration) {
    tokio::select! {
        biased;
        _ = inner.cancel.cancelled() => {
            tracing::debug!(queue = %inner.name, job_id = %id, "Retry timer cancelled");
            return;
        }
        _ = tokio::time::sleep(delay) => {}
    }

    {
        let mut state = inner.state();
        let Some(job) = state.jobs.get_mut(&id) else {
            return;
        };
        if !job.is_retry_scheduled() {
            return;
        }
        job.next_attempt_at = None;
        let priority = job.priority;
        state.enqueue(id, priority, true);
    }
    inner.wake.notify_one();
}
