//! Owner of every named queue in the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use artgen_events::EventBus;

use crate::config::QueueConfig;
use crate::job::QueueStats;
use crate::queue::JobQueue;

/// Creates queues on first use and shuts them all down together.
///
/// Constructed once at startup and passed to whatever needs a queue; there
/// is no global registry.
pub struct QueueManager {
    config: QueueConfig,
    events: Arc<EventBus>,
    queues: Mutex<HashMap<String, JobQueue>>,
}

impl QueueManager {
    pub fn new(config: QueueConfig, events: Arc<EventBus>) -> Self {
        Self {
            config,
            events,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// The queue called `name`, created with the manager's config if absent.
    pub fn queue(&self, name: &str) -> JobQueue {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(
                    queue = name,
                    concurrency = self.config.concurrency,
                    "Created job queue",
                );
                JobQueue::new(name, self.config.clone(), Arc::clone(&self.events))
            })
            .clone()
    }

    /// Stats for every queue, sorted by name.
    pub fn all_stats(&self) -> Vec<QueueStats> {
        let queues: Vec<JobQueue> = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut stats: Vec<QueueStats> = queues.iter().map(JobQueue::stats).collect();
        stats.sort_by(|a, b| a.queue.cmp(&b.queue));
        stats
    }

    /// Shut every queue down in parallel. Returns `true` when all drained.
    pub async fn shutdown(&self) -> bool {
        let queues: Vec<JobQueue> = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let results = futures::future::join_all(queues.iter().map(|queue| queue.shutdown())).await;
        results.into_iter().all(|drained| drained)
    }
}
