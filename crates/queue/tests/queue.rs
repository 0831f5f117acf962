//! Job queue behaviour: ordering, retries, concurrency, administration.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use artgen_core::job::JobStatus;
use artgen_events::names;
use artgen_queue::{JobOptions, QueueError, QueueManager};
use assert_matches::assert_matches;
use common::*;

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn job_completes_with_handler_result() {
    let (queue, _events) = new_queue(test_config());
    queue.register_handler("echo", Arc::new(EchoHandler));

    let job = queue
        .add("echo", serde_json::json!({"hello": "world"}), JobOptions::default())
        .unwrap();
    assert_eq!(job.status, JobStatus::Waiting);
    assert_eq!(job.max_attempts, 3);

    let done = wait_for_status(&queue, job.id, JobStatus::Completed).await;
    assert_eq!(done.result, Some(serde_json::json!({"hello": "world"})));
    assert_eq!(done.attempts, 0);
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn higher_priority_runs_first_and_equal_is_fifo() {
    let (queue, _events) = new_queue(test_config().with_concurrency(1));
    let gate = Arc::new(tokio::sync::Notify::new());
    let recorder = Arc::new(RecordingHandler::default());
    queue.register_handler("gate", Arc::new(GateHandler { gate: Arc::clone(&gate) }));
    queue.register_handler("record", recorder.clone());

    // Occupy the only worker so the rest line up.
    let blocker = queue
        .add("gate", serde_json::Value::Null, JobOptions::priority(100))
        .unwrap();
    wait_for_status(&queue, blocker.id, JobStatus::Processing).await;

    for (n, priority) in [(1, 0), (2, 5), (3, 0), (4, 5), (5, 1)] {
        queue
            .add("record", serde_json::json!({ "n": n }), JobOptions::priority(priority))
            .unwrap();
    }
    gate.notify_one();

    for _ in 0..200 {
        if recorder.order().len() == 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(recorder.order(), vec![2, 4, 5, 1, 3]);
}

#[tokio::test(start_paused = true)]
async fn concurrency_limit_is_respected() {
    let (queue, _events) = new_queue(test_config().with_concurrency(2));
    let handler = Arc::new(SlowHandler::default());
    queue.register_handler("slow", handler.clone());

    let ids: Vec<_> = (0..5)
        .map(|_| {
            queue
                .add("slow", serde_json::Value::Null, JobOptions::default())
                .unwrap()
                .id
        })
        .collect();
    for id in ids {
        wait_for_status(&queue, id, JobStatus::Completed).await;
    }
    assert_eq!(handler.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn set_concurrency_clamps_to_one() {
    let (queue, _events) = new_queue(test_config());
    queue.set_concurrency(0);
    assert_eq!(queue.stats().concurrency, 1);
    queue.set_concurrency(4);
    assert_eq!(queue.stats().concurrency, 4);
}

// ---------------------------------------------------------------------------
// Retries
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    let (queue, events) = new_queue(test_config());
    let mut rx = events.subscribe();
    let handler = Arc::new(FlakyHandler::new(2));
    queue.register_handler("flaky", handler.clone());

    let job = queue
        .add("flaky", serde_json::Value::Null, JobOptions::default())
        .unwrap();
    let done = wait_for_status(&queue, job.id, JobStatus::Completed).await;

    assert_eq!(handler.calls(), 3);
    assert_eq!(done.attempts, 2);
    assert!(done.error.is_none());

    let mut retrying = 0;
    while let Ok(event) = rx.try_recv() {
        if event.event_type == names::JOB_RETRYING {
            retrying += 1;
        }
    }
    assert_eq!(retrying, 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_job_fails_terminally_and_can_be_retried() {
    let (queue, _events) = new_queue(test_config());
    let handler = Arc::new(FlakyHandler::new(3));
    queue.register_handler("flaky", handler.clone());

    let job = queue
        .add("flaky", serde_json::Value::Null, JobOptions::default())
        .unwrap();
    let failed = wait_for_status(&queue, job.id, JobStatus::Failed).await;
    assert_eq!(failed.attempts, 3);
    assert!(failed.failed_at.is_some());
    assert!(failed.error.unwrap().contains("transient failure"));

    // Terminal: no further automatic runs.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(handler.calls(), 3);

    let requeued = queue.retry_job(job.id).unwrap();
    assert_eq!(requeued.attempts, 0);
    assert!(requeued.error.is_none());
    wait_for_status(&queue, job.id, JobStatus::Completed).await;
    assert_eq!(handler.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn missing_handler_counts_as_failure() {
    let (queue, _events) = new_queue(test_config());

    let job = queue
        .add(
            "unknown",
            serde_json::Value::Null,
            JobOptions::default().with_max_attempts(1),
        )
        .unwrap();
    let failed = wait_for_status(&queue, job.id, JobStatus::Failed).await;
    assert_eq!(failed.attempts, 1);
    assert!(failed.error.unwrap().contains("No handler registered"));
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_counts_as_failure() {
    let (queue, _events) = new_queue(test_config());
    queue.register_handler("panic", Arc::new(PanicHandler));

    let job = queue
        .add(
            "panic",
            serde_json::Value::Null,
            JobOptions::default().with_max_attempts(1),
        )
        .unwrap();
    let failed = wait_for_status(&queue, job.id, JobStatus::Failed).await;
    assert_eq!(failed.error.as_deref(), Some("Job handler panicked"));
    assert_eq!(queue.stats().processing, 0);
}

#[tokio::test(start_paused = true)]
async fn only_failed_jobs_can_be_retried() {
    let (queue, _events) = new_queue(test_config());
    queue.register_handler("echo", Arc::new(EchoHandler));

    let job = queue
        .add("echo", serde_json::Value::Null, JobOptions::default())
        .unwrap();
    wait_for_status(&queue, job.id, JobStatus::Completed).await;

    assert_matches!(
        queue.retry_job(job.id),
        Err(QueueError::NotRetryable { status: JobStatus::Completed, .. })
    );
    assert_matches!(
        queue.retry_job(uuid::Uuid::nil()),
        Err(QueueError::NotFound(_))
    );
}

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stats_and_clearing() {
    let (queue, _events) = new_queue(test_config());
    queue.register_handler("echo", Arc::new(EchoHandler));

    let ok = queue
        .add("echo", serde_json::Value::Null, JobOptions::default())
        .unwrap();
    let bad = queue
        .add(
            "nobody",
            serde_json::Value::Null,
            JobOptions::default().with_max_attempts(1),
        )
        .unwrap();
    wait_for_status(&queue, ok.id, JobStatus::Completed).await;
    wait_for_status(&queue, bad.id, JobStatus::Failed).await;

    let stats = queue.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);

    assert_eq!(queue.clear_completed(), 1);
    assert_eq!(queue.clear_failed(), 1);
    assert_eq!(queue.stats().total, 0);
    assert!(queue.get_job(ok.id).is_none());
}

#[tokio::test(start_paused = true)]
async fn shutdown_rejects_new_jobs() {
    let (queue, _events) = new_queue(test_config());

    assert!(queue.shutdown().await);
    assert_matches!(
        queue.add("echo", serde_json::Value::Null, JobOptions::default()),
        Err(QueueError::ShuttingDown(_))
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_in_flight_jobs() {
    let (queue, _events) = new_queue(test_config());
    queue.register_handler("slow", Arc::new(SlowHandler::default()));

    let job = queue
        .add("slow", serde_json::Value::Null, JobOptions::default())
        .unwrap();
    wait_for_status(&queue, job.id, JobStatus::Processing).await;

    assert!(queue.shutdown().await);
    assert_eq!(queue.get_job(job.id).unwrap().status, JobStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn manager_reuses_queues_by_name() {
    let manager = QueueManager::new(test_config(), Arc::new(artgen_events::EventBus::default()));

    let a = manager.queue("generation");
    a.register_handler("echo", Arc::new(EchoHandler));
    let job = a
        .add("echo", serde_json::Value::Null, JobOptions::default())
        .unwrap();

    // Same name, same queue.
    let again = manager.queue("generation");
    assert!(again.get_job(job.id).is_some());
    manager.queue("thumbnails");

    let stats = manager.all_stats();
    let names: Vec<&str> = stats.iter().map(|s| s.queue.as_str()).collect();
    assert_eq!(names, vec!["generation", "thumbnails"]);

    assert!(manager.shutdown().await);
}
