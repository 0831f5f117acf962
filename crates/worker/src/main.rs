use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use artgen_pipeline::PipelineConfig;
use artgen_queue::QueueConfig;
use artgen_worker::{LogFormat, Worker, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "artgen_worker=debug,artgen_pipeline=debug,artgen_queue=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    // --- Configuration ---
    let pipeline = PipelineConfig::from_env();
    let queue = QueueConfig::from_env();
    tracing::info!(
        providers = config.providers.len(),
        database = config.database_url.is_some(),
        concurrency = queue.concurrency,
        queue = %pipeline.generation_queue,
        "Loaded worker configuration",
    );

    // --- Orchestrator ---
    let worker = Worker::build(&config, pipeline, queue)
        .await
        .expect("Failed to start worker");

    // --- Background services ---
    let cancel = CancellationToken::new();
    let logger_handle = tokio::spawn(artgen_events::EventLogger::run(
        worker.events.subscribe(),
        cancel.clone(),
    ));
    let maintenance_handle =
        worker.spawn_maintenance(config.reap_interval, config.stale_after, cancel.clone());
    tracing::info!("Worker started");

    shutdown_signal().await;

    // --- Shutdown ---
    if !worker.shutdown().await {
        tracing::warn!("Some jobs were still running at shutdown");
    }
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), maintenance_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), logger_handle).await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
