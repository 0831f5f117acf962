//! Wires stores, providers, queues, and the orchestrator into one process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use artgen_db::{
    InMemoryLedgerStore, InMemoryRecordStore, LedgerStore, PgLedgerStore, PgRecordStore,
    RecordStore,
};
use artgen_events::EventBus;
use artgen_pipeline::{MemoryCache, Orchestrator, OrchestratorDeps, PipelineConfig};
use artgen_providers::{HttpTaskAdapter, ProviderRegistry};
use artgen_queue::{QueueConfig, QueueManager};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

/// A running worker: the orchestrator and everything it owns.
pub struct Worker {
    pub orchestrator: Arc<Orchestrator>,
    pub queues: QueueManager,
    pub events: Arc<EventBus>,
    pub cache: Arc<MemoryCache>,
}

impl Worker {
    /// Connect stores, register providers, and start the generation queue.
    pub async fn build(
        config: &WorkerConfig,
        pipeline: PipelineConfig,
        queue: QueueConfig,
    ) -> anyhow::Result<Self> {
        let (ledger, records) = stores(config.database_url.as_deref()).await?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        let mut providers = ProviderRegistry::new();
        for provider in &config.providers {
            tracing::info!(provider = %provider.name, "Registering provider");
            providers.register(Arc::new(HttpTaskAdapter::with_client(
                client.clone(),
                provider.clone(),
            )));
        }
        if providers.is_empty() {
            tracing::warn!("No providers configured, every generation will be rejected");
        }

        let events = Arc::new(EventBus::default());
        let cache = Arc::new(MemoryCache::new());
        let queues = QueueManager::new(queue, Arc::clone(&events));

        let orchestrator = Orchestrator::start(
            OrchestratorDeps {
                ledger,
                records,
                cache: Arc::clone(&cache) as _,
                providers,
                events: Arc::clone(&events),
            },
            &queues,
            pipeline,
        );

        Ok(Self {
            orchestrator,
            queues,
            events,
            cache,
        })
    }

    /// Periodically reap stale generations and purge expired cache entries
    /// until `cancel` fires.
    pub fn spawn_maintenance(
        &self,
        interval: Duration,
        stale_after: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let cache = Arc::clone(&self.cache);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Maintenance loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = orchestrator.reap_stale(stale_after).await {
                            tracing::warn!(error = %e, "Stale generation sweep failed");
                        }
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, "Purged expired cache entries");
                        }
                    }
                }
            }
        })
    }

    /// Stop accepting jobs and drain in-flight work. Returns `false` if a
    /// queue hit its shutdown timeout.
    pub async fn shutdown(&self) -> bool {
        self.queues.shutdown().await
    }
}

async fn stores(
    database_url: Option<&str>,
) -> anyhow::Result<(Arc<dyn LedgerStore>, Arc<dyn RecordStore>)> {
    let Some(url) = database_url else {
        tracing::warn!("DATABASE_URL not set, using in-memory stores");
        return Ok((
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryRecordStore::new()),
        ));
    };

    let pool = artgen_db::create_pool(url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    artgen_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    artgen_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok((
        Arc::new(PgLedgerStore::new(pool.clone())),
        Arc::new(PgRecordStore::new(pool)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use artgen_providers::HttpProviderConfig;

    fn in_memory_config() -> WorkerConfig {
        WorkerConfig {
            database_url: None,
            providers: vec![HttpProviderConfig::new(
                "flux",
                "http://127.0.0.1:9/submit",
                "http://127.0.0.1:9/status",
            )],
            log_format: Default::default(),
            reap_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(900),
        }
    }

    #[tokio::test]
    async fn builds_with_in_memory_stores() {
        let worker = Worker::build(
            &in_memory_config(),
            PipelineConfig::default(),
            QueueConfig::default(),
        )
        .await
        .unwrap();

        let stats = worker.queues.all_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].queue, "generation");
        assert!(worker.shutdown().await);
    }

    #[tokio::test(start_paused = true)]
    async fn maintenance_stops_on_cancel() {
        let worker = Worker::build(
            &in_memory_config(),
            PipelineConfig::default(),
            QueueConfig::default(),
        )
        .await
        .unwrap();

        let cancel = CancellationToken::new();
        let handle = worker.spawn_maintenance(
            Duration::from_secs(1),
            Duration::from_secs(900),
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
