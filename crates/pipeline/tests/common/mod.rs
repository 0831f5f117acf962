//! Fakes and harness for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use artgen_core::generation::{GenerationRequest, OutputDescriptor};
use artgen_core::job::JobStatus;
use artgen_core::polling::PollPolicy;
use artgen_core::status::GenerationStatus;
use artgen_core::types::{DbId, JobId, Timestamp};
use artgen_db::models::credit::{DeltaOutcome, LedgerEntry, NewLedgerEntry};
use artgen_db::models::generation::{
    GenerationFilter, GenerationOutput, GenerationPatch, GenerationRecord, GenerationStats,
    NewGeneration, NewGenerationOutput,
};
use artgen_db::{
    InMemoryLedgerStore, InMemoryRecordStore, LedgerStore, RecordStore, StoreError,
};
use artgen_events::{EventBus, PlatformEvent};
use artgen_pipeline::{
    JobStatusView, MemoryCache, Orchestrator, OrchestratorDeps, PipelineConfig,
};
use artgen_providers::{PollOutcome, ProviderAdapter, ProviderError, ProviderRegistry, TaskHandle};
use artgen_queue::{QueueConfig, QueueManager};
use async_trait::async_trait;
use tokio::sync::broadcast;

pub const OWNER: DbId = 7;

// ---------------------------------------------------------------------------
// Scripted provider
// ---------------------------------------------------------------------------

/// What every task submitted to a [`ScriptedProvider`] does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Ready on the second status check.
    Succeed,
    /// The provider reports the task failed.
    FailTask(String),
    /// Submission is refused with this HTTP status.
    RejectSubmit(u16),
    /// Always pending.
    Hang,
    /// Submission never returns.
    StallSubmit,
}

pub struct ScriptedProvider {
    name: String,
    script: Mutex<Script>,
    pub submits: AtomicU32,
    pub polls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script),
            submits: AtomicU32::new(0),
            polls: AtomicU32::new(0),
        })
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn submit_count(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }

    fn script(&self) -> Script {
        self.script.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::fixed(Duration::from_millis(100), 5)
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<TaskHandle, ProviderError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        match self.script() {
            Script::RejectSubmit(status) => {
                return Err(ProviderError::Api {
                    status,
                    body: "upstream refused".into(),
                })
            }
            Script::StallSubmit => std::future::pending::<()>().await,
            _ => {}
        }
        Ok(TaskHandle::new(format!("task-{n}"))
            .with_meta(serde_json::json!({ "model": request.model_id() })))
    }

    async fn poll(&self, task: &TaskHandle) -> Result<PollOutcome, ProviderError> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.script() {
            Script::Succeed if n % 2 == 0 => Ok(PollOutcome::Success(OutputDescriptor {
                url: format!("https://cdn.test/{}.png", task.task_id),
                width: 1024,
                height: 1024,
                model: task.meta["model"].as_str().unwrap_or("unknown").to_string(),
            })),
            Script::Succeed | Script::Hang => Ok(PollOutcome::Pending),
            Script::FailTask(message) => Ok(PollOutcome::Failure(message)),
            Script::RejectSubmit(_) | Script::StallSubmit => {
                Ok(PollOutcome::Failure("not submitted".into()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fault-injecting stores
// ---------------------------------------------------------------------------

/// Wraps an in-memory ledger and can refuse every credit (positive delta).
pub struct RefundFailingLedger {
    pub inner: InMemoryLedgerStore,
    pub fail_credits: AtomicBool,
}

impl RefundFailingLedger {
    pub fn new(inner: InMemoryLedgerStore) -> Self {
        Self {
            inner,
            fail_credits: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl LedgerStore for RefundFailingLedger {
    async fn open_account(&self, owner_id: DbId) -> Result<(), StoreError> {
        self.inner.open_account(owner_id).await
    }

    async fn balance(&self, owner_id: DbId) -> Result<i64, StoreError> {
        self.inner.balance(owner_id).await
    }

    async fn apply_delta(&self, entry: &NewLedgerEntry) -> Result<DeltaOutcome, StoreError> {
        if entry.amount > 0 && self.fail_credits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("ledger offline".into()));
        }
        self.inner.apply_delta(entry).await
    }

    async fn entries(&self, owner_id: DbId, limit: i64) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.entries(owner_id, limit).await
    }
}

/// Wraps an in-memory ledger whose debits (negative deltas) never reach
/// the store. Counts the credits it is asked to apply.
pub struct DebitFailingLedger {
    pub inner: InMemoryLedgerStore,
    pub credit_calls: AtomicU32,
}

impl DebitFailingLedger {
    pub fn new(inner: InMemoryLedgerStore) -> Self {
        Self {
            inner,
            credit_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl LedgerStore for DebitFailingLedger {
    async fn open_account(&self, owner_id: DbId) -> Result<(), StoreError> {
        self.inner.open_account(owner_id).await
    }

    async fn balance(&self, owner_id: DbId) -> Result<i64, StoreError> {
        self.inner.balance(owner_id).await
    }

    async fn apply_delta(&self, entry: &NewLedgerEntry) -> Result<DeltaOutcome, StoreError> {
        if entry.amount < 0 {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.credit_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.apply_delta(entry).await
    }

    async fn entries(&self, owner_id: DbId, limit: i64) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.entries(owner_id, limit).await
    }
}

/// Wraps an in-memory record store and injects write failures.
pub struct FaultyRecords {
    pub inner: Arc<InMemoryRecordStore>,
    fail_inserts: bool,
    fail_next_processing: AtomicBool,
}

impl FaultyRecords {
    /// Fails the first `Processing` transition only.
    pub fn losing_first_processing(inner: Arc<InMemoryRecordStore>) -> Self {
        Self {
            inner,
            fail_inserts: false,
            fail_next_processing: AtomicBool::new(true),
        }
    }

    /// Fails every insert.
    pub fn refusing_inserts(inner: Arc<InMemoryRecordStore>) -> Self {
        Self {
            inner,
            fail_inserts: true,
            fail_next_processing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RecordStore for FaultyRecords {
    async fn insert(&self, input: &NewGeneration) -> Result<GenerationRecord, StoreError> {
        if self.fail_inserts {
            return Err(StoreError::Unavailable("insert timed out".into()));
        }
        self.inner.insert(input).await
    }

    async fn update(
        &self,
        id: DbId,
        patch: &GenerationPatch,
    ) -> Result<Option<GenerationRecord>, StoreError> {
        if patch.status == Some(GenerationStatus::Processing)
            && self.fail_next_processing.swap(false, Ordering::SeqCst)
        {
            return Err(StoreError::Unavailable("write timed out".into()));
        }
        self.inner.update(id, patch).await
    }

    async fn find(&self, id: DbId) -> Result<Option<GenerationRecord>, StoreError> {
        self.inner.find(id).await
    }

    async fn list_for_owner(
        &self,
        owner_id: DbId,
        filter: &GenerationFilter,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        self.inner.list_for_owner(owner_id, filter).await
    }

    async fn list_stale(
        &self,
        older_than: Timestamp,
        limit: i64,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        self.inner.list_stale(older_than, limit).await
    }

    async fn stats_for_owner(&self, owner_id: DbId) -> Result<GenerationStats, StoreError> {
        self.inner.stats_for_owner(owner_id).await
    }

    async fn insert_output(
        &self,
        input: &NewGenerationOutput,
    ) -> Result<GenerationOutput, StoreError> {
        self.inner.insert_output(input).await
    }

    async fn outputs_for(&self, generation_id: DbId) -> Result<Vec<GenerationOutput>, StoreError> {
        self.inner.outputs_for(generation_id).await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub ledger: Arc<dyn LedgerStore>,
    pub records: Arc<InMemoryRecordStore>,
    pub cache: Arc<MemoryCache>,
    pub events: Arc<EventBus>,
    pub queues: QueueManager,
    pub provider: Arc<ScriptedProvider>,
}

impl Harness {
    /// One owner funded with `balance`, one `flux` provider running `script`.
    pub fn new(balance: i64, script: Script) -> Self {
        let ledger = Arc::new(InMemoryLedgerStore::new().with_account(OWNER, balance));
        Self::with_ledger(ledger, script)
    }

    pub fn with_ledger(ledger: Arc<dyn LedgerStore>, script: Script) -> Self {
        let records = Arc::new(InMemoryRecordStore::new());
        Self::with_stores(ledger, Arc::clone(&records), records, script)
    }

    /// `port` is what the orchestrator writes through; `records` is the
    /// in-memory store behind it that tests inspect.
    pub fn with_stores(
        ledger: Arc<dyn LedgerStore>,
        records: Arc<InMemoryRecordStore>,
        port: Arc<dyn RecordStore>,
        script: Script,
    ) -> Self {
        let events = Arc::new(EventBus::default());
        let cache = Arc::new(MemoryCache::new());
        let provider = ScriptedProvider::new("flux", script);
        let queues = QueueManager::new(
            QueueConfig::default()
                .with_concurrency(2)
                .with_retry_backoff(Duration::from_millis(100), Duration::from_secs(1)),
            Arc::clone(&events),
        );

        let orchestrator = Orchestrator::start(
            OrchestratorDeps {
                ledger: Arc::clone(&ledger),
                records: port,
                cache: Arc::clone(&cache) as _,
                providers: ProviderRegistry::new().with(Arc::clone(&provider) as _),
                events: Arc::clone(&events),
            },
            &queues,
            PipelineConfig::default().with_generation_max_attempts(1),
        );

        Self {
            orchestrator,
            ledger,
            records,
            cache,
            events,
            queues,
            provider,
        }
    }

    pub async fn balance(&self) -> i64 {
        self.ledger.balance(OWNER).await.unwrap()
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.ledger.entries(OWNER, 100).await.unwrap()
    }

    /// Wait for a queued generation to finish.
    pub async fn wait_for_job(&self, id: JobId) -> JobStatusView {
        for _ in 0..1_000 {
            if let Some(view) = self.orchestrator.job_status(id) {
                if matches!(view.status, JobStatus::Completed | JobStatus::Failed) {
                    return view;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job {id} never finished: {:?}", self.orchestrator.job_status(id));
    }
}

pub fn request(prompt: &str) -> GenerationRequest {
    GenerationRequest::new("flux", prompt).with_aspect_ratio("1:1")
}

/// Every event of `event_type` already published to `rx`.
pub fn drain(rx: &mut broadcast::Receiver<PlatformEvent>, event_type: &str) -> Vec<PlatformEvent> {
    let mut found = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if event.event_type == event_type {
            found.push(event);
        }
    }
    found
}
