//! The generation orchestrator.
//!
//! Synchronous path: validate, price, serve from cache when possible,
//! check affordability, debit, record, submit, poll, then either complete
//! (persist output, cache, publish) or settle the failure (mark the record
//! failed, refund the debit). The asynchronous path runs the same steps
//! from debit onwards inside a `generation.run` job.
//!
//! A debit is settled at most once. Settlement is gated on the record's
//! compare-and-set transition to `Failed`, so whichever of the request,
//! a job retry, or [`Orchestrator::reap_stale`] wins that transition is the
//! only one that refunds.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use anyhow::Context;
use artgen_core::cache_key::generation_cache_key;
use artgen_core::credits::CreditReason;
use artgen_core::error::CoreError;
use artgen_core::generation::{validate_request, GenerationRequest, OutputDescriptor};
use artgen_core::job::JobStatus;
use artgen_core::provider_errors::ProviderFailureKind;
use artgen_core::status::GenerationStatus;
use artgen_core::types::{DbId, JobId, Timestamp};
use artgen_db::models::generation::{GenerationRecord, NewGeneration, NewGenerationOutput};
use artgen_db::{LedgerStore, RecordStore, StoreError};
use artgen_events::{names, EventBus, PlatformEvent};
use artgen_providers::{
    poll_until_terminal, PollError, ProviderAdapter, ProviderError, ProviderRegistry,
};
use artgen_queue::{Job, JobHandler, JobOptions, JobQueue, QueueManager};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cache::CacheBackend;
use crate::config::PipelineConfig;
use crate::error::GenerationError;
use crate::ledger::CreditLedger;
use crate::records::GenerationRecords;

/// Job type of queued generations.
pub const GENERATION_JOB_TYPE: &str = "generation.run";

/// Stale records settled per [`Orchestrator::reap_stale`] call.
const STALE_BATCH: i64 = 100;

const ABANDONED_ERROR: &str = "Generation abandoned before completion";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Wait for the provider and return the output.
    #[default]
    Sync,
    /// Queue the work and return a job handle.
    Async,
}

/// A freshly generated, paid-for output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub generation_id: DbId,
    pub output: OutputDescriptor,
    pub credits_used: i64,
    pub credits_remaining: i64,
}

/// An output served from the result cache. Nothing was charged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedResult {
    pub cache_key: String,
    pub output: OutputDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    Completed(GenerationResult),
    Cached(CachedResult),
    Queued(JobHandle),
}

/// Caller-facing view of a queued generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub status: JobStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    /// When the job reached a terminal status.
    pub completed_at: Option<Timestamp>,
}

impl From<Job> for JobStatusView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            result: job.result,
            error: job.error,
            created_at: job.created_at,
            completed_at: job.completed_at.or(job.failed_at),
        }
    }
}

/// Ports the orchestrator is composed from.
pub struct OrchestratorDeps {
    pub ledger: Arc<dyn LedgerStore>,
    pub records: Arc<dyn RecordStore>,
    pub cache: Arc<dyn CacheBackend>,
    pub providers: ProviderRegistry,
    pub events: Arc<EventBus>,
}

/// Payload of a `generation.run` job.
#[derive(Debug, Serialize, Deserialize)]
struct GenerationJob {
    owner_id: DbId,
    credits: i64,
    request: GenerationRequest,
}

/// A failed attempt: what goes on the record and what the caller sees.
struct Failure {
    technical: String,
    kind: ProviderFailureKind,
    error: GenerationError,
}

impl Failure {
    fn provider(context: &str, err: &ProviderError) -> Self {
        let kind = err.kind();
        Self::from_kind(kind, format!("{context}: {err}"))
    }

    fn poll(err: PollError) -> Self {
        match err {
            PollError::Failed(message) => Self::from_kind(
                ProviderFailureKind::TaskFailed,
                format!("Provider task failed: {message}"),
            ),
            PollError::TimedOut { .. } => {
                Self::from_kind(ProviderFailureKind::Timeout, err.to_string())
            }
        }
    }

    fn from_kind(kind: ProviderFailureKind, technical: String) -> Self {
        let message = kind.user_message().to_string();
        let error = match kind {
            ProviderFailureKind::Timeout => GenerationError::Timeout { message },
            _ => GenerationError::Provider { message },
        };
        Self {
            technical,
            kind,
            error,
        }
    }

    fn store(context: &str, err: &StoreError) -> Self {
        Self {
            technical: format!("{context}: {err}"),
            kind: ProviderFailureKind::Unknown,
            error: GenerationError::RecordStoreUnavailable(err.to_string()),
        }
    }
}

fn validation_message(err: CoreError) -> String {
    match err {
        CoreError::Validation(message) => message,
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    ledger: CreditLedger,
    records: GenerationRecords,
    cache: Arc<dyn CacheBackend>,
    providers: ProviderRegistry,
    queue: JobQueue,
    events: Arc<EventBus>,
    config: PipelineConfig,
    /// Records refunded while the record store refused the `Failed`
    /// transition. The reaper marks them without refunding again.
    refunded_unmarked: Mutex<HashSet<DbId>>,
}

impl Orchestrator {
    /// Build the orchestrator and register its job handler on the
    /// generation queue.
    pub fn start(deps: OrchestratorDeps, queues: &QueueManager, config: PipelineConfig) -> Arc<Self> {
        let queue = queues.queue(&config.generation_queue);
        let orchestrator = Arc::new(Self {
            ledger: CreditLedger::new(deps.ledger, Arc::clone(&deps.cache), config.balance_cache_ttl),
            records: GenerationRecords::new(deps.records),
            cache: deps.cache,
            providers: deps.providers,
            queue: queue.clone(),
            events: deps.events,
            config,
            refunded_unmarked: Mutex::new(HashSet::new()),
        });

        queue.register_handler(
            GENERATION_JOB_TYPE,
            Arc::new(GenerationJobHandler {
                orchestrator: Arc::downgrade(&orchestrator),
            }),
        );
        tracing::info!(
            queue = %orchestrator.config.generation_queue,
            providers = ?orchestrator.providers.names(),
            "Generation orchestrator started",
        );
        orchestrator
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn records(&self) -> &GenerationRecords {
        &self.records
    }

    /// The queue asynchronous generations run on.
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Run or queue one generation for `owner_id`.
    pub async fn generate(
        &self,
        owner_id: DbId,
        request: GenerationRequest,
        mode: GenerationMode,
    ) -> Result<GenerateOutcome, GenerationError> {
        validate_request(&request).map_err(|e| GenerationError::Validation(validation_message(e)))?;
        self.adapter_for(&request.provider)?;

        let cost = self
            .config
            .pricing
            .cost(request.model_id(), request.batch_size);

        if !request.has_input_image() {
            let key = generation_cache_key(&request);
            if let Some(output) = self.cached_output(&key).await {
                tracing::info!(owner_id, provider = %request.provider, "Serving generation from cache");
                return Ok(GenerateOutcome::Cached(CachedResult {
                    cache_key: key,
                    output,
                }));
            }
        }

        let affordability = self.ledger.check_affordability(owner_id, cost).await?;
        if !affordability.can_afford {
            tracing::info!(
                owner_id,
                credits = cost,
                available = affordability.available,
                "Generation refused, insufficient credits",
            );
            return Err(GenerationError::InsufficientCredits {
                required: cost,
                available: affordability.available,
            });
        }

        match mode {
            GenerationMode::Sync => self
                .execute(owner_id, &request, cost)
                .await
                .map(GenerateOutcome::Completed),
            GenerationMode::Async => self
                .enqueue(owner_id, request, cost, affordability.available)
                .map(GenerateOutcome::Queued),
        }
    }

    /// Status of a queued generation.
    pub fn job_status(&self, job_id: JobId) -> Option<JobStatusView> {
        self.queue.get_job(job_id).map(JobStatusView::from)
    }

    /// Fail and refund generations stuck in `Pending`/`Processing` since
    /// before `older_than` ago. Returns how many were settled.
    pub async fn reap_stale(&self, older_than: Duration) -> Result<usize, GenerationError> {
        let Some(cutoff) = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };

        let stale = self.records.list_stale(cutoff, STALE_BATCH).await?;
        let mut reaped = 0;
        for record in stale {
            let already_refunded = self.unmarked().contains(&record.id);
            match self.records.mark_failed(record.id, ABANDONED_ERROR).await {
                Ok(true) => {
                    reaped += 1;
                    if already_refunded {
                        self.unmarked().remove(&record.id);
                    } else {
                        self.refund(record.owner_id, Some(record.id), record.credits_reserved)
                            .await;
                    }
                    self.publish_failed(&record, ABANDONED_ERROR, "PROVIDER_TIMEOUT");
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    generation_id = record.id,
                    error = %e,
                    "Could not reap stale generation",
                ),
            }
        }

        if reaped > 0 {
            tracing::info!(reaped, "Reaped stale generations");
        }
        Ok(reaped)
    }

    // ---- synchronous steps ----

    /// Debit, record, submit, poll, and settle. Assumes the request has
    /// been validated and priced.
    async fn execute(
        &self,
        owner_id: DbId,
        request: &GenerationRequest,
        cost: i64,
    ) -> Result<GenerationResult, GenerationError> {
        let adapter = self.adapter_for(&request.provider)?;
        let model = request.model_id().to_string();
        let description = format!("{} {} generation", request.provider, model);

        let credits_remaining = self
            .ledger
            .debit(owner_id, cost, CreditReason::Usage, &description)
            .await?;

        let new_generation = NewGeneration {
            owner_id,
            prompt: request.prompt.clone(),
            provider: request.provider.clone(),
            model,
            style: request.effective_style().map(str::to_string),
            credits_reserved: cost,
        };
        let record = match self.records.create(&new_generation).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(owner_id, error = %e, "Could not create generation record");
                self.refund(owner_id, None, cost).await;
                return Err(GenerationError::RecordStoreUnavailable(e.to_string()));
            }
        };

        tracing::info!(
            owner_id,
            generation_id = record.id,
            provider = %request.provider,
            model = %record.model,
            credits = cost,
            "Generation started",
        );

        let (task_id, output) = match self.run_on_provider(adapter.as_ref(), &record, request).await {
            Ok(done) => done,
            Err(failure) => return Err(self.settle_failure(&record, failure).await),
        };

        self.complete(&record, request, &task_id, output, credits_remaining)
            .await
    }

    async fn run_on_provider(
        &self,
        adapter: &dyn ProviderAdapter,
        record: &GenerationRecord,
        request: &GenerationRequest,
    ) -> Result<(String, OutputDescriptor), Failure> {
        let policy = adapter.poll_policy();
        let task = match tokio::time::timeout(policy.max_elapsed, adapter.submit(request)).await {
            Ok(submitted) => submitted.map_err(|e| Failure::provider("Submit failed", &e))?,
            Err(_) => {
                return Err(Failure::from_kind(
                    ProviderFailureKind::Timeout,
                    format!("Submit did not respond within {:?}", policy.max_elapsed),
                ));
            }
        };

        match self.records.mark_processing(record.id, &task.task_id).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                generation_id = record.id,
                "Generation was settled before the provider accepted it",
            ),
            Err(e) => tracing::warn!(
                generation_id = record.id,
                error = %e,
                "Could not mark generation processing",
            ),
        }
        tracing::debug!(
            generation_id = record.id,
            provider = adapter.name(),
            task_id = %task.task_id,
            "Provider accepted task",
        );

        let output = poll_until_terminal(adapter, &task, &policy)
            .await
            .map_err(Failure::poll)?;
        Ok((task.task_id, output))
    }

    async fn complete(
        &self,
        record: &GenerationRecord,
        request: &GenerationRequest,
        task_id: &str,
        output: OutputDescriptor,
        credits_remaining: i64,
    ) -> Result<GenerationResult, GenerationError> {
        let new_output = NewGenerationOutput {
            generation_id: record.id,
            owner_id: record.owner_id,
            url: output.url.clone(),
            width: i32::try_from(output.width).unwrap_or(i32::MAX),
            height: i32::try_from(output.height).unwrap_or(i32::MAX),
            model: output.model.clone(),
        };
        if let Err(e) = self.records.save_output(&new_output).await {
            let failure = Failure::store("Could not persist output", &e);
            return Err(self.settle_failure(record, failure).await);
        }

        let completed = match self.records.mark_completed(record.id).await {
            Ok(false) => self.complete_unprocessed(record.id, task_id).await,
            other => other,
        };
        match completed {
            Ok(true) => {}
            Ok(false) => {
                // Someone else failed and refunded this record while we
                // polled; the result is void.
                tracing::warn!(
                    generation_id = record.id,
                    "Generation finished after it was settled, discarding result",
                );
                return Err(GenerationError::Timeout {
                    message: ProviderFailureKind::Timeout.user_message().to_string(),
                });
            }
            Err(e) => {
                let failure = Failure::store("Could not mark generation completed", &e);
                return Err(self.settle_failure(record, failure).await);
            }
        }

        if !request.has_input_image() {
            let key = generation_cache_key(request);
            match serde_json::to_value(&output) {
                Ok(value) => {
                    if let Err(e) = self
                        .cache
                        .set(&key, value, self.config.result_cache_ttl)
                        .await
                    {
                        tracing::warn!(generation_id = record.id, error = %e, "Result cache write failed");
                    }
                }
                Err(e) => tracing::warn!(generation_id = record.id, error = %e, "Result not cacheable"),
            }
        }

        tracing::info!(
            owner_id = record.owner_id,
            generation_id = record.id,
            credits = record.credits_reserved,
            credits_remaining,
            "Generation completed",
        );
        self.events.publish(
            PlatformEvent::new(names::GENERATION_COMPLETED)
                .with_source("generation", record.id)
                .with_owner(record.owner_id)
                .with_payload(serde_json::json!({
                    "provider": record.provider,
                    "model": record.model,
                    "credits": record.credits_reserved,
                    "url": output.url,
                })),
        );

        Ok(GenerationResult {
            generation_id: record.id,
            output,
            credits_used: record.credits_reserved,
            credits_remaining,
        })
    }

    /// Completion for a record whose `Processing` transition was lost.
    /// A record that is already terminal stays untouched.
    async fn complete_unprocessed(&self, id: DbId, task_id: &str) -> Result<bool, StoreError> {
        match self.records.find(id).await? {
            Some(current) if current.status == GenerationStatus::Pending => {
                if !self.records.mark_processing(id, task_id).await? {
                    return Ok(false);
                }
                self.records.mark_completed(id).await
            }
            _ => Ok(false),
        }
    }

    // ---- settlement ----

    /// Mark the record failed and refund its debit, unless another path
    /// already settled it. Returns the caller-facing error.
    async fn settle_failure(&self, record: &GenerationRecord, failure: Failure) -> GenerationError {
        if failure.kind.is_service_side() {
            tracing::warn!(
                generation_id = record.id,
                error = %failure.technical,
                "Generation failed",
            );
        } else {
            tracing::error!(
                generation_id = record.id,
                error = %failure.technical,
                "Generation failed",
            );
        }

        match self.records.mark_failed(record.id, &failure.technical).await {
            Ok(true) => {
                self.refund(record.owner_id, Some(record.id), record.credits_reserved)
                    .await;
            }
            Ok(false) => tracing::info!(
                generation_id = record.id,
                "Generation already settled, skipping refund",
            ),
            Err(e) => {
                tracing::error!(
                    generation_id = record.id,
                    error = %e,
                    "Could not mark generation failed, refunding anyway",
                );
                if self
                    .refund(record.owner_id, Some(record.id), record.credits_reserved)
                    .await
                {
                    self.unmarked().insert(record.id);
                }
            }
        }

        self.publish_failed(record, &failure.technical, failure.error.code());
        failure.error
    }

    /// Credit back a debit. Returns whether the refund was written; a
    /// failed refund is escalated for manual reconciliation.
    async fn refund(&self, owner_id: DbId, generation_id: Option<DbId>, credits: i64) -> bool {
        let description = match generation_id {
            Some(id) => format!("Refund for failed generation {id}"),
            None => "Refund for failed generation".to_string(),
        };
        let source = generation_id.map_or_else(|| "-".to_string(), |id| id.to_string());

        match self
            .ledger
            .credit(owner_id, credits, CreditReason::Refund, &description)
            .await
        {
            Ok(balance) => {
                tracing::info!(owner_id, generation_id, credits, balance, "Credits refunded");
                self.events.publish(
                    PlatformEvent::new(names::CREDITS_REFUNDED)
                        .with_source("generation", source)
                        .with_owner(owner_id)
                        .with_payload(serde_json::json!({ "credits": credits, "balance": balance })),
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    target: "reconciliation",
                    owner_id,
                    generation_id,
                    credits,
                    error = %e,
                    "Refund failed, manual reconciliation required",
                );
                self.events.publish(
                    PlatformEvent::new(names::CREDITS_REFUND_FAILED)
                        .with_source("generation", source)
                        .with_owner(owner_id)
                        .with_payload(serde_json::json!({
                            "credits": credits,
                            "error": e.to_string(),
                        })),
                );
                false
            }
        }
    }

    fn publish_failed(&self, record: &GenerationRecord, error: &str, code: &str) {
        self.events.publish(
            PlatformEvent::new(names::GENERATION_FAILED)
                .with_source("generation", record.id)
                .with_owner(record.owner_id)
                .with_payload(serde_json::json!({
                    "provider": record.provider,
                    "model": record.model,
                    "code": code,
                    "error": error,
                })),
        );
    }

    // ---- asynchronous path ----

    fn enqueue(
        &self,
        owner_id: DbId,
        request: GenerationRequest,
        cost: i64,
        available: i64,
    ) -> Result<JobHandle, GenerationError> {
        let priority = request.priority.unwrap_or(
            if available > self.config.priority_balance_threshold {
                1
            } else {
                0
            },
        );
        let payload = serde_json::to_value(GenerationJob {
            owner_id,
            credits: cost,
            request,
        })
        .map_err(|e| GenerationError::Validation(format!("Request is not serialisable: {e}")))?;

        let job = self.queue.add(
            GENERATION_JOB_TYPE,
            payload,
            JobOptions {
                priority: Some(priority),
                max_attempts: Some(self.config.generation_max_attempts),
            },
        )?;

        tracing::info!(owner_id, job_id = %job.id, priority, credits = cost, "Generation queued");
        Ok(JobHandle {
            job_id: job.id,
            status: "queued".to_string(),
        })
    }

    // ---- helpers ----

    fn adapter_for(&self, provider: &str) -> Result<Arc<dyn ProviderAdapter>, GenerationError> {
        self.providers
            .get(provider)
            .ok_or_else(|| GenerationError::Validation(format!("Unknown provider: {provider}")))
    }

    async fn cached_output(&self, key: &str) -> Option<OutputDescriptor> {
        match self.cache.get(key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(output) => Some(output),
                Err(e) => {
                    tracing::debug!(key, error = %e, "Ignoring malformed cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Result cache read failed");
                None
            }
        }
    }

    fn unmarked(&self) -> std::sync::MutexGuard<'_, HashSet<DbId>> {
        self.refunded_unmarked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Job handler
// ---------------------------------------------------------------------------

/// Runs queued generations. Holds a weak reference so the queue does not
/// keep the orchestrator alive.
struct GenerationJobHandler {
    orchestrator: Weak<Orchestrator>,
}

#[async_trait]
impl JobHandler for GenerationJobHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        let orchestrator = self
            .orchestrator
            .upgrade()
            .context("generation orchestrator has shut down")?;
        let task: GenerationJob = serde_json::from_value(job.payload.clone())
            .context("invalid generation job payload")?;

        let result = orchestrator
            .execute(task.owner_id, &task.request, task.credits)
            .await?;
        Ok(serde_json::to_value(result)?)
    }
}
