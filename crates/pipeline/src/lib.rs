//! Generation orchestration.
//!
//! [`Orchestrator`] turns a generation request into a paid, recorded,
//! provider-backed result. It composes:
//!
//! - [`CreditLedger`]: affordability checks, debits, and refunds
//! - [`GenerationRecords`]: the generation record state machine
//! - [`CacheBackend`]: result and balance caching
//! - the provider registry and the generation job queue
//!
//! Every failure after a debit is settled exactly once: the record is
//! marked failed and the debit is refunded.

pub mod cache;
pub mod config;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod records;

pub use cache::{CacheBackend, CacheError, CacheStats, MemoryCache};
pub use config::PipelineConfig;
pub use error::{GenerationError, LedgerError};
pub use ledger::CreditLedger;
pub use orchestrator::{
    CachedResult, GenerateOutcome, GenerationMode, GenerationResult, JobHandle, JobStatusView,
    Orchestrator, OrchestratorDeps, GENERATION_JOB_TYPE,
};
pub use records::GenerationRecords;
