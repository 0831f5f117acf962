//! Storage ports consumed by the orchestration core.

use artgen_core::types::{DbId, Timestamp};
use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::credit::{DeltaOutcome, LedgerEntry, NewLedgerEntry};
use crate::models::generation::{
    GenerationFilter, GenerationOutput, GenerationPatch, GenerationRecord, GenerationStats,
    NewGeneration, NewGenerationOutput,
};

/// Durable account balances plus the immutable ledger that explains them.
///
/// Implementations must apply a balance change and its entry atomically:
/// either both are written or neither is. A negative delta that would take
/// the balance below zero must be rejected inside the same atomic step, so
/// two concurrent debits can never both pass a balance that covers one.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create a zero-balance account for `owner_id` if none exists.
    async fn open_account(&self, owner_id: DbId) -> Result<(), StoreError>;

    /// Current balance of `owner_id`.
    async fn balance(&self, owner_id: DbId) -> Result<i64, StoreError>;

    /// Apply `entry.amount` to the balance and append `entry` to the ledger.
    async fn apply_delta(&self, entry: &NewLedgerEntry) -> Result<DeltaOutcome, StoreError>;

    /// Most recent entries for `owner_id`, newest first.
    async fn entries(&self, owner_id: DbId, limit: i64) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// Durable generation records and their outputs.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record in `Pending` status.
    async fn insert(&self, input: &NewGeneration) -> Result<GenerationRecord, StoreError>;

    /// Apply `patch`. Returns `None` when the record does not exist or its
    /// current status does not satisfy the patch's guard.
    async fn update(
        &self,
        id: DbId,
        patch: &GenerationPatch,
    ) -> Result<Option<GenerationRecord>, StoreError>;

    async fn find(&self, id: DbId) -> Result<Option<GenerationRecord>, StoreError>;

    /// An owner's records, newest first.
    async fn list_for_owner(
        &self,
        owner_id: DbId,
        filter: &GenerationFilter,
    ) -> Result<Vec<GenerationRecord>, StoreError>;

    /// Non-terminal records created before `older_than`, oldest first.
    async fn list_stale(
        &self,
        older_than: Timestamp,
        limit: i64,
    ) -> Result<Vec<GenerationRecord>, StoreError>;

    async fn stats_for_owner(&self, owner_id: DbId) -> Result<GenerationStats, StoreError>;

    async fn insert_output(
        &self,
        input: &NewGenerationOutput,
    ) -> Result<GenerationOutput, StoreError>;

    async fn outputs_for(&self, generation_id: DbId) -> Result<Vec<GenerationOutput>, StoreError>;
}
