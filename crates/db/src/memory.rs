//! In-memory store implementations.
//!
//! Used by tests and by single-process deployments without a database.
//! Each store guards its state with one mutex held only for the duration of
//! a synchronous update, which gives the same all-or-nothing behaviour as a
//! database transaction.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use artgen_core::credits::CreditReason;
use artgen_core::error::CoreError;
use artgen_core::status::GenerationStatus;
use artgen_core::types::{DbId, Timestamp};
use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::models::credit::{DeltaOutcome, LedgerEntry, NewLedgerEntry};
use crate::models::generation::{
    GenerationFilter, GenerationOutput, GenerationPatch, GenerationRecord, GenerationStats,
    NewGeneration, NewGenerationOutput,
};
use crate::store::{LedgerStore, RecordStore};

fn poisoned(store: &str) -> StoreError {
    StoreError::Unavailable(format!("{store} lock poisoned"))
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LedgerState {
    balances: HashMap<DbId, i64>,
    entries: Vec<LedgerEntry>,
    next_id: DbId,
}

/// In-memory [`LedgerStore`].
#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an account for `owner_id` funded with `balance` credits.
    ///
    /// The opening balance is written as a `BONUS` entry so the ledger sum
    /// still equals the balance.
    pub fn with_account(self, owner_id: DbId, balance: i64) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.balances.entry(owner_id).or_insert(0);
            if balance != 0 {
                let opening =
                    NewLedgerEntry::credit(owner_id, balance, CreditReason::Bonus, "Opening balance");
                if let Err(e) = Self::append(&mut state, &opening) {
                    tracing::warn!(owner_id, error = %e, "Opening balance not applied");
                }
            }
        }
        self
    }

    /// Every entry for `owner_id`, oldest first.
    pub fn all_entries(&self, owner_id: DbId) -> Vec<LedgerEntry> {
        self.state
            .lock()
            .map(|state| {
                state
                    .entries
                    .iter()
                    .filter(|e| e.owner_id == owner_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, StoreError> {
        self.state.lock().map_err(|_| poisoned("ledger"))
    }

    /// Apply an already-validated delta. Caller holds the lock. A delta
    /// that would overflow the balance leaves the state untouched.
    fn append(state: &mut LedgerState, input: &NewLedgerEntry) -> Result<(i64, LedgerEntry), StoreError> {
        let balance = state.balances.entry(input.owner_id).or_insert(0);
        let new_balance = balance.checked_add(input.amount).ok_or_else(|| {
            StoreError::Core(CoreError::Validation(format!(
                "Balance of owner {} cannot absorb {} credits",
                input.owner_id, input.amount
            )))
        })?;
        *balance = new_balance;

        state.next_id += 1;
        let entry = LedgerEntry {
            id: state.next_id,
            owner_id: input.owner_id,
            amount: input.amount,
            reason: input.reason,
            description: input.description.clone(),
            created_at: Utc::now(),
        };
        state.entries.push(entry.clone());
        Ok((new_balance, entry))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn open_account(&self, owner_id: DbId) -> Result<(), StoreError> {
        self.lock()?.balances.entry(owner_id).or_insert(0);
        Ok(())
    }

    async fn balance(&self, owner_id: DbId) -> Result<i64, StoreError> {
        self.lock()?
            .balances
            .get(&owner_id)
            .copied()
            .ok_or(StoreError::Core(CoreError::NotFound {
                entity: "credit_account",
                id: owner_id,
            }))
    }

    async fn apply_delta(&self, input: &NewLedgerEntry) -> Result<DeltaOutcome, StoreError> {
        let mut state = self.lock()?;
        let available = state
            .balances
            .get(&input.owner_id)
            .copied()
            .ok_or(StoreError::Core(CoreError::NotFound {
                entity: "credit_account",
                id: input.owner_id,
            }))?;

        if input.amount < 0 && available.checked_add(input.amount).map_or(true, |b| b < 0) {
            return Ok(DeltaOutcome::Insufficient { available });
        }

        let (new_balance, entry) = Self::append(&mut state, input)?;
        Ok(DeltaOutcome::Applied { new_balance, entry })
    }

    async fn entries(&self, owner_id: DbId, limit: i64) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .entries
            .iter()
            .rev()
            .filter(|e| e.owner_id == owner_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordState {
    records: HashMap<DbId, GenerationRecord>,
    outputs: Vec<GenerationOutput>,
    next_record_id: DbId,
    next_output_id: DbId,
}

/// In-memory [`RecordStore`].
#[derive(Default)]
pub struct InMemoryRecordStore {
    state: Mutex<RecordState>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, across all owners.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, RecordState>, StoreError> {
        self.state.lock().map_err(|_| poisoned("record"))
    }

    /// Rewrite a record's `created_at`. Lets tests age records.
    pub fn backdate(&self, id: DbId, created_at: Timestamp) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(record) = state.records.get_mut(&id) {
                record.created_at = created_at;
            }
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, input: &NewGeneration) -> Result<GenerationRecord, StoreError> {
        let mut state = self.lock()?;
        state.next_record_id += 1;
        let now = Utc::now();
        let record = GenerationRecord {
            id: state.next_record_id,
            owner_id: input.owner_id,
            prompt: input.prompt.clone(),
            provider: input.provider.clone(),
            model: input.model.clone(),
            style: input.style.clone(),
            credits_reserved: input.credits_reserved,
            status: GenerationStatus::Pending,
            error: None,
            task_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        state.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: DbId,
        patch: &GenerationPatch,
    ) -> Result<Option<GenerationRecord>, StoreError> {
        let mut state = self.lock()?;
        let Some(record) = state.records.get_mut(&id) else {
            return Ok(None);
        };
        if !patch.guard_allows(record.status) {
            return Ok(None);
        }

        let now = Utc::now();
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(error) = &patch.error {
            record.error = Some(error.clone());
        }
        if let Some(task_id) = &patch.task_id {
            record.task_id = Some(task_id.clone());
        }
        if patch.mark_completed_at {
            record.completed_at = Some(now);
        }
        record.updated_at = now;
        Ok(Some(record.clone()))
    }

    async fn find(&self, id: DbId) -> Result<Option<GenerationRecord>, StoreError> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    async fn list_for_owner(
        &self,
        owner_id: DbId,
        filter: &GenerationFilter,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        let state = self.lock()?;
        let mut records: Vec<GenerationRecord> = state
            .records
            .values()
            .filter(|r| r.owner_id == owner_id && filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(records
            .into_iter()
            .skip(filter.effective_offset() as usize)
            .take(filter.effective_limit() as usize)
            .collect())
    }

    async fn list_stale(
        &self,
        older_than: Timestamp,
        limit: i64,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        let state = self.lock()?;
        let mut records: Vec<GenerationRecord> = state
            .records
            .values()
            .filter(|r| !r.status.is_terminal() && r.created_at < older_than)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn stats_for_owner(&self, owner_id: DbId) -> Result<GenerationStats, StoreError> {
        let state = self.lock()?;
        let mut stats = GenerationStats::default();
        for record in state.records.values().filter(|r| r.owner_id == owner_id) {
            stats.record(record.status, record.credits_reserved);
        }
        Ok(stats)
    }

    async fn insert_output(
        &self,
        input: &NewGenerationOutput,
    ) -> Result<GenerationOutput, StoreError> {
        let mut state = self.lock()?;
        if !state.records.contains_key(&input.generation_id) {
            return Err(StoreError::Core(CoreError::NotFound {
                entity: "generation",
                id: input.generation_id,
            }));
        }
        state.next_output_id += 1;
        let output = GenerationOutput {
            id: state.next_output_id,
            generation_id: input.generation_id,
            owner_id: input.owner_id,
            url: input.url.clone(),
            width: input.width,
            height: input.height,
            model: input.model.clone(),
            created_at: Utc::now(),
        };
        state.outputs.push(output.clone());
        Ok(output)
    }

    async fn outputs_for(&self, generation_id: DbId) -> Result<Vec<GenerationOutput>, StoreError> {
        Ok(self
            .lock()?
            .outputs
            .iter()
            .filter(|o| o.generation_id == generation_id)
            .cloned()
            .collect())
    }
}
