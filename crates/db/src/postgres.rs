//! Postgres-backed implementations of the store ports.

use artgen_core::types::{DbId, Timestamp};
use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::credit::{DeltaOutcome, LedgerEntry, NewLedgerEntry};
use crate::models::generation::{
    GenerationFilter, GenerationOutput, GenerationPatch, GenerationRecord, GenerationStats,
    NewGeneration, NewGenerationOutput,
};
use crate::repositories::{CreditRepo, GenerationRepo};
use crate::store::{LedgerStore, RecordStore};
use crate::DbPool;

/// [`LedgerStore`] over the `credit_accounts` / `credit_entries` tables.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: DbPool,
}

impl PgLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn open_account(&self, owner_id: DbId) -> Result<(), StoreError> {
        CreditRepo::open_account(&self.pool, owner_id).await
    }

    async fn balance(&self, owner_id: DbId) -> Result<i64, StoreError> {
        CreditRepo::balance(&self.pool, owner_id).await
    }

    async fn apply_delta(&self, entry: &NewLedgerEntry) -> Result<DeltaOutcome, StoreError> {
        CreditRepo::apply_delta(&self.pool, entry).await
    }

    async fn entries(&self, owner_id: DbId, limit: i64) -> Result<Vec<LedgerEntry>, StoreError> {
        CreditRepo::entries(&self.pool, owner_id, limit).await
    }
}

/// [`RecordStore`] over the `generations` / `generation_outputs` tables.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: DbPool,
}

impl PgRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert(&self, input: &NewGeneration) -> Result<GenerationRecord, StoreError> {
        GenerationRepo::create(&self.pool, input).await
    }

    async fn update(
        &self,
        id: DbId,
        patch: &GenerationPatch,
    ) -> Result<Option<GenerationRecord>, StoreError> {
        GenerationRepo::update(&self.pool, id, patch).await
    }

    async fn find(&self, id: DbId) -> Result<Option<GenerationRecord>, StoreError> {
        GenerationRepo::find_by_id(&self.pool, id).await
    }

    async fn list_for_owner(
        &self,
        owner_id: DbId,
        filter: &GenerationFilter,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        GenerationRepo::list_for_owner(&self.pool, owner_id, filter).await
    }

    async fn list_stale(
        &self,
        older_than: Timestamp,
        limit: i64,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        GenerationRepo::list_stale(&self.pool, older_than, limit).await
    }

    async fn stats_for_owner(&self, owner_id: DbId) -> Result<GenerationStats, StoreError> {
        GenerationRepo::stats_for_owner(&self.pool, owner_id).await
    }

    async fn insert_output(
        &self,
        input: &NewGenerationOutput,
    ) -> Result<GenerationOutput, StoreError> {
        GenerationRepo::create_output(&self.pool, input).await
    }

    async fn outputs_for(&self, generation_id: DbId) -> Result<Vec<GenerationOutput>, StoreError> {
        GenerationRepo::outputs_for(&self.pool, generation_id).await
    }
}
