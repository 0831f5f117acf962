//! Generation record service: the record state machine over a
//! [`RecordStore`].
//!
//! Every transition is a compare-and-set against the allowed predecessor
//! statuses, so settling a record twice is a harmless no-op that reports
//! `false`.

use std::sync::Arc;

use artgen_core::status::GenerationStatus;
use artgen_core::types::{DbId, Timestamp};
use artgen_db::models::generation::{
    GenerationFilter, GenerationOutput, GenerationPatch, GenerationRecord, GenerationStats,
    NewGeneration, NewGenerationOutput,
};
use artgen_db::{RecordStore, StoreError};

pub struct GenerationRecords {
    store: Arc<dyn RecordStore>,
}

impl GenerationRecords {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Insert a record in `Pending` status.
    pub async fn create(&self, input: &NewGeneration) -> Result<GenerationRecord, StoreError> {
        let record = self.store.insert(input).await?;
        tracing::debug!(
            generation_id = record.id,
            owner_id = record.owner_id,
            model = %record.model,
            "Generation record created",
        );
        Ok(record)
    }

    /// `Pending -> Processing` once the provider has accepted the task.
    pub async fn mark_processing(&self, id: DbId, task_id: &str) -> Result<bool, StoreError> {
        let patch = GenerationPatch::transition(GenerationStatus::Processing).with_task_id(task_id);
        self.apply(id, &patch).await
    }

    /// `Processing -> Completed`.
    pub async fn mark_completed(&self, id: DbId) -> Result<bool, StoreError> {
        self.apply(id, &GenerationPatch::transition(GenerationStatus::Completed))
            .await
    }

    /// Non-terminal -> `Failed`, keeping the technical error on the record.
    pub async fn mark_failed(&self, id: DbId, error: &str) -> Result<bool, StoreError> {
        let patch = GenerationPatch::transition(GenerationStatus::Failed).with_error(error);
        self.apply(id, &patch).await
    }

    pub async fn save_output(
        &self,
        input: &NewGenerationOutput,
    ) -> Result<GenerationOutput, StoreError> {
        self.store.insert_output(input).await
    }

    pub async fn outputs_for(&self, id: DbId) -> Result<Vec<GenerationOutput>, StoreError> {
        self.store.outputs_for(id).await
    }

    pub async fn find(&self, id: DbId) -> Result<Option<GenerationRecord>, StoreError> {
        self.store.find(id).await
    }

    pub async fn list_for_owner(
        &self,
        owner_id: DbId,
        filter: &GenerationFilter,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        self.store.list_for_owner(owner_id, filter).await
    }

    pub async fn stats_for_owner(&self, owner_id: DbId) -> Result<GenerationStats, StoreError> {
        self.store.stats_for_owner(owner_id).await
    }

    /// Records still `Pending` or `Processing` that were created before
    /// `older_than`.
    pub async fn list_stale(
        &self,
        older_than: Timestamp,
        limit: i64,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        self.store.list_stale(older_than, limit).await
    }

    async fn apply(&self, id: DbId, patch: &GenerationPatch) -> Result<bool, StoreError> {
        let updated = self.store.update(id, patch).await?;
        match &updated {
            Some(record) => tracing::debug!(
                generation_id = id,
                status = %record.status,
                "Generation status updated",
            ),
            None => tracing::debug!(
                generation_id = id,
                next_status = ?patch.status,
                "Generation transition skipped, record missing or already settled",
            ),
        }
        Ok(updated.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artgen_db::InMemoryRecordStore;

    fn new_generation() -> NewGeneration {
        NewGeneration {
            owner_id: 1,
            prompt: "a red fox".into(),
            provider: "flux".into(),
            model: "flux-pro".into(),
            style: None,
            credits_reserved: 10,
        }
    }

    #[tokio::test]
    async fn happy_path_transitions() {
        let records = GenerationRecords::new(Arc::new(InMemoryRecordStore::new()));
        let record = records.create(&new_generation()).await.unwrap();

        assert!(records.mark_processing(record.id, "task-1").await.unwrap());
        assert!(records.mark_completed(record.id).await.unwrap());

        let stored = records.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, GenerationStatus::Completed);
        assert_eq!(stored.task_id.as_deref(), Some("task-1"));
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn settling_twice_is_a_no_op() {
        let records = GenerationRecords::new(Arc::new(InMemoryRecordStore::new()));
        let record = records.create(&new_generation()).await.unwrap();

        assert!(records.mark_failed(record.id, "provider 500").await.unwrap());
        assert!(!records.mark_failed(record.id, "again").await.unwrap());
        assert!(!records.mark_completed(record.id).await.unwrap());

        let stored = records.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, GenerationStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("provider 500"));
    }

    #[tokio::test]
    async fn pending_can_fail_directly() {
        let records = GenerationRecords::new(Arc::new(InMemoryRecordStore::new()));
        let record = records.create(&new_generation()).await.unwrap();
        assert!(records.mark_failed(record.id, "submit refused").await.unwrap());
    }

    #[tokio::test]
    async fn pending_cannot_complete_without_processing() {
        let records = GenerationRecords::new(Arc::new(InMemoryRecordStore::new()));
        let record = records.create(&new_generation()).await.unwrap();
        assert!(!records.mark_completed(record.id).await.unwrap());
    }
}
