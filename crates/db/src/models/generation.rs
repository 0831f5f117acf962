//! Generation record and output models (`generations`, `generation_outputs`).

use artgen_core::status::GenerationStatus;
use artgen_core::types::{DbId, Timestamp};
use serde::Serialize;

/// Maximum page size for generation listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for generation listing.
pub const DEFAULT_LIMIT: i64 = 20;

/// A row from the `generations` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRecord {
    pub id: DbId,
    pub owner_id: DbId,
    pub prompt: String,
    pub provider: String,
    pub model: String,
    pub style: Option<String>,
    pub credits_reserved: i64,
    pub status: GenerationStatus,
    pub error: Option<String>,
    /// Provider task id once the provider has accepted the work.
    pub task_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// DTO for inserting a new generation in `Pending` status.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGeneration {
    pub owner_id: DbId,
    pub prompt: String,
    pub provider: String,
    pub model: String,
    pub style: Option<String>,
    pub credits_reserved: i64,
}

/// Partial update applied by [`RecordStore::update`](crate::store::RecordStore::update).
///
/// When `expected` is non-empty the update is a compare-and-set: it only
/// applies if the current status is one of `expected`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationPatch {
    pub status: Option<GenerationStatus>,
    pub error: Option<String>,
    pub task_id: Option<String>,
    /// Stamp `completed_at` with the current time.
    pub mark_completed_at: bool,
    pub expected: Vec<GenerationStatus>,
}

impl GenerationPatch {
    /// Move to `next`, guarded by the state machine's allowed predecessors.
    /// Terminal targets also stamp `completed_at`.
    pub fn transition(next: GenerationStatus) -> Self {
        Self {
            status: Some(next),
            mark_completed_at: next.is_terminal(),
            expected: GenerationStatus::predecessors(next),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Whether a record currently in `status` satisfies the guard.
    pub fn guard_allows(&self, status: GenerationStatus) -> bool {
        self.expected.is_empty() || self.expected.contains(&status)
    }
}

/// Filters for listing an owner's generations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationFilter {
    pub status: Option<GenerationStatus>,
    pub model: Option<String>,
    /// Maximum number of results. Defaults to 20, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

impl GenerationFilter {
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Whether `record` passes the status and model filters.
    pub fn matches(&self, record: &GenerationRecord) -> bool {
        self.status.map_or(true, |s| s == record.status)
            && self.model.as_deref().map_or(true, |m| m == record.model)
    }
}

/// Per-owner generation counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    /// Credits spent on completed generations.
    pub credits_used: i64,
}

impl GenerationStats {
    /// Fold one record into the counts.
    pub fn record(&mut self, status: GenerationStatus, credits_reserved: i64) {
        self.record_group(status, 1, credits_reserved);
    }

    /// Fold `count` records sharing `status` whose reservations sum to
    /// `credits_reserved`.
    pub fn record_group(&mut self, status: GenerationStatus, count: i64, credits_reserved: i64) {
        self.total += count;
        match status {
            GenerationStatus::Pending => self.pending += count,
            GenerationStatus::Processing => self.processing += count,
            GenerationStatus::Completed => {
                self.completed += count;
                self.credits_used += credits_reserved;
            }
            GenerationStatus::Failed => self.failed += count,
        }
    }
}

/// A row from the `generation_outputs` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOutput {
    pub id: DbId,
    pub generation_id: DbId,
    pub owner_id: DbId,
    pub url: String,
    pub width: i32,
    pub height: i32,
    pub model: String,
    pub created_at: Timestamp,
}

/// DTO for persisting a finished output.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGenerationOutput {
    pub generation_id: DbId,
    pub owner_id: DbId,
    pub url: String,
    pub width: i32,
    pub height: i32,
    pub model: String,
}
