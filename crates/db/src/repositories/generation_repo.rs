//! Repository for the `generations` and `generation_outputs` tables.
//!
//! Status transitions are compare-and-set: the `UPDATE` only matches when
//! the current `status_id` is one of the patch's expected predecessors.

use artgen_core::error::CoreError;
use artgen_core::status::{GenerationStatus, StatusId};
use artgen_core::types::{DbId, Timestamp};
use sqlx::{FromRow, PgPool};

use crate::error::StoreError;
use crate::models::generation::{
    GenerationFilter, GenerationOutput, GenerationPatch, GenerationRecord, GenerationStats,
    NewGeneration, NewGenerationOutput,
};

/// Column list for `generations` queries.
const COLUMNS: &str = "\
    id, owner_id, prompt, provider, model, style, credits_reserved, \
    status_id, error, task_id, created_at, updated_at, completed_at";

/// Column list for `generation_outputs` queries.
const OUTPUT_COLUMNS: &str =
    "id, generation_id, owner_id, url, width, height, model, created_at";

#[derive(Debug, FromRow)]
struct GenerationRow {
    id: DbId,
    owner_id: DbId,
    prompt: String,
    provider: String,
    model: String,
    style: Option<String>,
    credits_reserved: i64,
    status_id: StatusId,
    error: Option<String>,
    task_id: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
    completed_at: Option<Timestamp>,
}

fn status_from_id(id: StatusId) -> Result<GenerationStatus, StoreError> {
    GenerationStatus::from_id(id).ok_or_else(|| {
        StoreError::Core(CoreError::Validation(format!(
            "Unknown generation status id: {id}"
        )))
    })
}

impl TryFrom<GenerationRow> for GenerationRecord {
    type Error = StoreError;

    fn try_from(row: GenerationRow) -> Result<Self, Self::Error> {
        Ok(GenerationRecord {
            id: row.id,
            owner_id: row.owner_id,
            prompt: row.prompt,
            provider: row.provider,
            model: row.model,
            style: row.style,
            credits_reserved: row.credits_reserved,
            status: status_from_id(row.status_id)?,
            error: row.error,
            task_id: row.task_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OutputRow {
    id: DbId,
    generation_id: DbId,
    owner_id: DbId,
    url: String,
    width: i32,
    height: i32,
    model: String,
    created_at: Timestamp,
}

impl From<OutputRow> for GenerationOutput {
    fn from(row: OutputRow) -> Self {
        GenerationOutput {
            id: row.id,
            generation_id: row.generation_id,
            owner_id: row.owner_id,
            url: row.url,
            width: row.width,
            height: row.height,
            model: row.model,
            created_at: row.created_at,
        }
    }
}

fn into_records(rows: Vec<GenerationRow>) -> Result<Vec<GenerationRecord>, StoreError> {
    rows.into_iter().map(GenerationRecord::try_from).collect()
}

/// Persistence for generation records and their outputs.
pub struct GenerationRepo;

impl GenerationRepo {
    /// Insert a new record in `Pending` status.
    pub async fn create(
        pool: &PgPool,
        input: &NewGeneration,
    ) -> Result<GenerationRecord, StoreError> {
        let query = format!(
            "INSERT INTO generations \
                (owner_id, prompt, provider, model, style, credits_reserved, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationRow>(&query)
            .bind(input.owner_id)
            .bind(&input.prompt)
            .bind(&input.provider)
            .bind(&input.model)
            .bind(&input.style)
            .bind(input.credits_reserved)
            .bind(GenerationStatus::Pending.id())
            .fetch_one(pool)
            .await?
            .try_into()
    }

    /// Apply `patch`. Returns `None` when no row matched the id and guard.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        patch: &GenerationPatch,
    ) -> Result<Option<GenerationRecord>, StoreError> {
        let expected: Vec<StatusId> = patch.expected.iter().map(|s| s.id()).collect();
        let query = format!(
            "UPDATE generations SET \
                status_id = COALESCE($2, status_id), \
                error = COALESCE($3, error), \
                task_id = COALESCE($4, task_id), \
                completed_at = CASE WHEN $5 THEN NOW() ELSE completed_at END, \
                updated_at = NOW() \
             WHERE id = $1 \
               AND (cardinality($6::SMALLINT[]) = 0 OR status_id = ANY($6)) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationRow>(&query)
            .bind(id)
            .bind(patch.status.map(|s| s.id()))
            .bind(&patch.error)
            .bind(&patch.task_id)
            .bind(patch.mark_completed_at)
            .bind(&expected)
            .fetch_optional(pool)
            .await?
            .map(GenerationRecord::try_from)
            .transpose()
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<GenerationRecord>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM generations WHERE id = $1");
        sqlx::query_as::<_, GenerationRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(GenerationRecord::try_from)
            .transpose()
    }

    /// An owner's records, newest first, with optional status/model filters.
    pub async fn list_for_owner(
        pool: &PgPool,
        owner_id: DbId,
        filter: &GenerationFilter,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM generations \
             WHERE owner_id = $1 \
               AND ($2::SMALLINT IS NULL OR status_id = $2) \
               AND ($3::TEXT IS NULL OR model = $3) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query_as::<_, GenerationRow>(&query)
            .bind(owner_id)
            .bind(filter.status.map(|s| s.id()))
            .bind(&filter.model)
            .bind(filter.effective_limit())
            .bind(filter.effective_offset())
            .fetch_all(pool)
            .await?;
        into_records(rows)
    }

    /// Non-terminal records created before `older_than`, oldest first.
    pub async fn list_stale(
        pool: &PgPool,
        older_than: Timestamp,
        limit: i64,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        let active: Vec<StatusId> = artgen_core::status::ACTIVE_GENERATION_STATUSES
            .iter()
            .map(|s| s.id())
            .collect();
        let query = format!(
            "SELECT {COLUMNS} FROM generations \
             WHERE status_id = ANY($1) AND created_at < $2 \
             ORDER BY created_at ASC, id ASC \
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, GenerationRow>(&query)
            .bind(&active)
            .bind(older_than)
            .bind(limit.max(0))
            .fetch_all(pool)
            .await?;
        into_records(rows)
    }

    pub async fn stats_for_owner(
        pool: &PgPool,
        owner_id: DbId,
    ) -> Result<GenerationStats, StoreError> {
        let groups: Vec<(StatusId, i64, i64)> = sqlx::query_as(
            "SELECT status_id, COUNT(*), COALESCE(SUM(credits_reserved), 0)::BIGINT \
             FROM generations \
             WHERE owner_id = $1 \
             GROUP BY status_id",
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await?;

        let mut stats = GenerationStats::default();
        for (status_id, count, credits) in groups {
            stats.record_group(status_from_id(status_id)?, count, credits);
        }
        Ok(stats)
    }

    pub async fn create_output(
        pool: &PgPool,
        input: &NewGenerationOutput,
    ) -> Result<GenerationOutput, StoreError> {
        let query = format!(
            "INSERT INTO generation_outputs \
                (generation_id, owner_id, url, width, height, model) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {OUTPUT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OutputRow>(&query)
            .bind(input.generation_id)
            .bind(input.owner_id)
            .bind(&input.url)
            .bind(input.width)
            .bind(input.height)
            .bind(&input.model)
            .fetch_one(pool)
            .await?;
        Ok(row.into())
    }

    pub async fn outputs_for(
        pool: &PgPool,
        generation_id: DbId,
    ) -> Result<Vec<GenerationOutput>, StoreError> {
        let query = format!(
            "SELECT {OUTPUT_COLUMNS} FROM generation_outputs \
             WHERE generation_id = $1 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, OutputRow>(&query)
            .bind(generation_id)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(GenerationOutput::from).collect())
    }
}
