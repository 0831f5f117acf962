//! Repository for the `credit_accounts` and `credit_entries` tables.
//!
//! Every balance change runs in one transaction with its ledger entry. The
//! non-negative balance guard lives in the `UPDATE` itself, so two
//! concurrent debits serialize on the account row.

use artgen_core::credits::CreditReason;
use artgen_core::error::CoreError;
use artgen_core::types::{DbId, Timestamp};
use sqlx::{FromRow, PgPool};

use crate::error::StoreError;
use crate::models::credit::{DeltaOutcome, LedgerEntry, NewLedgerEntry};

/// Column list for `credit_entries` queries.
const ENTRY_COLUMNS: &str = "id, owner_id, amount, reason, description, created_at";

#[derive(Debug, FromRow)]
struct EntryRow {
    id: DbId,
    owner_id: DbId,
    amount: i64,
    reason: String,
    description: String,
    created_at: Timestamp,
}

impl TryFrom<EntryRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(LedgerEntry {
            id: row.id,
            owner_id: row.owner_id,
            amount: row.amount,
            reason: row.reason.parse::<CreditReason>()?,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

/// Balance and ledger operations for credit accounts.
pub struct CreditRepo;

impl CreditRepo {
    /// Create a zero-balance account. No-op when one already exists.
    pub async fn open_account(pool: &PgPool, owner_id: DbId) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO credit_accounts (owner_id, balance) VALUES ($1, 0) \
             ON CONFLICT (owner_id) DO NOTHING",
        )
        .bind(owner_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn balance(pool: &PgPool, owner_id: DbId) -> Result<i64, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT balance FROM credit_accounts WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_optional(pool)
                .await?;
        row.map(|(balance,)| balance)
            .ok_or(StoreError::Core(CoreError::NotFound {
                entity: "credit_account",
                id: owner_id,
            }))
    }

    /// Apply a signed delta and append its entry in one transaction.
    pub async fn apply_delta(
        pool: &PgPool,
        input: &NewLedgerEntry,
    ) -> Result<DeltaOutcome, StoreError> {
        let mut tx = pool.begin().await?;

        let updated: Option<(i64,)> = sqlx::query_as(
            "UPDATE credit_accounts \
             SET balance = balance + $2, updated_at = NOW() \
             WHERE owner_id = $1 AND balance + $2 >= 0 \
             RETURNING balance",
        )
        .bind(input.owner_id)
        .bind(input.amount)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((new_balance,)) = updated else {
            let current: Option<(i64,)> =
                sqlx::query_as("SELECT balance FROM credit_accounts WHERE owner_id = $1")
                    .bind(input.owner_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return match current {
                Some((available,)) => Ok(DeltaOutcome::Insufficient { available }),
                None => Err(StoreError::Core(CoreError::NotFound {
                    entity: "credit_account",
                    id: input.owner_id,
                })),
            };
        };

        let query = format!(
            "INSERT INTO credit_entries (owner_id, amount, reason, description) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {ENTRY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EntryRow>(&query)
            .bind(input.owner_id)
            .bind(input.amount)
            .bind(input.reason.as_str())
            .bind(&input.description)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(DeltaOutcome::Applied {
            new_balance,
            entry: row.try_into()?,
        })
    }

    /// Most recent entries, newest first.
    pub async fn entries(
        pool: &PgPool,
        owner_id: DbId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM credit_entries \
             WHERE owner_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, EntryRow>(&query)
            .bind(owner_id)
            .bind(limit.max(0))
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
    }
}
