//! Ledger entry models (`credit_accounts`, `credit_entries` tables).

use artgen_core::credits::CreditReason;
use artgen_core::types::{DbId, Timestamp};
use serde::Serialize;

/// An immutable row from the `credit_entries` table.
///
/// `amount` is signed: negative for debits, positive for credits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub id: DbId,
    pub owner_id: DbId,
    pub amount: i64,
    pub reason: CreditReason,
    pub description: String,
    pub created_at: Timestamp,
}

/// A balance change to apply together with its ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub owner_id: DbId,
    /// Signed delta; a negative delta may not take the balance below zero.
    pub amount: i64,
    pub reason: CreditReason,
    pub description: String,
}

impl NewLedgerEntry {
    /// A debit of `amount` credits (stored as `-amount`).
    pub fn debit(owner_id: DbId, amount: i64, reason: CreditReason, description: impl Into<String>) -> Self {
        Self {
            owner_id,
            amount: -amount,
            reason,
            description: description.into(),
        }
    }

    /// A credit of `amount` credits.
    pub fn credit(owner_id: DbId, amount: i64, reason: CreditReason, description: impl Into<String>) -> Self {
        Self {
            owner_id,
            amount,
            reason,
            description: description.into(),
        }
    }
}

/// Result of [`LedgerStore::apply_delta`](crate::store::LedgerStore::apply_delta).
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaOutcome {
    /// Balance and entry were written together.
    Applied { new_balance: i64, entry: LedgerEntry },
    /// The debit would have taken the balance below zero; nothing was written.
    Insufficient { available: i64 },
}
