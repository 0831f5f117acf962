//! Credit ledger service.
//!
//! Wraps a [`LedgerStore`] with amount validation, a short-lived balance
//! cache for affordability checks, and logging. The cache only ever
//! answers "can this owner probably afford it"; the debit itself is
//! re-validated inside the store.

use std::sync::Arc;
use std::time::Duration;

use artgen_core::cache_key::balance_cache_key;
use artgen_core::credits::{self, Affordability, CreditReason};
use artgen_core::types::DbId;
use artgen_db::models::credit::{DeltaOutcome, LedgerEntry, NewLedgerEntry};
use artgen_db::LedgerStore;

use crate::cache::CacheBackend;
use crate::error::LedgerError;

pub struct CreditLedger {
    store: Arc<dyn LedgerStore>,
    cache: Arc<dyn CacheBackend>,
    balance_ttl: Duration,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn LedgerStore>, cache: Arc<dyn CacheBackend>, balance_ttl: Duration) -> Self {
        Self {
            store,
            cache,
            balance_ttl,
        }
    }

    /// Create a zero-balance account if none exists.
    pub async fn open_account(&self, owner_id: DbId) -> Result<(), LedgerError> {
        self.store
            .open_account(owner_id)
            .await
            .map_err(|e| LedgerError::from_store(owner_id, e))
    }

    /// Whether `owner_id` can cover `required`. Never mutates the balance.
    pub async fn check_affordability(
        &self,
        owner_id: DbId,
        required: i64,
    ) -> Result<Affordability, LedgerError> {
        if required < 0 {
            return Err(LedgerError::InvalidAmount(required));
        }
        let available = self.cached_balance(owner_id).await?;
        Ok(credits::check_affordability(available, required))
    }

    /// Take `amount` credits. Fails with `InsufficientFunds` when the
    /// balance does not cover it at the moment of the write.
    pub async fn debit(
        &self,
        owner_id: DbId,
        amount: i64,
        reason: CreditReason,
        description: &str,
    ) -> Result<i64, LedgerError> {
        validate(amount)?;
        let entry = NewLedgerEntry::debit(owner_id, amount, reason, description);
        let outcome = self
            .store
            .apply_delta(&entry)
            .await
            .map_err(|e| LedgerError::from_store(owner_id, e))?;
        self.invalidate(owner_id).await;

        match outcome {
            DeltaOutcome::Applied { new_balance, .. } => {
                tracing::info!(owner_id, credits = amount, %reason, new_balance, "Credits debited");
                Ok(new_balance)
            }
            DeltaOutcome::Insufficient { available } => {
                tracing::info!(owner_id, credits = amount, available, "Debit rejected, insufficient credits");
                Err(LedgerError::InsufficientFunds {
                    required: amount,
                    available,
                })
            }
        }
    }

    /// Add `amount` credits.
    pub async fn credit(
        &self,
        owner_id: DbId,
        amount: i64,
        reason: CreditReason,
        description: &str,
    ) -> Result<i64, LedgerError> {
        validate(amount)?;
        let entry = NewLedgerEntry::credit(owner_id, amount, reason, description);
        let outcome = self
            .store
            .apply_delta(&entry)
            .await
            .map_err(|e| LedgerError::from_store(owner_id, e))?;
        self.invalidate(owner_id).await;

        match outcome {
            DeltaOutcome::Applied { new_balance, .. } => {
                tracing::info!(owner_id, credits = amount, %reason, new_balance, "Credits added");
                Ok(new_balance)
            }
            // A positive delta cannot overdraw; a store that says otherwise
            // is misbehaving.
            DeltaOutcome::Insufficient { available } => Err(LedgerError::Unavailable(format!(
                "store rejected a credit of {amount} (available {available})"
            ))),
        }
    }

    /// Authoritative balance, bypassing the cache.
    pub async fn balance(&self, owner_id: DbId) -> Result<i64, LedgerError> {
        self.store
            .balance(owner_id)
            .await
            .map_err(|e| LedgerError::from_store(owner_id, e))
    }

    /// Most recent ledger entries, newest first.
    pub async fn history(&self, owner_id: DbId, limit: i64) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.store
            .entries(owner_id, limit)
            .await
            .map_err(|e| LedgerError::from_store(owner_id, e))
    }

    // ---- private helpers ----

    async fn cached_balance(&self, owner_id: DbId) -> Result<i64, LedgerError> {
        let key = balance_cache_key(owner_id);
        match self.cache.get(&key).await {
            Ok(Some(value)) => {
                if let Some(balance) = value.as_i64() {
                    return Ok(balance);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(owner_id, error = %e, "Balance cache read failed"),
        }

        let balance = self.balance(owner_id).await?;
        if let Err(e) = self
            .cache
            .set(&key, serde_json::json!(balance), self.balance_ttl)
            .await
        {
            tracing::warn!(owner_id, error = %e, "Balance cache write failed");
        }
        Ok(balance)
    }

    async fn invalidate(&self, owner_id: DbId) {
        if let Err(e) = self.cache.delete(&balance_cache_key(owner_id)).await {
            tracing::warn!(owner_id, error = %e, "Balance cache invalidation failed");
        }
    }
}

fn validate(amount: i64) -> Result<(), LedgerError> {
    credits::validate_amount(amount).map_err(|_| LedgerError::InvalidAmount(amount))
}
