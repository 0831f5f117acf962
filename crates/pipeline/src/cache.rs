//! Key/value cache port and the in-process implementation.
//!
//! The cache is an optimisation only: callers treat every [`CacheError`] as
//! a miss and never rely on cached values for billing decisions that the
//! ledger re-validates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use artgen_core::cache_key::compile_glob;
use artgen_core::error::CoreError;
use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backing store could not be reached.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    InvalidPattern(#[from] CoreError),
}

/// A TTL key/value cache holding JSON values.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// The live value for `key`; expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration)
        -> Result<(), CacheError>;

    /// Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Delete every key matching a glob (`*` any run, `?` one character).
    /// Returns the number removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Hit/miss counters for a [`MemoryCache`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries currently held, including expired ones not yet evicted.
    pub entries: usize,
    pub hit_rate: f64,
}

/// In-process [`CacheBackend`]. Expired entries are evicted lazily on read
/// and in bulk by [`purge_expired`](MemoryCache::purge_expired).
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            entries: self.entries().len(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries();
        let value = match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "Cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "Cache miss");
        }
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries()
            .remove(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let matcher = compile_glob(pattern)?;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| !matcher.is_match(key));
        let removed = before - entries.len();
        tracing::debug!(pattern, removed, "Cache pattern delete");
        Ok(removed)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries().clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
