//! Orchestrator configuration loaded from environment variables.

use std::time::Duration;

use artgen_core::credits::PricingTable;
use artgen_core::job::DEFAULT_MAX_ATTEMPTS;
use artgen_queue::config::env_or;

/// Default name of the queue asynchronous generations run on.
pub const DEFAULT_GENERATION_QUEUE: &str = "generation";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How long a finished text-to-image result is served from cache.
    pub result_cache_ttl: Duration,
    /// How long a cached balance may answer affordability checks.
    pub balance_cache_ttl: Duration,
    /// Owners with more than this many credits get priority 1 on the
    /// generation queue when the request names no priority.
    pub priority_balance_threshold: i64,
    pub generation_queue: String,
    pub generation_max_attempts: u32,
    pub pricing: PricingTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            result_cache_ttl: Duration::from_secs(3600),
            balance_cache_ttl: Duration::from_secs(60),
            priority_balance_threshold: 100,
            generation_queue: DEFAULT_GENERATION_QUEUE.to_string(),
            generation_max_attempts: DEFAULT_MAX_ATTEMPTS,
            pricing: PricingTable::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default      |
    /// |------------------------------|--------------|
    /// | `RESULT_CACHE_TTL_SECS`      | `3600`       |
    /// | `BALANCE_CACHE_TTL_SECS`     | `60`         |
    /// | `PRIORITY_BALANCE_THRESHOLD` | `100`        |
    /// | `GENERATION_QUEUE`           | `generation` |
    /// | `GENERATION_MAX_ATTEMPTS`    | `3`          |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let generation_queue = std::env::var("GENERATION_QUEUE")
            .ok()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .unwrap_or(defaults.generation_queue);

        Self {
            result_cache_ttl: Duration::from_secs(env_or("RESULT_CACHE_TTL_SECS", 3600u64)),
            balance_cache_ttl: Duration::from_secs(env_or("BALANCE_CACHE_TTL_SECS", 60u64)),
            priority_balance_threshold: env_or(
                "PRIORITY_BALANCE_THRESHOLD",
                defaults.priority_balance_threshold,
            ),
            generation_queue,
            generation_max_attempts: env_or(
                "GENERATION_MAX_ATTEMPTS",
                defaults.generation_max_attempts,
            )
            .max(1),
            pricing: defaults.pricing,
        }
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_generation_max_attempts(mut self, max_attempts: u32) -> Self {
        self.generation_max_attempts = max_attempts.max(1);
        self
    }
}
