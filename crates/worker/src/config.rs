use std::time::Duration;

use artgen_providers::HttpProviderConfig;
use artgen_queue::config::env_or;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Worker process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Postgres URL. In-memory stores are used when absent.
    pub database_url: Option<String>,
    /// HTTP task providers to register.
    pub providers: Vec<HttpProviderConfig>,
    pub log_format: LogFormat,
    /// How often stale generations are reaped.
    pub reap_interval: Duration,
    /// Age after which a non-terminal generation counts as abandoned.
    pub stale_after: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default  |
    /// |------------------------------|----------|
    /// | `DATABASE_URL`               | unset    |
    /// | `PROVIDERS`                  | empty    |
    /// | `PROVIDER_{NAME}_SUBMIT_URL` | required |
    /// | `PROVIDER_{NAME}_STATUS_URL` | required |
    /// | `PROVIDER_{NAME}_API_KEY`    | unset    |
    /// | `LOG_FORMAT`                 | `pretty` |
    /// | `REAP_INTERVAL_SECS`         | `60`     |
    /// | `STALE_GENERATION_SECS`      | `900`    |
    pub fn from_env() -> Self {
        let lookup = |key: &str| std::env::var(key).ok();
        Self {
            database_url: non_empty(lookup("DATABASE_URL")),
            providers: providers_from(lookup),
            log_format: lookup("LOG_FORMAT")
                .map(|raw| LogFormat::parse(&raw))
                .unwrap_or_default(),
            reap_interval: Duration::from_secs(env_or("REAP_INTERVAL_SECS", 60u64).max(1)),
            stale_after: Duration::from_secs(env_or("STALE_GENERATION_SECS", 900u64)),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `PROVIDERS` and each provider's `PROVIDER_{NAME}_*` variables.
/// Providers missing an endpoint are skipped with a warning.
pub fn providers_from(lookup: impl Fn(&str) -> Option<String>) -> Vec<HttpProviderConfig> {
    let Some(names) = lookup("PROVIDERS") else {
        return Vec::new();
    };

    names
        .split(',')
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .filter_map(|name| {
            let prefix = format!("PROVIDER_{}", name.to_uppercase().replace('-', "_"));
            let submit_url = non_empty(lookup(&format!("{prefix}_SUBMIT_URL")));
            let status_url = non_empty(lookup(&format!("{prefix}_STATUS_URL")));

            let (Some(submit_url), Some(status_url)) = (submit_url, status_url) else {
                tracing::warn!(provider = %name, "Provider is missing its submit or status URL, skipping");
                return None;
            };

            let config = HttpProviderConfig::new(name, submit_url, status_url);
            Some(match non_empty(lookup(&format!("{prefix}_API_KEY"))) {
                Some(key) => config.with_api_key(key),
                None => config,
            })
        })
        .collect()
}
