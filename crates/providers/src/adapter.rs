//! The provider port: submit work, then poll a task handle until terminal.

use artgen_core::generation::{GenerationRequest, OutputDescriptor};
use artgen_core::polling::PollPolicy;
use artgen_core::provider_errors::ProviderFailureKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Handle for a task a provider has accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
    /// Provider-specific data the adapter needs again when polling.
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl TaskHandle {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            meta: serde_json::Value::Null,
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }
}

/// Result of one status check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Still running; check again later.
    Pending,
    Success(OutputDescriptor),
    /// The provider reports the task as failed.
    Failure(String),
}

/// Errors from talking to a provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The provider refused the submission outright.
    #[error("Provider rejected request: {0}")]
    Rejected(String),

    /// The provider answered with a body we could not interpret.
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Classify for the user-facing message.
    pub fn kind(&self) -> ProviderFailureKind {
        match self {
            ProviderError::Request(err) if err.is_timeout() => ProviderFailureKind::Timeout,
            ProviderError::Request(err) => match err.status() {
                Some(status) => ProviderFailureKind::from_http_status(status.as_u16()),
                None => ProviderFailureKind::Network,
            },
            ProviderError::Api { status, .. } => ProviderFailureKind::from_http_status(*status),
            ProviderError::Rejected(_) => ProviderFailureKind::BadRequest,
            ProviderError::Malformed(_) => ProviderFailureKind::Unknown,
        }
    }
}

/// A generation backend.
///
/// `submit` must return quickly with a task handle; long-running work is
/// observed through `poll`. Adapters are shared across workers, so they
/// must be `Send + Sync` and hold no per-task state.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry key, e.g. `"flux"`.
    fn name(&self) -> &str;

    /// Polling budget for this provider's tasks.
    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::default()
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<TaskHandle, ProviderError>;

    async fn poll(&self, task: &TaskHandle) -> Result<PollOutcome, ProviderError>;
}
