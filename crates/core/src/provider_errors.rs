//! Classification of provider failures into user-facing messages.
//!
//! Callers never see adapter internals. The full technical error goes to
//! the generation record and the logs; the caller gets one of these
//! provider-agnostic messages.

use serde::Serialize;

/// Broad cause of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFailureKind {
    /// 5xx from the provider.
    ServerError,
    /// 429 from the provider.
    RateLimited,
    /// 401/403: our credentials are wrong or revoked.
    Authentication,
    /// 400: the provider rejected the payload.
    BadRequest,
    /// Connection refused, DNS, reset.
    Network,
    /// The provider took longer than the polling budget.
    Timeout,
    /// The provider reported the task itself as failed.
    TaskFailed,
    Unknown,
}

impl ProviderFailureKind {
    /// Classify an HTTP status code returned by a provider.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            500..=599 => Self::ServerError,
            429 => Self::RateLimited,
            401 | 403 => Self::Authentication,
            400 => Self::BadRequest,
            _ => Self::Unknown,
        }
    }

    /// `true` when the failure is on the provider's side rather than a bug
    /// in our request. Such failures are logged at warn level.
    pub fn is_service_side(self) -> bool {
        matches!(
            self,
            Self::ServerError | Self::RateLimited | Self::Network | Self::Timeout
        )
    }

    /// Message shown to the caller.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::ServerError => {
                "The AI service is temporarily unavailable. Please try again later or use a different model."
            }
            Self::RateLimited => {
                "The AI service is experiencing high demand. Please wait a moment and try again."
            }
            Self::Authentication => {
                "The AI service is misconfigured. Please contact support or try a different model."
            }
            Self::BadRequest => {
                "The AI service rejected this request. Please adjust the prompt or settings and try again."
            }
            Self::Network => {
                "Unable to reach the AI service. Please try again shortly."
            }
            Self::Timeout => {
                "The AI service is taking too long to respond. Your credits have been refunded; please try again."
            }
            Self::TaskFailed => {
                "The AI service could not complete this generation. Your credits have been refunded."
            }
            Self::Unknown => {
                "An unexpected error occurred with the AI service. Please try again later."
            }
        }
    }
}
