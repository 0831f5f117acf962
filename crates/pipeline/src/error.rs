//! Ledger and orchestration errors.

use artgen_core::types::DbId;
use artgen_db::StoreError;
use artgen_queue::QueueError;

/// Errors from [`CreditLedger`](crate::CreditLedger) operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientFunds { required: i64, available: i64 },

    /// The ledger store could not be reached. The outcome of a write that
    /// failed this way is unknown.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Credit amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("No credit account for owner {0}")]
    OwnerNotFound(DbId),
}

impl LedgerError {
    pub(crate) fn from_store(owner_id: DbId, err: StoreError) -> Self {
        if err.is_not_found() {
            LedgerError::OwnerNotFound(owner_id)
        } else {
            LedgerError::Unavailable(err.to_string())
        }
    }
}

/// Failures a generation request can end in.
///
/// Display strings are safe to show to the caller: provider failures carry
/// a provider-agnostic message, never the technical error.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },

    /// The provider failed; the debit has been refunded.
    #[error("{message}")]
    Provider { message: String },

    /// The provider did not finish within its polling budget; the debit has
    /// been refunded.
    #[error("{message}")]
    Timeout { message: String },

    /// The ledger could not be reached. No compensation is attempted.
    #[error("Credit ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Generation records unavailable: {0}")]
    RecordStoreUnavailable(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl GenerationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::Validation(_) => "VALIDATION_ERROR",
            GenerationError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            GenerationError::Provider { .. } => "PROVIDER_ERROR",
            GenerationError::Timeout { .. } => "PROVIDER_TIMEOUT",
            GenerationError::LedgerUnavailable(_) => "LEDGER_UNAVAILABLE",
            GenerationError::RecordStoreUnavailable(_) => "RECORD_STORE_UNAVAILABLE",
            GenerationError::Queue(_) => "QUEUE_ERROR",
        }
    }

    /// HTTP-equivalent status for API layers.
    pub fn status_code(&self) -> u16 {
        match self {
            GenerationError::Validation(_) => 400,
            GenerationError::InsufficientCredits { .. } => 402,
            GenerationError::Provider { .. } => 502,
            GenerationError::Timeout { .. } => 504,
            GenerationError::LedgerUnavailable(_)
            | GenerationError::RecordStoreUnavailable(_)
            | GenerationError::Queue(_) => 503,
        }
    }
}

impl From<LedgerError> for GenerationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                required,
                available,
            } => GenerationError::InsufficientCredits {
                required,
                available,
            },
            LedgerError::Unavailable(msg) => GenerationError::LedgerUnavailable(msg),
            LedgerError::InvalidAmount(_) | LedgerError::OwnerNotFound(_) => {
                GenerationError::Validation(err.to_string())
            }
        }
    }
}

impl From<StoreError> for GenerationError {
    fn from(err: StoreError) -> Self {
        GenerationError::RecordStoreUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artgen_core::error::CoreError;
    use assert_matches::assert_matches;

    #[test]
    fn codes_and_statuses() {
        let cases = [
            (GenerationError::Validation("x".into()), "VALIDATION_ERROR", 400),
            (
                GenerationError::InsufficientCredits {
                    required: 10,
                    available: 5,
                },
                "INSUFFICIENT_CREDITS",
                402,
            ),
            (
                GenerationError::Provider {
                    message: "m".into(),
                },
                "PROVIDER_ERROR",
                502,
            ),
            (
                GenerationError::Timeout {
                    message: "m".into(),
                },
                "PROVIDER_TIMEOUT",
                504,
            ),
            (
                GenerationError::LedgerUnavailable("down".into()),
                "LEDGER_UNAVAILABLE",
                503,
            ),
            (
                GenerationError::RecordStoreUnavailable("down".into()),
                "RECORD_STORE_UNAVAILABLE",
                503,
            ),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn insufficient_funds_maps_to_insufficient_credits() {
        let err: GenerationError = LedgerError::InsufficientFunds {
            required: 10,
            available: 5,
        }
        .into();
        assert_matches!(
            err,
            GenerationError::InsufficientCredits {
                required: 10,
                available: 5
            }
        );
    }

    #[test]
    fn store_not_found_is_owner_not_found() {
        let err = LedgerError::from_store(
            3,
            StoreError::Core(CoreError::NotFound {
                entity: "credit_account",
                id: 3,
            }),
        );
        assert_matches!(err, LedgerError::OwnerNotFound(3));

        let err = LedgerError::from_store(3, StoreError::Unavailable("timeout".into()));
        assert_matches!(err, LedgerError::Unavailable(_));
    }

    #[test]
    fn provider_message_is_displayed_verbatim() {
        let err = GenerationError::Provider {
            message: "The AI service is temporarily unavailable.".into(),
        };
        assert_eq!(err.to_string(), "The AI service is temporarily unavailable.");
    }
}
