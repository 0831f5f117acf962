//! Domain errors shared by every artgen crate.

use crate::status::GenerationStatus;
use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A referenced owner account, generation, or output does not exist.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// Input rejected before any side effect. The message is shown to the
    /// caller as is.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The generation state machine forbids this move.
    #[error("Generation cannot move from {from} to {to}")]
    InvalidTransition {
        from: GenerationStatus,
        to: GenerationStatus,
    },
}
