//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Resolve a database status ID back to the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Upper-case label as stored in the lookup table's `name` column.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// Lifecycle of a single generation attempt.
    GenerationStatus {
        Pending = 1 => "PENDING",
        Processing = 2 => "PROCESSING",
        Completed = 3 => "COMPLETED",
        Failed = 4 => "FAILED",
    }
}

/// Statuses a generation may still leave.
pub const ACTIVE_GENERATION_STATUSES: [GenerationStatus; 2] =
    [GenerationStatus::Pending, GenerationStatus::Processing];

impl GenerationStatus {
    /// `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// - `Pending -> Processing` once the provider accepts the task.
    /// - `Pending -> Failed` when submission is rejected.
    /// - `Processing -> Completed | Failed` on settlement.
    pub fn can_transition_to(self, next: GenerationStatus) -> bool {
        use GenerationStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }

    /// The statuses from which `next` may be entered.
    pub fn predecessors(next: GenerationStatus) -> Vec<GenerationStatus> {
        [Self::Pending, Self::Processing, Self::Completed, Self::Failed]
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    pub fn validate_transition(self, next: GenerationStatus) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_lookup() {
        for status in [
            GenerationStatus::Pending,
            GenerationStatus::Processing,
            GenerationStatus::Completed,
            GenerationStatus::Failed,
        ] {
            assert_eq!(GenerationStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(GenerationStatus::from_id(0), None);
        assert_eq!(GenerationStatus::from_id(5), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!GenerationStatus::Pending.is_terminal());
        assert!(!GenerationStatus::Processing.is_terminal());
        assert!(GenerationStatus::Completed.is_terminal());
        assert!(GenerationStatus::Failed.is_terminal());
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        for next in [
            GenerationStatus::Pending,
            GenerationStatus::Processing,
            GenerationStatus::Completed,
            GenerationStatus::Failed,
        ] {
            assert!(!GenerationStatus::Completed.can_transition_to(next));
            assert!(!GenerationStatus::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn pending_cannot_complete_directly() {
        assert!(GenerationStatus::Pending
            .validate_transition(GenerationStatus::Completed)
            .is_err());
    }

    #[test]
    fn predecessors_of_failed() {
        assert_eq!(
            GenerationStatus::predecessors(GenerationStatus::Failed),
            vec![GenerationStatus::Pending, GenerationStatus::Processing]
        );
        assert_eq!(
            GenerationStatus::predecessors(GenerationStatus::Completed),
            vec![GenerationStatus::Processing]
        );
    }

    #[test]
    fn serializes_as_upper_case_label() {
        let json = serde_json::to_string(&GenerationStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
        assert_eq!(GenerationStatus::Failed.to_string(), "FAILED");
    }
}
