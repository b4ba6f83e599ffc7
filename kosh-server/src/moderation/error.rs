//! Error taxonomy for the moderation engine.
//!
//! Every failure crosses the service boundary as a typed value, never a
//! panic. Callers branch on [`ModerationError::kind`], a stable string that
//! also travels over the wire; messages are for humans only.

use kosh_core::{CorrectionType, EntityKind, UserId};
use std::fmt;

/// All the ways a moderation operation can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationError {
    /// The referenced entity or report does not exist.
    NotFound { kind: EntityKind, id: String },
    /// A report with the given ID does not exist.
    ReportNotFound { id: String },
    /// The caller lacks the admin role for a privileged operation.
    PermissionDenied { user: UserId },
    /// The contributor/proposer attempted to vote on their own entity.
    SelfVote { user: UserId },
    /// The user already has an entry in this entity's vote ledger.
    AlreadyVoted { user: UserId },
    /// The entity is terminal or in the wrong stage for this operation.
    InvalidStateForOperation {
        status: String,
        operation: &'static str,
    },
    /// A required field was missing or malformed.
    Validation { message: String },
    /// The correction's snapshot no longer matches the live word value.
    ApplyConflict {
        field: CorrectionType,
        expected: String,
        found: String,
    },
    /// The correction was already applied; a word is mutated at most once
    /// per correction.
    AlreadyApplied,
    /// Optimistic transaction retries were exhausted under contention.
    Conflict { retries: u32 },
    /// The storage backend failed.
    Storage {
        operation: &'static str,
        message: String,
    },
}

impl ModerationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable kind, used by callers and on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::ReportNotFound { .. } => "not_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::SelfVote { .. } => "self_vote",
            Self::AlreadyVoted { .. } => "already_voted",
            Self::InvalidStateForOperation { .. } => "invalid_state_for_operation",
            Self::Validation { .. } => "validation_error",
            Self::ApplyConflict { .. } => "apply_conflict",
            Self::AlreadyApplied => "already_applied",
            Self::Conflict { .. } => "conflict",
            Self::Storage { .. } => "storage_error",
        }
    }
}

impl fmt::Display for ModerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { kind, id } => write!(f, "{} {} not found", kind, id),
            Self::ReportNotFound { id } => write!(f, "report {} not found", id),
            Self::PermissionDenied { user } => {
                write!(f, "user {} lacks the admin role", user)
            }
            Self::SelfVote { user } => {
                write!(f, "user {} cannot vote on their own entry", user)
            }
            Self::AlreadyVoted { user } => {
                write!(f, "user {} has already voted on this entry", user)
            }
            Self::InvalidStateForOperation { status, operation } => {
                write!(f, "cannot {} an entity in state {}", operation, status)
            }
            Self::Validation { message } => write!(f, "validation failed: {}", message),
            Self::ApplyConflict {
                field,
                expected,
                found,
            } => write!(
                f,
                "cannot apply correction to {}: expected {:?}, live value is {:?}",
                field, expected, found
            ),
            Self::AlreadyApplied => write!(f, "correction was already applied"),
            Self::Conflict { retries } => {
                write!(f, "transaction conflicted {} times; giving up", retries)
            }
            Self::Storage { operation, message } => {
                write!(f, "storage failure during {}: {}", operation, message)
            }
        }
    }
}

impl std::error::Error for ModerationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_is_stable() {
        let err = ModerationError::SelfVote {
            user: UserId::from("u1"),
        };
        assert_eq!(err.kind(), "self_vote");

        let err = ModerationError::Conflict { retries: 5 };
        assert_eq!(err.kind(), "conflict");

        let err = ModerationError::not_found(EntityKind::Word, "abc");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_display_messages() {
        let err = ModerationError::InvalidStateForOperation {
            status: "approved".to_string(),
            operation: "vote on",
        };
        assert_eq!(format!("{}", err), "cannot vote on an entity in state approved");

        let err = ModerationError::AlreadyApplied;
        assert_eq!(format!("{}", err), "correction was already applied");
    }
}
