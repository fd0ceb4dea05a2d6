//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
///
/// Uniqueness and quota violations are store-level errors because the
/// store is the transaction boundary: the policy layer's pre-flight checks
/// give friendlier messages, but these variants are the authoritative
/// backstop under concurrency.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A row referenced by id does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A unique or unique-together constraint was violated.
    #[error("duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// An insert referenced a missing parent row.
    #[error("referenced {entity} does not exist: {key}")]
    MissingReference { entity: &'static str, key: String },

    /// Cumulative note file size would exceed the caller-supplied ceiling.
    #[error("storage quota exceeded (limit: {limit} bytes)")]
    QuotaExceeded { limit: u64 },

    /// The actor is at the caller-supplied membership ceiling.
    #[error("membership limit reached (limit: {limit})")]
    MembershipLimitReached { limit: usize },

    /// Invitation-accept without a matching pending invitation.
    #[error("no pending invitation for user {user_id} to group {group_id}")]
    InvitationMissing { group_id: i64, user_id: i64 },

    /// Inviting a user who already holds a membership.
    #[error("user {user_id} is already a member of group {group_id}")]
    AlreadyMember { group_id: i64, user_id: i64 },

    /// Invalid list filter (unknown order_by field and the like).
    #[error("invalid filter: {message}")]
    InvalidFilter { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    Internal { message: String },
}

impl StorageError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StorageError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn duplicate(entity: &'static str, key: impl ToString) -> Self {
        StorageError::Duplicate {
            entity,
            key: key.to_string(),
        }
    }

    pub fn missing_reference(entity: &'static str, key: impl ToString) -> Self {
        StorageError::MissingReference {
            entity,
            key: key.to_string(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
