//! Domain error types for policy and quota decisions.

use thiserror::Error;

/// Domain-specific errors.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A policy predicate evaluated to false.
    #[error("access denied by {policy}")]
    Denied { policy: &'static str },

    /// Cumulative file size would exceed the actor's storage ceiling.
    #[error("storage quota exceeded (limit: {limit} bytes)")]
    StorageQuotaExceeded { limit: u64 },

    /// Non-premium actor is at the free-tier group membership limit.
    #[error("group membership limit reached (limit: {limit})")]
    MembershipLimitReached { limit: usize },

    /// A field failed validation.
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The access reader could not resolve entity state.
    #[error("policy read failed: {message}")]
    ReadFailed { message: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
