//! Error mapping from the domain and storage layers to HTTP responses.
//!
//! All error bodies serialize as `{"message": "..."}`; the status code is
//! derived from an internal kind that never reaches the wire. A handful of
//! client-visible messages are fixed strings the frontend matches on, so
//! they live here as constants.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tracing::error;

use notedrop_domain::DomainError;
use notedrop_storage::StorageError;

/// Policy denial, also used when a storage backstop fires for a request a
/// policy should have rejected.
pub const MSG_FORBIDDEN: &str = "You do not have permission to perform this action.";
/// Cumulative file size over the actor's storage ceiling.
pub const MSG_QUOTA_EXCEEDED: &str = "Exceeded note size limit.";
/// Free-tier actor at the membership ceiling.
pub const MSG_GROUP_LIMIT: &str = "At the limit of three groups.";
/// The moderator's own membership cannot be removed.
pub const MSG_MODERATOR_MEMBERSHIP: &str = "Not allowed to remove moderator membership.";
/// A second overlapping subscription was requested.
pub const MSG_ACTIVE_SUBSCRIPTION: &str = "Already have active subscription.";
/// Invitation target already belongs to the group.
pub const MSG_ALREADY_MEMBER: &str = "User is already a member.";
/// Password change with a wrong current password.
pub const MSG_WRONG_PASSWORD: &str = "Wrong password.";

/// Internal classification of an API error, mapped to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    PayloadTooLarge,
    Internal,
}

impl ErrorKind {
    fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error response. Only `message` is serialized.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PayloadTooLarge, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.kind.status(), Json(self)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::NotFound { .. } => ApiError::not_found("Not found."),
            StorageError::Duplicate { entity, .. } => {
                ApiError::bad_request(format!("A {entity} with these fields already exists."))
            }
            StorageError::MissingReference { entity, .. } => {
                ApiError::bad_request(format!("Referenced {entity} does not exist."))
            }
            StorageError::QuotaExceeded { .. } => ApiError::forbidden(MSG_QUOTA_EXCEEDED),
            StorageError::MembershipLimitReached { .. } => ApiError::forbidden(MSG_GROUP_LIMIT),
            // The policy layer should have caught these; the store is the
            // race backstop and reports the same outcome.
            StorageError::InvitationMissing { .. } => ApiError::forbidden(MSG_FORBIDDEN),
            StorageError::AlreadyMember { .. } => ApiError::bad_request(MSG_ALREADY_MEMBER),
            StorageError::InvalidFilter { message } => ApiError::bad_request(message),
            StorageError::Internal { .. } => {
                error!("storage error: {err}");
                ApiError::internal("Internal server error.")
            }
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match &err {
            DomainError::Denied { policy } => {
                tracing::debug!(policy, "request denied");
                ApiError::forbidden(MSG_FORBIDDEN)
            }
            DomainError::StorageQuotaExceeded { .. } => ApiError::forbidden(MSG_QUOTA_EXCEEDED),
            DomainError::MembershipLimitReached { .. } => ApiError::forbidden(MSG_GROUP_LIMIT),
            DomainError::InvalidField { field, reason } => {
                ApiError::bad_request(format!("Invalid {field}: {reason}"))
            }
            DomainError::ReadFailed { message } => {
                error!("policy read failed: {message}");
                ApiError::internal("Internal server error.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_errors_map_to_403_with_fixed_message() {
        let err = ApiError::from(StorageError::QuotaExceeded { limit: 15_000_000 });
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.message, MSG_QUOTA_EXCEEDED);

        let err = ApiError::from(DomainError::MembershipLimitReached { limit: 3 });
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.message, MSG_GROUP_LIMIT);
    }

    #[test]
    fn denial_maps_to_403_without_leaking_the_policy_name() {
        let err = ApiError::from(DomainError::Denied {
            policy: "CanAccessNote",
        });
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(!err.message.contains("CanAccessNote"));
    }

    #[test]
    fn body_contains_only_the_message() {
        let err = ApiError::bad_request("Wrong password.");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({ "message": "Wrong password." }));
    }

    #[test]
    fn storage_not_found_maps_to_404() {
        let err = ApiError::from(StorageError::not_found("note", 9));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn already_member_backstop_maps_to_400() {
        let err = ApiError::from(StorageError::AlreadyMember {
            group_id: 1,
            user_id: 2,
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, MSG_ALREADY_MEMBER);
    }
}
