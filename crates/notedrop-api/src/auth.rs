//! Bearer-token authentication.
//!
//! Tokens are opaque ulids stored server-side next to the user they belong
//! to; passwords are argon2id PHC strings. Handlers receive the caller via
//! [`AuthUser`] (401 when missing or invalid) or [`MaybeAuthUser`] (absent
//! header means anonymous; the policy engine decides what anonymous may do).

use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use ulid::Ulid;

use notedrop_domain::model::User;
use notedrop_storage::DataStore;

use crate::errors::ApiError;
use crate::http::AppState;

/// Hashes a password into a PHC string.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::internal(format!("password hashing failed: {e}")))
}

/// Verifies a password against a stored PHC string.
///
/// An unparseable hash verifies as false rather than erroring; it denies
/// login the same way a wrong password does.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Generates a fresh opaque bearer token.
pub fn new_token() -> String {
    Ulid::new().to_string()
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(|t| t.trim().to_string())
}

/// Extractor for endpoints that require an authenticated caller.
pub struct AuthUser(pub User);

#[async_trait]
impl<S: DataStore> FromRequestParts<Arc<AppState<S>>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::unauthorized("Authentication required."))?;
        match state.storage.user_for_token(&token).await? {
            Some(user) => Ok(AuthUser(user)),
            None => Err(ApiError::unauthorized("Invalid token.")),
        }
    }
}

/// Extractor for endpoints that also serve anonymous callers.
///
/// A present but invalid token is still a 401; only a missing header is
/// anonymous.
pub struct MaybeAuthUser(pub Option<User>);

#[async_trait]
impl<S: DataStore> FromRequestParts<Arc<AppState<S>>> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeAuthUser(None));
        };
        match state.storage.user_for_token(&token).await? {
            Some(user) => Ok(MaybeAuthUser(Some(user))),
            None => Err(ApiError::unauthorized("Invalid token.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(new_token(), new_token());
    }
}
