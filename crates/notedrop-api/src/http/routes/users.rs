//! Account and session handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use notedrop_domain::model::User;
use notedrop_storage::{DataStore, NewUser, UserFilter};

use super::{ApiResult, JsonBadRequest};
use crate::auth::{self, AuthUser};
use crate::errors::{ApiError, MSG_WRONG_PASSWORD};
use crate::http::state::AppState;

/// User representation returned to clients. The password hash never
/// leaves the server.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            avatar: user.avatar,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
}

pub async fn register<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    JsonBadRequest(body): JsonBadRequest<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    if body.username.trim().is_empty() {
        return Err(ApiError::bad_request("Username must not be empty."));
    }
    if body.password.is_empty() {
        return Err(ApiError::bad_request("Password must not be empty."));
    }
    let password_hash = auth::hash_password(&body.password)?;
    let user = state
        .storage
        .create_user(NewUser {
            username: body.username,
            email: body.email,
            first_name: body.first_name,
            last_name: body.last_name,
            password_hash,
        })
        .await?;
    info!(user_id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

pub async fn login<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    JsonBadRequest(body): JsonBadRequest<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let user = state.storage.find_user_by_username(&body.username).await?;
    // One rejection path for unknown user and wrong password.
    let user = user
        .filter(|u| auth::verify_password(&body.password, &u.password_hash))
        .ok_or_else(|| ApiError::bad_request("Wrong username or password."))?;
    let token = auth::new_token();
    state.storage.insert_token(&token, user.id).await?;
    Ok(Json(TokenResponse { token }))
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub username: Option<String>,
}

/// Public like registration; the response shape hides credentials.
pub async fn list_users<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Json<Vec<UserResponse>>> {
    let users = state
        .storage
        .list_users(&UserFilter {
            username: query.username,
        })
        .await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

pub async fn profile<S: DataStore>(
    State(_state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<UserResponse>> {
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Changes the password, revokes every outstanding token, and hands back
/// a fresh one so the current session survives.
pub async fn change_password<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    JsonBadRequest(body): JsonBadRequest<ChangePasswordRequest>,
) -> ApiResult<Json<TokenResponse>> {
    if !auth::verify_password(&body.old_password, &user.password_hash) {
        return Err(ApiError::bad_request(MSG_WRONG_PASSWORD));
    }
    if body.new_password.is_empty() {
        return Err(ApiError::bad_request("Password must not be empty."));
    }
    let password_hash = auth::hash_password(&body.new_password)?;
    state
        .storage
        .set_password_hash(user.id, &password_hash)
        .await?;
    state.storage.revoke_tokens(user.id).await?;
    let token = auth::new_token();
    state.storage.insert_token(&token, user.id).await?;
    info!(user_id = user.id, "password changed, tokens rotated");
    Ok(Json(TokenResponse { token }))
}

#[derive(Debug, Deserialize)]
pub struct SetAvatarRequest {
    /// Empty string clears the avatar.
    pub avatar: String,
}

pub async fn set_avatar<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    JsonBadRequest(body): JsonBadRequest<SetAvatarRequest>,
) -> ApiResult<Json<UserResponse>> {
    state.storage.set_avatar(user.id, &body.avatar).await?;
    let user = state.storage.get_user(user.id).await?;
    Ok(Json(user.into()))
}

pub async fn delete_account<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> ApiResult<StatusCode> {
    state.storage.delete_user(user.id).await?;
    info!(user_id = user.id, "account deleted");
    Ok(StatusCode::NO_CONTENT)
}
