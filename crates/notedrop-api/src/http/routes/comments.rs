//! Comment handlers. Authors edit their own; group moderators may also
//! remove comments on notes in their group.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use notedrop_domain::model::{Comment, MAX_COMMENT_LEN};
use notedrop_domain::policy::{AccessRequest, Target, Verb};
use notedrop_domain::Policy;
use notedrop_storage::DataStore;

use super::{authorize, validate_len, ApiResult, JsonBadRequest};
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::errors::ApiError;
use crate::http::state::AppState;

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: i64,
    pub author_id: i64,
    pub note_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Comment> for CommentResponse {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            author_id: comment.author_id,
            note_id: comment.note_id,
            text: comment.text,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

pub async fn list_comments<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path(note_id): Path<i64>,
) -> ApiResult<Json<Vec<CommentResponse>>> {
    let actor = user.map(|u| u.id);
    let req = AccessRequest::new(Verb::Get).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], actor, &req).await?;
    let comments = state.storage.list_comments(note_id).await?;
    Ok(Json(
        comments.into_iter().map(CommentResponse::from).collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

pub async fn create_comment<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(note_id): Path<i64>,
    JsonBadRequest(body): JsonBadRequest<CommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentResponse>)> {
    validate_len("text", &body.text, MAX_COMMENT_LEN)?;
    let req = AccessRequest::new(Verb::Post).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], Some(user.id), &req).await?;
    let comment = state
        .storage
        .create_comment(user.id, note_id, &body.text)
        .await?;
    Ok((StatusCode::CREATED, Json(comment.into())))
}

async fn comment_in_note<S: DataStore>(
    state: &AppState<S>,
    note_id: i64,
    comment_id: i64,
) -> ApiResult<Comment> {
    let comment = state.storage.get_comment(comment_id).await?;
    if comment.note_id != note_id {
        return Err(ApiError::not_found("Not found."));
    }
    Ok(comment)
}

pub async fn get_comment<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path((note_id, comment_id)): Path<(i64, i64)>,
) -> ApiResult<Json<CommentResponse>> {
    let actor = user.map(|u| u.id);
    let req = AccessRequest::new(Verb::Get).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], actor, &req).await?;
    let comment = comment_in_note(&state, note_id, comment_id).await?;
    Ok(Json(comment.into()))
}

pub async fn update_comment<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path((note_id, comment_id)): Path<(i64, i64)>,
    JsonBadRequest(body): JsonBadRequest<CommentRequest>,
) -> ApiResult<Json<CommentResponse>> {
    validate_len("text", &body.text, MAX_COMMENT_LEN)?;
    let req = AccessRequest::new(Verb::Patch).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], Some(user.id), &req).await?;
    let comment = comment_in_note(&state, note_id, comment_id).await?;
    let req = AccessRequest::new(Verb::Patch)
        .note(note_id)
        .target(Target::Comment(&comment));
    authorize(
        &state,
        &[Policy::IsAuthorOrModeratorOrReadOnly],
        Some(user.id),
        &req,
    )
    .await?;
    let comment = state.storage.update_comment(comment_id, &body.text).await?;
    Ok(Json(comment.into()))
}

pub async fn delete_comment<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path((note_id, comment_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let req = AccessRequest::new(Verb::Delete).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], Some(user.id), &req).await?;
    let comment = comment_in_note(&state, note_id, comment_id).await?;
    let req = AccessRequest::new(Verb::Delete)
        .note(note_id)
        .target(Target::Comment(&comment));
    authorize(
        &state,
        &[Policy::IsAuthorOrModeratorOrReadOnly],
        Some(user.id),
        &req,
    )
    .await?;
    state.storage.delete_comment(comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
