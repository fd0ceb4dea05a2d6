//! Favorites and abuse reports.
//!
//! Both are one-per-(user, target) rows; a duplicate POST is denied by the
//! AlreadyPosted policies with the store's unique check as backstop.
//! Reports are write-only from the API's perspective.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use notedrop_domain::model::Favorite;
use notedrop_domain::policy::{AccessRequest, Target, Verb};
use notedrop_domain::Policy;
use notedrop_storage::DataStore;

use super::{authorize, ApiResult};
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::errors::ApiError;
use crate::http::state::AppState;

#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    pub id: i64,
    pub user_id: i64,
    pub note_id: i64,
}

impl From<Favorite> for FavoriteResponse {
    fn from(favorite: Favorite) -> Self {
        Self {
            id: favorite.id,
            user_id: favorite.user_id,
            note_id: favorite.note_id,
        }
    }
}

pub async fn list_favorites<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path(note_id): Path<i64>,
) -> ApiResult<Json<Vec<FavoriteResponse>>> {
    let actor = user.map(|u| u.id);
    // GET passes for non-members too; favorite counts are not scoped.
    let req = AccessRequest::new(Verb::Get).note(note_id);
    authorize(&state, &[Policy::CanAccessFavorite], actor, &req).await?;
    let favorites = state.storage.list_favorites(note_id).await?;
    Ok(Json(
        favorites.into_iter().map(FavoriteResponse::from).collect(),
    ))
}

pub async fn create_favorite<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(note_id): Path<i64>,
) -> ApiResult<(StatusCode, Json<FavoriteResponse>)> {
    let req = AccessRequest::new(Verb::Post).note(note_id);
    authorize(
        &state,
        &[Policy::CanAccessFavorite, Policy::NotAlreadyFavorited],
        Some(user.id),
        &req,
    )
    .await?;
    let favorite = state.storage.create_favorite(user.id, note_id).await?;
    Ok((StatusCode::CREATED, Json(favorite.into())))
}

pub async fn delete_favorite<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path((note_id, favorite_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let favorite = state.storage.get_favorite(favorite_id).await?;
    if favorite.note_id != note_id {
        return Err(ApiError::not_found("Not found."));
    }
    let req = AccessRequest::new(Verb::Delete)
        .note(note_id)
        .target(Target::Favorite(&favorite));
    authorize(
        &state,
        &[Policy::CanAccessFavorite, Policy::IsAuthorOrReadOnly],
        Some(user.id),
        &req,
    )
    .await?;
    state.storage.delete_favorite(favorite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn report_note<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(note_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let req = AccessRequest::new(Verb::Post).note(note_id);
    authorize(
        &state,
        &[Policy::CanAccessNote, Policy::NotAlreadyReportedNote],
        Some(user.id),
        &req,
    )
    .await?;
    state.storage.create_note_report(user.id, note_id).await?;
    Ok(StatusCode::CREATED)
}

pub async fn report_comment<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(comment_id): Path<i64>,
) -> ApiResult<StatusCode> {
    // Reporting a comment requires access to the note it sits on.
    let comment = state.storage.get_comment(comment_id).await?;
    let req = AccessRequest::new(Verb::Post)
        .note(comment.note_id)
        .comment(comment_id);
    authorize(
        &state,
        &[Policy::CanAccessNote, Policy::NotAlreadyReportedComment],
        Some(user.id),
        &req,
    )
    .await?;
    state
        .storage
        .create_comment_report(user.id, comment_id)
        .await?;
    Ok(StatusCode::CREATED)
}
