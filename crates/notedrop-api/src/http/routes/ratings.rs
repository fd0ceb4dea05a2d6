//! Rating handlers. One rating per (author, note); scores in [0, 5].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use notedrop_domain::model::Rating;
use notedrop_domain::policy::{AccessRequest, Target, Verb};
use notedrop_domain::Policy;
use notedrop_storage::{DataStore, NewRating};

use super::{authorize, ApiResult, JsonBadRequest};
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::errors::ApiError;
use crate::http::state::AppState;

#[derive(Debug, Serialize)]
pub struct RatingResponse {
    pub id: i64,
    pub author_id: i64,
    pub note_id: i64,
    pub score: f64,
}

impl From<Rating> for RatingResponse {
    fn from(rating: Rating) -> Self {
        Self {
            id: rating.id,
            author_id: rating.author_id,
            note_id: rating.note_id,
            score: rating.score,
        }
    }
}

fn validate_score(score: f64) -> ApiResult<()> {
    if !(0.0..=5.0).contains(&score) {
        return Err(ApiError::bad_request("Score must be between 0 and 5."));
    }
    Ok(())
}

pub async fn list_ratings<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path(note_id): Path<i64>,
) -> ApiResult<Json<Vec<RatingResponse>>> {
    let actor = user.map(|u| u.id);
    let req = AccessRequest::new(Verb::Get).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], actor, &req).await?;
    let ratings = state.storage.list_ratings(note_id).await?;
    Ok(Json(ratings.into_iter().map(RatingResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub score: f64,
}

pub async fn create_rating<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(note_id): Path<i64>,
    JsonBadRequest(body): JsonBadRequest<RatingRequest>,
) -> ApiResult<(StatusCode, Json<RatingResponse>)> {
    validate_score(body.score)?;
    let req = AccessRequest::new(Verb::Post).note(note_id);
    authorize(
        &state,
        &[Policy::CanAccessNote, Policy::NotAlreadyRated],
        Some(user.id),
        &req,
    )
    .await?;
    let rating = state
        .storage
        .create_rating(NewRating {
            author_id: user.id,
            note_id,
            score: body.score,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(rating.into())))
}

/// Fetches a rating scoped to the route note; a mismatched pair is a 404.
async fn rating_in_note<S: DataStore>(
    state: &AppState<S>,
    note_id: i64,
    rating_id: i64,
) -> ApiResult<Rating> {
    let rating = state.storage.get_rating(rating_id).await?;
    if rating.note_id != note_id {
        return Err(ApiError::not_found("Not found."));
    }
    Ok(rating)
}

pub async fn get_rating<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path((note_id, rating_id)): Path<(i64, i64)>,
) -> ApiResult<Json<RatingResponse>> {
    let actor = user.map(|u| u.id);
    let req = AccessRequest::new(Verb::Get).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], actor, &req).await?;
    let rating = rating_in_note(&state, note_id, rating_id).await?;
    Ok(Json(rating.into()))
}

pub async fn update_rating<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path((note_id, rating_id)): Path<(i64, i64)>,
    JsonBadRequest(body): JsonBadRequest<RatingRequest>,
) -> ApiResult<Json<RatingResponse>> {
    validate_score(body.score)?;
    let req = AccessRequest::new(Verb::Patch).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], Some(user.id), &req).await?;
    let rating = rating_in_note(&state, note_id, rating_id).await?;
    let req = AccessRequest::new(Verb::Patch)
        .note(note_id)
        .target(Target::Rating(&rating));
    authorize(&state, &[Policy::IsAuthorOrReadOnly], Some(user.id), &req).await?;
    let rating = state.storage.update_rating(rating_id, body.score).await?;
    Ok(Json(rating.into()))
}

pub async fn delete_rating<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path((note_id, rating_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let req = AccessRequest::new(Verb::Delete).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], Some(user.id), &req).await?;
    let rating = rating_in_note(&state, note_id, rating_id).await?;
    let req = AccessRequest::new(Verb::Delete)
        .note(note_id)
        .target(Target::Rating(&rating));
    authorize(&state, &[Policy::IsAuthorOrReadOnly], Some(user.id), &req).await?;
    state.storage.delete_rating(rating_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
