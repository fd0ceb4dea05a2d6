//! Note handlers, for both the personal endpoint and group-scoped notes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use notedrop_domain::model::{average_rating, Note, MAX_TITLE_LEN};
use notedrop_domain::policy::{AccessRequest, Target, Verb};
use notedrop_domain::Policy;
use notedrop_storage::{DataStore, NewNote, NoteChanges, NoteFilter};

use super::{authorize, validate_len, ApiResult, JsonBadRequest};
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::http::state::AppState;

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub university_id: Option<i64>,
    pub course: String,
    pub group_id: Option<i64>,
    pub avg_rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NoteResponse {
    fn new(note: Note, avg_rating: f64) -> Self {
        Self {
            id: note.id,
            author_id: note.author_id,
            title: note.title,
            university_id: note.university_id,
            course: note.course,
            group_id: note.group_id,
            avg_rating,
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

/// Builds a response embedding the derived average rating.
pub(crate) async fn note_response<S: DataStore>(
    storage: &S,
    note: Note,
) -> ApiResult<NoteResponse> {
    let ratings = storage.list_ratings(note.id).await?;
    Ok(NoteResponse::new(note, average_rating(&ratings)))
}

async fn note_responses<S: DataStore>(storage: &S, notes: Vec<Note>) -> ApiResult<Vec<NoteResponse>> {
    let mut out = Vec::with_capacity(notes.len());
    for note in notes {
        out.push(note_response(storage, note).await?);
    }
    Ok(out)
}

#[derive(Debug, Default, Deserialize)]
pub struct NoteListQuery {
    pub username: Option<String>,
    pub title: Option<String>,
    pub university: Option<i64>,
    pub course: Option<String>,
    pub order_by: Option<String>,
}

impl NoteListQuery {
    fn into_filter(self, group: Option<Option<i64>>) -> NoteFilter {
        NoteFilter {
            username: self.username,
            title: self.title,
            university_id: self.university,
            course: self.course,
            group,
            order_by: self.order_by,
        }
    }
}

/// Lists public notes. The personal endpoint is pinned to group = null,
/// so the visibility question does not arise here.
pub async fn list_notes<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<NoteListQuery>,
) -> ApiResult<Json<Vec<NoteResponse>>> {
    let notes = state
        .storage
        .list_notes(&query.into_filter(Some(None)))
        .await?;
    Ok(Json(note_responses(state.storage.as_ref(), notes).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub title: String,
    pub course: String,
    pub university_id: Option<i64>,
}

pub async fn create_note<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    JsonBadRequest(body): JsonBadRequest<CreateNoteRequest>,
) -> ApiResult<(StatusCode, Json<NoteResponse>)> {
    validate_len("title", &body.title, MAX_TITLE_LEN)?;
    validate_len("course", &body.course, MAX_TITLE_LEN)?;
    let note = state
        .storage
        .create_note(NewNote {
            author_id: user.id,
            title: body.title,
            university_id: body.university_id,
            course: body.course,
            group_id: None,
        })
        .await?;
    info!(note_id = note.id, user_id = user.id, "note created");
    let response = note_response(state.storage.as_ref(), note).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_note<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path(note_id): Path<i64>,
) -> ApiResult<Json<NoteResponse>> {
    let actor = user.map(|u| u.id);
    // A nonexistent note denies like an inaccessible one; probing ids
    // does not reveal existence.
    let req = AccessRequest::new(Verb::Get).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], actor, &req).await?;
    let note = state.storage.get_note(note_id).await?;
    Ok(Json(note_response(state.storage.as_ref(), note).await?))
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub course: Option<String>,
    /// Absent field leaves the university untouched; explicit null clears it.
    #[serde(default, deserialize_with = "double_option")]
    pub university_id: Option<Option<i64>>,
}

pub async fn update_note<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(note_id): Path<i64>,
    JsonBadRequest(body): JsonBadRequest<UpdateNoteRequest>,
) -> ApiResult<Json<NoteResponse>> {
    let req = AccessRequest::new(Verb::Patch).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], Some(user.id), &req).await?;

    let note = state.storage.get_note(note_id).await?;
    let req = AccessRequest::new(Verb::Patch)
        .note(note_id)
        .target(Target::Note(&note));
    authorize(
        &state,
        &[Policy::IsAuthorOrModeratorOrReadOnly],
        Some(user.id),
        &req,
    )
    .await?;

    if let Some(title) = &body.title {
        validate_len("title", title, MAX_TITLE_LEN)?;
    }
    if let Some(course) = &body.course {
        validate_len("course", course, MAX_TITLE_LEN)?;
    }
    let note = state
        .storage
        .update_note(
            note_id,
            NoteChanges {
                title: body.title,
                course: body.course,
                university_id: body.university_id,
            },
        )
        .await?;
    Ok(Json(note_response(state.storage.as_ref(), note).await?))
}

pub async fn delete_note<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(note_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let req = AccessRequest::new(Verb::Delete).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], Some(user.id), &req).await?;

    let note = state.storage.get_note(note_id).await?;
    let req = AccessRequest::new(Verb::Delete)
        .note(note_id)
        .target(Target::Note(&note));
    authorize(
        &state,
        &[Policy::IsAuthorOrModeratorOrReadOnly],
        Some(user.id),
        &req,
    )
    .await?;

    state.storage.delete_note(note_id).await?;
    info!(note_id, user_id = user.id, "note deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_group_notes<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path(group_id): Path<i64>,
    Query(query): Query<NoteListQuery>,
) -> ApiResult<Json<Vec<NoteResponse>>> {
    let actor = user.map(|u| u.id);
    let req = AccessRequest::new(Verb::Get).group(group_id);
    authorize(&state, &[Policy::CanAccessGroup], actor, &req).await?;
    let notes = state
        .storage
        .list_notes(&query.into_filter(Some(Some(group_id))))
        .await?;
    Ok(Json(note_responses(state.storage.as_ref(), notes).await?))
}

pub async fn create_group_note<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(group_id): Path<i64>,
    JsonBadRequest(body): JsonBadRequest<CreateNoteRequest>,
) -> ApiResult<(StatusCode, Json<NoteResponse>)> {
    let req = AccessRequest::new(Verb::Post).group(group_id);
    authorize(&state, &[Policy::CanAccessGroup], Some(user.id), &req).await?;
    validate_len("title", &body.title, MAX_TITLE_LEN)?;
    validate_len("course", &body.course, MAX_TITLE_LEN)?;
    let note = state
        .storage
        .create_note(NewNote {
            author_id: user.id,
            title: body.title,
            university_id: body.university_id,
            course: body.course,
            group_id: Some(group_id),
        })
        .await?;
    info!(note_id = note.id, group_id, "group note created");
    let response = note_response(state.storage.as_ref(), note).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
