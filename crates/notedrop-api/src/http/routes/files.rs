//! Note file handlers.
//!
//! Uploads are raw request bodies; the caller-assigned slot and filename
//! travel as query parameters. Only the note's author may add or remove
//! files, and the cumulative size per note is capped by the author's
//! storage ceiling.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use notedrop_domain::model::{extension_allowed, NoteFile};
use notedrop_domain::policy::{AccessRequest, Verb};
use notedrop_domain::{quota, Policy};
use notedrop_storage::{DataStore, NewNoteFile};

use super::{actor_is_premium, authorize, ApiResult};
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::errors::ApiError;
use crate::http::state::AppState;

/// File metadata; content is served by the download endpoint.
#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub index: i64,
    pub filename: String,
    pub size: usize,
    pub created_at: DateTime<Utc>,
}

impl From<NoteFile> for FileResponse {
    fn from(file: NoteFile) -> Self {
        Self {
            index: file.index,
            filename: file.filename,
            size: file.content.len(),
            created_at: file.created_at,
        }
    }
}

pub async fn list_files<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path(note_id): Path<i64>,
) -> ApiResult<Json<Vec<FileResponse>>> {
    let actor = user.map(|u| u.id);
    let req = AccessRequest::new(Verb::Get).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], actor, &req).await?;
    let files = state.storage.list_note_files(note_id).await?;
    Ok(Json(files.into_iter().map(FileResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub index: i64,
    pub filename: String,
}

pub async fn upload_file<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(note_id): Path<i64>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<FileResponse>)> {
    let req = AccessRequest::new(Verb::Post).note(note_id);
    authorize(&state, &[Policy::IsNoteAuthor], Some(user.id), &req).await?;

    if !extension_allowed(&params.filename) {
        return Err(ApiError::bad_request(
            "Unsupported file extension. Allowed: pdf, png, jpg.",
        ));
    }
    if body.is_empty() {
        return Err(ApiError::bad_request("File must not be empty."));
    }

    // IsNoteAuthor holds, so the actor's tier is the note owner's tier.
    let premium = actor_is_premium(state.storage.as_ref(), user.id).await?;
    let limit = quota::storage_limit(premium);
    let file = state
        .storage
        .add_note_file(
            NewNoteFile {
                note_id,
                index: params.index,
                filename: params.filename,
                content: body.to_vec(),
            },
            limit,
        )
        .await?;
    info!(note_id, index = file.index, size = file.content.len(), "file uploaded");
    Ok((StatusCode::CREATED, Json(file.into())))
}

#[derive(Debug, Deserialize)]
pub struct ReplaceParams {
    pub filename: String,
}

/// Replaces the file already sitting at the slot; the old file's size no
/// longer counts against the ceiling.
pub async fn replace_file<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path((note_id, index)): Path<(i64, i64)>,
    Query(params): Query<ReplaceParams>,
    body: Bytes,
) -> ApiResult<Json<FileResponse>> {
    let req = AccessRequest::new(Verb::Put).note(note_id);
    authorize(&state, &[Policy::IsNoteAuthor], Some(user.id), &req).await?;

    if !extension_allowed(&params.filename) {
        return Err(ApiError::bad_request(
            "Unsupported file extension. Allowed: pdf, png, jpg.",
        ));
    }
    if body.is_empty() {
        return Err(ApiError::bad_request("File must not be empty."));
    }

    let premium = actor_is_premium(state.storage.as_ref(), user.id).await?;
    let limit = quota::storage_limit(premium);
    let file = state
        .storage
        .replace_note_file(
            NewNoteFile {
                note_id,
                index,
                filename: params.filename,
                content: body.to_vec(),
            },
            limit,
        )
        .await?;
    info!(note_id, index, size = file.content.len(), "file replaced");
    Ok(Json(file.into()))
}

pub async fn download_file<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path((note_id, index)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let actor = user.map(|u| u.id);
    let req = AccessRequest::new(Verb::Get).note(note_id);
    authorize(&state, &[Policy::CanAccessNote], actor, &req).await?;
    let file = state.storage.get_note_file(note_id, index).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.content,
    ))
}

pub async fn delete_file<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path((note_id, index)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let req = AccessRequest::new(Verb::Delete).note(note_id);
    authorize(&state, &[Policy::IsNoteAuthor], Some(user.id), &req).await?;
    state.storage.delete_note_file(note_id, index).await?;
    info!(note_id, index, "file deleted");
    Ok(StatusCode::NO_CONTENT)
}
