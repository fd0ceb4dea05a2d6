//! University handlers. Reads are open; writes need a session.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use notedrop_domain::model::University;
use notedrop_storage::{DataStore, UniversityFilter};

use super::{ApiResult, JsonBadRequest};
use crate::auth::AuthUser;
use crate::errors::ApiError;
use crate::http::state::AppState;

#[derive(Debug, Serialize)]
pub struct UniversityResponse {
    pub id: i64,
    pub name: String,
}

impl From<University> for UniversityResponse {
    fn from(university: University) -> Self {
        Self {
            id: university.id,
            name: university.name,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UniversityListQuery {
    pub starts_with: Option<String>,
    pub contains: Option<String>,
    pub order_by: Option<String>,
}

pub async fn list_universities<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<UniversityListQuery>,
) -> ApiResult<Json<Vec<UniversityResponse>>> {
    let universities = state
        .storage
        .list_universities(&UniversityFilter {
            starts_with: query.starts_with,
            contains: query.contains,
            order_by: query.order_by,
        })
        .await?;
    Ok(Json(
        universities
            .into_iter()
            .map(UniversityResponse::from)
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CreateUniversityRequest {
    pub name: String,
}

pub async fn create_university<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(_): AuthUser,
    JsonBadRequest(body): JsonBadRequest<CreateUniversityRequest>,
) -> ApiResult<(StatusCode, Json<UniversityResponse>)> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name must not be empty."));
    }
    let university = state.storage.create_university(&body.name).await?;
    Ok((StatusCode::CREATED, Json(university.into())))
}

pub async fn get_university<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(university_id): Path<i64>,
) -> ApiResult<Json<UniversityResponse>> {
    let university = state.storage.get_university(university_id).await?;
    Ok(Json(university.into()))
}

pub async fn delete_university<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(_): AuthUser,
    Path(university_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.storage.delete_university(university_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
