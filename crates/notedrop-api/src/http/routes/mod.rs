//! Route definitions and handler modules.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequest, Request, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::error;

use chrono::Utc;
use notedrop_domain::model::UserId;
use notedrop_domain::policy::AccessRequest;
use notedrop_domain::{evaluate, quota, Policy};
use notedrop_storage::DataStore;

use super::state::AppState;
use crate::errors::ApiError;

mod comments;
mod files;
mod groups;
mod notes;
mod ratings;
mod social;
mod subscriptions;
mod universities;
mod users;

/// Custom JSON extractor that turns deserialization rejections into 400
/// Bad Request instead of axum's default 422, preserving 413 for body
/// limit overruns.
pub struct JsonBadRequest<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBadRequest<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBadRequest(value)),
            Err(rejection) => {
                let message = rejection.body_text();
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    Err(ApiError::payload_too_large(message))
                } else {
                    Err(ApiError::bad_request(message))
                }
            }
        }
    }
}

/// Default request body size limit; matches the premium storage ceiling
/// so a single permissible upload always fits.
pub const DEFAULT_BODY_LIMIT: usize = 50_000_000;

fn api_routes<S: DataStore>() -> Router<Arc<AppState<S>>> {
    Router::new()
        // Accounts and sessions
        .route("/login", post(users::login::<S>))
        .route(
            "/users",
            get(users::list_users::<S>).post(users::register::<S>),
        )
        .route(
            "/user",
            get(users::profile::<S>).delete(users::delete_account::<S>),
        )
        .route("/user/password", put(users::change_password::<S>))
        .route("/user/avatar", put(users::set_avatar::<S>))
        // Notes
        .route(
            "/notes",
            get(notes::list_notes::<S>).post(notes::create_note::<S>),
        )
        .route(
            "/notes/:note_id",
            get(notes::get_note::<S>)
                .patch(notes::update_note::<S>)
                .delete(notes::delete_note::<S>),
        )
        // Files
        .route(
            "/notes/:note_id/files",
            get(files::list_files::<S>).post(files::upload_file::<S>),
        )
        .route(
            "/notes/:note_id/files/:index",
            get(files::download_file::<S>)
                .put(files::replace_file::<S>)
                .delete(files::delete_file::<S>),
        )
        // Ratings
        .route(
            "/notes/:note_id/ratings",
            get(ratings::list_ratings::<S>).post(ratings::create_rating::<S>),
        )
        .route(
            "/notes/:note_id/ratings/:rating_id",
            get(ratings::get_rating::<S>)
                .patch(ratings::update_rating::<S>)
                .delete(ratings::delete_rating::<S>),
        )
        // Comments
        .route(
            "/notes/:note_id/comments",
            get(comments::list_comments::<S>).post(comments::create_comment::<S>),
        )
        .route(
            "/notes/:note_id/comments/:comment_id",
            get(comments::get_comment::<S>)
                .patch(comments::update_comment::<S>)
                .delete(comments::delete_comment::<S>),
        )
        // Favorites and reports
        .route(
            "/notes/:note_id/favorites",
            get(social::list_favorites::<S>).post(social::create_favorite::<S>),
        )
        .route(
            "/notes/:note_id/favorites/:favorite_id",
            delete(social::delete_favorite::<S>),
        )
        .route("/notes/:note_id/reports", post(social::report_note::<S>))
        .route(
            "/comments/:comment_id/reports",
            post(social::report_comment::<S>),
        )
        // Universities
        .route(
            "/universities",
            get(universities::list_universities::<S>).post(universities::create_university::<S>),
        )
        .route(
            "/universities/:university_id",
            get(universities::get_university::<S>).delete(universities::delete_university::<S>),
        )
        // Groups
        .route(
            "/groups",
            get(groups::list_groups::<S>).post(groups::create_group::<S>),
        )
        .route(
            "/groups/:group_id",
            get(groups::get_group::<S>)
                .patch(groups::update_group::<S>)
                .delete(groups::delete_group::<S>),
        )
        .route(
            "/groups/:group_id/notes",
            get(notes::list_group_notes::<S>).post(notes::create_group_note::<S>),
        )
        .route(
            "/groups/:group_id/memberships",
            get(groups::list_memberships::<S>).post(groups::join_group::<S>),
        )
        .route(
            "/groups/:group_id/memberships/:membership_id",
            delete(groups::delete_membership::<S>),
        )
        .route(
            "/groups/:group_id/invitations",
            get(groups::list_invitations::<S>).post(groups::create_invitation::<S>),
        )
        .route(
            "/invitations/:invitation_id",
            delete(groups::delete_invitation::<S>),
        )
        // Subscriptions
        .route(
            "/subscriptions",
            get(subscriptions::list_subscriptions::<S>)
                .post(subscriptions::create_subscription::<S>),
        )
}

/// Creates the HTTP router with the default body size limit.
pub fn create_router<S: DataStore>(state: AppState<S>) -> Router {
    create_router_with_body_limit(state, DEFAULT_BODY_LIMIT)
}

/// Creates the HTTP router with a custom body size limit.
pub fn create_router_with_body_limit<S: DataStore>(
    state: AppState<S>,
    body_limit: usize,
) -> Router {
    let shared_state = Arc::new(state);
    api_routes::<S>()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check::<S>))
        .with_state(shared_state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
}

/// Liveness probe; does not check dependencies.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness probe; verifies the storage backend answers reads.
async fn readiness_check<S: DataStore>(State(state): State<Arc<AppState<S>>>) -> impl IntoResponse {
    match state.storage.list_users(&Default::default()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "checks": { "storage": "ok" }
            })),
        ),
        Err(e) => {
            error!("readiness check failed: storage unavailable: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "checks": { "storage": "unavailable" }
                })),
            )
        }
    }
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;

/// Runs a predicate conjunction against the request, mapping a denial to
/// a 403 response.
pub(crate) async fn authorize<S: DataStore>(
    state: &AppState<S>,
    policies: &[Policy],
    actor: Option<UserId>,
    req: &AccessRequest<'_>,
) -> ApiResult<()> {
    evaluate(policies, actor, req, &state.reader).await?;
    Ok(())
}

/// Re-derives the actor's premium status from their subscriptions.
/// Never cached; expiry needs no background work this way.
pub(crate) async fn actor_is_premium<S: DataStore>(
    storage: &S,
    user_id: UserId,
) -> ApiResult<bool> {
    let subscriptions = storage.list_subscriptions(user_id).await?;
    Ok(quota::is_premium(&subscriptions, Utc::now()))
}

/// Rejects values over a character ceiling with a field-named 400.
pub(crate) fn validate_len(field: &str, value: &str, max: usize) -> ApiResult<()> {
    if value.chars().count() > max {
        return Err(ApiError::bad_request(format!(
            "{field} must be at most {max} characters."
        )));
    }
    Ok(())
}
