//! Premium subscription handlers. A subscription runs 30 days from
//! purchase; only one may be active at a time.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use notedrop_domain::model::Subscription;
use notedrop_domain::quota;
use notedrop_storage::DataStore;

use super::ApiResult;
use crate::auth::AuthUser;
use crate::errors::{ApiError, MSG_ACTIVE_SUBSCRIPTION};
use crate::http::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub id: i64,
    pub user_id: i64,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(subscription: Subscription) -> Self {
        Self {
            id: subscription.id,
            user_id: subscription.user_id,
            starts_at: subscription.starts_at,
            expires_at: subscription.expires_at,
        }
    }
}

pub async fn list_subscriptions<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<SubscriptionResponse>>> {
    let subscriptions = state.storage.list_subscriptions(user.id).await?;
    Ok(Json(
        subscriptions
            .into_iter()
            .map(SubscriptionResponse::from)
            .collect(),
    ))
}

pub async fn create_subscription<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> ApiResult<(StatusCode, Json<SubscriptionResponse>)> {
    let now = Utc::now();
    let existing = state.storage.list_subscriptions(user.id).await?;
    if existing.iter().any(|s| s.is_active_at(now)) {
        return Err(ApiError::bad_request(MSG_ACTIVE_SUBSCRIPTION));
    }
    let (starts_at, expires_at) = quota::subscription_window(now);
    let subscription = state
        .storage
        .create_subscription(user.id, starts_at, expires_at)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription.into())))
}
