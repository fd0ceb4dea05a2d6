//! Group, membership, and invitation handlers.
//!
//! Groups are invite-only. Everything under a group is gated by
//! membership, and invitations are issued solely by the moderator.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use notedrop_domain::model::{Group, Invitation, Membership};
use notedrop_domain::policy::{AccessRequest, Policy, Target, Verb};
use notedrop_domain::quota;
use notedrop_storage::DataStore;

use super::{actor_is_premium, authorize, validate_len, ApiResult, JsonBadRequest};
use crate::auth::AuthUser;
use crate::errors::{ApiError, MSG_FORBIDDEN, MSG_MODERATOR_MEMBERSHIP};
use crate::http::routes::users::UserResponse;
use crate::http::state::AppState;

const MAX_GROUP_NAME_LEN: usize = 200;

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub id: i64,
    pub name: String,
    pub moderator_id: i64,
}

impl From<Group> for GroupResponse {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            name: group.name,
            moderator_id: group.moderator_id,
        }
    }
}

/// Full view of a single group, members included. Only reachable by
/// members, so exposing the roster here leaks nothing.
#[derive(Debug, Serialize)]
pub struct GroupDetailResponse {
    pub id: i64,
    pub name: String,
    pub moderator: UserResponse,
    pub members: Vec<UserResponse>,
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub joined_at: DateTime<Utc>,
}

impl From<Membership> for MembershipResponse {
    fn from(membership: Membership) -> Self {
        Self {
            id: membership.id,
            group_id: membership.group_id,
            user_id: membership.user_id,
            joined_at: membership.joined_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
}

impl From<Invitation> for InvitationResponse {
    fn from(invitation: Invitation) -> Self {
        Self {
            id: invitation.id,
            group_id: invitation.group_id,
            user_id: invitation.user_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GroupRequest {
    pub name: String,
}

pub async fn list_groups<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<GroupResponse>>> {
    let groups = state.storage.list_groups_for_user(user.id).await?;
    Ok(Json(groups.into_iter().map(GroupResponse::from).collect()))
}

/// Creating a group enrolls the creator as moderator. Free users are
/// capped at three memberships, and the moderator seat counts.
pub async fn create_group<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    JsonBadRequest(body): JsonBadRequest<GroupRequest>,
) -> ApiResult<(StatusCode, Json<GroupResponse>)> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name must not be empty."));
    }
    validate_len("Name", &body.name, MAX_GROUP_NAME_LEN)?;

    let premium = actor_is_premium(state.storage.as_ref(), user.id).await?;
    let limit = quota::membership_limit(premium);
    let (group, _membership) = state.storage.create_group(&body.name, user.id, limit).await?;
    Ok((StatusCode::CREATED, Json(group.into())))
}

pub async fn get_group<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(group_id): Path<i64>,
) -> ApiResult<Json<GroupDetailResponse>> {
    let req = AccessRequest::new(Verb::Get).group(group_id);
    authorize(&state, &[Policy::CanAccessGroup], Some(user.id), &req).await?;

    let group = state.storage.get_group(group_id).await?;
    let moderator = state.storage.get_user(group.moderator_id).await?;
    let memberships = state.storage.list_memberships(group_id).await?;
    let mut members = Vec::with_capacity(memberships.len());
    for membership in memberships {
        members.push(state.storage.get_user(membership.user_id).await?.into());
    }
    Ok(Json(GroupDetailResponse {
        id: group.id,
        name: group.name,
        moderator: moderator.into(),
        members,
    }))
}

pub async fn update_group<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(group_id): Path<i64>,
    JsonBadRequest(body): JsonBadRequest<GroupRequest>,
) -> ApiResult<Json<GroupResponse>> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name must not be empty."));
    }
    validate_len("Name", &body.name, MAX_GROUP_NAME_LEN)?;

    // Missing group denies like an inaccessible one.
    let req = AccessRequest::new(Verb::Patch).group(group_id);
    authorize(&state, &[Policy::CanAccessGroup], Some(user.id), &req).await?;

    let group = state.storage.get_group(group_id).await?;
    let req = AccessRequest::new(Verb::Patch)
        .group(group_id)
        .target(Target::Group(&group));
    authorize(&state, &[Policy::IsModeratorOrReadOnly], Some(user.id), &req).await?;

    let updated = state.storage.update_group(group_id, &body.name).await?;
    Ok(Json(updated.into()))
}

pub async fn delete_group<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(group_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let req = AccessRequest::new(Verb::Delete).group(group_id);
    authorize(&state, &[Policy::CanAccessGroup], Some(user.id), &req).await?;

    let group = state.storage.get_group(group_id).await?;
    let req = AccessRequest::new(Verb::Delete)
        .group(group_id)
        .target(Target::Group(&group));
    authorize(&state, &[Policy::IsModeratorOrReadOnly], Some(user.id), &req).await?;

    state.storage.delete_group(group_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_memberships<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(group_id): Path<i64>,
) -> ApiResult<Json<Vec<MembershipResponse>>> {
    let req = AccessRequest::new(Verb::Get).group(group_id);
    authorize(&state, &[Policy::CanAccessGroup], Some(user.id), &req).await?;

    let memberships = state.storage.list_memberships(group_id).await?;
    Ok(Json(
        memberships
            .into_iter()
            .map(MembershipResponse::from)
            .collect(),
    ))
}

/// Joining requires a pending invitation, which is consumed on success.
pub async fn join_group<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(group_id): Path<i64>,
) -> ApiResult<(StatusCode, Json<MembershipResponse>)> {
    let req = AccessRequest::new(Verb::Post).group(group_id);
    authorize(&state, &[Policy::HasInvitation], Some(user.id), &req).await?;

    let premium = actor_is_premium(state.storage.as_ref(), user.id).await?;
    let limit = quota::membership_limit(premium);
    let membership = state
        .storage
        .accept_invitation(group_id, user.id, limit)
        .await?;
    Ok((StatusCode::CREATED, Json(membership.into())))
}

/// Members may leave, and the moderator may remove members. The
/// moderator's own membership is pinned for the group's lifetime.
pub async fn delete_membership<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path((group_id, membership_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let req = AccessRequest::new(Verb::Delete).group(group_id);
    authorize(&state, &[Policy::CanAccessGroup], Some(user.id), &req).await?;

    let membership = state.storage.get_membership(membership_id).await?;
    if membership.group_id != group_id {
        return Err(ApiError::not_found("Not found."));
    }
    let group = state.storage.get_group(group_id).await?;
    if user.id != membership.user_id && user.id != group.moderator_id {
        return Err(ApiError::forbidden(MSG_FORBIDDEN));
    }
    if membership.user_id == group.moderator_id {
        return Err(ApiError::forbidden(MSG_MODERATOR_MEMBERSHIP));
    }
    state.storage.delete_membership(membership_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_invitations<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(group_id): Path<i64>,
) -> ApiResult<Json<Vec<InvitationResponse>>> {
    let req = AccessRequest::new(Verb::Get).group(group_id);
    authorize(&state, &[Policy::IsModerator], Some(user.id), &req).await?;

    let invitations = state.storage.list_invitations(group_id).await?;
    Ok(Json(
        invitations
            .into_iter()
            .map(InvitationResponse::from)
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    pub username: String,
}

pub async fn create_invitation<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(group_id): Path<i64>,
    JsonBadRequest(body): JsonBadRequest<CreateInvitationRequest>,
) -> ApiResult<(StatusCode, Json<InvitationResponse>)> {
    let req = AccessRequest::new(Verb::Post).group(group_id);
    authorize(&state, &[Policy::IsModerator], Some(user.id), &req).await?;

    let invitee = state
        .storage
        .find_user_by_username(&body.username)
        .await?
        .ok_or_else(|| ApiError::bad_request("No such user."))?;
    let invitation = state.storage.create_invitation(group_id, invitee.id).await?;
    Ok((StatusCode::CREATED, Json(invitation.into())))
}

/// The moderator may retract an invitation, and the invitee may decline
/// it. Nobody else can see that it exists.
pub async fn delete_invitation<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    Path(invitation_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let req = AccessRequest::new(Verb::Delete).invitation(invitation_id);
    authorize(&state, &[Policy::IsModeratorOrInvitee], Some(user.id), &req).await?;

    state.storage.delete_invitation(invitation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
