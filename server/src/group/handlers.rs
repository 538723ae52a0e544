//! Group Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::types::{
    AddMemberRequest, ChangeRoleRequest, CreateGroupRequest, GroupDeletedResponse,
    UpdateGroupRequest,
};
use crate::{
    api::AppState,
    auth::AuthUser,
    db::{Group, GroupMember},
    error::{AppError, AppResult},
};

/// Load a group or fail with `NotFound`.
pub(super) async fn load(state: &AppState, group_id: Uuid) -> AppResult<Group> {
    state
        .store
        .find_group(group_id)
        .await?
        .ok_or(AppError::NotFound("Group"))
}

/// Store a member admitted on a loaded copy of the group.
///
/// Fails with `conflict` when another request added the same user first.
pub(super) async fn insert_member(
    state: &AppState,
    group_id: Uuid,
    member: &GroupMember,
    conflict: &str,
) -> AppResult<Group> {
    if let Some(group) = state.store.add_group_member(group_id, member).await? {
        return Ok(group);
    }
    Err(match state.store.find_group(group_id).await? {
        Some(_) => AppError::conflict(conflict),
        None => AppError::NotFound("Group"),
    })
}

/// Error for a member change that no longer applies to the stored group.
async fn missing_member(state: &AppState, group_id: Uuid) -> AppResult<AppError> {
    Ok(match state.store.find_group(group_id).await? {
        Some(_) => AppError::NotFound("Member"),
        None => AppError::NotFound("Group"),
    })
}

/// Drop `user_id` from the stored member list.
async fn delete_member(state: &AppState, group_id: Uuid, user_id: Uuid) -> AppResult<Group> {
    match state.store.remove_group_member(group_id, user_id).await? {
        Some(group) => Ok(group),
        None => Err(missing_member(state, group_id).await?),
    }
}

async fn ensure_user_exists(state: &AppState, user_id: Uuid) -> AppResult<()> {
    if state.store.find_user(user_id).await?.is_none() {
        return Err(AppError::NotFound("User"));
    }
    Ok(())
}

/// Create a group with the caller as creator and admin.
/// POST /api/groups/create
#[tracing::instrument(skip(state, body))]
pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateGroupRequest>,
) -> AppResult<(StatusCode, Json<Group>)> {
    body.validate()?;
    for &member in &body.members {
        ensure_user_exists(&state, member).await?;
    }

    let group = Group::new(
        body.name.trim(),
        body.description.unwrap_or_default(),
        auth.id,
        &body.members,
        body.settings.unwrap_or_default(),
    );
    state.store.insert_group(&group).await?;

    info!(group_id = %group.id, creator_id = %auth.id, members = group.members.len(), "Group created");
    Ok((StatusCode::CREATED, Json(group)))
}

/// Groups the caller belongs to.
/// GET /api/groups
#[tracing::instrument(skip(state))]
pub async fn list(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Group>>> {
    Ok(Json(state.store.list_groups_for_member(auth.id).await?))
}

/// Group details, members only.
/// GET /api/groups/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
) -> AppResult<Json<Group>> {
    let group = load(&state, group_id).await?;
    if !group.is_member(auth.id) {
        return Err(AppError::forbidden("You are not a member of this group"));
    }
    Ok(Json(group))
}

/// Update name, description, picture or settings.
/// PUT /api/groups/{id}
#[tracing::instrument(skip(state, body))]
pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
    Json(body): Json<UpdateGroupRequest>,
) -> AppResult<Json<Group>> {
    body.validate()?;
    let mut group = load(&state, group_id).await?;

    if !group.can_edit_info(auth.id) {
        return Err(AppError::forbidden("Only admins can edit group info"));
    }
    if body.settings.is_some() && !group.is_admin(auth.id) {
        return Err(AppError::forbidden("Only admins can change group settings"));
    }

    if let Some(name) = body.name {
        group.name = name.trim().to_string();
    }
    if let Some(description) = body.description {
        group.description = description;
    }
    if let Some(picture_url) = body.picture_url {
        group.picture_url = Some(picture_url).filter(|url| !url.is_empty());
    }
    if let Some(settings) = body.settings {
        group.settings = settings;
    }
    group.updated_at = chrono::Utc::now();

    if !state.store.update_group_info(&group).await? {
        return Err(AppError::NotFound("Group"));
    }
    Ok(Json(load(&state, group_id).await?))
}

/// Delete a group and its messages. Admins and the creator only.
/// DELETE /api/groups/{id}
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
) -> AppResult<Json<GroupDeletedResponse>> {
    let group = load(&state, group_id).await?;
    if !group.can_delete(auth.id) {
        return Err(AppError::forbidden("Only admins can delete the group"));
    }

    if !state.store.delete_group(group_id).await? {
        return Err(AppError::NotFound("Group"));
    }

    info!(group_id = %group_id, "Group deleted");
    Ok(Json(GroupDeletedResponse {
        id: group_id,
        deleted: true,
    }))
}

/// Add a member.
/// POST /api/groups/{id}/members
#[tracing::instrument(skip(state, body))]
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
    Json(body): Json<AddMemberRequest>,
) -> AppResult<Json<Group>> {
    let mut group = load(&state, group_id).await?;
    ensure_user_exists(&state, body.user_id).await?;

    let member = group.add_member(auth.id, body.user_id)?;
    let group = insert_member(&state, group_id, &member, "User is already a member").await?;

    info!(group_id = %group_id, user_id = %body.user_id, "Member added");
    Ok(Json(group))
}

/// Remove a member.
/// DELETE /api/groups/{id}/members/{user_id}
#[tracing::instrument(skip(state))]
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Group>> {
    let mut group = load(&state, group_id).await?;

    group.remove_member(auth.id, user_id)?;
    let group = delete_member(&state, group_id, user_id).await?;

    info!(group_id = %group_id, user_id = %user_id, "Member removed");
    Ok(Json(group))
}

/// Change a member's role.
/// PUT /api/groups/{id}/members/{user_id}/role
#[tracing::instrument(skip(state, body))]
pub async fn change_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ChangeRoleRequest>,
) -> AppResult<Json<Group>> {
    let mut group = load(&state, group_id).await?;

    group.change_role(auth.id, user_id, body.role)?;
    let group = match state
        .store
        .set_member_role(group_id, user_id, body.role)
        .await?
    {
        Some(group) => group,
        None => return Err(missing_member(&state, group_id).await?),
    };

    info!(group_id = %group_id, user_id = %user_id, role = ?body.role, "Member role changed");
    Ok(Json(group))
}

/// Leave a group.
/// POST /api/groups/{id}/leave
#[tracing::instrument(skip(state))]
pub async fn leave(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut group = load(&state, group_id).await?;

    group.leave(auth.id)?;
    delete_member(&state, group_id, auth.id).await?;

    info!(group_id = %group_id, user_id = %auth.id, "Member left");
    Ok(StatusCode::NO_CONTENT)
}
