//! Group CRUD and directory handlers.
//!
//! - `POST /v1/groups`: create a top-level group
//! - `GET /v1/groups`: the groups directory
//! - `GET|PATCH|DELETE /v1/groups/{id}`
//! - `POST /v1/groups/{id}/subgroups`: create a child group
//!
//! The creator of a group becomes its administrator.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use hgroups::{validate_slug, EngineError, Group, GroupEvent, GroupId, Role, UserId, TOP_LEVEL};
use hgroups_node_api::{CreateGroupRequest, DirectoryParams, DirectoryResponse, UpdateGroupRequest};

use crate::{
    error::AppError,
    middleware::auth::{RequireUser, Viewer},
    storage::NewGroup,
};

use super::AppState;

/// `POST /v1/groups` — create a top-level group.
///
/// Returns 201 with the stored group, 403 when group creation is restricted
/// to site administrators, 409 on a sibling slug clash.
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_slug(&req.slug).map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let allowed = state.run(move |e| Ok(e.can_create_group(user)?)).await?;
    if !allowed {
        return Err(AppError::Forbidden(format!("user {user} may not create groups")));
    }

    let group = insert(&state, user, TOP_LEVEL, req).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// `POST /v1/groups/{id}/subgroups` — create a child of `{id}`.
///
/// Governed by the parent's subgroup creation policy.
pub async fn create_subgroup(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(parent_id): Path<GroupId>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_slug(&req.slug).map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let allowed = state
        .run(move |e| {
            e.visible_group(user, parent_id)?;
            Ok(e.can_create_subgroup(user, parent_id)?)
        })
        .await?;
    if !allowed {
        return Err(AppError::Forbidden(format!(
            "user {user} may not create subgroups of group {parent_id}"
        )));
    }

    let group = insert(&state, user, parent_id, req).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn insert(
    state: &AppState,
    creator: UserId,
    parent_id: GroupId,
    req: CreateGroupRequest,
) -> Result<Group, AppError> {
    let CreateGroupRequest { slug, name, status } = req;
    let name = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| slug.clone());

    let group = state
        .storage
        .create_group(&NewGroup {
            parent_id,
            slug,
            name,
            status,
        })
        .await?;
    state
        .storage
        .set_role(creator, group.id, Some(Role::Admin))
        .await?;
    state.notify(GroupEvent::Saved(group.id)).await?;

    tracing::info!(group_id = group.id, parent_id, creator, "group created");
    Ok(group)
}

/// `GET /v1/groups` — list the directory for the requesting user.
///
/// See [`hgroups::listing_scope`] for how the parameters pick between a tree
/// level and a flat listing.
pub async fn list(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Query(params): Query<DirectoryParams>,
) -> Result<Json<DirectoryResponse>, AppError> {
    let directory_url = state.config.directory_url.clone();
    let listing = state
        .run(move |e| Ok(e.directory(viewer, &params.into(), &directory_url)?))
        .await?;
    Ok(Json(DirectoryResponse::new(listing.scope, listing.entries)))
}

/// `GET /v1/groups/{id}` — a single group. Hidden groups are 404 to outsiders.
pub async fn get_by_id(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<GroupId>,
) -> Result<Json<Group>, AppError> {
    let group = state.run(move |e| Ok(e.visible_group(viewer, id)?)).await?;
    Ok(Json(group))
}

/// `PATCH /v1/groups/{id}` — rename, change status or move a group.
///
/// Requires group administrator rights. A move to a missing parent is 422;
/// a move under the group itself or one of its descendants is 409.
pub async fn update(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<GroupId>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<Json<Group>, AppError> {
    if let Some(slug) = &req.slug {
        validate_slug(slug).map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;
    }
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::UnprocessableEntity("name must not be empty".into()));
    }

    let updated = state
        .run(move |e| {
            let mut group = e.visible_group(user, id)?;
            if !e.can_manage_group(user, id)? {
                return Err(AppError::Forbidden(format!(
                    "user {user} may not manage group {id}"
                )));
            }

            let old_parent = group.parent_id;
            req.apply(&mut group);
            if group.parent_id != old_parent {
                if group.parent_id != TOP_LEVEL {
                    match e.visible_group(user, group.parent_id) {
                        Ok(_) => {}
                        Err(EngineError::GroupNotFound(p)) => {
                            return Err(AppError::UnprocessableEntity(format!(
                                "parent group {p} does not exist"
                            )))
                        }
                        Err(other) => return Err(other.into()),
                    }
                }
                if e.would_create_cycle(id, group.parent_id)? {
                    return Err(AppError::Conflict(format!(
                        "moving group {id} under {} would create a cycle",
                        group.parent_id
                    )));
                }
            }
            Ok(group)
        })
        .await?;

    // The store repeats the cycle check under its write lock.
    state.storage.update_group(&updated).await?;
    state.notify(GroupEvent::Saved(id)).await?;

    tracing::info!(group_id = id, parent_id = updated.parent_id, user, "group updated");
    Ok(Json(updated))
}

/// `DELETE /v1/groups/{id}` — delete a group; its children move up a level.
pub async fn delete(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<GroupId>,
) -> Result<StatusCode, AppError> {
    state
        .run(move |e| {
            e.visible_group(user, id)?;
            if e.can_manage_group(user, id)? {
                Ok(())
            } else {
                Err(AppError::Forbidden(format!(
                    "user {user} may not manage group {id}"
                )))
            }
        })
        .await?;

    let removed = state.storage.delete_group(id).await?;
    state.notify(GroupEvent::Deleted(id)).await?;

    tracing::info!(group_id = id, slug = %removed.slug, user, "group deleted");
    Ok(StatusCode::NO_CONTENT)
}
