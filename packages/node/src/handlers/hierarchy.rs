//! Hierarchy and identifier handlers.
//!
//! Every endpoint first checks that the requesting user can see the group
//! itself; an invisible group is a 404, never an empty result.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use hgroups::{GroupId, PATH_SEPARATOR};
use hgroups_node_api::{
    AncestorsResponse, BreadcrumbsResponse, GroupsResponse, PermalinkResponse, RelationQuery,
    ResolveResponse,
};

use crate::{error::AppError, middleware::auth::Viewer};

use super::AppState;

/// `GET /v1/groups/{id}/ancestors` — parent chain, nearest first.
pub async fn ancestors(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<GroupId>,
    Query(q): Query<RelationQuery>,
) -> Result<Json<AncestorsResponse>, AppError> {
    let ancestors = state
        .run(move |e| {
            e.visible_group(viewer, id)?;
            Ok(e.ancestors(id, viewer, q.relation)?)
        })
        .await?;
    Ok(Json(AncestorsResponse {
        group_id: id,
        ancestors,
    }))
}

/// `GET /v1/groups/{id}/descendants` — the visible subtree, depth-first preorder.
pub async fn descendants(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<GroupId>,
    Query(q): Query<RelationQuery>,
) -> Result<Json<GroupsResponse>, AppError> {
    let groups = state
        .run(move |e| {
            e.visible_group(viewer, id)?;
            Ok(e.descendants(id, viewer, q.relation)?)
        })
        .await?;
    Ok(Json(GroupsResponse { groups }))
}

/// `GET /v1/groups/{id}/children`
pub async fn children(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<GroupId>,
    Query(q): Query<RelationQuery>,
) -> Result<Json<GroupsResponse>, AppError> {
    let groups = state
        .run(move |e| {
            e.visible_group(viewer, id)?;
            Ok(e.children(id, viewer, q.relation)?)
        })
        .await?;
    Ok(Json(GroupsResponse { groups }))
}

/// `GET /v1/groups/{id}/permalink`
pub async fn permalink(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<GroupId>,
) -> Result<Json<PermalinkResponse>, AppError> {
    let directory_url = state.config.directory_url.clone();
    let response = state
        .run(move |e| {
            e.visible_group(viewer, id)?;
            Ok(PermalinkResponse {
                group_id: id,
                slug: e.build_hierarchical_slug(id)?,
                permalink: e.permalink(&directory_url, id)?,
            })
        })
        .await?;
    Ok(Json(response))
}

/// `GET /v1/groups/{id}/breadcrumbs` — root first, ending with the group.
pub async fn breadcrumbs(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<GroupId>,
) -> Result<Json<BreadcrumbsResponse>, AppError> {
    let directory_url = state.config.directory_url.clone();
    let breadcrumbs = state
        .run(move |e| {
            e.visible_group(viewer, id)?;
            Ok(e.breadcrumbs(&directory_url, id)?)
        })
        .await?;
    Ok(Json(BreadcrumbsResponse { breadcrumbs }))
}

/// `GET /v1/resolve/{*path}` — map a request path onto a group.
///
/// Segments past the deepest matching group come back as action variables,
/// so `animals/pets/members` resolves to `pets` with `["members"]`.
pub async fn resolve(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(path): Path<String>,
) -> Result<Json<ResolveResponse>, AppError> {
    let segments: Vec<String> = path
        .split(PATH_SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let directory_url = state.config.directory_url.clone();

    let response = state
        .run(move |e| {
            let resolution = e
                .resolve_path(segments.as_slice())?
                .ok_or_else(|| AppError::NotFound(format!("no group at /{}", segments.join("/"))))?;
            let group = e.visible_group(viewer, resolution.group.id)?;
            Ok(ResolveResponse {
                permalink: e.permalink(&directory_url, group.id)?,
                group,
                action_variables: resolution.action_variables,
            })
        })
        .await?;
    Ok(Json(response))
}
