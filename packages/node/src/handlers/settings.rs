//! Per-group settings, permission, activity scope and membership handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use hgroups::{
    EngineError, GroupEvent, GroupId, IncludeActivity, SubgroupCreators, UserId, ANONYMOUS,
    INCLUDE_ACTIVITY_META_KEY, SUBGROUP_CREATORS_META_KEY,
};
use hgroups_node_api::{
    ActivityScopeResponse, MembershipRequest, PermissionsResponse, SettingsRequest,
    SettingsResponse,
};

use crate::{
    error::AppError,
    middleware::auth::{RequireUser, Viewer},
};

use super::AppState;

fn forbidden(user: UserId, group_id: GroupId) -> AppError {
    AppError::Forbidden(format!("user {user} may not manage group {group_id}"))
}

/// `GET /v1/groups/{id}/permissions` — what the requesting user may do.
pub async fn permissions(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<GroupId>,
) -> Result<Json<PermissionsResponse>, AppError> {
    let response = state
        .run(move |e| {
            e.visible_group(viewer, id)?;
            Ok(PermissionsResponse {
                group_id: id,
                user_id: viewer,
                can_create_subgroup: e.can_create_subgroup(viewer, id)?,
                can_include_aggregated_activity: e.can_include_aggregated_activity(viewer, id)?,
                can_manage: e.can_manage_group(viewer, id)?,
            })
        })
        .await?;
    Ok(Json(response))
}

/// `GET /v1/groups/{id}/settings`
pub async fn get_settings(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<GroupId>,
) -> Result<Json<SettingsResponse>, AppError> {
    let response = state
        .run(move |e| {
            e.visible_group(viewer, id)?;
            let (subgroup_creators, include_activity) = e.settings(id)?;
            Ok(SettingsResponse {
                group_id: id,
                subgroup_creators,
                include_activity,
            })
        })
        .await?;
    Ok(Json(response))
}

/// `PUT /v1/groups/{id}/settings` — store one or both settings.
///
/// Requires group administrator rights; `include_activity` additionally
/// requires the activity aggregation gate. Both values are validated
/// before anything is written.
pub async fn put_settings(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<GroupId>,
    Json(req): Json<SettingsRequest>,
) -> Result<Json<SettingsResponse>, AppError> {
    let response = state
        .run(move |e| {
            e.visible_group(user, id)?;
            if !e.can_manage_group(user, id)? {
                return Err(forbidden(user, id));
            }

            if let Some(value) = &req.subgroup_creators {
                value.parse::<SubgroupCreators>().map_err(|_| EngineError::InvalidSetting {
                    key: SUBGROUP_CREATORS_META_KEY,
                    value: value.clone(),
                })?;
            }
            if let Some(value) = &req.include_activity {
                value.parse::<IncludeActivity>().map_err(|_| EngineError::InvalidSetting {
                    key: INCLUDE_ACTIVITY_META_KEY,
                    value: value.clone(),
                })?;
                if !e.can_include_aggregated_activity(user, id)? {
                    return Err(AppError::Forbidden(format!(
                        "user {user} may not change activity aggregation of group {id}"
                    )));
                }
            }

            if let Some(value) = &req.subgroup_creators {
                e.save_subgroup_creators(id, value)?;
            }
            if let Some(value) = &req.include_activity {
                e.save_include_activity(user, id, value)?;
            }

            let (subgroup_creators, include_activity) = e.settings(id)?;
            Ok(SettingsResponse {
                group_id: id,
                subgroup_creators,
                include_activity,
            })
        })
        .await?;

    tracing::info!(
        group_id = id,
        user,
        subgroup_creators = %response.subgroup_creators,
        include_activity = %response.include_activity,
        "group settings saved"
    );
    Ok(Json(response))
}

/// `GET /v1/groups/{id}/activity-scope` — the groups whose activity the
/// group's stream covers for the requesting user.
pub async fn activity_scope(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<GroupId>,
) -> Result<Json<ActivityScopeResponse>, AppError> {
    let scope = state
        .run(move |e| {
            e.visible_group(viewer, id)?;
            Ok(e.activity_scope_for(viewer, id)?)
        })
        .await?;
    Ok(Json(ActivityScopeResponse {
        group_id: id,
        aggregated: scope.len() > 1,
        scope,
    }))
}

/// `PUT /v1/groups/{id}/members/{user}` — grant, change or revoke a role.
pub async fn set_member(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path((id, member)): Path<(GroupId, UserId)>,
    Json(req): Json<MembershipRequest>,
) -> Result<StatusCode, AppError> {
    if member == ANONYMOUS {
        return Err(AppError::BadRequest("user id 0 cannot hold a role".into()));
    }

    state
        .run(move |e| {
            e.visible_group(user, id)?;
            if e.can_manage_group(user, id)? {
                Ok(())
            } else {
                Err(forbidden(user, id))
            }
        })
        .await?;

    state.storage.set_role(member, id, req.role).await?;
    state.notify(GroupEvent::Saved(id)).await?;

    tracing::info!(group_id = id, member, role = ?req.role, "membership changed");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use hgroups::{ActivityEnforcement, EngineConfig};
    use serde_json::json;

    use crate::handlers::testing::{app, app_with, send, ADMIN};

    // animals(1) -> pets(2) -> kittens(3), all created by the site admin.
    async fn animals(config: EngineConfig) -> axum::Router {
        let (app, _) = app_with(config).await;
        send(&app, "POST", "/v1/groups", Some(ADMIN), Some(json!({"slug": "animals"}))).await;
        send(&app, "POST", "/v1/groups/1/subgroups", Some(ADMIN), Some(json!({"slug": "pets"}))).await;
        send(&app, "POST", "/v1/groups/2/subgroups", Some(ADMIN), Some(json!({"slug": "kittens"}))).await;
        app
    }

    #[tokio::test]
    async fn settings_default_to_noone_and_none() {
        let (app, _) = app().await;
        send(&app, "POST", "/v1/groups", Some(7), Some(json!({"slug": "animals"}))).await;
        let (status, body) = send(&app, "GET", "/v1/groups/1/settings", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subgroup_creators"], "noone");
        assert_eq!(body["include_activity"], "include-from-none");
    }

    #[tokio::test]
    async fn mod_policy_lets_moderators_create_subgroups() {
        let app = animals(EngineConfig::default()).await;
        send(&app, "PUT", "/v1/groups/2/members/20", Some(ADMIN), Some(json!({"role": "mod"}))).await;
        send(&app, "PUT", "/v1/groups/2/members/21", Some(ADMIN), Some(json!({"role": "member"}))).await;

        let (status, _) = send(&app, "PUT", "/v1/groups/2/settings", Some(ADMIN), Some(json!({"subgroup_creators": "mod"}))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, "GET", "/v1/groups/2/permissions", Some(20), None).await;
        assert_eq!(body["can_create_subgroup"], true);
        let (_, body) = send(&app, "GET", "/v1/groups/2/permissions", Some(21), None).await;
        assert_eq!(body["can_create_subgroup"], false);

        let (status, _) = send(&app, "POST", "/v1/groups/2/subgroups", Some(21), Some(json!({"slug": "puppies"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, "POST", "/v1/groups/2/subgroups", Some(20), Some(json!({"slug": "puppies"}))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn unknown_setting_value_is_rejected_without_writes() {
        let app = animals(EngineConfig::default()).await;
        let (status, body) = send(
            &app,
            "PUT",
            "/v1/groups/2/settings",
            Some(ADMIN),
            Some(json!({"subgroup_creators": "mod", "include_activity": "everything"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_setting");

        let (_, body) = send(&app, "GET", "/v1/groups/2/settings", None, None).await;
        assert_eq!(body["subgroup_creators"], "noone");
    }

    #[tokio::test]
    async fn strict_enforcement_blocks_activity_setting() {
        let app = animals(EngineConfig::default()).await;
        let (status, _) = send(
            &app,
            "PUT",
            "/v1/groups/3/settings",
            Some(ADMIN),
            Some(json!({"include_activity": "include-from-parents"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn activity_scope_from_parents() {
        let app = animals(EngineConfig {
            activity_enforcement: ActivityEnforcement::SiteAdmins,
            ..Default::default()
        })
        .await;
        let (status, _) = send(
            &app,
            "PUT",
            "/v1/groups/3/settings",
            Some(ADMIN),
            Some(json!({"include_activity": "include-from-parents"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, "GET", "/v1/groups/3/activity-scope", Some(ADMIN), None).await;
        assert_eq!(body["aggregated"], true);
        assert_eq!(body["scope"], json!([3, 2, 1]));

        // Outside the gate the stream covers the group only.
        let (_, body) = send(&app, "GET", "/v1/groups/3/activity-scope", Some(9), None).await;
        assert_eq!(body["aggregated"], false);
        assert_eq!(body["scope"], json!([3]));
    }

    #[tokio::test]
    async fn membership_changes_require_manage_rights() {
        let app = animals(EngineConfig::default()).await;
        let (status, _) = send(&app, "PUT", "/v1/groups/2/members/30", Some(31), Some(json!({"role": "admin"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, "PUT", "/v1/groups/2/members/0", Some(ADMIN), Some(json!({"role": "member"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, "PUT", "/v1/groups/2/members/30", Some(ADMIN), Some(json!({"role": "admin"}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, body) = send(&app, "GET", "/v1/groups/2/permissions", Some(30), None).await;
        assert_eq!(body["can_manage"], true);
    }
}
