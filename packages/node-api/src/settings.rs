//! Per-group settings, permission checks, activity scope, and membership types.

use serde::{Deserialize, Serialize};

use hgroups::{GroupId, IncludeActivity, Role, SubgroupCreators, UserId};

/// Body of `PUT /v1/groups/{id}/settings`. Absent fields are left unchanged.
///
/// Values are sent as their stored strings and validated by the node, so an
/// unknown value is reported as `invalid_setting` rather than a JSON error.
///
/// ```json
/// { "subgroup_creators": "mod", "include_activity": "include-from-parents" }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup_creators: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_activity: Option<String>,
}

/// Effective settings of a group, with fallbacks applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsResponse {
    pub group_id: GroupId,
    pub subgroup_creators: SubgroupCreators,
    pub include_activity: IncludeActivity,
}

/// Response of `GET /v1/groups/{id}/permissions` for the requesting user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionsResponse {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub can_create_subgroup: bool,
    pub can_include_aggregated_activity: bool,
    pub can_manage: bool,
}

/// Response of `GET /v1/groups/{id}/activity-scope`.
///
/// `scope` always starts with the group itself. `aggregated` is false when
/// the stream is limited to the group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityScopeResponse {
    pub group_id: GroupId,
    pub aggregated: bool,
    pub scope: Vec<GroupId>,
}

/// Body of `PUT /v1/groups/{id}/members/{user}`. A `null` role removes the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MembershipRequest {
    pub role: Option<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_response_uses_stored_strings() {
        let r = SettingsResponse {
            group_id: 3,
            subgroup_creators: SubgroupCreators::Mod,
            include_activity: IncludeActivity::FromBoth,
        };
        assert_eq!(
            serde_json::to_value(r).unwrap(),
            serde_json::json!({
                "group_id": 3,
                "subgroup_creators": "mod",
                "include_activity": "include-from-both"
            })
        );
    }

    #[test]
    fn null_role_removes() {
        let r: MembershipRequest = serde_json::from_str(r#"{"role":null}"#).unwrap();
        assert_eq!(r.role, None);
        let r: MembershipRequest = serde_json::from_str(r#"{"role":"admin"}"#).unwrap();
        assert_eq!(r.role, Some(Role::Admin));
    }
}
