//! Request and response types for the hierarchical groups node API.
//!
//! # Endpoints covered
//!
//! | Method | Path | Type |
//! |--------|------|------|
//! | POST | `/v1/groups` | [`CreateGroupRequest`] → [`hgroups::Group`] |
//! | GET | `/v1/groups` | [`DirectoryParams`] → [`DirectoryResponse`] |
//! | GET | `/v1/groups/{id}` | → [`hgroups::Group`] |
//! | PATCH | `/v1/groups/{id}` | [`UpdateGroupRequest`] → [`hgroups::Group`] |
//! | DELETE | `/v1/groups/{id}` | → `204` |
//! | GET | `/v1/groups/{id}/ancestors` | [`RelationQuery`] → [`AncestorsResponse`] |
//! | GET | `/v1/groups/{id}/descendants` | [`RelationQuery`] → [`GroupsResponse`] |
//! | GET | `/v1/groups/{id}/children` | [`RelationQuery`] → [`GroupsResponse`] |
//! | GET | `/v1/groups/{id}/permalink` | → [`PermalinkResponse`] |
//! | GET | `/v1/groups/{id}/breadcrumbs` | → [`BreadcrumbsResponse`] |
//! | POST | `/v1/groups/{id}/subgroups` | [`CreateGroupRequest`] → [`hgroups::Group`] |
//! | GET | `/v1/groups/{id}/permissions` | → [`PermissionsResponse`] |
//! | GET | `/v1/groups/{id}/settings` | → [`SettingsResponse`] |
//! | PUT | `/v1/groups/{id}/settings` | [`SettingsRequest`] → [`SettingsResponse`] |
//! | GET | `/v1/groups/{id}/activity-scope` | → [`ActivityScopeResponse`] |
//! | PUT | `/v1/groups/{id}/members/{user}` | [`MembershipRequest`] → `204` |
//! | GET | `/v1/resolve/{*path}` | → [`ResolveResponse`] |
//!
//! The requesting user is named by the `x-user-id` header; see [`USER_HEADER`].

pub mod error;
pub mod group;
pub mod settings;

pub use error::ErrorResponse;
pub use group::{
    AncestorsResponse, BreadcrumbsResponse, CreateGroupRequest, DirectoryParams,
    DirectoryResponse, GroupsResponse, PermalinkResponse, RelationQuery, ResolveResponse,
    UpdateGroupRequest,
};
pub use settings::{
    ActivityScopeResponse, MembershipRequest, PermissionsResponse, SettingsRequest,
    SettingsResponse,
};

/// Header carrying the requesting user's id. Absent means anonymous.
pub const USER_HEADER: &str = "x-user-id";
