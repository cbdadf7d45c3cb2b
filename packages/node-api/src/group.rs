//! Group CRUD, hierarchy, and directory types.

use serde::{Deserialize, Serialize};

use hgroups::{
    Breadcrumb, DirectoryEntry, DirectoryQuery, Group, GroupId, GroupStatus, ListingScope,
    Relation,
};

// ---------------------------------------------------------------------------
// Create / update
// ---------------------------------------------------------------------------

/// Body of `POST /v1/groups` and `POST /v1/groups/{id}/subgroups`.
///
/// The node assigns the id. For subgroups the parent comes from the path.
///
/// ```json
/// { "slug": "kittens", "name": "Kittens", "status": "private" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateGroupRequest {
    pub slug: String,

    /// Display name. Defaults to the slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub status: GroupStatus,
}

/// Body of `PATCH /v1/groups/{id}`. Absent fields are left unchanged.
///
/// `parent_id: 0` moves the group to the top level.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateGroupRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GroupStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<GroupId>,
}

impl UpdateGroupRequest {
    /// Apply the present fields to `group`.
    pub fn apply(&self, group: &mut Group) {
        if let Some(slug) = &self.slug {
            group.slug = slug.clone();
        }
        if let Some(name) = &self.name {
            group.name = name.clone();
        }
        if let Some(status) = self.status {
            group.status = status;
        }
        if let Some(parent_id) = self.parent_id {
            group.parent_id = parent_id;
        }
    }
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

/// Query parameters of the hierarchy endpoints.
///
/// `?relation=activity` selects the activity visibility rule.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationQuery {
    #[serde(default)]
    pub relation: Relation,
}

/// Response of `GET /v1/groups/{id}/ancestors`, nearest parent first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AncestorsResponse {
    pub group_id: GroupId,
    pub ancestors: Vec<GroupId>,
}

/// Response of `GET /v1/groups/{id}/descendants` and `/children`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupsResponse {
    pub groups: Vec<Group>,
}

/// Response of `GET /v1/groups/{id}/permalink`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermalinkResponse {
    pub group_id: GroupId,
    /// Root-first slug path, e.g. `animals/pets/kittens`.
    pub slug: String,
    /// Always ends in `/`.
    pub permalink: String,
}

/// Response of `GET /v1/groups/{id}/breadcrumbs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreadcrumbsResponse {
    pub breadcrumbs: Vec<Breadcrumb>,
}

/// Response of `GET /v1/resolve/{*path}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolveResponse {
    pub group: Group,
    pub permalink: String,
    pub action_variables: Vec<String>,
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Query parameters of `GET /v1/groups`.
///
/// | Parameter | Meaning |
/// |-----------|---------|
/// | `parent_id` | Explicit parent filter; always wins |
/// | `search` | Free-text search; lists flat |
/// | `parent` | Tree level the user navigated to |
/// | `hierarchy_of` | List on this group's hierarchy screen |
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryParams {
    #[serde(default)]
    pub parent_id: Option<GroupId>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub parent: Option<GroupId>,
    #[serde(default)]
    pub hierarchy_of: Option<GroupId>,
}

impl From<DirectoryParams> for DirectoryQuery {
    fn from(p: DirectoryParams) -> Self {
        DirectoryQuery {
            parent_id: p.parent_id,
            search_terms: p.search,
            requested_parent: p.parent,
            hierarchy_screen: p.hierarchy_of,
        }
    }
}

/// Response of `GET /v1/groups`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryResponse {
    /// The parent the rows belong to; absent for flat listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<GroupId>,
    pub flat: bool,
    pub groups: Vec<DirectoryEntry>,
}

impl DirectoryResponse {
    pub fn new(scope: ListingScope, groups: Vec<DirectoryEntry>) -> Self {
        Self {
            parent_id: scope.parent_filter,
            flat: scope.flat,
            groups,
        }
    }
}
