//! Core data types for the hierarchical groups engine.
//!
//! This module defines the records the engine reads from its collaborators
//! ([`Group`]) and the closed policy enumerations stored as per-group metadata
//! ([`SubgroupCreators`], [`IncludeActivity`]) or as process-wide configuration
//! ([`ActivityEnforcement`]). Every enumeration serialises to the same string
//! that is persisted in the metadata store.
//!
//! Stored policy strings are untyped. Parsing them goes through the
//! `from_setting` constructors, which map absent or unrecognised values to the
//! most restrictive variant instead of failing.

use serde::{Deserialize, Serialize};

/// Integer identifier of a group. `0` is never a real group; as a parent
/// reference it means "top level".
pub type GroupId = u64;

/// Integer identifier of a user. `0` is the anonymous viewer.
pub type UserId = u64;

/// Parent reference value of a top-level group.
pub const TOP_LEVEL: GroupId = 0;

/// The anonymous viewer.
pub const ANONYMOUS: UserId = 0;

/// Metadata key holding a group's [`SubgroupCreators`] policy.
pub const SUBGROUP_CREATORS_META_KEY: &str = "allowed-subgroup-creators";

/// Metadata key holding a group's [`IncludeActivity`] setting.
pub const INCLUDE_ACTIVITY_META_KEY: &str = "include-activity-from-relatives";

/// Access level of a group as stored by the host platform.
///
/// The engine only uses it inside the default visibility rule of
/// [`Membership::viewer_can_access`](crate::store::Membership::viewer_can_access).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    /// Listed and readable by anyone.
    #[default]
    Public,
    /// Listed, but content is restricted to members.
    Private,
    /// Not listed for non-members.
    Hidden,
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupStatus::Public => write!(f, "public"),
            GroupStatus::Private => write!(f, "private"),
            GroupStatus::Hidden => write!(f, "hidden"),
        }
    }
}

impl std::str::FromStr for GroupStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(GroupStatus::Public),
            "private" => Ok(GroupStatus::Private),
            "hidden" => Ok(GroupStatus::Hidden),
            _ => Err(format!(
                "unknown group status {:?}; expected one of: public, private, hidden",
                s
            )),
        }
    }
}

/// A group record, owned by the host's storage layer.
///
/// The engine never mutates groups. `parent_id == 0` marks a top-level group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,

    /// Parent group id, or [`TOP_LEVEL`].
    #[serde(default)]
    pub parent_id: GroupId,

    /// URL segment, unique among the children of one parent.
    pub slug: String,

    /// Display name used for breadcrumbs and listings.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub status: GroupStatus,
}

impl Group {
    /// A public group whose display name equals its slug.
    pub fn new(id: GroupId, parent_id: GroupId, slug: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            id,
            parent_id,
            name: slug.clone(),
            slug,
            status: GroupStatus::Public,
        }
    }

    pub fn with_status(mut self, status: GroupStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id == TOP_LEVEL
    }
}

/// A user's role within one group. Moderators and administrators are members.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Mod,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Member => write!(f, "member"),
            Role::Mod => write!(f, "mod"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "mod" => Ok(Role::Mod),
            "admin" => Ok(Role::Admin),
            _ => Err(format!(
                "unknown role {:?}; expected one of: member, mod, admin",
                s
            )),
        }
    }
}

/// The visibility context a hierarchy query runs under.
///
/// Part of every cache key: the activity context filters differently from
/// the default UI context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Relation {
    /// Directory and navigation listings.
    #[default]
    Default,
    /// Activity stream aggregation.
    Activity,
    /// Everything except hidden groups, regardless of membership.
    ExcludeHidden,
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relation::Default => write!(f, "default"),
            Relation::Activity => write!(f, "activity"),
            Relation::ExcludeHidden => write!(f, "exclude-hidden"),
        }
    }
}

impl std::str::FromStr for Relation {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Relation::Default),
            "activity" => Ok(Relation::Activity),
            "exclude-hidden" => Ok(Relation::ExcludeHidden),
            _ => Err(format!(
                "unknown relation {:?}; expected one of: default, activity, exclude-hidden",
                s
            )),
        }
    }
}

/// Who may create subgroups under a specific group.
///
/// Stored under [`SUBGROUP_CREATORS_META_KEY`]. Absent means `Noone`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubgroupCreators {
    /// Only site administrators.
    #[default]
    Noone,
    /// Group administrators.
    Admin,
    /// Group moderators and administrators.
    Mod,
    /// Any group member.
    Member,
}

impl SubgroupCreators {
    /// Interpret a stored metadata value, falling back to [`SubgroupCreators::Noone`].
    pub fn from_setting(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl std::fmt::Display for SubgroupCreators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubgroupCreators::Noone => write!(f, "noone"),
            SubgroupCreators::Admin => write!(f, "admin"),
            SubgroupCreators::Mod => write!(f, "mod"),
            SubgroupCreators::Member => write!(f, "member"),
        }
    }
}

impl std::str::FromStr for SubgroupCreators {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noone" => Ok(SubgroupCreators::Noone),
            "admin" => Ok(SubgroupCreators::Admin),
            "mod" => Ok(SubgroupCreators::Mod),
            "member" => Ok(SubgroupCreators::Member),
            _ => Err(format!(
                "unknown subgroup creators policy {:?}; expected one of: \
                 noone, admin, mod, member",
                s
            )),
        }
    }
}

/// Process-wide policy deciding who may widen a group's activity stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityEnforcement {
    /// Site administrators only.
    SiteAdmins,
    /// Site administrators and the group's own administrators.
    GroupAdmins,
    /// Nobody; hierarchical aggregation is disabled.
    #[default]
    Strict,
}

impl ActivityEnforcement {
    /// Interpret a configured value, falling back to [`ActivityEnforcement::Strict`].
    pub fn from_setting(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl std::fmt::Display for ActivityEnforcement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityEnforcement::SiteAdmins => write!(f, "site-admins"),
            ActivityEnforcement::GroupAdmins => write!(f, "group-admins"),
            ActivityEnforcement::Strict => write!(f, "strict"),
        }
    }
}

impl std::str::FromStr for ActivityEnforcement {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "site-admins" => Ok(ActivityEnforcement::SiteAdmins),
            "group-admins" => Ok(ActivityEnforcement::GroupAdmins),
            "strict" => Ok(ActivityEnforcement::Strict),
            _ => Err(format!(
                "unknown activity enforcement {:?}; expected one of: \
                 site-admins, group-admins, strict",
                s
            )),
        }
    }
}

/// Which related groups feed a group's activity stream.
///
/// Stored under [`INCLUDE_ACTIVITY_META_KEY`]. Absent means `FromNone`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum IncludeActivity {
    #[default]
    #[serde(rename = "include-from-none")]
    FromNone,
    #[serde(rename = "include-from-parents")]
    FromParents,
    #[serde(rename = "include-from-children")]
    FromChildren,
    #[serde(rename = "include-from-both")]
    FromBoth,
}

impl IncludeActivity {
    /// Interpret a stored metadata value, falling back to [`IncludeActivity::FromNone`].
    pub fn from_setting(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }

    pub fn includes_parents(self) -> bool {
        matches!(self, IncludeActivity::FromParents | IncludeActivity::FromBoth)
    }

    pub fn includes_children(self) -> bool {
        matches!(self, IncludeActivity::FromChildren | IncludeActivity::FromBoth)
    }
}

impl std::fmt::Display for IncludeActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncludeActivity::FromNone => write!(f, "include-from-none"),
            IncludeActivity::FromParents => write!(f, "include-from-parents"),
            IncludeActivity::FromChildren => write!(f, "include-from-children"),
            IncludeActivity::FromBoth => write!(f, "include-from-both"),
        }
    }
}

impl std::str::FromStr for IncludeActivity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "include-from-none" => Ok(IncludeActivity::FromNone),
            "include-from-parents" => Ok(IncludeActivity::FromParents),
            "include-from-children" => Ok(IncludeActivity::FromChildren),
            "include-from-both" => Ok(IncludeActivity::FromBoth),
            _ => Err(format!(
                "unknown activity setting {:?}; expected one of: include-from-none, \
                 include-from-parents, include-from-children, include-from-both",
                s
            )),
        }
    }
}

/// A change notification raised by the host after a successful group mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEvent {
    /// A group was created or edited, including its settings.
    Saved(GroupId),
    Deleted(GroupId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognised_policies_fall_back_to_most_restrictive() {
        assert_eq!(SubgroupCreators::from_setting(Some("everyone")), SubgroupCreators::Noone);
        assert_eq!(SubgroupCreators::from_setting(None), SubgroupCreators::Noone);
        assert_eq!(
            ActivityEnforcement::from_setting(Some("site_admins")),
            ActivityEnforcement::Strict
        );
        assert_eq!(IncludeActivity::from_setting(Some("both")), IncludeActivity::FromNone);
    }

    #[test]
    fn recognised_policies_parse() {
        assert_eq!(SubgroupCreators::from_setting(Some("mod")), SubgroupCreators::Mod);
        assert_eq!(
            ActivityEnforcement::from_setting(Some("group-admins")),
            ActivityEnforcement::GroupAdmins
        );
        assert_eq!(
            IncludeActivity::from_setting(Some("include-from-parents")),
            IncludeActivity::FromParents
        );
    }

    #[test]
    fn include_activity_wire_format_matches_display() {
        for v in [
            IncludeActivity::FromNone,
            IncludeActivity::FromParents,
            IncludeActivity::FromChildren,
            IncludeActivity::FromBoth,
        ] {
            let json = serde_json::to_string(&v).unwrap();
            assert_eq!(json, format!("\"{v}\""));
        }
    }

    #[test]
    fn group_defaults_when_fields_absent() {
        let g: Group = serde_json::from_str(r#"{"id":3,"slug":"pets"}"#).unwrap();
        assert!(g.is_top_level());
        assert_eq!(g.status, GroupStatus::Public);
        assert_eq!(g.name, "");
    }
}
