//! The engine facade a host talks to.
//!
//! [`Engine`] wires the collaborators into the resolvers once and exposes the
//! operations a request needs. It owns no state besides the cache; every
//! group mutation is reported back through [`Engine::handle_event`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::activity::ActivityScope;
use crate::cache::{CacheStore, HierarchyCache};
use crate::config::EngineConfig;
use crate::directory::{listing_scope, DirectoryQuery, ListingScope};
use crate::error::EngineError;
use crate::identifier::{Breadcrumb, IdentifierBuilder, PathResolution};
use crate::permissions::PermissionResolver;
use crate::store::{GroupStore, Membership};
use crate::tree::TreeResolver;
use crate::types::{
    Group, GroupEvent, GroupId, IncludeActivity, Relation, SubgroupCreators, UserId,
    INCLUDE_ACTIVITY_META_KEY, SUBGROUP_CREATORS_META_KEY,
};

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub group: Group,
    pub has_children: bool,
    pub permalink: String,
    /// Present in flat listings only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breadcrumbs: Option<Vec<Breadcrumb>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub scope: ListingScope,
    pub entries: Vec<DirectoryEntry>,
}

#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    groups: Arc<dyn GroupStore>,
    members: Arc<dyn Membership>,
    tree: TreeResolver,
    permissions: PermissionResolver,
    activity: ActivityScope,
    identifiers: IdentifierBuilder,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        groups: Arc<dyn GroupStore>,
        members: Arc<dyn Membership>,
        cache_store: Arc<dyn CacheStore>,
    ) -> Self {
        let cache = if config.cache_enabled {
            HierarchyCache::new(cache_store)
        } else {
            HierarchyCache::disabled()
        };
        let tree = TreeResolver::new(groups.clone(), members.clone(), cache, config.max_depth);
        let permissions = PermissionResolver::new(
            groups.clone(),
            members.clone(),
            config.restrict_group_creation,
            config.activity_enforcement,
        );
        let activity = ActivityScope::new(groups.clone(), tree.clone());
        let identifiers = IdentifierBuilder::new(groups.clone(), tree.clone());
        Self {
            config,
            groups,
            members,
            tree,
            permissions,
            activity,
            identifiers,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tree(&self) -> &TreeResolver {
        &self.tree
    }

    pub fn permissions(&self) -> &PermissionResolver {
        &self.permissions
    }

    pub fn identifiers(&self) -> &IdentifierBuilder {
        &self.identifiers
    }

    pub fn cache(&self) -> &HierarchyCache {
        self.tree.cache()
    }

    /// React to a group mutation reported by the host.
    pub fn handle_event(&self, event: GroupEvent) {
        tracing::debug!(?event, "group event");
        match event {
            GroupEvent::Saved(_) | GroupEvent::Deleted(_) => self.cache().invalidate_all(),
        }
    }

    // --- hierarchy ----------------------------------------------------------

    /// Load `group_id` for `viewer`.
    ///
    /// A group the viewer cannot access is reported as not found.
    pub fn visible_group(&self, viewer: UserId, group_id: GroupId) -> Result<Group, EngineError> {
        let group = self.require_group(group_id)?;
        if !self.members.viewer_can_access(viewer, &group, Relation::Default)? {
            return Err(EngineError::GroupNotFound(group_id));
        }
        Ok(group)
    }

    pub fn ancestors(
        &self,
        group_id: GroupId,
        viewer: UserId,
        relation: Relation,
    ) -> Result<Vec<GroupId>, EngineError> {
        Ok(self.tree.ancestors(group_id, viewer, relation)?)
    }

    pub fn descendants(
        &self,
        group_id: GroupId,
        viewer: UserId,
        relation: Relation,
    ) -> Result<Vec<Group>, EngineError> {
        Ok(self.tree.descendants(group_id, viewer, relation)?)
    }

    pub fn children(
        &self,
        group_id: GroupId,
        viewer: UserId,
        relation: Relation,
    ) -> Result<Vec<Group>, EngineError> {
        Ok(self.tree.children(group_id, viewer, relation)?)
    }

    pub fn has_children(
        &self,
        group_id: GroupId,
        viewer: UserId,
        relation: Relation,
    ) -> Result<bool, EngineError> {
        Ok(self.tree.has_children(group_id, viewer, relation)?)
    }

    /// Whether moving `group_id` under `new_parent_id` would form a cycle.
    pub fn would_create_cycle(
        &self,
        group_id: GroupId,
        new_parent_id: GroupId,
    ) -> Result<bool, EngineError> {
        Ok(self.tree.would_create_cycle(group_id, new_parent_id)?)
    }

    // --- permissions --------------------------------------------------------

    pub fn can_create_group(&self, user_id: UserId) -> Result<bool, EngineError> {
        Ok(self.permissions.can_create_group(user_id)?)
    }

    pub fn can_create_subgroup(&self, user_id: UserId, group_id: GroupId) -> Result<bool, EngineError> {
        Ok(self.permissions.can_create_subgroup(user_id, group_id)?)
    }

    pub fn can_include_aggregated_activity(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<bool, EngineError> {
        Ok(self.permissions.can_include_aggregated_activity(user_id, group_id)?)
    }

    pub fn can_manage_group(&self, user_id: UserId, group_id: GroupId) -> Result<bool, EngineError> {
        Ok(self.permissions.can_manage_group(user_id, group_id)?)
    }

    // --- activity -----------------------------------------------------------

    pub fn aggregation_scope(
        &self,
        group_id: GroupId,
        viewer: UserId,
    ) -> Result<Option<Vec<GroupId>>, EngineError> {
        Ok(self.activity.aggregation_scope(group_id, viewer)?)
    }

    /// The groups an activity query for `group_id` should cover.
    ///
    /// Applies the aggregation gate for `viewer` first; a denied or
    /// unconfigured group covers only itself.
    pub fn activity_scope_for(
        &self,
        viewer: UserId,
        group_id: GroupId,
    ) -> Result<Vec<GroupId>, EngineError> {
        if !self.permissions.can_include_aggregated_activity(viewer, group_id)? {
            return Ok(vec![group_id]);
        }
        Ok(self
            .activity
            .aggregation_scope(group_id, viewer)?
            .unwrap_or_else(|| vec![group_id]))
    }

    // --- settings -----------------------------------------------------------

    /// The stored settings of `group_id`, with fallbacks applied.
    pub fn settings(&self, group_id: GroupId) -> Result<(SubgroupCreators, IncludeActivity), EngineError> {
        self.require_group(group_id)?;
        Ok((
            self.permissions.subgroup_creators(group_id)?,
            self.activity.setting(group_id)?,
        ))
    }

    /// Store the subgroup creation policy of `group_id`.
    ///
    /// Only the four enumerated values are accepted; nothing is written otherwise.
    pub fn save_subgroup_creators(
        &self,
        group_id: GroupId,
        value: &str,
    ) -> Result<SubgroupCreators, EngineError> {
        let policy: SubgroupCreators = value.parse().map_err(|_| EngineError::InvalidSetting {
            key: SUBGROUP_CREATORS_META_KEY,
            value: value.to_string(),
        })?;
        self.require_group(group_id)?;
        self.groups
            .set_group_meta(group_id, SUBGROUP_CREATORS_META_KEY, &policy.to_string())?;
        self.handle_event(GroupEvent::Saved(group_id));
        Ok(policy)
    }

    /// Store the activity aggregation setting of `group_id` on behalf of `user_id`.
    ///
    /// Fails with [`EngineError::Forbidden`] unless the user may widen the
    /// group's activity stream.
    pub fn save_include_activity(
        &self,
        user_id: UserId,
        group_id: GroupId,
        value: &str,
    ) -> Result<IncludeActivity, EngineError> {
        let setting: IncludeActivity = value.parse().map_err(|_| EngineError::InvalidSetting {
            key: INCLUDE_ACTIVITY_META_KEY,
            value: value.to_string(),
        })?;
        self.require_group(group_id)?;
        if !self.permissions.can_include_aggregated_activity(user_id, group_id)? {
            return Err(EngineError::Forbidden(format!(
                "user {user_id} may not change activity aggregation of group {group_id}"
            )));
        }
        self.groups
            .set_group_meta(group_id, INCLUDE_ACTIVITY_META_KEY, &setting.to_string())?;
        self.handle_event(GroupEvent::Saved(group_id));
        Ok(setting)
    }

    // --- identifiers --------------------------------------------------------

    pub fn build_hierarchical_slug(&self, group_id: GroupId) -> Result<String, EngineError> {
        self.identifiers.build_hierarchical_slug(group_id)
    }

    pub fn permalink(&self, directory_url: &str, group_id: GroupId) -> Result<String, EngineError> {
        let group = self.require_group(group_id)?;
        Ok(self.identifiers.permalink(directory_url, &group)?)
    }

    pub fn breadcrumbs(
        &self,
        directory_url: &str,
        group_id: GroupId,
    ) -> Result<Vec<Breadcrumb>, EngineError> {
        let group = self.require_group(group_id)?;
        Ok(self.identifiers.breadcrumbs(directory_url, &group)?)
    }

    pub fn resolve_path<S: AsRef<str>>(
        &self,
        segments: &[S],
    ) -> Result<Option<PathResolution>, EngineError> {
        Ok(self.identifiers.resolve_path(segments)?)
    }

    // --- directory ----------------------------------------------------------

    /// List the groups directory for `viewer`.
    pub fn directory(
        &self,
        viewer: UserId,
        query: &DirectoryQuery,
        directory_url: &str,
    ) -> Result<DirectoryListing, EngineError> {
        let scope = listing_scope(self.config.directory_as_tree, query);
        let terms = query
            .search_terms
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let groups = match scope.parent_filter {
            Some(parent) => {
                let needle = terms.map(str::to_lowercase);
                self.tree
                    .children(parent, viewer, Relation::Default)?
                    .into_iter()
                    .filter(|g| match &needle {
                        Some(n) => g.name.to_lowercase().contains(n) || g.slug.contains(n.as_str()),
                        None => true,
                    })
                    .collect()
            }
            None => {
                let mut visible = Vec::new();
                for g in self.groups.search_groups(terms)? {
                    if self.members.viewer_can_access(viewer, &g, Relation::Default)? {
                        visible.push(g);
                    }
                }
                visible
            }
        };

        let mut entries = Vec::with_capacity(groups.len());
        for group in groups {
            let has_children = self.tree.has_children(group.id, viewer, Relation::Default)?;
            let permalink = self.identifiers.permalink(directory_url, &group)?;
            let breadcrumbs = if scope.flat {
                Some(self.identifiers.breadcrumbs(directory_url, &group)?)
            } else {
                None
            };
            entries.push(DirectoryEntry {
                group,
                has_children,
                permalink,
                breadcrumbs,
            });
        }

        tracing::debug!(viewer, ?scope, rows = entries.len(), "directory listing");
        Ok(DirectoryListing { scope, entries })
    }

    fn require_group(&self, group_id: GroupId) -> Result<Group, EngineError> {
        self.groups
            .get_group(group_id)?
            .ok_or(EngineError::GroupNotFound(group_id))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("tree", &self.tree)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}
