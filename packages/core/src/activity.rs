//! Activity aggregation scope.
//!
//! Decides which groups' activity is merged into a group's stream, based on
//! the group's [`IncludeActivity`] setting. This module computes the scope
//! only; whether the caller may widen a stream at all is decided by
//! [`PermissionResolver::can_include_aggregated_activity`](crate::permissions::PermissionResolver::can_include_aggregated_activity).

use std::collections::HashSet;
use std::sync::Arc;

use crate::store::{GroupStore, StoreError};
use crate::tree::TreeResolver;
use crate::types::{GroupId, IncludeActivity, Relation, UserId, INCLUDE_ACTIVITY_META_KEY};

#[derive(Clone)]
pub struct ActivityScope {
    groups: Arc<dyn GroupStore>,
    tree: TreeResolver,
}

impl ActivityScope {
    pub fn new(groups: Arc<dyn GroupStore>, tree: TreeResolver) -> Self {
        Self { groups, tree }
    }

    /// The stored aggregation setting of `group_id`.
    pub fn setting(&self, group_id: GroupId) -> Result<IncludeActivity, StoreError> {
        let raw = self.groups.get_group_meta(group_id, INCLUDE_ACTIVITY_META_KEY)?;
        Ok(IncludeActivity::from_setting(raw.as_deref()))
    }

    /// Groups whose activity belongs in the stream of `group_id`.
    ///
    /// `None` means the stream stays limited to the group itself. Otherwise
    /// the result starts with `group_id`, followed by the ancestors (nearest
    /// first) and then the descendants in resolver order, all filtered with
    /// [`Relation::Activity`]. Ids appear at most once.
    pub fn aggregation_scope(
        &self,
        group_id: GroupId,
        viewer: UserId,
    ) -> Result<Option<Vec<GroupId>>, StoreError> {
        let setting = self.setting(group_id)?;
        if setting == IncludeActivity::FromNone {
            return Ok(None);
        }

        let mut scope = vec![group_id];
        if setting.includes_parents() {
            scope.extend(self.tree.ancestors(group_id, viewer, Relation::Activity)?);
        }
        if setting.includes_children() {
            scope.extend(
                self.tree
                    .descendants(group_id, viewer, Relation::Activity)?
                    .into_iter()
                    .map(|g| g.id),
            );
        }

        let mut seen = HashSet::new();
        scope.retain(|id| seen.insert(*id));

        tracing::debug!(group_id, viewer, %setting, size = scope.len(), "activity scope");
        Ok(Some(scope))
    }
}

impl std::fmt::Debug for ActivityScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityScope")
            .field("tree", &self.tree)
            .finish_non_exhaustive()
    }
}
