//! Ancestor and descendant derivation over the implicit parent-reference tree.
//!
//! The tree is never materialised. Every walk follows `parent_id` upward or
//! asks the store for direct children downward, consults the
//! [`HierarchyCache`] first, and populates it on a miss.
//!
//! Walks are defensive against corrupt data: a revisited id ends the walk
//! with the result accumulated so far, and no walk takes more than
//! `max_depth` steps.

use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::{CacheKey, CacheKind, HierarchyCache, Lookup};
use crate::store::{GroupStore, Membership, StoreError};
use crate::types::{Group, GroupId, Relation, UserId, ANONYMOUS, TOP_LEVEL};

/// Resolves hierarchy relations for a viewer.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct TreeResolver {
    groups: Arc<dyn GroupStore>,
    members: Arc<dyn Membership>,
    cache: HierarchyCache,
    max_depth: usize,
}

impl TreeResolver {
    pub fn new(
        groups: Arc<dyn GroupStore>,
        members: Arc<dyn Membership>,
        cache: HierarchyCache,
        max_depth: usize,
    ) -> Self {
        Self {
            groups,
            members,
            cache,
            max_depth: max_depth.max(1),
        }
    }

    pub fn cache(&self) -> &HierarchyCache {
        &self.cache
    }

    /// Ids of the ancestors of `group_id` the viewer can access, nearest
    /// parent first.
    ///
    /// An inaccessible ancestor is skipped but the walk continues through it.
    /// Top-level and unknown groups have no ancestors.
    pub fn ancestors(
        &self,
        group_id: GroupId,
        viewer: UserId,
        relation: Relation,
    ) -> Result<Vec<GroupId>, StoreError> {
        let key = CacheKey::new(CacheKind::Ancestors, group_id, viewer, relation);
        let slot = match self.cache.lookup(&key) {
            Lookup::Hit(hit) => return Ok(hit),
            Lookup::Miss(slot) => slot,
        };

        let mut ancestors = Vec::new();
        for parent in self.walk_up(group_id)? {
            if self.members.viewer_can_access(viewer, &parent, relation)? {
                ancestors.push(parent.id);
            }
        }

        self.cache.fill(slot, &ancestors);
        Ok(ancestors)
    }

    /// Every ancestor of `group_id`, root first, with no visibility filter.
    ///
    /// Used to build permalinks, which must not depend on who is asking.
    pub fn lineage(&self, group_id: GroupId) -> Result<Vec<Group>, StoreError> {
        let key = CacheKey::new(CacheKind::Lineage, group_id, ANONYMOUS, Relation::Default);
        let slot = match self.cache.lookup(&key) {
            Lookup::Hit(hit) => return Ok(hit),
            Lookup::Miss(slot) => slot,
        };

        let mut lineage = self.walk_up(group_id)?;
        lineage.reverse();

        self.cache.fill(slot, &lineage);
        Ok(lineage)
    }

    /// The direct children of `group_id` the viewer can access, ordered by id.
    pub fn children(
        &self,
        group_id: GroupId,
        viewer: UserId,
        relation: Relation,
    ) -> Result<Vec<Group>, StoreError> {
        let key = CacheKey::new(CacheKind::Children, group_id, viewer, relation);
        let slot = match self.cache.lookup(&key) {
            Lookup::Hit(hit) => return Ok(hit),
            Lookup::Miss(slot) => slot,
        };

        let mut children = Vec::new();
        for child in self.groups.child_groups(group_id)? {
            if child.id == group_id {
                continue;
            }
            if self.members.viewer_can_access(viewer, &child, relation)? {
                children.push(child);
            }
        }

        self.cache.fill(slot, &children);
        Ok(children)
    }

    /// All descendants of `group_id` the viewer can access, depth-first in
    /// preorder with siblings ordered by id.
    ///
    /// A child the viewer cannot access is left out together with its whole
    /// subtree. The result never contains `group_id` itself or duplicates.
    pub fn descendants(
        &self,
        group_id: GroupId,
        viewer: UserId,
        relation: Relation,
    ) -> Result<Vec<Group>, StoreError> {
        let key = CacheKey::new(CacheKind::Descendants, group_id, viewer, relation);
        let slot = match self.cache.lookup(&key) {
            Lookup::Hit(hit) => return Ok(hit),
            Lookup::Miss(slot) => slot,
        };

        let mut visited: HashSet<GroupId> = HashSet::new();
        visited.insert(group_id);
        // Entries carry their depth below `group_id`. Siblings are pushed in
        // reverse so the lowest id pops first.
        let mut stack: Vec<(Group, usize)> = Vec::new();
        for child in self.unvisited_children(group_id, group_id, viewer, relation, &mut visited)?
            .into_iter()
            .rev()
        {
            stack.push((child, 1));
        }
        let mut descendants: Vec<Group> = Vec::new();
        let mut truncated = false;

        while let Some((group, depth)) = stack.pop() {
            let id = group.id;
            descendants.push(group);
            if depth == self.max_depth {
                truncated |= !self.groups.child_groups(id)?.is_empty();
                continue;
            }
            for child in self
                .unvisited_children(group_id, id, viewer, relation, &mut visited)?
                .into_iter()
                .rev()
            {
                stack.push((child, depth + 1));
            }
        }

        if truncated {
            tracing::warn!(
                group_id,
                max_depth = self.max_depth,
                "descendant walk hit the depth bound; returning partial result"
            );
        }

        self.cache.fill(slot, &descendants);
        Ok(descendants)
    }

    /// Whether `group_id` has at least one descendant the viewer can access.
    ///
    /// Because inaccessible children hide their subtrees, this only needs to
    /// look at direct children and agrees with `!descendants(..).is_empty()`.
    pub fn has_children(
        &self,
        group_id: GroupId,
        viewer: UserId,
        relation: Relation,
    ) -> Result<bool, StoreError> {
        let key = CacheKey::new(CacheKind::HasChildren, group_id, viewer, relation);
        let slot = match self.cache.lookup(&key) {
            Lookup::Hit(hit) => return Ok(hit),
            Lookup::Miss(slot) => slot,
        };

        let mut found = false;
        for child in self.groups.child_groups(group_id)? {
            if child.id != group_id && self.members.viewer_can_access(viewer, &child, relation)? {
                found = true;
                break;
            }
        }

        self.cache.fill(slot, &found);
        Ok(found)
    }

    /// Whether making `new_parent_id` the parent of `group_id` would put
    /// `group_id` inside its own subtree.
    ///
    /// Always reads the store directly. An existing cycle or an exhausted
    /// depth bound above `new_parent_id` also counts as a cycle.
    pub fn would_create_cycle(
        &self,
        group_id: GroupId,
        new_parent_id: GroupId,
    ) -> Result<bool, StoreError> {
        if new_parent_id == group_id {
            return Ok(true);
        }
        let mut seen: HashSet<GroupId> = HashSet::new();
        let mut current = new_parent_id;
        for _ in 0..self.max_depth {
            if current == TOP_LEVEL {
                return Ok(false);
            }
            if current == group_id || !seen.insert(current) {
                return Ok(true);
            }
            match self.groups.get_group(current)? {
                Some(g) => current = g.parent_id,
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    // Accessible children of `parent_id` not seen yet in the walk rooted at
    // `root`, ordered by id. Inaccessible children are marked visited too so
    // their subtrees stay hidden.
    fn unvisited_children(
        &self,
        root: GroupId,
        parent_id: GroupId,
        viewer: UserId,
        relation: Relation,
        visited: &mut HashSet<GroupId>,
    ) -> Result<Vec<Group>, StoreError> {
        let mut children = Vec::new();
        for child in self.groups.child_groups(parent_id)? {
            if !visited.insert(child.id) {
                tracing::warn!(
                    group_id = root,
                    revisited = child.id,
                    "cycle in group hierarchy; skipping revisited group"
                );
                continue;
            }
            if self.members.viewer_can_access(viewer, &child, relation)? {
                children.push(child);
            }
        }
        children.sort_by_key(|g| g.id);
        Ok(children)
    }

    // Unfiltered parent chain of `group_id`, nearest first.
    fn walk_up(&self, group_id: GroupId) -> Result<Vec<Group>, StoreError> {
        let Some(mut current) = self.groups.get_group(group_id)? else {
            return Ok(vec![]);
        };

        let mut seen: HashSet<GroupId> = HashSet::new();
        seen.insert(group_id);
        let mut chain = Vec::new();

        while !current.is_top_level() {
            if chain.len() == self.max_depth {
                tracing::warn!(
                    group_id,
                    max_depth = self.max_depth,
                    "ancestor walk hit the depth bound; returning partial result"
                );
                break;
            }
            let parent_id = current.parent_id;
            if !seen.insert(parent_id) {
                tracing::warn!(
                    group_id,
                    revisited = parent_id,
                    "cycle in group hierarchy; stopping ancestor walk"
                );
                break;
            }
            let Some(parent) = self.groups.get_group(parent_id)? else {
                break;
            };
            chain.push(parent.clone());
            current = parent;
        }

        Ok(chain)
    }
}

impl std::fmt::Debug for TreeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeResolver")
            .field("cache", &self.cache)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

// --- tests -------------------------------------------------------------------
