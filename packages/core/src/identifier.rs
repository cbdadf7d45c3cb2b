//! Hierarchical identifiers: slugs, permalinks, breadcrumbs and the reverse
//! mapping from URL path segments back to a group.
//!
//! Identifiers never depend on the viewer. A slug path includes every
//! ancestor, even ones the current viewer cannot access; access control
//! happens when the resulting page is requested.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::store::{GroupStore, StoreError};
use crate::tree::TreeResolver;
use crate::types::{Group, GroupId, TOP_LEVEL};

/// Separator between slugs in a hierarchical slug.
pub const PATH_SEPARATOR: char = '/';

/// One entry of a breadcrumb trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub id: GroupId,
    pub name: String,
    pub permalink: String,
}

/// A group located from URL segments, plus the segments left over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResolution {
    pub group: Group,
    /// Segments after the deepest matched group, e.g. `["members"]`.
    pub action_variables: Vec<String>,
}

#[derive(Clone)]
pub struct IdentifierBuilder {
    groups: Arc<dyn GroupStore>,
    tree: TreeResolver,
}

impl IdentifierBuilder {
    pub fn new(groups: Arc<dyn GroupStore>, tree: TreeResolver) -> Self {
        Self { groups, tree }
    }

    /// Root-first slug path of `group_id`, e.g. `animals/pets/kittens`.
    pub fn build_hierarchical_slug(&self, group_id: GroupId) -> Result<String, EngineError> {
        let group = self
            .groups
            .get_group(group_id)?
            .ok_or(EngineError::GroupNotFound(group_id))?;
        Ok(self.slug_for(&group)?)
    }

    /// Slug path of an already loaded group.
    pub fn slug_for(&self, group: &Group) -> Result<String, StoreError> {
        if group.is_top_level() {
            return Ok(group.slug.clone());
        }
        let mut path: Vec<String> = self
            .tree
            .lineage(group.id)?
            .into_iter()
            .map(|g| g.slug)
            .collect();
        path.push(group.slug.clone());
        Ok(path.join(&PATH_SEPARATOR.to_string()))
    }

    /// Canonical URL of `group` under the groups directory. Always ends in `/`.
    pub fn permalink(&self, directory_url: &str, group: &Group) -> Result<String, StoreError> {
        let base = directory_url.trim_end_matches(PATH_SEPARATOR);
        Ok(format!("{base}/{}/", self.slug_for(group)?))
    }

    /// Root-first trail ending with `group` itself.
    pub fn breadcrumbs(&self, directory_url: &str, group: &Group) -> Result<Vec<Breadcrumb>, StoreError> {
        let base = directory_url.trim_end_matches(PATH_SEPARATOR);
        let mut trail = Vec::new();
        let mut path = String::new();
        for g in self.tree.lineage(group.id)?.iter().chain(std::iter::once(group)) {
            if !path.is_empty() {
                path.push(PATH_SEPARATOR);
            }
            path.push_str(&g.slug);
            trail.push(Breadcrumb {
                id: g.id,
                name: g.name.clone(),
                permalink: format!("{base}/{path}/"),
            });
        }
        Ok(trail)
    }

    /// Find the group addressed by `segments`, walking down from the top level.
    ///
    /// Returns `None` when the first segment names no top-level group.
    pub fn resolve_path<S: AsRef<str>>(
        &self,
        segments: &[S],
    ) -> Result<Option<PathResolution>, StoreError> {
        let mut matched: Option<Group> = None;
        let mut consumed = 0;

        for segment in segments {
            let segment = segment.as_ref();
            if segment.is_empty() {
                consumed += 1;
                continue;
            }
            let parent = matched.as_ref().map_or(TOP_LEVEL, |g| g.id);
            match self.groups.child_by_slug(parent, segment)? {
                Some(child) if child.id != parent => {
                    matched = Some(child);
                    consumed += 1;
                }
                _ => break,
            }
        }

        Ok(matched.map(|group| PathResolution {
            group,
            action_variables: segments[consumed..]
                .iter()
                .map(|s| s.as_ref().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }))
    }
}

impl std::fmt::Debug for IdentifierBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierBuilder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{HierarchyCache, MemoryCacheStore};
    use crate::forest::Forest;
    use crate::types::GroupStatus;

    const DIR: &str = "https://example.com/groups/";

    fn fixture() -> (Arc<Forest>, IdentifierBuilder) {
        let f = Arc::new(Forest::from_groups([
            Group::new(1, 0, "animals").with_name("Animals"),
            Group::new(2, 1, "pets").with_name("Pets"),
            Group::new(3, 2, "kittens").with_name("Kittens"),
            Group::new(4, 0, "pets").with_name("Pet Owners"),
        ]));
        let cache = HierarchyCache::new(Arc::new(MemoryCacheStore::new()));
        let tree = TreeResolver::new(f.clone(), f.clone(), cache, 100);
        let ids = IdentifierBuilder::new(f.clone(), tree);
        (f, ids)
    }

    #[test]
    fn hierarchical_slug() {
        let (_, ids) = fixture();
        assert_eq!(ids.build_hierarchical_slug(3).unwrap(), "animals/pets/kittens");
        assert_eq!(ids.build_hierarchical_slug(1).unwrap(), "animals");
        assert!(matches!(
            ids.build_hierarchical_slug(99),
            Err(EngineError::GroupNotFound(99))
        ));
    }

    #[test]
    fn slug_includes_private_and_hidden_ancestors() {
        let (f, ids) = fixture();
        f.insert(Group::new(1, 0, "animals").with_status(GroupStatus::Hidden));
        f.insert(Group::new(2, 1, "pets").with_status(GroupStatus::Private));
        assert_eq!(ids.build_hierarchical_slug(3).unwrap(), "animals/pets/kittens");
    }

    #[test]
    fn permalinks() {
        let (f, ids) = fixture();
        let kittens = f.get_group(3).unwrap().unwrap();
        let animals = f.get_group(1).unwrap().unwrap();
        assert_eq!(
            ids.permalink(DIR, &kittens).unwrap(),
            "https://example.com/groups/animals/pets/kittens/"
        );
        assert_eq!(
            ids.permalink("https://example.com/groups", &animals).unwrap(),
            "https://example.com/groups/animals/"
        );
    }

    #[test]
    fn breadcrumb_trail() {
        let (f, ids) = fixture();
        let kittens = f.get_group(3).unwrap().unwrap();
        let trail = ids.breadcrumbs(DIR, &kittens).unwrap();
        let names: Vec<_> = trail.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Animals", "Pets", "Kittens"]);
        assert_eq!(trail[1].permalink, "https://example.com/groups/animals/pets/");
        assert_eq!(trail[2].id, 3);
    }

    #[test]
    fn resolve_with_action_variables() {
        let (_, ids) = fixture();
        let r = ids
            .resolve_path(&["animals", "pets", "kittens", "members"])
            .unwrap()
            .unwrap();
        assert_eq!(r.group.id, 3);
        assert_eq!(r.action_variables, vec!["members"]);

        let r = ids.resolve_path(&["animals", "pets", "", ""]).unwrap().unwrap();
        assert_eq!(r.group.id, 2);
        assert!(r.action_variables.is_empty());
    }

    #[test]
    fn same_slug_under_different_parents() {
        let (_, ids) = fixture();
        assert_eq!(ids.resolve_path(&["pets"]).unwrap().unwrap().group.id, 4);
        assert_eq!(ids.resolve_path(&["animals", "pets"]).unwrap().unwrap().group.id, 2);
    }

    #[test]
    fn unknown_first_segment() {
        let (_, ids) = fixture();
        assert!(ids.resolve_path(&["kittens"]).unwrap().is_none());
        assert!(ids.resolve_path::<&str>(&[]).unwrap().is_none());
    }
}
