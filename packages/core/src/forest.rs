use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use crate::store::{GroupStore, Membership, StoreError};
use crate::types::{Group, GroupId, Role, UserId};

/// A local, in-memory collection of [`Group`]s with roles and metadata.
///
/// The forest is not a storage engine. It is a snapshot that implements the
/// collaborator traits so the engine can run offline (the CLI) or against
/// fixtures (tests). Groups are indexed by `id`; inserting a duplicate `id`
/// replaces the earlier entry.
#[derive(Debug, Default)]
pub struct Forest {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    groups: BTreeMap<GroupId, Group>,
    meta: HashMap<(GroupId, String), String>,
    roles: HashMap<(UserId, GroupId), Role>,
    site_admins: HashSet<UserId>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Internal("forest lock poisoned".into())
}

impl Forest {
    /// Create an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a forest from an iterator of groups.
    pub fn from_groups(iter: impl IntoIterator<Item = Group>) -> Self {
        let forest = Self::new();
        for g in iter {
            forest.insert(g);
        }
        forest
    }

    /// Insert a group. If a group with the same `id` already exists, it is replaced.
    pub fn insert(&self, group: Group) {
        if let Ok(mut inner) = self.inner.write() {
            inner.groups.insert(group.id, group);
        }
    }

    /// Point `id` at a new parent. No-op if the group is unknown.
    pub fn set_parent(&self, id: GroupId, parent_id: GroupId) {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(g) = inner.groups.get_mut(&id) {
                g.parent_id = parent_id;
            }
        }
    }

    pub fn remove(&self, id: GroupId) -> Option<Group> {
        self.inner.write().ok()?.groups.remove(&id)
    }

    /// Give `user_id` a role in `group_id`, replacing any previous role.
    pub fn grant(&self, user_id: UserId, group_id: GroupId, role: Role) {
        if let Ok(mut inner) = self.inner.write() {
            inner.roles.insert((user_id, group_id), role);
        }
    }

    pub fn add_site_admin(&self, user_id: UserId) {
        if let Ok(mut inner) = self.inner.write() {
            inner.site_admins.insert(user_id);
        }
    }

    /// Total number of groups.
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.groups.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of every group, ordered by id.
    pub fn groups(&self) -> Vec<Group> {
        self.inner
            .read()
            .map(|i| i.groups.values().cloned().collect())
            .unwrap_or_default()
    }

    fn role(&self, user_id: UserId, group_id: GroupId) -> Result<Option<Role>, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.roles.get(&(user_id, group_id)).copied())
    }
}

impl GroupStore for Forest {
    fn get_group(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.groups.get(&id).cloned())
    }

    fn child_groups(&self, parent_id: GroupId) -> Result<Vec<Group>, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .groups
            .values()
            .filter(|g| g.parent_id == parent_id)
            .cloned()
            .collect())
    }

    fn search_groups(&self, terms: Option<&str>) -> Result<Vec<Group>, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        let needle = terms.map(str::to_lowercase);
        Ok(inner
            .groups
            .values()
            .filter(|g| match &needle {
                Some(n) => g.name.to_lowercase().contains(n) || g.slug.contains(n.as_str()),
                None => true,
            })
            .cloned()
            .collect())
    }

    fn get_group_meta(&self, id: GroupId, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.meta.get(&(id, key.to_string())).cloned())
    }

    fn set_group_meta(&self, id: GroupId, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.meta.insert((id, key.to_string()), value.to_string());
        Ok(())
    }
}

impl Membership for Forest {
    fn is_admin(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StoreError> {
        Ok(self.role(user_id, group_id)? == Some(Role::Admin))
    }

    fn is_mod(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StoreError> {
        Ok(self.role(user_id, group_id)? == Some(Role::Mod))
    }

    fn is_member(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StoreError> {
        Ok(self.role(user_id, group_id)?.is_some())
    }

    fn is_site_admin(&self, user_id: UserId) -> Result<bool, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.site_admins.contains(&user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SUBGROUP_CREATORS_META_KEY, TOP_LEVEL};

    #[test]
    fn insert_and_lookup() {
        let f = Forest::from_groups([Group::new(1, 0, "animals"), Group::new(2, 1, "pets")]);
        assert_eq!(f.len(), 2);
        assert_eq!(f.get_group(2).unwrap().map(|g| g.slug), Some("pets".into()));
        assert!(f.get_group(9).unwrap().is_none());
    }

    #[test]
    fn children_are_ordered_by_id() {
        let f = Forest::from_groups([
            Group::new(1, 0, "animals"),
            Group::new(5, 1, "wild"),
            Group::new(2, 1, "pets"),
        ]);
        let ids: Vec<_> = f.child_groups(1).unwrap().into_iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![2, 5]);
        assert_eq!(f.child_groups(TOP_LEVEL).unwrap().len(), 1);
        assert_eq!(f.child_by_slug(1, "wild").unwrap().map(|g| g.id), Some(5));
    }

    #[test]
    fn search_matches_name_or_slug() {
        let f = Forest::from_groups([
            Group::new(1, 0, "animals").with_name("Animal Lovers"),
            Group::new(2, 1, "pets"),
        ]);
        assert_eq!(f.search_groups(None).unwrap().len(), 2);
        let hits: Vec<_> = f.search_groups(Some("LOVER")).unwrap().into_iter().map(|g| g.id).collect();
        assert_eq!(hits, vec![1]);
        assert_eq!(f.search_groups(Some("pet")).unwrap()[0].id, 2);
    }

    #[test]
    fn roles() {
        let f = Forest::new();
        f.grant(10, 1, Role::Mod);
        assert!(f.is_mod(10, 1).unwrap());
        assert!(f.is_member(10, 1).unwrap());
        assert!(!f.is_admin(10, 1).unwrap());
        assert!(!f.is_member(10, 2).unwrap());
    }

    #[test]
    fn meta_roundtrip() {
        let f = Forest::new();
        assert!(f.get_group_meta(1, SUBGROUP_CREATORS_META_KEY).unwrap().is_none());
        f.set_group_meta(1, SUBGROUP_CREATORS_META_KEY, "mod").unwrap();
        assert_eq!(
            f.get_group_meta(1, SUBGROUP_CREATORS_META_KEY).unwrap().as_deref(),
            Some("mod")
        );
    }
}
