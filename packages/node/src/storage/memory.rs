//! In-memory storage implementation.
//!
//! All data is held in RAM behind a [`RwLock`] and is lost when the process
//! exits. Use this for tests, the conformance suite, and ephemeral nodes.
//!
//! Groups live in a [`BTreeMap`] keyed by id, so child lookups come back in
//! id order without sorting.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use hgroups::{Group, GroupId, GroupStore, Membership, Role, UserId};

use super::{ensure_acyclic, slug_conflict, NewGroup, Storage, StorageError};

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    groups: BTreeMap<GroupId, Group>,
    meta: HashMap<(GroupId, String), String>,
    roles: HashMap<(UserId, GroupId), Role>,
    site_admins: HashSet<UserId>,
    last_id: GroupId,
}

impl Inner {
    fn slug_taken(&self, parent_id: GroupId, slug: &str, except: GroupId) -> bool {
        self.groups
            .values()
            .any(|g| g.parent_id == parent_id && g.slug == slug && g.id != except)
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Internal("memory storage lock poisoned".into())
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// Thread-safe, in-memory implementation of [`Storage`], [`GroupStore`] and [`Membership`].
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Storage impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_group(&self, group: &NewGroup) -> Result<Group, StorageError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if inner.slug_taken(group.parent_id, &group.slug, 0) {
            return Err(slug_conflict(group.parent_id, &group.slug));
        }
        inner.last_id += 1;
        let created = Group {
            id: inner.last_id,
            parent_id: group.parent_id,
            slug: group.slug.clone(),
            name: group.name.clone(),
            status: group.status,
        };
        inner.groups.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_group(&self, group: &Group) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let stored_parent = inner.groups.get(&group.id).ok_or(StorageError::NotFound)?.parent_id;
        if stored_parent != group.parent_id {
            ensure_acyclic(group, |id| Ok(inner.groups.get(&id).map(|g| g.parent_id)))?;
        }
        if inner.slug_taken(group.parent_id, &group.slug, group.id) {
            return Err(slug_conflict(group.parent_id, &group.slug));
        }
        inner.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn delete_group(&self, id: GroupId) -> Result<Group, StorageError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let new_parent = inner.groups.get(&id).ok_or(StorageError::NotFound)?.parent_id;
        for child in inner.groups.values().filter(|g| g.parent_id == id) {
            if inner.slug_taken(new_parent, &child.slug, id) {
                return Err(slug_conflict(new_parent, &child.slug));
            }
        }
        let removed = inner.groups.remove(&id).ok_or(StorageError::NotFound)?;
        for g in inner.groups.values_mut() {
            if g.parent_id == id {
                g.parent_id = removed.parent_id;
            }
        }
        inner.meta.retain(|(group_id, _), _| *group_id != id);
        inner.roles.retain(|(_, group_id), _| *group_id != id);
        Ok(removed)
    }

    async fn set_role(
        &self,
        user_id: UserId,
        group_id: GroupId,
        role: Option<Role>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if !inner.groups.contains_key(&group_id) {
            return Err(StorageError::NotFound);
        }
        match role {
            Some(role) => {
                inner.roles.insert((user_id, group_id), role);
            }
            None => {
                inner.roles.remove(&(user_id, group_id));
            }
        }
        Ok(())
    }

    async fn add_site_admin(&self, user_id: UserId) -> Result<(), StorageError> {
        self.inner.write().map_err(poisoned)?.site_admins.insert(user_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engine collaborators
// ---------------------------------------------------------------------------

impl GroupStore for MemoryStorage {
    fn get_group(&self, id: GroupId) -> Result<Option<Group>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.groups.get(&id).cloned())
    }

    fn child_groups(&self, parent_id: GroupId) -> Result<Vec<Group>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .groups
            .values()
            .filter(|g| g.parent_id == parent_id)
            .cloned()
            .collect())
    }

    fn search_groups(&self, terms: Option<&str>) -> Result<Vec<Group>, StorageError> {
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

    fn get_group_meta(&self, id: GroupId, key: &str) -> Result<Option<String>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.meta.get(&(id, key.to_string())).cloned())
    }

    fn set_group_meta(&self, id: GroupId, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.meta.insert((id, key.to_string()), value.to_string());
        Ok(())
    }
}

impl MemoryStorage {
    fn role(&self, user_id: UserId, group_id: GroupId) -> Result<Option<Role>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.roles.get(&(user_id, group_id)).copied())
    }
}

impl Membership for MemoryStorage {
    fn is_admin(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StorageError> {
        Ok(self.role(user_id, group_id)? == Some(Role::Admin))
    }

    fn is_mod(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StorageError> {
        Ok(self.role(user_id, group_id)? == Some(Role::Mod))
    }

    fn is_member(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StorageError> {
        Ok(self.role(user_id, group_id)?.is_some())
    }

    fn is_site_admin(&self, user_id: UserId) -> Result<bool, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.site_admins.contains(&user_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
