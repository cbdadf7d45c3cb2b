//! Storage layer for the groups node.
//!
//! A backend serves two audiences:
//!
//! - The HTTP handlers, through the async [`Storage`] trait: group writes,
//!   memberships and site administrators.
//! - The engine, through the synchronous [`GroupStore`] and [`Membership`]
//!   collaborator traits from `hgroups`. Handlers call the engine inside
//!   `spawn_blocking`, so these may block.
//!
//! All authorization decisions live in the handlers and the engine; storage
//! only enforces data constraints (sibling slug uniqueness).
//!
//! # Implementations
//!
//! | Type | When to use |
//! |------|-------------|
//! | [`MemoryStorage`] | Tests, conformance suite, ephemeral nodes |
//! | [`SqliteStorage`] | Production; durable single-file database, also serves as the shared cache |
//!
//! [`MemoryStorage`]: memory::MemoryStorage
//! [`SqliteStorage`]: sqlite::SqliteStorage
//! [`GroupStore`]: hgroups::GroupStore
//! [`Membership`]: hgroups::Membership

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;

use async_trait::async_trait;
use hgroups::{Group, GroupId, GroupStatus, Role, UserId, TOP_LEVEL};

/// Errors that storage operations can return. Shared with the engine.
pub use hgroups::StoreError as StorageError;

/// A group to be created. The backend assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub parent_id: GroupId,
    pub slug: String,
    pub name: String,
    pub status: GroupStatus,
}

/// The write side of a groups node.
///
/// All methods are `async` and return `Result<_, StorageError>`. Implementations
/// must be `Send + Sync + 'static` so they can be held in an `Arc<dyn Storage>`.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    // --- Groups --------------------------------------------------------------

    /// Persist a new group and return it with its assigned id.
    ///
    /// Returns [`StorageError::Conflict`] if a sibling already uses the slug.
    async fn create_group(&self, group: &NewGroup) -> Result<Group, StorageError>;

    /// Replace a stored group record.
    ///
    /// Returns [`StorageError::NotFound`] for an unknown id and
    /// [`StorageError::Conflict`] if the new slug clashes with a sibling or
    /// the new parent is the group itself or one of its descendants.
    async fn update_group(&self, group: &Group) -> Result<(), StorageError>;

    /// Delete a group with its metadata and memberships.
    ///
    /// The group's children move up to the deleted group's parent. Returns
    /// the deleted record, or [`StorageError::NotFound`].
    async fn delete_group(&self, id: GroupId) -> Result<Group, StorageError>;

    // --- Memberships ---------------------------------------------------------

    /// Set or clear (`None`) the role of `user_id` in `group_id`.
    async fn set_role(
        &self,
        user_id: UserId,
        group_id: GroupId,
        role: Option<Role>,
    ) -> Result<(), StorageError>;

    /// Mark `user_id` as a site administrator. Idempotent.
    async fn add_site_admin(&self, user_id: UserId) -> Result<(), StorageError>;
}

/// Sibling slug clash message shared by the backends.
pub(crate) fn slug_conflict(parent_id: GroupId, slug: &str) -> StorageError {
    StorageError::Conflict(format!(
        "slug {slug:?} is already used under parent {parent_id}"
    ))
}

/// Rejects moving `group` under its own subtree.
///
/// `parent_of` reads a stored group's parent. Call it under the same lock or
/// transaction as the write.
pub(crate) fn ensure_acyclic(
    group: &Group,
    mut parent_of: impl FnMut(GroupId) -> Result<Option<GroupId>, StorageError>,
) -> Result<(), StorageError> {
    let mut seen: HashSet<GroupId> = HashSet::new();
    let mut current = group.parent_id;
    while current != TOP_LEVEL {
        if current == group.id || !seen.insert(current) {
            return Err(StorageError::Conflict(format!(
                "moving group {} under {} would create a cycle",
                group.id, group.parent_id
            )));
        }
        match parent_of(current)? {
            Some(parent_id) => current = parent_id,
            None => break,
        }
    }
    Ok(())
}
