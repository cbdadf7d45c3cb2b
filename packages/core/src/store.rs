//! Collaborator contracts the engine consumes.
//!
//! The engine never owns group storage. A host provides three things:
//!
//! | Trait | Provides |
//! |-------|----------|
//! | [`GroupStore`] | Group records, child lookups, per-group key-value metadata |
//! | [`Membership`] | Role checks and the visibility predicate |
//! | [`CacheStore`](crate::cache::CacheStore) | A shared key-value cache (see [`cache`](crate::cache)) |
//!
//! All methods are synchronous; the engine runs inside a single request's
//! handling. Implementations must be `Send + Sync` so they can be held in an
//! `Arc<dyn ...>`.

use crate::types::{Group, GroupId, GroupStatus, Relation, UserId, ANONYMOUS};

/// Errors a collaborator can return.
///
/// These are the only errors the engine propagates: if the group store is
/// down there is nothing to compute from.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested item does not exist.
    #[error("not found")]
    NotFound,

    /// The write would violate a storage constraint (e.g. duplicate sibling slug).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An unexpected error in the underlying storage backend.
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Read access to group records and read/write access to group metadata.
pub trait GroupStore: Send + Sync {
    /// Retrieve a group by id. Returns `None` if it does not exist.
    fn get_group(&self, id: GroupId) -> Result<Option<Group>, StoreError>;

    /// The direct children of `parent_id`, ordered by id ascending.
    ///
    /// `parent_id == 0` lists the top-level groups.
    fn child_groups(&self, parent_id: GroupId) -> Result<Vec<Group>, StoreError>;

    /// The direct child of `parent_id` whose slug is `slug`, if any.
    ///
    /// The default walks [`child_groups`](Self::child_groups); backends with
    /// an index should override it.
    fn child_by_slug(&self, parent_id: GroupId, slug: &str) -> Result<Option<Group>, StoreError> {
        Ok(self
            .child_groups(parent_id)?
            .into_iter()
            .find(|g| g.slug == slug))
    }

    /// Every group, ordered by id. With `terms`, only groups whose name or
    /// slug contains them, case-insensitively.
    fn search_groups(&self, terms: Option<&str>) -> Result<Vec<Group>, StoreError>;

    /// Read a metadata value. Returns `None` if the key has never been set.
    fn get_group_meta(&self, id: GroupId, key: &str) -> Result<Option<String>, StoreError>;

    /// Persist a metadata value (upsert by `(id, key)`).
    fn set_group_meta(&self, id: GroupId, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Role lookups and the visibility predicate.
pub trait Membership: Send + Sync {
    fn is_admin(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StoreError>;

    fn is_mod(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StoreError>;

    fn is_member(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StoreError>;

    fn is_site_admin(&self, user_id: UserId) -> Result<bool, StoreError>;

    /// Whether `viewer` may see `group` in the given context.
    ///
    /// The default rule, by relation:
    ///
    /// | Relation | Visible when |
    /// |----------|--------------|
    /// | `default` | not hidden, or viewer is a member, or viewer is a site admin |
    /// | `activity` | public, or viewer is a member |
    /// | `exclude-hidden` | not hidden |
    fn viewer_can_access(
        &self,
        viewer: UserId,
        group: &Group,
        relation: Relation,
    ) -> Result<bool, StoreError> {
        let signed_in = viewer != ANONYMOUS;
        match relation {
            Relation::Default => Ok(group.status != GroupStatus::Hidden
                || (signed_in && self.is_member(viewer, group.id)?)
                || (signed_in && self.is_site_admin(viewer)?)),
            Relation::Activity => Ok(group.status == GroupStatus::Public
                || (signed_in && self.is_member(viewer, group.id)?)),
            Relation::ExcludeHidden => Ok(group.status != GroupStatus::Hidden),
        }
    }
}
