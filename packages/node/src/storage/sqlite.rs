//! SQLite-backed storage implementation.
//!
//! Uses `rusqlite` (with bundled SQLite) wrapped in an `Arc<Mutex<Connection>>`
//! to satisfy the `Send + Sync` requirements. The async [`Storage`] methods
//! offload to a thread-pool via `tokio::task::spawn_blocking`; the engine
//! collaborator traits are synchronous and are only called from blocking
//! tasks.
//!
//! # Schema
//!
//! - `groups` — group records; `(parent_id, slug)` is unique.
//! - `group_meta` — per-group key-value settings.
//! - `memberships` — (user, group) roles.
//! - `site_admins` — site administrator user ids.
//! - `cache_entries` — the hierarchy cache, including its generation token.
//!   Keeping it in the database shares invalidations between every process
//!   using the same file. Advancing the generation deletes the rows of every
//!   earlier one.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use hgroups::{
    CacheError, CacheStore, Group, GroupId, GroupStore, Membership, Role, UserId, GENERATION_KEY,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{ensure_acyclic, slug_conflict, NewGroup, Storage, StorageError};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS groups (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id   INTEGER NOT NULL DEFAULT 0,
    slug        TEXT NOT NULL,
    name        TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'public',
    UNIQUE (parent_id, slug)
);
CREATE INDEX IF NOT EXISTS idx_groups_parent ON groups(parent_id);

CREATE TABLE IF NOT EXISTS group_meta (
    group_id    INTEGER NOT NULL,
    meta_key    TEXT NOT NULL,
    meta_value  TEXT NOT NULL,
    PRIMARY KEY (group_id, meta_key)
);

CREATE TABLE IF NOT EXISTS memberships (
    user_id     INTEGER NOT NULL,
    group_id    INTEGER NOT NULL,
    role        TEXT NOT NULL,
    PRIMARY KEY (user_id, group_id)
);
CREATE INDEX IF NOT EXISTS idx_memberships_group ON memberships(group_id);

CREATE TABLE IF NOT EXISTS site_admins (
    user_id     INTEGER PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS cache_entries (
    cache_key   TEXT PRIMARY KEY,
    cache_value TEXT NOT NULL
);
";

const GROUP_COLUMNS: &str = "id, parent_id, slug, name, status";

// ---------------------------------------------------------------------------
// SqliteStorage
// ---------------------------------------------------------------------------

/// SQLite-backed implementation of [`Storage`], [`GroupStore`], [`Membership`]
/// and [`CacheStore`].
///
/// Holds a single database connection protected by a `Mutex`.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) the SQLite database at `path` and apply the schema.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database (data is lost when dropped).
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(poisoned)
    }

    /// Run `f` against the connection on the blocking thread-pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(poisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StorageError::Internal(format!("task join error: {e}")))?
    }
}

// ---------------------------------------------------------------------------
// Error conversions
// ---------------------------------------------------------------------------

fn map_err(e: rusqlite::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Internal("sqlite connection lock poisoned".into())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn map_cache_err(e: rusqlite::Error) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn group_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    let status: String = row.get(4)?;
    let status = status.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;
    Ok(Group {
        id: row.get::<_, i64>(0)? as GroupId,
        parent_id: row.get::<_, i64>(1)? as GroupId,
        slug: row.get(2)?,
        name: row.get(3)?,
        status,
    })
}

fn fetch_group(conn: &Connection, id: GroupId) -> Result<Option<Group>, StorageError> {
    conn.query_row(
        &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = ?1"),
        params![id as i64],
        group_from_row,
    )
    .optional()
    .map_err(map_err)
}

fn fetch_role(conn: &Connection, user_id: UserId, group_id: GroupId) -> Result<Option<Role>, StorageError> {
    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM memberships WHERE user_id = ?1 AND group_id = ?2",
            params![user_id as i64, group_id as i64],
            |row| row.get(0),
        )
        .optional()
        .map_err(map_err)?;
    role.map(|r| r.parse::<Role>().map_err(StorageError::Internal))
        .transpose()
}

// ---------------------------------------------------------------------------
// Storage impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_group(&self, group: &NewGroup) -> Result<Group, StorageError> {
        let group = group.clone();
        self.blocking(move |conn| {
            let result = conn.execute(
                "INSERT INTO groups (parent_id, slug, name, status) VALUES (?1, ?2, ?3, ?4)",
                params![
                    group.parent_id as i64,
                    group.slug,
                    group.name,
                    group.status.to_string(),
                ],
            );
            match result {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => {
                    return Err(slug_conflict(group.parent_id, &group.slug));
                }
                Err(e) => return Err(map_err(e)),
            }
            Ok(Group {
                id: conn.last_insert_rowid() as GroupId,
                parent_id: group.parent_id,
                slug: group.slug,
                name: group.name,
                status: group.status,
            })
        })
        .await
    }

    async fn update_group(&self, group: &Group) -> Result<(), StorageError> {
        let group = group.clone();
        self.blocking(move |conn| {
            // Immediate: take the write lock before reading the parent chain.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_err)?;
            let stored = fetch_group(&tx, group.id)?.ok_or(StorageError::NotFound)?;
            if stored.parent_id != group.parent_id {
                ensure_acyclic(&group, |id| Ok(fetch_group(&tx, id)?.map(|g| g.parent_id)))?;
            }

            let result = tx.execute(
                "UPDATE groups SET parent_id = ?2, slug = ?3, name = ?4, status = ?5 WHERE id = ?1",
                params![
                    group.id as i64,
                    group.parent_id as i64,
                    group.slug,
                    group.name,
                    group.status.to_string(),
                ],
            );
            match result {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => {
                    return Err(slug_conflict(group.parent_id, &group.slug));
                }
                Err(e) => return Err(map_err(e)),
            }
            tx.commit().map_err(map_err)
        })
        .await
    }

    async fn delete_group(&self, id: GroupId) -> Result<Group, StorageError> {
        self.blocking(move |conn| {
            let tx = conn.transaction().map_err(map_err)?;
            let removed = fetch_group(&tx, id)?.ok_or(StorageError::NotFound)?;

            // The group row goes first so its slug cannot clash with a promoted child.
            tx.execute("DELETE FROM groups WHERE id = ?1", params![id as i64])
                .map_err(map_err)?;
            let moved = tx.execute(
                "UPDATE groups SET parent_id = ?1 WHERE parent_id = ?2",
                params![removed.parent_id as i64, id as i64],
            );
            match moved {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => {
                    return Err(StorageError::Conflict(format!(
                        "children of group {id} clash with slugs under parent {}",
                        removed.parent_id
                    )));
                }
                Err(e) => return Err(map_err(e)),
            }
            tx.execute("DELETE FROM group_meta WHERE group_id = ?1", params![id as i64])
                .map_err(map_err)?;
            tx.execute("DELETE FROM memberships WHERE group_id = ?1", params![id as i64])
                .map_err(map_err)?;
            tx.commit().map_err(map_err)?;
            Ok(removed)
        })
        .await
    }

    async fn set_role(
        &self,
        user_id: UserId,
        group_id: GroupId,
        role: Option<Role>,
    ) -> Result<(), StorageError> {
        self.blocking(move |conn| {
            if fetch_group(conn, group_id)?.is_none() {
                return Err(StorageError::NotFound);
            }
            let result = match role {
                Some(role) => conn.execute(
                    "INSERT INTO memberships (user_id, group_id, role) VALUES (?1, ?2, ?3)
                     ON CONFLICT(user_id, group_id) DO UPDATE SET role = excluded.role",
                    params![user_id as i64, group_id as i64, role.to_string()],
                ),
                None => conn.execute(
                    "DELETE FROM memberships WHERE user_id = ?1 AND group_id = ?2",
                    params![user_id as i64, group_id as i64],
                ),
            };
            result.map_err(map_err)?;
            Ok(())
        })
        .await
    }

    async fn add_site_admin(&self, user_id: UserId) -> Result<(), StorageError> {
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO site_admins (user_id) VALUES (?1)",
                params![user_id as i64],
            )
            .map_err(map_err)?;
            Ok(())
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Engine collaborators
// ---------------------------------------------------------------------------

impl GroupStore for SqliteStorage {
    fn get_group(&self, id: GroupId) -> Result<Option<Group>, StorageError> {
        fetch_group(&*self.lock()?, id)
    }

    fn child_groups(&self, parent_id: GroupId) -> Result<Vec<Group>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {GROUP_COLUMNS} FROM groups WHERE parent_id = ?1 ORDER BY id ASC"
            ))
            .map_err(map_err)?;
        let groups = stmt
            .query_map(params![parent_id as i64], group_from_row)
            .map_err(map_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_err)?;
        Ok(groups)
    }

    fn child_by_slug(&self, parent_id: GroupId, slug: &str) -> Result<Option<Group>, StorageError> {
        self.lock()?
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE parent_id = ?1 AND slug = ?2"),
                params![parent_id as i64, slug],
                group_from_row,
            )
            .optional()
            .map_err(map_err)
    }

    fn search_groups(&self, terms: Option<&str>) -> Result<Vec<Group>, StorageError> {
        let conn = self.lock()?;
        let pattern = format!("%{}%", terms.unwrap_or("").to_lowercase());
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {GROUP_COLUMNS} FROM groups
                 WHERE lower(name) LIKE ?1 OR slug LIKE ?1
                 ORDER BY id ASC"
            ))
            .map_err(map_err)?;
        let groups = stmt
            .query_map(params![pattern], group_from_row)
            .map_err(map_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_err)?;
        Ok(groups)
    }

    fn get_group_meta(&self, id: GroupId, key: &str) -> Result<Option<String>, StorageError> {
        self.lock()?
            .query_row(
                "SELECT meta_value FROM group_meta WHERE group_id = ?1 AND meta_key = ?2",
                params![id as i64, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_err)
    }

    fn set_group_meta(&self, id: GroupId, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock()?
            .execute(
                "INSERT INTO group_meta (group_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(group_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
                params![id as i64, key, value],
            )
            .map_err(map_err)?;
        Ok(())
    }
}

impl Membership for SqliteStorage {
    fn is_admin(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StorageError> {
        Ok(fetch_role(&*self.lock()?, user_id, group_id)? == Some(Role::Admin))
    }

    fn is_mod(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StorageError> {
        Ok(fetch_role(&*self.lock()?, user_id, group_id)? == Some(Role::Mod))
    }

    fn is_member(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StorageError> {
        Ok(fetch_role(&*self.lock()?, user_id, group_id)?.is_some())
    }

    fn is_site_admin(&self, user_id: UserId) -> Result<bool, StorageError> {
        let count: i64 = self
            .lock()?
            .query_row(
                "SELECT COUNT(*) FROM site_admins WHERE user_id = ?1",
                params![user_id as i64],
                |row| row.get(0),
            )
            .map_err(map_err)?;
        Ok(count > 0)
    }
}

impl CacheStore for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CacheError::Unavailable("sqlite connection lock poisoned".into()))?;
        conn.query_row(
            "SELECT cache_value FROM cache_entries WHERE cache_key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(map_cache_err)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CacheError::Unavailable("sqlite connection lock poisoned".into()))?;
        conn.execute(
            "INSERT INTO cache_entries (cache_key, cache_value) VALUES (?1, ?2)
             ON CONFLICT(cache_key) DO UPDATE SET cache_value = excluded.cache_value",
            params![key, value],
        )
        .map_err(map_cache_err)?;
        Ok(())
    }

    fn incr(&self, key: &str) -> Result<u64, CacheError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| CacheError::Unavailable("sqlite connection lock poisoned".into()))?;
        let tx = conn.transaction().map_err(map_cache_err)?;
        tx.execute(
            "INSERT INTO cache_entries (cache_key, cache_value) VALUES (?1, '1')
             ON CONFLICT(cache_key) DO UPDATE
             SET cache_value = CAST(CAST(cache_value AS INTEGER) + 1 AS TEXT)",
            params![key],
        )
        .map_err(map_cache_err)?;
        let value: String = tx
            .query_row(
                "SELECT cache_value FROM cache_entries WHERE cache_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .map_err(map_cache_err)?;
        let generation: u64 = value
            .parse()
            .map_err(|e: std::num::ParseIntError| CacheError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        if key == GENERATION_KEY {
            // Rows under any other generation are never addressed again.
            tx.execute(
                "DELETE FROM cache_entries WHERE cache_key <> ?1 AND cache_key NOT LIKE ?2",
                params![GENERATION_KEY, format!("hgroups:{generation}:%")],
            )
            .map_err(map_cache_err)?;
        }
        tx.commit().map_err(map_cache_err)?;
        Ok(generation)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use hgroups::{GroupStatus, HierarchyCache, INCLUDE_ACTIVITY_META_KEY};

    fn new_group(parent_id: GroupId, slug: &str) -> NewGroup {
        NewGroup {
            parent_id,
            slug: slug.into(),
            name: slug.to_uppercase(),
            status: GroupStatus::Public,
        }
    }

    fn storage() -> SqliteStorage {
        SqliteStorage::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn create_get_and_children() {
        let s = storage();
        let a = s.create_group(&new_group(0, "animals")).await.unwrap();
        let p = s.create_group(&new_group(a.id, "pets")).await.unwrap();
        let w = s.create_group(&new_group(a.id, "wild")).await.unwrap();

        let got = s.get_group(p.id).unwrap().unwrap();
        assert_eq!(got, p);
        assert_eq!(got.name, "PETS");

        let ids: Vec<_> = s.child_groups(a.id).unwrap().into_iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![p.id, w.id]);
        assert_eq!(s.child_by_slug(a.id, "wild").unwrap().map(|g| g.id), Some(w.id));
        assert!(s.child_by_slug(0, "wild").unwrap().is_none());
    }

    #[tokio::test]
    async fn sibling_slug_conflict() {
        let s = storage();
        s.create_group(&new_group(0, "animals")).await.unwrap();
        let err = s.create_group(&new_group(0, "animals")).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_and_status_roundtrip() {
        let s = storage();
        let mut g = s.create_group(&new_group(0, "club")).await.unwrap();
        g.status = GroupStatus::Hidden;
        g.name = "Secret Club".into();
        s.update_group(&g).await.unwrap();
        assert_eq!(s.get_group(g.id).unwrap().unwrap(), g);

        let ghost = Group::new(999, 0, "ghost");
        assert!(matches!(s.update_group(&ghost).await, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn update_rejects_cycles_inside_the_write() {
        let s = storage();
        let a = s.create_group(&new_group(0, "a")).await.unwrap();
        let b = s.create_group(&new_group(0, "b")).await.unwrap();

        // Two moves each checked against the tree before the other landed.
        let mut a_under_b = a.clone();
        a_under_b.parent_id = b.id;
        let mut b_under_a = b.clone();
        b_under_a.parent_id = a.id;
        s.update_group(&a_under_b).await.unwrap();
        let err = s.update_group(&b_under_a).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        assert_eq!(s.get_group(b.id).unwrap().unwrap().parent_id, 0);
        assert_eq!(s.get_group(a.id).unwrap().unwrap().parent_id, b.id);
    }

    #[tokio::test]
    async fn delete_reparents_children() {
        let s = storage();
        let a = s.create_group(&new_group(0, "animals")).await.unwrap();
        let p = s.create_group(&new_group(a.id, "pets")).await.unwrap();
        let k = s.create_group(&new_group(p.id, "kittens")).await.unwrap();
        s.set_group_meta(p.id, INCLUDE_ACTIVITY_META_KEY, "include-from-both").unwrap();
        s.set_role(3, p.id, Some(Role::Member)).await.unwrap();

        let removed = s.delete_group(p.id).await.unwrap();
        assert_eq!(removed.slug, "pets");
        assert_eq!(s.get_group(k.id).unwrap().unwrap().parent_id, a.id);
        assert!(s.get_group_meta(p.id, INCLUDE_ACTIVITY_META_KEY).unwrap().is_none());
        assert!(!s.is_member(3, p.id).unwrap());
    }

    #[tokio::test]
    async fn roles() {
        let s = storage();
        let a = s.create_group(&new_group(0, "animals")).await.unwrap();
        s.set_role(5, a.id, Some(Role::Mod)).await.unwrap();
        assert!(s.is_mod(5, a.id).unwrap());
        assert!(!s.is_admin(5, a.id).unwrap());
        s.set_role(5, a.id, Some(Role::Admin)).await.unwrap();
        assert!(s.is_admin(5, a.id).unwrap());
        s.set_role(5, a.id, None).await.unwrap();
        assert!(!s.is_member(5, a.id).unwrap());

        s.add_site_admin(1).await.unwrap();
        s.add_site_admin(1).await.unwrap();
        assert!(s.is_site_admin(1).unwrap());
    }

    #[tokio::test]
    async fn search() {
        let s = storage();
        s.create_group(&new_group(0, "animals")).await.unwrap();
        s.create_group(&new_group(0, "plants")).await.unwrap();
        assert_eq!(s.search_groups(None).unwrap().len(), 2);
        let hits = s.search_groups(Some("Plan")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "plants");
    }

    #[test]
    fn cache_incr_and_generation() {
        let s = storage();
        assert_eq!(s.incr("counter").unwrap(), 1);
        assert_eq!(s.incr("counter").unwrap(), 2);
        s.set("k", "v").unwrap();
        assert_eq!(s.get("k").unwrap().as_deref(), Some("v"));
        assert!(s.get("missing").unwrap().is_none());
    }

    #[test]
    fn invalidation_purges_earlier_generations() {
        let s = Arc::new(storage());
        let cache = HierarchyCache::new(s.clone());
        let before = cache.generation().unwrap();
        s.set(&format!("hgroups:{before}:ancestors:3:0:default"), "[2,1]").unwrap();
        s.set("hgroups:1:children:1:0:default", "[]").unwrap();

        cache.invalidate_all();
        let after = cache.generation().unwrap();
        s.set(&format!("hgroups:{after}:ancestors:3:0:default"), "[2,6]").unwrap();

        assert!(s.get(&format!("hgroups:{before}:ancestors:3:0:default")).unwrap().is_none());
        assert!(s.get("hgroups:1:children:1:0:default").unwrap().is_none());
        assert_eq!(s.get(GENERATION_KEY).unwrap(), Some(after.to_string()));

        cache.invalidate_all();
        assert!(s.get(&format!("hgroups:{after}:ancestors:3:0:default")).unwrap().is_none());
        let count: i64 = s
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1, "only the generation token is left");
    }

    #[test]
    fn shared_generation_between_handles() {
        let s = Arc::new(storage());
        let first = HierarchyCache::new(s.clone());
        let second = HierarchyCache::new(s.clone());
        let before = second.generation().unwrap();
        first.invalidate_all();
        assert_eq!(second.generation().unwrap(), before + 1);
    }
}
