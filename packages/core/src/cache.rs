//! Versioned hierarchy cache with wholesale invalidation.
//!
//! Computed ancestor and descendant lists are stored in a shared
//! [`CacheStore`] under keys that embed a *generation token*. The token itself
//! lives in the same store under [`GENERATION_KEY`], so every process sharing
//! the store observes an invalidation as soon as the increment is written.
//!
//! Invalidation is lazy: [`HierarchyCache::invalidate_all`] advances the token
//! and nothing is deleted. Entries written under an older generation are never
//! addressed again. A miss hands out a [`CacheSlot`] keyed by the generation
//! the read saw, so a walk that overlaps an invalidation files its result
//! under the orphaned generation.
//!
//! The cache is a pure optimisation. Any [`CacheError`] is logged and the
//! operation degrades to a miss (reads) or a no-op (writes).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::{GroupId, Relation, UserId};

/// Store key holding the current generation token.
pub const GENERATION_KEY: &str = "hgroups:generation";

/// Errors a cache backend can report. Never propagated past [`HierarchyCache`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backend could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be decoded.
    #[error("corrupt cache entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// A shared string key-value store, e.g. memcached, Redis, or a database table.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Atomically add one to the integer stored at `key` and return the new
    /// value. An absent key counts as `0`.
    fn incr(&self, key: &str) -> Result<u64, CacheError>;
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Process-local [`CacheStore`] behind a [`RwLock`].
///
/// Suitable for single-process hosts, tests, and the CLI.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically stored entries, including stale generations.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> CacheError {
    CacheError::Unavailable("memory cache lock poisoned".into())
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn incr(&self, key: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let current = match entries.get(key) {
            Some(v) => v.parse::<u64>().map_err(|e| CacheError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?,
            None => 0,
        };
        let next = current + 1;
        entries.insert(key.to_string(), next.to_string());
        Ok(next)
    }
}

/// A [`CacheStore`] that stores nothing. Every read misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCacheStore;

impl CacheStore for NullCacheStore {
    fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
        Ok(())
    }

    fn incr(&self, _key: &str) -> Result<u64, CacheError> {
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// The kind of derivation a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Ancestors,
    Descendants,
    HasChildren,
    Children,
    Lineage,
}

impl CacheKind {
    fn as_str(self) -> &'static str {
        match self {
            CacheKind::Ancestors => "ancestors",
            CacheKind::Descendants => "descendants",
            CacheKind::HasChildren => "has-children",
            CacheKind::Children => "children",
            CacheKind::Lineage => "lineage",
        }
    }
}

/// Identifies one cached derivation, independent of generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheKey {
    pub kind: CacheKind,
    pub group_id: GroupId,
    pub viewer: UserId,
    pub relation: Relation,
}

impl CacheKey {
    pub fn new(kind: CacheKind, group_id: GroupId, viewer: UserId, relation: Relation) -> Self {
        Self {
            kind,
            group_id,
            viewer,
            relation,
        }
    }

    /// The store key under a given generation.
    fn render(&self, generation: u64) -> String {
        format!(
            "hgroups:{generation}:{}:{}:{}:{}",
            self.kind.as_str(),
            self.group_id,
            self.viewer,
            self.relation
        )
    }
}

/// Outcome of [`HierarchyCache::lookup`].
#[derive(Debug)]
pub enum Lookup<T> {
    Hit(T),
    Miss(CacheSlot),
}

/// Where a value computed after a miss belongs.
///
/// Holds the rendered key under the generation the miss observed; `None`
/// when the cache is disabled or the generation could not be read, in which
/// case filling is a no-op.
#[derive(Debug)]
#[must_use]
pub struct CacheSlot {
    rendered: Option<String>,
}

// ---------------------------------------------------------------------------
// HierarchyCache
// ---------------------------------------------------------------------------

/// Generation-tagged typed view over a [`CacheStore`].
#[derive(Clone)]
pub struct HierarchyCache {
    store: Arc<dyn CacheStore>,
    enabled: bool,
}

impl HierarchyCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            enabled: true,
        }
    }

    /// A cache that always misses.
    pub fn disabled() -> Self {
        Self {
            store: Arc::new(NullCacheStore),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The current generation token, seeding it on first use.
    ///
    /// The seed is the current time in milliseconds so that a token lost by
    /// the backend (eviction, restart) never comes back at a value an older
    /// entry was written under.
    pub fn generation(&self) -> Result<u64, CacheError> {
        match self.store.get(GENERATION_KEY)? {
            Some(raw) => raw.parse::<u64>().map_err(|e| CacheError::Corrupt {
                key: GENERATION_KEY.to_string(),
                reason: e.to_string(),
            }),
            None => {
                let seed = chrono::Utc::now().timestamp_millis().max(1) as u64;
                self.store.set(GENERATION_KEY, &seed.to_string())?;
                Ok(seed)
            }
        }
    }

    /// Look up a value written under the current generation.
    ///
    /// A miss carries a [`CacheSlot`] pinned to the generation this read
    /// observed. Filling it after an invalidation writes under the old
    /// generation, so a value computed from pre-mutation data is never
    /// served afterwards.
    pub fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Lookup<T> {
        if !self.enabled {
            return Lookup::Miss(CacheSlot { rendered: None });
        }
        let generation = match self.generation() {
            Ok(generation) => generation,
            Err(e) => {
                tracing::warn!("hierarchy cache read degraded to miss: {e}");
                return Lookup::Miss(CacheSlot { rendered: None });
            }
        };
        let rendered = key.render(generation);
        let result = match self.store.get(&rendered) {
            Ok(Some(raw)) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| CacheError::Corrupt {
                    key: rendered.clone(),
                    reason: e.to_string(),
                }),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        match result {
            Ok(Some(value)) => {
                tracing::trace!(?key, generation, "hierarchy cache hit");
                Lookup::Hit(value)
            }
            Ok(None) => {
                tracing::trace!(?key, generation, "hierarchy cache miss");
                Lookup::Miss(CacheSlot {
                    rendered: Some(rendered),
                })
            }
            Err(e) => {
                tracing::warn!("hierarchy cache read degraded to miss: {e}");
                Lookup::Miss(CacheSlot {
                    rendered: Some(rendered),
                })
            }
        }
    }

    /// Convenience over [`lookup`](Self::lookup) for callers that never fill.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.lookup(key) {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss(_) => None,
        }
    }

    /// Store a value in the slot a previous miss handed out. Last write wins.
    pub fn fill<T: Serialize>(&self, slot: CacheSlot, value: &T) {
        let Some(rendered) = slot.rendered else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("hierarchy cache value not serialisable: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(&rendered, &raw) {
            tracing::warn!("hierarchy cache write dropped: {e}");
        }
    }

    /// Advance the generation token, orphaning every existing entry.
    pub fn invalidate_all(&self) {
        if !self.enabled {
            return;
        }
        let result = self
            .generation()
            .and_then(|_| self.store.incr(GENERATION_KEY));
        match result {
            Ok(generation) => tracing::debug!(generation, "hierarchy cache invalidated"),
            Err(e) => tracing::warn!("hierarchy cache invalidation failed: {e}"),
        }
    }
}

impl std::fmt::Debug for HierarchyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyCache")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    impl CacheStore for Unreachable {
        fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn incr(&self, _key: &str) -> Result<u64, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    fn key(group_id: GroupId) -> CacheKey {
        CacheKey::new(CacheKind::Ancestors, group_id, 0, Relation::Default)
    }

    fn put<T: Serialize>(cache: &HierarchyCache, key: &CacheKey, value: &T) {
        if let Lookup::Miss(slot) = cache.lookup::<serde_json::Value>(key) {
            cache.fill(slot, value);
        }
    }

    #[test]
    fn put_then_get_same_generation() {
        let cache = HierarchyCache::new(Arc::new(MemoryCacheStore::new()));
        put(&cache, &key(3), &vec![2u64, 1]);
        assert_eq!(cache.get::<Vec<GroupId>>(&key(3)), Some(vec![2, 1]));
        assert_eq!(cache.get::<Vec<GroupId>>(&key(4)), None);
    }

    #[test]
    fn invalidate_all_orphans_entries_without_deleting() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = HierarchyCache::new(store.clone());
        put(&cache, &key(3), &vec![2u64, 1]);
        let before = cache.generation().unwrap();
        let stored = store.len();

        cache.invalidate_all();

        assert_eq!(cache.generation().unwrap(), before + 1);
        assert_eq!(cache.get::<Vec<GroupId>>(&key(3)), None);
        assert_eq!(store.len(), stored, "lazy invalidation keeps old entries");
    }

    #[test]
    fn slot_filled_after_invalidation_is_not_served() {
        let cache = HierarchyCache::new(Arc::new(MemoryCacheStore::new()));
        let Lookup::Miss(slot) = cache.lookup::<Vec<GroupId>>(&key(3)) else {
            panic!("empty cache must miss");
        };

        cache.invalidate_all();
        cache.fill(slot, &vec![2u64, 1]);

        assert_eq!(cache.get::<Vec<GroupId>>(&key(3)), None);
    }

    #[test]
    fn relation_and_viewer_are_part_of_the_key() {
        let cache = HierarchyCache::new(Arc::new(MemoryCacheStore::new()));
        let default = CacheKey::new(CacheKind::Descendants, 1, 5, Relation::Default);
        let activity = CacheKey::new(CacheKind::Descendants, 1, 5, Relation::Activity);
        let other_viewer = CacheKey::new(CacheKind::Descendants, 1, 6, Relation::Default);
        put(&cache, &default, &true);
        assert_eq!(cache.get::<bool>(&default), Some(true));
        assert_eq!(cache.get::<bool>(&activity), None);
        assert_eq!(cache.get::<bool>(&other_viewer), None);
    }

    #[test]
    fn unreachable_backend_degrades_to_miss() {
        let cache = HierarchyCache::new(Arc::new(Unreachable));
        put(&cache, &key(1), &vec![1u64]);
        cache.invalidate_all();
        assert_eq!(cache.get::<Vec<GroupId>>(&key(1)), None);
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = HierarchyCache::new(store.clone());
        let generation = cache.generation().unwrap();
        store.set(&key(9).render(generation), "not json").unwrap();
        assert_eq!(cache.get::<Vec<GroupId>>(&key(9)), None);
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = HierarchyCache::disabled();
        put(&cache, &key(1), &vec![1u64]);
        assert_eq!(cache.get::<Vec<GroupId>>(&key(1)), None);
    }
}
