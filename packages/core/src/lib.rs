//! Hierarchical groups engine.
//!
//! Groups form a forest through a single parent reference per group. This
//! crate derives everything else on demand: ancestor and descendant lists
//! filtered for a viewer, subgroup creation and activity aggregation
//! permissions, activity aggregation scopes, and hierarchical slugs and
//! permalinks. Derived results are kept in a shared, generation-versioned
//! cache that is invalidated wholesale whenever a group changes.
//!
//! The engine owns no storage. A host implements [`GroupStore`],
//! [`Membership`] and [`CacheStore`] and reports mutations through
//! [`Engine::handle_event`].
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | Records and policy enums: [`Group`], [`SubgroupCreators`], [`IncludeActivity`], [`ActivityEnforcement`] |
//! | [`store`] | Collaborator traits [`GroupStore`] and [`Membership`] |
//! | [`cache`] | [`HierarchyCache`] over a [`CacheStore`] |
//! | [`tree`] | [`TreeResolver`]: ancestors, descendants, children, has-children |
//! | [`permissions`] | [`PermissionResolver`]: subgroup creation and activity aggregation gates |
//! | [`activity`] | [`ActivityScope`]: which groups feed an activity stream |
//! | [`identifier`] | Hierarchical slugs, permalinks, breadcrumbs, path resolution |
//! | [`directory`] | Directory listing rules |
//! | [`engine`] | The [`Engine`] facade |
//! | [`forest`] | In-memory [`Forest`] implementing the collaborator traits |
//! | [`validation`] | Slug and forest checks |
//! | [`render`] | Plain-text tree outlines |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hgroups::{Engine, EngineConfig, Forest, Group, MemoryCacheStore, Relation, ANONYMOUS};
//!
//! let forest = Arc::new(Forest::from_groups([
//!     Group::new(1, 0, "animals"),
//!     Group::new(2, 1, "pets"),
//!     Group::new(3, 2, "kittens"),
//! ]));
//! let engine = Engine::new(
//!     EngineConfig::default(),
//!     forest.clone(),
//!     forest.clone(),
//!     Arc::new(MemoryCacheStore::new()),
//! );
//!
//! assert_eq!(engine.ancestors(3, ANONYMOUS, Relation::Default)?, vec![2, 1]);
//! assert_eq!(engine.build_hierarchical_slug(3)?, "animals/pets/kittens");
//! ```

pub mod activity;
pub mod cache;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod forest;
pub mod identifier;
pub mod permissions;
pub mod render;
pub mod store;
pub mod tree;
pub mod types;
pub mod validation;

pub use activity::ActivityScope;
pub use cache::{
    CacheError, CacheSlot, CacheStore, HierarchyCache, Lookup, MemoryCacheStore, NullCacheStore,
    GENERATION_KEY,
};
pub use config::EngineConfig;
pub use directory::{listing_scope, DirectoryQuery, ListingScope};
pub use engine::{DirectoryEntry, DirectoryListing, Engine};
pub use error::EngineError;
pub use forest::Forest;
pub use identifier::{Breadcrumb, IdentifierBuilder, PathResolution, PATH_SEPARATOR};
pub use permissions::PermissionResolver;
pub use store::{GroupStore, Membership, StoreError};
pub use tree::TreeResolver;
pub use types::{
    ActivityEnforcement, Group, GroupEvent, GroupId, GroupStatus, IncludeActivity, Relation, Role,
    SubgroupCreators, UserId, ANONYMOUS, INCLUDE_ACTIVITY_META_KEY, SUBGROUP_CREATORS_META_KEY,
    TOP_LEVEL,
};
pub use validation::{validate_forest, validate_group, validate_slug, ValidationError};
