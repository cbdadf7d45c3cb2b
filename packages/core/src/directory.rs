//! Groups directory listing rules.
//!
//! The directory is shown either as a tree, one level at a time below a
//! parent, or as a flat list. Flat lists carry breadcrumbs so a row's place
//! in the hierarchy stays visible.

use serde::{Deserialize, Serialize};

use crate::types::{GroupId, TOP_LEVEL};

/// What a directory request asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryQuery {
    /// A parent filter set explicitly by the caller. Always wins.
    #[serde(default)]
    pub parent_id: Option<GroupId>,

    /// Free-text search. A search always lists flat.
    #[serde(default)]
    pub search_terms: Option<String>,

    /// The parent the user navigated to, e.g. by expanding a tree row.
    #[serde(default)]
    pub requested_parent: Option<GroupId>,

    /// Set when listing on a group's own hierarchy screen.
    #[serde(default)]
    pub hierarchy_screen: Option<GroupId>,
}

/// The effective filter for a directory request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingScope {
    /// List only children of this group. `None` lists every group.
    pub parent_filter: Option<GroupId>,
    /// Flat listings show breadcrumbs.
    pub flat: bool,
}

/// Decide how a directory request is listed.
pub fn listing_scope(directory_as_tree: bool, query: &DirectoryQuery) -> ListingScope {
    if let Some(parent) = query.parent_id {
        return ListingScope {
            parent_filter: Some(parent),
            flat: false,
        };
    }

    if let Some(screen) = query.hierarchy_screen {
        return ListingScope {
            parent_filter: Some(query.requested_parent.unwrap_or(screen)),
            flat: false,
        };
    }

    let searching = query
        .search_terms
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    if searching || !directory_as_tree {
        return ListingScope {
            parent_filter: None,
            flat: true,
        };
    }

    ListingScope {
        parent_filter: Some(query.requested_parent.unwrap_or(TOP_LEVEL)),
        flat: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(parent_filter: GroupId) -> ListingScope {
        ListingScope {
            parent_filter: Some(parent_filter),
            flat: false,
        }
    }

    const FLAT: ListingScope = ListingScope {
        parent_filter: None,
        flat: true,
    };

    #[test]
    fn default_tree_starts_at_top_level() {
        assert_eq!(listing_scope(true, &DirectoryQuery::default()), tree(0));
    }

    #[test]
    fn requested_parent() {
        let q = DirectoryQuery {
            requested_parent: Some(7),
            ..Default::default()
        };
        assert_eq!(listing_scope(true, &q), tree(7));
    }

    #[test]
    fn search_or_flat_mode_lists_everything() {
        let q = DirectoryQuery {
            search_terms: Some("cats".into()),
            requested_parent: Some(7),
            ..Default::default()
        };
        assert_eq!(listing_scope(true, &q), FLAT);
        assert_eq!(listing_scope(false, &DirectoryQuery::default()), FLAT);

        let blank = DirectoryQuery {
            search_terms: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(listing_scope(true, &blank), tree(0));
    }

    #[test]
    fn explicit_parent_wins() {
        let q = DirectoryQuery {
            parent_id: Some(3),
            search_terms: Some("cats".into()),
            ..Default::default()
        };
        assert_eq!(listing_scope(false, &q), tree(3));
    }

    #[test]
    fn hierarchy_screen() {
        let q = DirectoryQuery {
            hierarchy_screen: Some(5),
            ..Default::default()
        };
        assert_eq!(listing_scope(false, &q), tree(5));
        let q = DirectoryQuery {
            hierarchy_screen: Some(5),
            requested_parent: Some(9),
            ..Default::default()
        };
        assert_eq!(listing_scope(true, &q), tree(9));
    }
}
