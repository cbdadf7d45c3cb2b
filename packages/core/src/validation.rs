use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::types::{Group, GroupId, TOP_LEVEL};

/// Errors returned when a [`Group`] or a set of groups is not a valid forest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("group id must not be 0")]
    ZeroId,

    #[error(
        "slug {0:?} is invalid; slugs are lowercase letters and digits separated by \
         single hyphens (e.g. my-group-2)"
    )]
    InvalidSlug(String),

    #[error("group {0} is its own parent")]
    SelfParent(GroupId),

    #[error("group id {0} appears more than once")]
    DuplicateId(GroupId),

    #[error("group {id} references missing parent {parent_id}")]
    MissingParent { id: GroupId, parent_id: GroupId },

    #[error("slug {slug:?} is used by more than one child of group {parent_id}")]
    DuplicateSibling { parent_id: GroupId, slug: String },

    #[error("parent chain of group {0} forms a cycle")]
    Cycle(GroupId),
}

/// Validate one group record on its own.
///
/// Returns the first problem found, in field order.
pub fn validate_group(group: &Group) -> Result<(), ValidationError> {
    if group.id == 0 {
        return Err(ValidationError::ZeroId);
    }
    validate_slug(&group.slug)?;
    if group.parent_id == group.id {
        return Err(ValidationError::SelfParent(group.id));
    }
    Ok(())
}

/// `^[a-z0-9]+(?:-[a-z0-9]+)*$`
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if SLUG_RE.is_match(slug) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSlug(slug.to_string()))
    }
}

/// Validate a whole set of groups as a forest.
///
/// Every group must be valid on its own, ids must be unique, parents must
/// exist, slugs must be unique among siblings and no parent chain may loop.
/// All problems are reported; a cycle is reported once, under its smallest id.
pub fn validate_forest(groups: &[Group]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut parents: HashMap<GroupId, GroupId> = HashMap::new();

    for g in groups {
        if let Err(e) = validate_group(g) {
            errors.push(e);
        }
        if parents.insert(g.id, g.parent_id).is_some() {
            errors.push(ValidationError::DuplicateId(g.id));
        }
    }

    let mut siblings: HashSet<(GroupId, &str)> = HashSet::new();
    for g in groups {
        if g.parent_id != TOP_LEVEL && g.parent_id != g.id && !parents.contains_key(&g.parent_id) {
            errors.push(ValidationError::MissingParent {
                id: g.id,
                parent_id: g.parent_id,
            });
        }
        if !siblings.insert((g.parent_id, g.slug.as_str())) {
            errors.push(ValidationError::DuplicateSibling {
                parent_id: g.parent_id,
                slug: g.slug.clone(),
            });
        }
    }

    let mut reported: BTreeSet<GroupId> = BTreeSet::new();
    for g in groups {
        if let Some(min) = cycle_through(&parents, g.id) {
            if reported.insert(min) {
                errors.push(ValidationError::Cycle(min));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// --- helpers -----------------------------------------------------------------

/// If `start` lies on a parent cycle of two or more groups, the smallest id
/// on that cycle.
fn cycle_through(parents: &HashMap<GroupId, GroupId>, start: GroupId) -> Option<GroupId> {
    let mut current = start;
    let mut path = vec![start];
    for _ in 0..parents.len() {
        let parent = *parents.get(&current)?;
        if parent == TOP_LEVEL || parent == current {
            return None;
        }
        if parent == start {
            return path.into_iter().min();
        }
        path.push(parent);
        current = parent;
    }
    None
}

static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("invalid slug regex")
});

// --- tests -------------------------------------------------------------------
