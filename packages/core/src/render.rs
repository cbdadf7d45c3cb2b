//! Human-readable text rendering of group forests and breadcrumb trails.
//!
//! The output is stable plain text for terminals and logs. It is not a
//! canonical format; only the JSON wire format is.

use std::collections::{BTreeMap, HashSet};

use crate::identifier::Breadcrumb;
use crate::types::{Group, GroupId, GroupStatus, TOP_LEVEL};

/// Render a set of groups as an indented outline.
///
/// ```text
/// Groups  4 groups
/// ────────────────
/// animals  Animals
///   pets  Pets  [private]
///     kittens  Kittens
/// plants  Plants
/// ```
///
/// Groups whose parent is missing are shown at the top level. Groups only
/// reachable through a parent cycle are listed under `UNREACHABLE`.
pub fn render_forest(groups: &[Group]) -> String {
    let total = groups.len();
    let header = format!("Groups  {} group{}", total, if total == 1 { "" } else { "s" });
    let rule = "─".repeat(header.chars().count());
    let mut out = format!("{}\n{}\n", header, rule);

    let ids: HashSet<GroupId> = groups.iter().map(|g| g.id).collect();
    let mut children: BTreeMap<GroupId, Vec<&Group>> = BTreeMap::new();
    let mut roots: Vec<&Group> = Vec::new();
    for g in groups {
        if g.parent_id == TOP_LEVEL || !ids.contains(&g.parent_id) {
            roots.push(g);
        } else {
            children.entry(g.parent_id).or_default().push(g);
        }
    }
    roots.sort_by_key(|g| g.id);
    for list in children.values_mut() {
        list.sort_by_key(|g| g.id);
    }

    let mut seen: HashSet<GroupId> = HashSet::new();
    for root in roots {
        render_subtree(root, 0, &children, &mut seen, &mut out);
    }

    let mut unreachable: Vec<&Group> = groups.iter().filter(|g| !seen.contains(&g.id)).collect();
    if !unreachable.is_empty() {
        unreachable.sort_by_key(|g| g.id);
        out.push('\n');
        out.push_str(&format!("UNREACHABLE ({})\n", unreachable.len()));
        for g in unreachable {
            out.push_str(&format!("  {}  (parent {})\n", line(g), g.parent_id));
        }
    }

    out
}

/// Render a breadcrumb trail as `Animals › Pets › Kittens`.
pub fn render_breadcrumbs(trail: &[Breadcrumb]) -> String {
    trail
        .iter()
        .map(|b| b.name.as_str())
        .collect::<Vec<_>>()
        .join(" › ")
}

// --- helpers -----------------------------------------------------------------

fn render_subtree(
    group: &Group,
    depth: usize,
    children: &BTreeMap<GroupId, Vec<&Group>>,
    seen: &mut HashSet<GroupId>,
    out: &mut String,
) {
    if !seen.insert(group.id) {
        return;
    }
    out.push_str(&"  ".repeat(depth));
    out.push_str(&line(group));
    out.push('\n');
    if let Some(kids) = children.get(&group.id) {
        for child in kids {
            render_subtree(child, depth + 1, children, seen, out);
        }
    }
}

fn line(group: &Group) -> String {
    let mut s = group.slug.clone();
    if !group.name.is_empty() && group.name != group.slug {
        s.push_str("  ");
        s.push_str(&group.name);
    }
    if group.status != GroupStatus::Public {
        s.push_str(&format!("  [{}]", group.status));
    }
    s
}

// --- tests -------------------------------------------------------------------
