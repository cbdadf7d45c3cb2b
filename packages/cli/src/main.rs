//! `hgroups` — command-line interface for hierarchical group forests.
//!
//! Works offline on a forest file: a JSON array of groups, or an object
//! that also carries memberships, site administrators and per-group
//! settings:
//!
//! ```json
//! {
//!   "groups": [{ "id": 1, "slug": "animals" }, { "id": 2, "parent_id": 1, "slug": "pets" }],
//!   "memberships": [{ "user_id": 7, "group_id": 2, "role": "mod" }],
//!   "site_admins": [1],
//!   "settings": [{ "group_id": 2, "subgroup_creators": "mod" }]
//! }
//! ```
//!
//! Subcommands:
//!
//! - **`validate`** — check ids, slugs, parents and cycles.
//! - **`render`** — print the forest as an indented outline.
//! - **`ancestors`** / **`descendants`** — walk the hierarchy as a viewer.
//! - **`path`** — hierarchical slug, permalink and breadcrumbs of a group.
//! - **`resolve`** — map a URL path onto a group.
//! - **`permissions`** — what a user may do in a group.
//! - **`scope`** — the activity aggregation scope of a group.
//!
//! All subcommands read JSON from a file path or from stdin (`-`).

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hgroups::{
    render, validate_forest, ActivityEnforcement, Engine, EngineConfig, Forest, Group, GroupId,
    GroupStore, NullCacheStore, Relation, Role, UserId, ANONYMOUS, INCLUDE_ACTIVITY_META_KEY,
    SUBGROUP_CREATORS_META_KEY,
};
use serde::Deserialize;

/// hgroups — hierarchical groups CLI
///
/// Validate and query group forests.
#[derive(Parser)]
#[command(name = "hgroups", version, about, long_about = None)]
struct Cli {
    /// Who may aggregate activity: site-admins | group-admins | strict
    #[arg(
        long,
        global = true,
        env = "HGROUPS_ACTIVITY_ENFORCEMENT",
        default_value = "strict"
    )]
    activity_enforcement: ActivityEnforcement,

    /// Only site administrators may create groups.
    #[arg(long, global = true, env = "HGROUPS_RESTRICT_GROUP_CREATION")]
    restrict_group_creation: bool,

    /// Base URL of the groups directory, used for permalinks.
    #[arg(
        long,
        global = true,
        env = "HGROUPS_DIRECTORY_URL",
        default_value = "/groups"
    )]
    directory_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a forest file.
    ///
    /// Exits 0 if the forest is well formed, 1 otherwise.
    Validate {
        /// Path to a JSON file, or `-` for stdin.
        file: PathBuf,
    },

    /// Render a forest as an indented outline.
    Render {
        /// Path to a JSON file, or `-` for stdin.
        file: PathBuf,
    },

    /// List the ancestors of a group, nearest parent first.
    Ancestors {
        file: PathBuf,
        group: GroupId,
        /// Requesting user; 0 is anonymous.
        #[arg(long, default_value_t = ANONYMOUS)]
        viewer: UserId,
        /// default | activity | exclude-hidden
        #[arg(long, default_value = "default")]
        relation: Relation,
    },

    /// List the descendants of a group, depth-first.
    Descendants {
        file: PathBuf,
        group: GroupId,
        #[arg(long, default_value_t = ANONYMOUS)]
        viewer: UserId,
        #[arg(long, default_value = "default")]
        relation: Relation,
    },

    /// Print the hierarchical slug, permalink and breadcrumbs of a group.
    Path { file: PathBuf, group: GroupId },

    /// Resolve a URL path such as `animals/pets/members` to a group.
    Resolve { file: PathBuf, path: String },

    /// Print what a user may do in a group.
    Permissions {
        file: PathBuf,
        group: GroupId,
        #[arg(long, default_value_t = ANONYMOUS)]
        user: UserId,
    },

    /// Print the groups whose activity a group's stream covers.
    Scope {
        file: PathBuf,
        group: GroupId,
        #[arg(long, default_value_t = ANONYMOUS)]
        viewer: UserId,
    },
}

// ---------------------------------------------------------------------------
// Forest file
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum ForestFile {
    Groups(Vec<Group>),
    Full(FullForest),
}

#[derive(Deserialize)]
struct FullForest {
    groups: Vec<Group>,
    #[serde(default)]
    memberships: Vec<MembershipRow>,
    #[serde(default)]
    site_admins: Vec<UserId>,
    #[serde(default)]
    settings: Vec<SettingsRow>,
}

#[derive(Deserialize)]
struct MembershipRow {
    user_id: UserId,
    group_id: GroupId,
    role: Role,
}

#[derive(Deserialize)]
struct SettingsRow {
    group_id: GroupId,
    #[serde(default)]
    subgroup_creators: Option<String>,
    #[serde(default)]
    include_activity: Option<String>,
}

impl ForestFile {
    fn into_forest(self) -> Forest {
        let full = match self {
            ForestFile::Groups(groups) => FullForest {
                groups,
                memberships: Vec::new(),
                site_admins: Vec::new(),
                settings: Vec::new(),
            },
            ForestFile::Full(full) => full,
        };

        let forest = Forest::from_groups(full.groups);
        for m in full.memberships {
            forest.grant(m.user_id, m.group_id, m.role);
        }
        for user in full.site_admins {
            forest.add_site_admin(user);
        }
        for s in full.settings {
            let pairs = [
                (SUBGROUP_CREATORS_META_KEY, s.subgroup_creators),
                (INCLUDE_ACTIVITY_META_KEY, s.include_activity),
            ];
            for (key, value) in pairs {
                if let Some(value) = value {
                    forest
                        .set_group_meta(s.group_id, key, &value)
                        .unwrap_or_else(|e| fatal(&e.to_string()));
                }
            }
        }
        forest
    }
}

fn main() {
    let cli = Cli::parse();
    let config = EngineConfig {
        activity_enforcement: cli.activity_enforcement,
        restrict_group_creation: cli.restrict_group_creation,
        // Nothing changes between queries of one run.
        cache_enabled: false,
        ..Default::default()
    };

    match cli.command {
        Command::Validate { file } => {
            let forest = load(&file);
            let groups = forest.groups();
            match validate_forest(&groups) {
                Ok(()) => println!("valid: {} groups", groups.len()),
                Err(errors) => {
                    for e in &errors {
                        eprintln!("error: {}", e);
                    }
                    eprintln!("{} problem(s) found", errors.len());
                    process::exit(1);
                }
            }
        }

        Command::Render { file } => {
            let forest = load(&file);
            print!("{}", render::render_forest(&forest.groups()));
        }

        Command::Ancestors {
            file,
            group,
            viewer,
            relation,
        } => {
            let engine = engine(config, load(&file));
            let ids = engine
                .ancestors(group, viewer, relation)
                .unwrap_or_else(|e| fatal(&e.to_string()));
            for id in ids {
                println!("{}", id);
            }
        }

        Command::Descendants {
            file,
            group,
            viewer,
            relation,
        } => {
            let engine = engine(config, load(&file));
            let groups = engine
                .descendants(group, viewer, relation)
                .unwrap_or_else(|e| fatal(&e.to_string()));
            for g in groups {
                println!("{}\t{}\t{}", g.id, g.slug, g.name);
            }
        }

        Command::Path { file, group } => {
            let engine = engine(config, load(&file));
            let slug = engine
                .build_hierarchical_slug(group)
                .unwrap_or_else(|e| fatal(&e.to_string()));
            let permalink = engine
                .permalink(&cli.directory_url, group)
                .unwrap_or_else(|e| fatal(&e.to_string()));
            let trail = engine
                .breadcrumbs(&cli.directory_url, group)
                .unwrap_or_else(|e| fatal(&e.to_string()));
            println!("slug:        {}", slug);
            println!("permalink:   {}", permalink);
            println!("breadcrumbs: {}", render::render_breadcrumbs(&trail));
        }

        Command::Resolve { file, path } => {
            let engine = engine(config, load(&file));
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            match engine.resolve_path(segments.as_slice()) {
                Ok(Some(res)) => {
                    println!("group:   {} ({})", res.group.id, res.group.slug);
                    if !res.action_variables.is_empty() {
                        println!("actions: {}", res.action_variables.join("/"));
                    }
                }
                Ok(None) => {
                    eprintln!("no group at /{}", segments.join("/"));
                    process::exit(1);
                }
                Err(e) => fatal(&e.to_string()),
            }
        }

        Command::Permissions { file, group, user } => {
            let engine = engine(config, load(&file));
            let check = |r: Result<bool, hgroups::EngineError>| {
                r.unwrap_or_else(|e| fatal(&e.to_string()))
            };
            println!("create subgroup:     {}", check(engine.can_create_subgroup(user, group)));
            println!(
                "aggregate activity:  {}",
                check(engine.can_include_aggregated_activity(user, group))
            );
            println!("manage:              {}", check(engine.can_manage_group(user, group)));
        }

        Command::Scope {
            file,
            group,
            viewer,
        } => {
            let engine = engine(config, load(&file));
            let scope = engine
                .activity_scope_for(viewer, group)
                .unwrap_or_else(|e| fatal(&e.to_string()));
            let ids: Vec<String> = scope.iter().map(|id| id.to_string()).collect();
            println!("{}", ids.join(" "));
        }
    }
}

fn engine(config: EngineConfig, forest: Forest) -> Engine {
    let forest = Arc::new(forest);
    Engine::new(config, forest.clone(), forest, Arc::new(NullCacheStore))
}

fn load(path: &Path) -> Forest {
    let json = read_input(path);
    match serde_json::from_str::<ForestFile>(&json) {
        Ok(file) => file.into_forest(),
        Err(e) => fatal(&format!("failed to parse input as a group forest: {}", e)),
    }
}

/// Read the full contents of a file, or stdin when the path is `"-"`.
fn read_input(path: &Path) -> String {
    if path.to_str() == Some("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .unwrap_or_else(|e| fatal(&format!("failed to read stdin: {}", e)));
        buf
    } else {
        fs::read_to_string(path).unwrap_or_else(|e| {
            fatal(&format!("failed to read {}: {}", path.display(), e))
        })
    }
}

/// Print an error message to stderr and exit with code 2.
fn fatal(msg: &str) -> ! {
    eprintln!("hgroups: {}", msg);
    process::exit(2);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgroups::Membership;

    #[test]
    fn bare_array_is_a_forest() {
        let file: ForestFile =
            serde_json::from_str(r#"[{"id":1,"slug":"animals"},{"id":2,"parent_id":1,"slug":"pets"}]"#)
                .unwrap();
        let forest = file.into_forest();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest.get_group(2).unwrap().unwrap().parent_id, 1);
    }

    #[test]
    fn full_form_carries_roles_and_settings() {
        let file: ForestFile = serde_json::from_str(
            r#"{
                "groups": [{"id":1,"slug":"animals"},{"id":2,"parent_id":1,"slug":"pets"}],
                "memberships": [{"user_id":7,"group_id":2,"role":"mod"}],
                "site_admins": [1],
                "settings": [{"group_id":2,"subgroup_creators":"mod"}]
            }"#,
        )
        .unwrap();
        let engine = engine(EngineConfig::default(), file.into_forest());
        assert!(engine.can_create_subgroup(7, 2).unwrap());
        assert!(!engine.can_create_subgroup(8, 2).unwrap());
        assert_eq!(engine.build_hierarchical_slug(2).unwrap(), "animals/pets");
    }

    #[test]
    fn roles_are_loaded() {
        let file: ForestFile = serde_json::from_str(
            r#"{"groups":[{"id":1,"slug":"animals"}],"memberships":[{"user_id":3,"group_id":1,"role":"admin"}]}"#,
        )
        .unwrap();
        let forest = file.into_forest();
        assert!(forest.is_admin(3, 1).unwrap());
    }
}
