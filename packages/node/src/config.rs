//! Node configuration, populated from environment variables.

use std::net::SocketAddr;

use hgroups::{ActivityEnforcement, EngineConfig, UserId};

/// Runtime configuration for a groups node.
///
/// All fields are populated from environment variables with sensible
/// defaults, so a node can be started with zero configuration.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `HGROUPS_BIND` | `0.0.0.0:3000` | TCP socket address to listen on |
/// | `HGROUPS_DB` | (absent = in-memory) | Path to the SQLite database file |
/// | `HGROUPS_DIRECTORY_URL` | derived from HGROUPS_BIND | Base URL of the groups directory, used in permalinks |
/// | `HGROUPS_RESTRICT_GROUP_CREATION` | `false` | Only site administrators may create groups |
/// | `HGROUPS_ACTIVITY_ENFORCEMENT` | `strict` | `site-admins`, `group-admins` or `strict` |
/// | `HGROUPS_DIRECTORY_AS_TREE` | `true` | List the directory one tree level at a time |
/// | `HGROUPS_MAX_DEPTH` | `100` | Bound on hierarchy walks |
/// | `HGROUPS_CACHE` | `true` | `false` disables the hierarchy cache |
/// | `HGROUPS_SITE_ADMINS` | (empty) | Comma-separated user ids seeded as site administrators |
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Socket address the server binds to.
    pub bind_addr: SocketAddr,

    /// Path to the SQLite database file.
    /// `None` means use an in-memory store (data is lost on restart).
    pub db_path: Option<String>,

    /// Base URL of the groups directory, e.g. `"https://example.com/groups"`.
    pub directory_url: String,

    /// Settings handed to the engine.
    pub engine: EngineConfig,

    /// Users marked as site administrators at start-up.
    pub site_admins: Vec<UserId>,
}

impl NodeConfig {
    /// Populate config from environment variables, applying defaults where absent.
    ///
    /// Returns an error only for an unparseable bind address. Unrecognised
    /// policy values fall back to their most restrictive setting.
    pub fn from_env() -> Result<Self, String> {
        let bind_addr: SocketAddr = std::env::var("HGROUPS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:3000".into())
            .parse()
            .map_err(|e| format!("HGROUPS_BIND must be a valid socket address (e.g. 0.0.0.0:3000): {e}"))?;

        let directory_url = std::env::var("HGROUPS_DIRECTORY_URL")
            .unwrap_or_else(|_| format!("http://{bind_addr}/groups"));

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            restrict_group_creation: env_bool("HGROUPS_RESTRICT_GROUP_CREATION")
                .unwrap_or(defaults.restrict_group_creation),
            activity_enforcement: ActivityEnforcement::from_setting(
                std::env::var("HGROUPS_ACTIVITY_ENFORCEMENT").ok().as_deref(),
            ),
            directory_as_tree: env_bool("HGROUPS_DIRECTORY_AS_TREE")
                .unwrap_or(defaults.directory_as_tree),
            max_depth: std::env::var("HGROUPS_MAX_DEPTH")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|d| *d > 0)
                .unwrap_or(defaults.max_depth),
            cache_enabled: env_bool("HGROUPS_CACHE").unwrap_or(defaults.cache_enabled),
        };

        let site_admins = std::env::var("HGROUPS_SITE_ADMINS")
            .map(|v| parse_user_list(&v))
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            db_path: std::env::var("HGROUPS_DB").ok(),
            directory_url,
            engine,
            site_admins,
        })
    }

    /// A configuration for in-process tests: ephemeral port, in-memory store.
    pub fn for_tests(engine: EngineConfig) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            db_path: None,
            directory_url: "http://groups.test/groups".into(),
            engine,
            site_admins: Vec::new(),
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `"1, 2,x,3"` into `[1, 2, 3]`, skipping entries that are not user ids.
fn parse_user_list(raw: &str) -> Vec<UserId> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<UserId>().ok())
        .filter(|id| *id != 0)
        .collect()
}
