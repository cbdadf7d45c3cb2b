//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::types::ActivityEnforcement;

/// Default bound on the number of steps any hierarchy walk may take.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Process-wide settings, passed explicitly into the [`Engine`](crate::engine::Engine).
///
/// | Field | Default | Meaning |
/// |-------|---------|---------|
/// | `restrict_group_creation` | `false` | Only site administrators may create groups |
/// | `activity_enforcement` | `strict` | Who may widen an activity stream |
/// | `directory_as_tree` | `true` | Directory lists one tree level at a time |
/// | `max_depth` | `100` | Walk bound against corrupt parent chains |
/// | `cache_enabled` | `true` | `false` makes every cache read miss |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub restrict_group_creation: bool,
    pub activity_enforcement: ActivityEnforcement,
    pub directory_as_tree: bool,
    pub max_depth: usize,
    pub cache_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            restrict_group_creation: false,
            activity_enforcement: ActivityEnforcement::Strict,
            directory_as_tree: true,
            max_depth: DEFAULT_MAX_DEPTH,
            cache_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"activity_enforcement":"group-admins"}"#).unwrap();
        assert_eq!(cfg.activity_enforcement, ActivityEnforcement::GroupAdmins);
        assert!(cfg.directory_as_tree);
        assert_eq!(cfg.max_depth, DEFAULT_MAX_DEPTH);
    }
}
