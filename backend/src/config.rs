//! Engine configuration
//!
//! Knobs that apply to every model compiled by the engine. Loaded from JSON
//! alongside model definitions or built in code; every field has a default.

use serde::{Deserialize, Serialize};

/// Default maximum clause nesting depth
pub const DEFAULT_MAX_TREE_DEPTH: usize = 100;

/// Default number of backtracking steps before the evaluator falls back to
/// first-satisfiable-child selection
pub const DEFAULT_MAX_SEARCH_STEPS: usize = 100_000;

/// Engine-wide settings
///
/// # Example
///
/// ```rust
/// use resource_requirement_engine::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str(r#"{"max_tree_depth": 8}"#).unwrap();
/// assert_eq!(config.max_tree_depth, 8);
/// assert_eq!(config.max_search_steps, 100_000);
/// assert!(config.record_events);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest clause nesting accepted when building requirement trees
    pub max_tree_depth: usize,

    /// Backtracking budget per evaluation; past it, each `require_any` keeps
    /// its first satisfiable child without revisiting the choice
    pub max_search_steps: usize,

    /// Keep a per-replication allocation event log
    pub record_events: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
            max_search_steps: DEFAULT_MAX_SEARCH_STEPS,
            record_events: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
