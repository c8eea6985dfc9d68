//! Model definitions
//!
//! Serde types for the records consumed from the model/analysis/scenario
//! management layer. These are the raw authoring-time shapes: nothing here is
//! validated beyond JSON well-formedness. Validation happens when a
//! [`RequirementTree`](crate::requirement::RequirementTree) is built or a
//! scenario is compiled.
//!
//! Numeric fields are deliberately wide signed integers so that bad input
//! (negative capacity, zero quantity) reaches validation and is reported as a
//! configuration error instead of a JSON parse failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading definitions from JSON
#[derive(Debug, Error, PartialEq)]
pub enum DefinitionError {
    #[error("Malformed definition JSON: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for DefinitionError {
    fn from(err: serde_json::Error) -> Self {
        DefinitionError::Malformed(err.to_string())
    }
}

// ============================================================================
// RESOURCES
// ============================================================================

/// A resource with finite capacity, owned by a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
    /// Unique identifier within the model (e.g., "nurse")
    pub id: String,

    /// Optional display name
    #[serde(default)]
    pub name: Option<String>,

    /// Total units of this resource
    pub capacity: i64,
}

impl ResourceDef {
    pub fn new(id: impl Into<String>, capacity: i64) -> Self {
        Self {
            id: id.into(),
            name: None,
            capacity,
        }
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

// ============================================================================
// REQUIREMENTS
// ============================================================================

/// A clause row: one internal node of a requirement tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseDef {
    pub id: String,

    /// "require_all" or "require_any" (checked at build time)
    pub mode: String,

    /// Evaluation priority among siblings (lower first)
    #[serde(default)]
    pub order: i64,

    /// Owning clause, or None for a root clause
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// A request row: one leaf of a requirement tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDef {
    pub id: String,

    /// Owning clause, or None to sit directly under the requirement root
    #[serde(default)]
    pub clause_id: Option<String>,

    pub resource_id: String,

    /// Units to reserve (must be >= 1)
    pub quantity: i64,

    /// Tie-break within the owning clause (lower first)
    #[serde(default)]
    pub order: i64,
}

/// Named container for one clause tree, referenced by operation steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementDef {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub clauses: Vec<ClauseDef>,

    #[serde(default)]
    pub requests: Vec<RequestDef>,
}

/// Everything the engine needs from one model
///
/// # Example
///
/// ```rust
/// use resource_requirement_engine::models::ModelDef;
///
/// let json = r#"{
///   "model_id": "clinic",
///   "resources": [{"id": "nurse", "capacity": 2}],
///   "requirements": [{
///     "id": "triage",
///     "clauses": [{"id": "c1", "mode": "require_all", "order": 0}],
///     "requests": [{"id": "r1", "clause_id": "c1", "resource_id": "nurse", "quantity": 1}]
///   }]
/// }"#;
/// let model = ModelDef::from_json(json).unwrap();
/// assert_eq!(model.resources.len(), 1);
/// assert_eq!(model.requirements[0].requests[0].order, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub model_id: String,

    #[serde(default)]
    pub resources: Vec<ResourceDef>,

    #[serde(default)]
    pub requirements: Vec<RequirementDef>,
}

impl ModelDef {
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

/// One generic property-bag override row
///
/// Resolved into a typed patch when the scenario is compiled; see
/// [`crate::scenario::compile_scenario`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOverride {
    pub target_object_id: String,
    pub target_object_type: String,
    pub property_name: String,
    pub property_value: serde_json::Value,
}

/// A scenario layered on top of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDef {
    pub scenario_id: String,

    /// Number of independent replications to run
    #[serde(default = "default_replications")]
    pub replications: usize,

    #[serde(default)]
    pub overrides: Vec<ScenarioOverride>,
}

fn default_replications() -> usize {
    1
}

impl ScenarioDef {
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(json)?)
    }
}
