// Scenario Override Layer
//
// A scenario patches a compiled model (capacities, request quantities) and is
// compiled once before its first replication. The result is immutable and
// shared by every replication of the scenario.
//
// Architecture:
// - overrides.rs: Property-bag rows → typed ScenarioPatch
// - lifecycle.rs: ScenarioStatus and checked transitions

pub mod lifecycle;
pub mod overrides;

pub use lifecycle::{ScenarioLifecycle, ScenarioStatus};
pub use overrides::{resolve_overrides, OverrideError, ScenarioPatch};

use crate::allocation::AllocationManager;
use crate::config::EngineConfig;
use crate::models::catalog::CapacityTable;
use crate::models::definition::{ScenarioDef, ScenarioOverride};
use crate::pool::ResourcePool;
use crate::requirement::analysis::{is_ever_satisfiable, shortfalls, Shortfall};
use crate::requirement::set::{CompiledModel, RequirementSet};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Errors and warnings
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("Invalid scenario overrides: {}", format_override_errors(.0))]
    InvalidOverrides(Vec<OverrideError>),

    #[error("Requirements can never be satisfied: {}", join_ids(.0))]
    NeverSatisfiable(Vec<String>),

    #[error("Invalid scenario transition from {from} to {to}")]
    InvalidTransition {
        from: ScenarioStatus,
        to: ScenarioStatus,
    },

    #[error("Scenario has no replications to run")]
    NoReplications,

    #[error("Scenario '{scenario_id}' ({fingerprint}) was not validated by mark_ready")]
    NotValidated {
        scenario_id: String,
        fingerprint: String,
    },

    #[error("Fingerprint computation failed: {0}")]
    Fingerprint(String),
}

fn join_ids(ids: &[String]) -> String {
    ids.join(", ")
}

fn format_override_errors(errors: &[OverrideError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Finding from static scenario validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// Requirement cannot be met even with every resource idle
    NeverSatisfiable {
        requirement_id: String,
        shortfalls: Vec<Shortfall>,
    },
}

impl ValidationWarning {
    pub fn requirement_id(&self) -> &str {
        match self {
            ValidationWarning::NeverSatisfiable { requirement_id, .. } => requirement_id,
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::NeverSatisfiable {
                requirement_id,
                shortfalls,
            } => {
                write!(f, "requirement '{}' can never be satisfied", requirement_id)?;
                for s in shortfalls {
                    write!(
                        f,
                        "; request '{}' needs {} units of resource {} but capacity is {}",
                        s.request_id, s.requested, s.resource, s.available
                    )?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// Compiled scenario
// ============================================================================

/// A model with one scenario's overrides applied
///
/// Built by [`compile_scenario`]. Every replication draws a fresh pool from
/// [`CompiledScenario::new_pool`] and shares the requirement set.
#[derive(Debug, Clone)]
pub struct CompiledScenario {
    scenario_id: String,
    model_id: String,
    replications: usize,
    capacities: CapacityTable,
    requirements: Arc<RequirementSet>,
    fingerprint: String,
    config: EngineConfig,
}

impl CompiledScenario {
    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn replications(&self) -> usize {
        self.replications
    }

    /// Effective capacities after overrides
    pub fn capacities(&self) -> &CapacityTable {
        &self.capacities
    }

    pub fn requirements(&self) -> &RequirementSet {
        &self.requirements
    }

    /// Shared handle for replications
    pub fn shared_requirements(&self) -> Arc<RequirementSet> {
        Arc::clone(&self.requirements)
    }

    /// SHA-256 of the resolved capacities and request quantities (hex)
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh, idle pool for one replication
    pub fn new_pool(&self) -> ResourcePool {
        ResourcePool::new(&self.capacities)
    }

    /// Allocation manager over this scenario's requirement set
    pub fn manager(&self) -> AllocationManager {
        AllocationManager::new(self.shared_requirements())
    }

    /// Static check of every requirement against the effective capacities
    pub fn validate(&self) -> Vec<ValidationWarning> {
        self.requirements
            .iter()
            .filter(|tree| !is_ever_satisfiable(tree, &self.capacities))
            .map(|tree| {
                let found = shortfalls(tree, &self.capacities);
                warn!(
                    scenario_id = %self.scenario_id,
                    requirement_id = tree.requirement_id(),
                    short_requests = found.len(),
                    "requirement can never be satisfied"
                );
                ValidationWarning::NeverSatisfiable {
                    requirement_id: tree.requirement_id().to_string(),
                    shortfalls: found,
                }
            })
            .collect()
    }
}

/// Resolve a scenario's overrides against `model` and freeze the result
///
/// # Example
///
/// ```rust
/// use resource_requirement_engine::models::{ModelDef, ScenarioDef};
/// use resource_requirement_engine::requirement::CompiledModel;
/// use resource_requirement_engine::scenario::compile_scenario;
/// use resource_requirement_engine::EngineConfig;
///
/// let model = ModelDef::from_json(r#"{
///   "model_id": "clinic",
///   "resources": [{"id": "bed", "capacity": 1}],
///   "requirements": []
/// }"#).unwrap();
/// let scenario = ScenarioDef::from_json(r#"{
///   "scenario_id": "extra_beds",
///   "overrides": [{"target_object_id": "bed", "target_object_type": "resource",
///                  "property_name": "capacity", "property_value": 4}]
/// }"#).unwrap();
///
/// let config = EngineConfig::default();
/// let compiled = CompiledModel::compile(&model, &config).unwrap();
/// let scenario = compile_scenario(&compiled, &scenario, &config).unwrap();
///
/// let bed = compiled.catalog().resolve("bed").unwrap();
/// assert_eq!(scenario.capacities().capacity(bed), Some(4));
/// assert_eq!(compiled.catalog().capacity(bed), Some(1));
/// ```
pub fn compile_scenario(
    model: &CompiledModel,
    scenario: &ScenarioDef,
    config: &EngineConfig,
) -> Result<CompiledScenario, ScenarioError> {
    let patch =
        resolve_overrides(&scenario.overrides, model).map_err(ScenarioError::InvalidOverrides)?;

    let capacities = patched_capacities(model, &patch);

    let mut requirements = model.requirements().clone();
    for tree in requirements.iter_mut() {
        if let Some(quantities) = patch.quantities.get(tree.requirement_id()) {
            *tree = tree.with_quantities(quantities);
        }
    }

    let fingerprint = compute_fingerprint(
        &scenario.scenario_id,
        model.catalog().model_id(),
        &capacities,
        &requirements,
    )?;

    debug!(
        scenario_id = %scenario.scenario_id,
        model_id = model.catalog().model_id(),
        capacity_overrides = patch.capacities.len(),
        quantity_overrides = patch.quantities.values().map(|q| q.len()).sum::<usize>(),
        fingerprint = %fingerprint,
        "compiled scenario"
    );

    Ok(CompiledScenario {
        scenario_id: scenario.scenario_id.clone(),
        model_id: model.catalog().model_id().to_string(),
        replications: scenario.replications,
        capacities,
        requirements: Arc::new(requirements),
        fingerprint,
        config: config.clone(),
    })
}

/// Pool with the model's capacities patched by `overrides`
///
/// The model's own catalog is not modified.
pub fn effective_pool(
    model: &CompiledModel,
    overrides: &[ScenarioOverride],
) -> Result<ResourcePool, ScenarioError> {
    let patch = resolve_overrides(overrides, model).map_err(ScenarioError::InvalidOverrides)?;
    Ok(ResourcePool::new(&patched_capacities(model, &patch)))
}

fn patched_capacities(model: &CompiledModel, patch: &ScenarioPatch) -> CapacityTable {
    let mut capacities = model.catalog().base_capacities();
    for (resource, capacity) in &patch.capacities {
        // indices come from the same catalog
        capacities.set_capacity(*resource, *capacity);
    }
    capacities
}

// ============================================================================
// Fingerprint
// ============================================================================

#[derive(Serialize)]
struct FingerprintInput<'a> {
    scenario_id: &'a str,
    model_id: &'a str,
    capacities: BTreeMap<&'a str, u32>,
    /// "requirement/request" → quantity
    quantities: BTreeMap<String, u32>,
}

fn compute_fingerprint(
    scenario_id: &str,
    model_id: &str,
    capacities: &CapacityTable,
    requirements: &RequirementSet,
) -> Result<String, ScenarioError> {
    let input = FingerprintInput {
        scenario_id,
        model_id,
        capacities: capacities.iter().map(|(_, id, cap)| (id, cap)).collect(),
        quantities: requirements
            .iter()
            .flat_map(|tree| {
                tree.requests().map(move |r| {
                    (format!("{}/{}", tree.requirement_id(), r.key), r.quantity)
                })
            })
            .collect(),
    };

    // BTreeMap keys keep the serialization canonical
    let json = serde_json::to_string(&input)
        .map_err(|e| ScenarioError::Fingerprint(format!("serialization failed: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let result = hasher.finalize();

    Ok(format!("{:x}", result))
}
