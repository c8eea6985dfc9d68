//! Compiled requirement sets
//!
//! A model is compiled once: its resources are indexed into a catalog and
//! every requirement definition is validated and built into a tree. The result
//! is read-only and can be shared by every scenario and replication of the
//! model.

use crate::config::EngineConfig;
use crate::models::catalog::{CapacityTable, CatalogError, ResourceCatalog};
use crate::models::definition::ModelDef;
use crate::requirement::analysis::is_ever_satisfiable;
use crate::requirement::tree::RequirementTree;
use crate::requirement::validation::ConfigError;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Errors that stop a model from compiling
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Resource catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Duplicate requirement ID: {0}")]
    DuplicateRequirement(String),

    #[error("Requirement '{requirement_id}': {error}")]
    InvalidRequirement {
        requirement_id: String,
        error: ConfigError,
    },
}

/// Lookup of a requirement id that the set does not contain
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown requirement: {0}")]
pub struct UnknownRequirement(pub String);

/// Requirement trees of one model, keyed by requirement id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequirementSet {
    trees: BTreeMap<String, RequirementTree>,
}

impl RequirementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tree; returns false (and keeps the existing tree) on id clash
    pub fn insert(&mut self, tree: RequirementTree) -> bool {
        if self.trees.contains_key(tree.requirement_id()) {
            return false;
        }
        self.trees.insert(tree.requirement_id().to_string(), tree);
        true
    }

    pub fn get(&self, requirement_id: &str) -> Result<&RequirementTree, UnknownRequirement> {
        self.trees
            .get(requirement_id)
            .ok_or_else(|| UnknownRequirement(requirement_id.to_string()))
    }

    pub fn contains(&self, requirement_id: &str) -> bool {
        self.trees.contains_key(requirement_id)
    }

    /// Trees in requirement-id order
    pub fn iter(&self) -> impl Iterator<Item = &RequirementTree> {
        self.trees.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RequirementTree> {
        self.trees.values_mut()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Static check: could this requirement ever be met with `capacities`?
    pub fn is_ever_satisfiable(
        &self,
        requirement_id: &str,
        capacities: &CapacityTable,
    ) -> Result<bool, UnknownRequirement> {
        Ok(is_ever_satisfiable(self.get(requirement_id)?, capacities))
    }
}

/// A model's catalog plus its built requirement trees
#[derive(Debug, Clone)]
pub struct CompiledModel {
    catalog: ResourceCatalog,
    requirements: RequirementSet,
}

impl CompiledModel {
    /// Compile a model definition
    ///
    /// Catalog errors are reported alone (requirements cannot be checked
    /// without a catalog). Otherwise every requirement is validated and all
    /// errors across all requirements are returned together.
    ///
    /// # Example
    ///
    /// ```rust
    /// use resource_requirement_engine::models::ModelDef;
    /// use resource_requirement_engine::requirement::CompiledModel;
    /// use resource_requirement_engine::EngineConfig;
    ///
    /// let model = ModelDef::from_json(r#"{
    ///   "model_id": "port",
    ///   "resources": [{"id": "crane", "capacity": 1}],
    ///   "requirements": [{"id": "unload", "requests": [
    ///     {"id": "r", "resource_id": "crane", "quantity": 1}
    ///   ]}]
    /// }"#).unwrap();
    /// let compiled = CompiledModel::compile(&model, &EngineConfig::default()).unwrap();
    /// assert!(compiled.requirements().contains("unload"));
    /// ```
    pub fn compile(model: &ModelDef, config: &EngineConfig) -> Result<Self, Vec<ModelError>> {
        let catalog = ResourceCatalog::build(&model.model_id, &model.resources)
            .map_err(|errors| errors.into_iter().map(ModelError::from).collect::<Vec<_>>())?;

        let mut requirements = RequirementSet::new();
        let mut errors = Vec::new();

        for def in &model.requirements {
            match RequirementTree::build(def, &catalog, config) {
                Ok(tree) => {
                    if !requirements.insert(tree) {
                        errors.push(ModelError::DuplicateRequirement(def.id.clone()));
                    }
                }
                Err(config_errors) => {
                    errors.extend(config_errors.into_iter().map(|error| {
                        ModelError::InvalidRequirement {
                            requirement_id: def.id.clone(),
                            error,
                        }
                    }));
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        debug!(
            model_id = %model.model_id,
            resources = catalog.len(),
            requirements = requirements.len(),
            "compiled model"
        );

        Ok(Self {
            catalog,
            requirements,
        })
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    pub fn requirements(&self) -> &RequirementSet {
        &self.requirements
    }
}
