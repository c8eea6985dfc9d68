// Requirement Definition Validation
//
// Pre-build checks that a requirement definition describes a finite,
// well-formed tree:
// - Node ID uniqueness (clauses and requests share one namespace)
// - Clause modes
// - Parent references and cycle detection
// - Request references (owning clause, resource) and quantities
// - Nesting depth limits

use crate::models::catalog::ResourceCatalog;
use crate::models::definition::RequirementDef;
use crate::requirement::tree::ClauseMode;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Configuration errors found while building a requirement tree
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Duplicate node ID: {0}")]
    DuplicateNodeId(String),

    #[error("Clause '{clause_id}' has invalid mode '{mode}' (expected require_all or require_any)")]
    InvalidMode { clause_id: String, mode: String },

    #[error("Clause '{clause_id}' references unknown parent '{parent_id}'")]
    DanglingParent { clause_id: String, parent_id: String },

    #[error("Clause '{0}' is its own ancestor")]
    CyclicParentage(String),

    #[error("Request '{request_id}' references unknown clause '{clause_id}'")]
    DanglingClause { request_id: String, clause_id: String },

    #[error("Request '{request_id}' references resource '{resource_id}' outside model '{model_id}'")]
    DanglingResource {
        request_id: String,
        resource_id: String,
        model_id: String,
    },

    #[error("Request '{request_id}' has invalid quantity {quantity} (must be at least 1)")]
    InvalidQuantity { request_id: String, quantity: i64 },

    #[error("Clause depth {actual} exceeds maximum {max}")]
    ExcessiveDepth { actual: usize, max: usize },
}

/// Validation result
pub type ValidationResult = Result<(), Vec<ConfigError>>;

/// Validate a requirement definition against its model's catalog
///
/// Runs every check and returns all errors found.
pub fn validate_definition(
    def: &RequirementDef,
    catalog: &ResourceCatalog,
    max_depth: usize,
) -> ValidationResult {
    let mut errors = Vec::new();

    if let Err(e) = validate_node_id_uniqueness(def) {
        errors.extend(e);
    }

    if let Err(e) = validate_modes(def) {
        errors.extend(e);
    }

    // Depth is only meaningful once every parent chain is known to terminate
    match validate_parentage(def) {
        Ok(()) => {
            if let Err(e) = validate_depth(def, max_depth) {
                errors.extend(e);
            }
        }
        Err(e) => errors.extend(e),
    }

    if let Err(e) = validate_requests(def, catalog) {
        errors.extend(e);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// Node ID Uniqueness
// ============================================================================

fn validate_node_id_uniqueness(def: &RequirementDef) -> ValidationResult {
    let mut seen = HashSet::new();
    let mut errors = Vec::new();

    let ids = def
        .clauses
        .iter()
        .map(|c| c.id.as_str())
        .chain(def.requests.iter().map(|r| r.id.as_str()));

    for id in ids {
        if !seen.insert(id) {
            errors.push(ConfigError::DuplicateNodeId(id.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// Clause Modes
// ============================================================================

fn validate_modes(def: &RequirementDef) -> ValidationResult {
    let errors: Vec<ConfigError> = def
        .clauses
        .iter()
        .filter(|c| c.mode.parse::<ClauseMode>().is_err())
        .map(|c| ConfigError::InvalidMode {
            clause_id: c.id.clone(),
            mode: c.mode.clone(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// Parentage: dangling parents and cycles
// ============================================================================

/// Map clause id to its parent id (first declaration wins on duplicates)
fn parent_map(def: &RequirementDef) -> HashMap<&str, Option<&str>> {
    let mut parents = HashMap::with_capacity(def.clauses.len());
    for clause in &def.clauses {
        parents
            .entry(clause.id.as_str())
            .or_insert(clause.parent_id.as_deref());
    }
    parents
}

fn validate_parentage(def: &RequirementDef) -> ValidationResult {
    let parents = parent_map(def);
    let mut errors = Vec::new();

    for clause in &def.clauses {
        if let Some(parent_id) = clause.parent_id.as_deref() {
            if !parents.contains_key(parent_id) {
                errors.push(ConfigError::DanglingParent {
                    clause_id: clause.id.clone(),
                    parent_id: parent_id.to_string(),
                });
            }
        }
    }

    // Walk each clause's parent chain with a per-path visited set. A clause is
    // reported only when the walk returns to it; clauses that merely lead into
    // someone else's cycle stop on the revisit without being reported.
    let mut reported = HashSet::new();
    for clause in &def.clauses {
        let start = clause.id.as_str();
        if reported.contains(start) {
            continue;
        }
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut current = parents.get(start).copied().flatten();

        while let Some(parent) = current {
            if parent == start {
                reported.insert(start);
                errors.push(ConfigError::CyclicParentage(start.to_string()));
                break;
            }
            if !visited.insert(parent) {
                break;
            }
            current = parents.get(parent).copied().flatten();
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// Depth Limits
// ============================================================================

/// Deepest clause nesting, counting root clauses as depth 1
///
/// Callers must have checked parentage first; chains are assumed finite.
pub(crate) fn max_clause_depth(def: &RequirementDef) -> usize {
    let parents = parent_map(def);
    let mut depths: HashMap<&str, usize> = HashMap::with_capacity(def.clauses.len());
    let mut max_depth = 0;

    for clause in &def.clauses {
        let mut chain = vec![clause.id.as_str()];
        let mut base = 0;
        let mut current = parents.get(clause.id.as_str()).copied().flatten();
        while let Some(parent) = current {
            if let Some(known) = depths.get(parent) {
                base = *known;
                break;
            }
            chain.push(parent);
            current = parents.get(parent).copied().flatten();
        }
        for (offset, id) in chain.iter().rev().enumerate() {
            depths.insert(*id, base + offset + 1);
        }
        max_depth = max_depth.max(base + chain.len());
    }

    max_depth
}

fn validate_depth(def: &RequirementDef, max_depth: usize) -> ValidationResult {
    let actual = max_clause_depth(def);
    if actual > max_depth {
        Err(vec![ConfigError::ExcessiveDepth {
            actual,
            max: max_depth,
        }])
    } else {
        Ok(())
    }
}

// ============================================================================
// Requests
// ============================================================================

fn validate_requests(def: &RequirementDef, catalog: &ResourceCatalog) -> ValidationResult {
    let clause_ids: HashSet<&str> = def.clauses.iter().map(|c| c.id.as_str()).collect();
    let mut errors = Vec::new();

    for request in &def.requests {
        if let Some(clause_id) = request.clause_id.as_deref() {
            if !clause_ids.contains(clause_id) {
                errors.push(ConfigError::DanglingClause {
                    request_id: request.id.clone(),
                    clause_id: clause_id.to_string(),
                });
            }
        }

        if catalog.resolve(&request.resource_id).is_none() {
            errors.push(ConfigError::DanglingResource {
                request_id: request.id.clone(),
                resource_id: request.resource_id.clone(),
                model_id: catalog.model_id().to_string(),
            });
        }

        if request.quantity < 1 || u32::try_from(request.quantity).is_err() {
            errors.push(ConfigError::InvalidQuantity {
                request_id: request.id.clone(),
                quantity: request.quantity,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::definition::{ClauseDef, RequestDef, ResourceDef};

    fn clause(id: &str, parent: Option<&str>) -> ClauseDef {
        ClauseDef {
            id: id.to_string(),
            mode: "require_all".to_string(),
            order: 0,
            parent_id: parent.map(str::to_string),
        }
    }

    fn def(clauses: Vec<ClauseDef>) -> RequirementDef {
        RequirementDef {
            id: "req".to_string(),
            name: None,
            clauses,
            requests: vec![],
        }
    }

    fn catalog() -> ResourceCatalog {
        ResourceCatalog::build("m", &[ResourceDef::new("a", 1)]).unwrap()
    }

    #[test]
    fn test_depth_counts_nested_clauses() {
        let d = def(vec![
            clause("c3", Some("c2")),
            clause("c1", None),
            clause("c2", Some("c1")),
            clause("c4", Some("c1")),
        ]);
        assert_eq!(max_clause_depth(&d), 3);
    }

    #[test]
    fn test_self_parent_is_cycle() {
        let d = def(vec![clause("x", Some("x"))]);
        let errors = validate_definition(&d, &catalog(), 10).unwrap_err();
        assert_eq!(errors, vec![ConfigError::CyclicParentage("x".to_string())]);
    }

    #[test]
    fn test_cycle_members_reported_once_each() {
        let d = def(vec![
            clause("a", Some("b")),
            clause("b", Some("a")),
            clause("tail", Some("a")),
        ]);
        let errors = validate_parentage(&d).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ConfigError::CyclicParentage("a".to_string())));
        assert!(errors.contains(&ConfigError::CyclicParentage("b".to_string())));
    }

    #[test]
    fn test_depth_limit_enforced() {
        let d = def(vec![
            clause("c1", None),
            clause("c2", Some("c1")),
            clause("c3", Some("c2")),
        ]);
        assert_eq!(
            validate_definition(&d, &catalog(), 2).unwrap_err(),
            vec![ConfigError::ExcessiveDepth { actual: 3, max: 2 }]
        );
        assert!(validate_definition(&d, &catalog(), 3).is_ok());
    }

    #[test]
    fn test_quantity_overflow_rejected() {
        let mut d = def(vec![]);
        d.requests.push(RequestDef {
            id: "r".to_string(),
            clause_id: None,
            resource_id: "a".to_string(),
            quantity: i64::from(u32::MAX) + 1,
            order: 0,
        });
        assert!(matches!(
            validate_definition(&d, &catalog(), 10).unwrap_err()[0],
            ConfigError::InvalidQuantity { .. }
        ));
    }
}
