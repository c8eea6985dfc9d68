//! Requirement Tree Build & Validation Tests
//!
//! Tree construction from definitions and every configuration error.

use resource_requirement_engine::models::{RequirementDef, ResourceCatalog, ResourceDef};
use resource_requirement_engine::requirement::{
    ClauseMode, ConfigError, Node, RequirementTree,
};
use resource_requirement_engine::EngineConfig;
use serde_json::json;

// ============================================================================
// Test Helpers
// ============================================================================

fn create_catalog() -> ResourceCatalog {
    ResourceCatalog::build(
        "hospital",
        &[
            ResourceDef::new("nurse", 2),
            ResourceDef::new("bed", 1),
            ResourceDef::new("doctor", 1),
        ],
    )
    .unwrap()
}

fn requirement(value: serde_json::Value) -> RequirementDef {
    serde_json::from_value(value).unwrap()
}

fn build(value: serde_json::Value) -> Result<RequirementTree, Vec<ConfigError>> {
    RequirementTree::build(&requirement(value), &create_catalog(), &EngineConfig::default())
}

fn child_keys(tree: &RequirementTree, node: &Node) -> Vec<String> {
    match node {
        Node::Clause { children, .. } => children
            .iter()
            .map(|c| tree.node(*c).key().to_string())
            .collect(),
        Node::Request { .. } => vec![],
    }
}

// ============================================================================
// Structure
// ============================================================================

#[test]
fn test_single_root_clause_becomes_root() {
    let tree = build(json!({
        "id": "admit",
        "clauses": [{"id": "all", "mode": "require_all"}],
        "requests": [
            {"id": "need_nurse", "clause_id": "all", "resource_id": "nurse", "quantity": 1},
            {"id": "need_bed", "clause_id": "all", "resource_id": "bed", "quantity": 1}
        ]
    }))
    .unwrap();

    let root = tree.node(tree.root());
    assert_eq!(root.key(), "all");
    assert!(matches!(root, Node::Clause { mode: ClauseMode::RequireAll, .. }));
    assert_eq!(child_keys(&tree, root), vec!["need_nurse", "need_bed"]);
    assert_eq!(tree.len(), 3);
}

#[test]
fn test_multiple_top_level_nodes_get_implicit_and_root() {
    let tree = build(json!({
        "id": "surgery",
        "clauses": [{"id": "staff", "mode": "require_any", "order": 1}],
        "requests": [
            {"id": "need_bed", "resource_id": "bed", "quantity": 1, "order": 0},
            {"id": "need_nurse", "clause_id": "staff", "resource_id": "nurse", "quantity": 1},
            {"id": "need_doctor", "clause_id": "staff", "resource_id": "doctor", "quantity": 1}
        ]
    }))
    .unwrap();

    let root = tree.node(tree.root());
    assert_eq!(root.key(), "surgery::root");
    assert!(matches!(root, Node::Clause { mode: ClauseMode::RequireAll, .. }));
    assert_eq!(child_keys(&tree, root), vec!["need_bed", "staff"]);
}

#[test]
fn test_children_sorted_by_order_then_kind_then_position() {
    let tree = build(json!({
        "id": "r",
        "clauses": [
            {"id": "top", "mode": "require_all"},
            {"id": "inner", "mode": "require_any", "parent_id": "top", "order": 5}
        ],
        "requests": [
            {"id": "late", "clause_id": "top", "resource_id": "bed", "quantity": 1, "order": 9},
            {"id": "tie_req", "clause_id": "top", "resource_id": "nurse", "quantity": 1, "order": 5},
            {"id": "first", "clause_id": "top", "resource_id": "doctor", "quantity": 1, "order": -1},
            {"id": "x", "clause_id": "inner", "resource_id": "nurse", "quantity": 1}
        ]
    }))
    .unwrap();

    let root = tree.node(tree.root());
    assert_eq!(
        child_keys(&tree, root),
        vec!["first", "inner", "tie_req", "late"]
    );
}

#[test]
fn test_mode_strings_parse() {
    assert_eq!("require_all".parse::<ClauseMode>(), Ok(ClauseMode::RequireAll));
    assert_eq!("require_any".parse::<ClauseMode>(), Ok(ClauseMode::RequireAny));
    assert!("all".parse::<ClauseMode>().is_err());
}

// ============================================================================
// Configuration errors
// ============================================================================

#[test]
fn test_self_parent_cycle_rejected() {
    let errors = build(json!({
        "id": "r",
        "clauses": [{"id": "x", "mode": "require_all", "parent_id": "x"}]
    }))
    .unwrap_err();
    assert!(errors.contains(&ConfigError::CyclicParentage("x".to_string())));
}

#[test]
fn test_longer_cycle_rejected() {
    let errors = build(json!({
        "id": "r",
        "clauses": [
            {"id": "a", "mode": "require_all", "parent_id": "c"},
            {"id": "b", "mode": "require_any", "parent_id": "a"},
            {"id": "c", "mode": "require_all", "parent_id": "b"}
        ]
    }))
    .unwrap_err();
    for id in ["a", "b", "c"] {
        assert!(
            errors.contains(&ConfigError::CyclicParentage(id.to_string())),
            "missing cycle report for {}",
            id
        );
    }
}

#[test]
fn test_clause_hanging_off_cycle_not_reported_as_cyclic() {
    let errors = build(json!({
        "id": "r",
        "clauses": [
            {"id": "loop", "mode": "require_all", "parent_id": "loop"},
            {"id": "tail", "mode": "require_all", "parent_id": "loop"}
        ]
    }))
    .unwrap_err();
    assert_eq!(errors, vec![ConfigError::CyclicParentage("loop".to_string())]);
}

#[test]
fn test_dangling_resource_rejected() {
    let errors = build(json!({
        "id": "r",
        "requests": [{"id": "x", "resource_id": "crane", "quantity": 1}]
    }))
    .unwrap_err();
    assert_eq!(
        errors,
        vec![ConfigError::DanglingResource {
            request_id: "x".to_string(),
            resource_id: "crane".to_string(),
            model_id: "hospital".to_string(),
        }]
    );
}

#[test]
fn test_all_problems_reported_together() {
    let errors = build(json!({
        "id": "r",
        "clauses": [
            {"id": "c", "mode": "require_some"},
            {"id": "d", "mode": "require_all", "parent_id": "ghost"}
        ],
        "requests": [
            {"id": "q0", "clause_id": "c", "resource_id": "bed", "quantity": 0},
            {"id": "q1", "clause_id": "nowhere", "resource_id": "bed", "quantity": 1},
            {"id": "c", "resource_id": "bed", "quantity": 1}
        ]
    }))
    .unwrap_err();

    assert!(errors.contains(&ConfigError::InvalidMode {
        clause_id: "c".to_string(),
        mode: "require_some".to_string(),
    }));
    assert!(errors.contains(&ConfigError::DanglingParent {
        clause_id: "d".to_string(),
        parent_id: "ghost".to_string(),
    }));
    assert!(errors.contains(&ConfigError::InvalidQuantity {
        request_id: "q0".to_string(),
        quantity: 0,
    }));
    assert!(errors.contains(&ConfigError::DanglingClause {
        request_id: "q1".to_string(),
        clause_id: "nowhere".to_string(),
    }));
    assert!(errors.contains(&ConfigError::DuplicateNodeId("c".to_string())));
}

#[test]
fn test_depth_limit_enforced() {
    // chain c0 <- c1 <- ... <- c5
    let clauses: Vec<serde_json::Value> = (0..6)
        .map(|i| {
            if i == 0 {
                json!({"id": "c0", "mode": "require_all"})
            } else {
                json!({"id": format!("c{}", i), "mode": "require_all", "parent_id": format!("c{}", i - 1)})
            }
        })
        .collect();
    let def = requirement(json!({"id": "deep", "clauses": clauses}));

    let shallow = EngineConfig {
        max_tree_depth: 3,
        ..EngineConfig::default()
    };
    let errors = RequirementTree::build(&def, &create_catalog(), &shallow).unwrap_err();
    assert!(matches!(errors[0], ConfigError::ExcessiveDepth { max: 3, .. }));

    assert!(RequirementTree::build(&def, &create_catalog(), &EngineConfig::default()).is_ok());
}

// ============================================================================
// Quantity patches
// ============================================================================

#[test]
fn test_with_quantities_copies_tree() {
    let tree = build(json!({
        "id": "r",
        "requests": [
            {"id": "x", "resource_id": "nurse", "quantity": 1},
            {"id": "y", "resource_id": "bed", "quantity": 1}
        ]
    }))
    .unwrap();

    let patch = [("y".to_string(), 4u32), ("zzz".to_string(), 9u32)]
        .into_iter()
        .collect();
    let patched = tree.with_quantities(&patch);

    let quantities: Vec<u32> = patched.requests().map(|r| r.quantity).collect();
    assert_eq!(quantities, vec![1, 4]);
    let original: Vec<u32> = tree.requests().map(|r| r.quantity).collect();
    assert_eq!(original, vec![1, 1]);
}
