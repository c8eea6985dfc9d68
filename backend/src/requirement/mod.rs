// Resource Requirement Trees
//
// A requirement is a tree of AND ("require_all") / OR ("require_any")
// clauses whose leaves request quantities of named resources.
//
// Architecture:
// - tree.rs: Arena representation and build from definitions
// - validation.rs: Definition checks (ids, modes, cycles, references, depth)
// - evaluator.rs: Satisfiability and plan construction against a pool view
// - analysis.rs: Static satisfiability and blocking diagnostics
// - set.rs: Per-model compilation into a requirement set

pub mod analysis;
pub mod evaluator;
pub mod set;
pub mod tree;
pub mod validation;

// Re-export main types for convenience
pub use analysis::{is_ever_satisfiable, shortfalls, Shortfall};
pub use evaluator::{evaluate, evaluate_node, Evaluation};
pub use set::{CompiledModel, ModelError, RequirementSet, UnknownRequirement};
pub use tree::{ClauseMode, Node, NodeId, RequestView, RequirementTree};
pub use validation::{validate_definition, ConfigError, ValidationResult};
