//! Requirement Tree Model
//!
//! Immutable, validated form of a [`RequirementDef`]. Nodes live in an arena
//! and are addressed by [`NodeId`]; a clause stores the ids of its children
//! and nothing points back up, so the tree has a single owner and no
//! reference cycles.
//!
//! Children are sorted once at build time by declared `order`. Ties are
//! broken by kind (clauses before requests) and then by declaration position,
//! which makes evaluation order identical across runs with identical input.
//!
//! Each node also carries its minimum demand: per resource, the fewest units
//! any solution of that subtree can claim. `require_all` sums its children,
//! `require_any` takes the per-resource minimum over its children. The
//! evaluator uses it to drop branches that cannot fit before exploring them.

use crate::config::EngineConfig;
use crate::models::catalog::{ResourceCatalog, ResourceIndex};
use crate::models::definition::RequirementDef;
use crate::pool::AllocationPlan;
use crate::requirement::validation::{validate_definition, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How a clause combines its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseMode {
    /// AND: every child must be satisfied
    RequireAll,

    /// OR: the first satisfiable child (by order) is used
    RequireAny,
}

impl ClauseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClauseMode::RequireAll => "require_all",
            ClauseMode::RequireAny => "require_any",
        }
    }
}

impl fmt::Display for ClauseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClauseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "require_all" => Ok(ClauseMode::RequireAll),
            "require_any" => Ok(ClauseMode::RequireAny),
            other => Err(other.to_string()),
        }
    }
}

/// Position of a node in its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// A tree node: either a clause or a leaf request
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Clause {
        /// Clause id from the definition (synthetic for an implicit root)
        key: String,
        mode: ClauseMode,
        order: i64,
        children: Vec<NodeId>,
    },

    Request {
        /// Request id from the definition
        key: String,
        resource: ResourceIndex,
        quantity: u32,
        order: i64,
    },
}

impl Node {
    pub fn key(&self) -> &str {
        match self {
            Node::Clause { key, .. } => key,
            Node::Request { key, .. } => key,
        }
    }

    pub fn order(&self) -> i64 {
        match self {
            Node::Clause { order, .. } => *order,
            Node::Request { order, .. } => *order,
        }
    }
}

/// A leaf as seen from outside the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestView<'a> {
    pub key: &'a str,
    pub resource: ResourceIndex,
    pub quantity: u32,
}

/// Validated requirement tree
///
/// # Example
///
/// ```rust
/// use resource_requirement_engine::models::{ResourceCatalog, ResourceDef, RequirementDef};
/// use resource_requirement_engine::requirement::RequirementTree;
/// use resource_requirement_engine::EngineConfig;
///
/// let catalog = ResourceCatalog::build("clinic", &[ResourceDef::new("bed", 1)]).unwrap();
/// let def: RequirementDef = serde_json::from_str(r#"{
///   "id": "admit",
///   "clauses": [{"id": "all", "mode": "require_all"}],
///   "requests": [{"id": "need_bed", "clause_id": "all", "resource_id": "bed", "quantity": 1}]
/// }"#).unwrap();
///
/// let tree = RequirementTree::build(&def, &catalog, &EngineConfig::default()).unwrap();
/// assert_eq!(tree.requests().count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequirementTree {
    requirement_id: String,
    nodes: Vec<Node>,
    root: NodeId,
    min_demand: Vec<AllocationPlan>,
    search_budget: usize,
}

/// A child waiting to be placed under its parent, with its sort key
#[derive(Debug, Clone, Copy)]
enum PendingChild {
    Clause(usize),
    Request(usize),
}

impl RequirementTree {
    /// Validate a definition and build its tree
    ///
    /// Returns every configuration error found. A single root clause becomes
    /// the tree root; any other combination of root clauses and clause-less
    /// requests is placed under an implicit `require_all` root.
    pub fn build(
        def: &RequirementDef,
        catalog: &ResourceCatalog,
        config: &EngineConfig,
    ) -> Result<Self, Vec<ConfigError>> {
        validate_definition(def, catalog, config.max_tree_depth)?;

        // Group children by owning clause (None = requirement root)
        let mut children: HashMap<Option<&str>, Vec<PendingChild>> = HashMap::new();
        for (i, clause) in def.clauses.iter().enumerate() {
            children
                .entry(clause.parent_id.as_deref())
                .or_default()
                .push(PendingChild::Clause(i));
        }
        for (i, request) in def.requests.iter().enumerate() {
            children
                .entry(request.clause_id.as_deref())
                .or_default()
                .push(PendingChild::Request(i));
        }
        for list in children.values_mut() {
            list.sort_by_key(|child| match *child {
                PendingChild::Clause(i) => (def.clauses[i].order, 0u8, i),
                PendingChild::Request(i) => (def.requests[i].order, 1u8, i),
            });
        }

        let mut builder = TreeBuilder {
            def,
            catalog,
            children: &children,
            nodes: Vec::with_capacity(def.clauses.len() + def.requests.len() + 1),
        };

        let top_level = children.get(&None::<&str>).map(Vec::as_slice).unwrap_or(&[]);
        let root = match top_level {
            [PendingChild::Clause(i)] => builder.place(PendingChild::Clause(*i)),
            _ => top_level
                .iter()
                .map(|c| builder.place(*c))
                .collect::<Result<Vec<NodeId>, ConfigError>>()
                .map(|kids| {
                    builder.push(Node::Clause {
                        key: format!("{}::root", def.id),
                        mode: ClauseMode::RequireAll,
                        order: 0,
                        children: kids,
                    })
                }),
        }
        .map_err(|e| vec![e])?;

        let min_demand = min_demands(&builder.nodes);
        Ok(Self {
            requirement_id: def.id.clone(),
            nodes: builder.nodes,
            root,
            min_demand,
            search_budget: config.max_search_steps,
        })
    }

    pub fn requirement_id(&self) -> &str {
        &self.requirement_id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Node by id; ids handed out by this tree are always valid
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fewest units, per resource, that any solution of the subtree claims
    pub fn min_demand(&self, id: NodeId) -> &AllocationPlan {
        &self.min_demand[id.0]
    }

    /// Backtracking steps allowed per evaluation of this tree
    pub fn search_budget(&self) -> usize {
        self.search_budget
    }

    /// All leaves, in arena order
    pub fn requests(&self) -> impl Iterator<Item = RequestView<'_>> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Request {
                key,
                resource,
                quantity,
                ..
            } => Some(RequestView {
                key,
                resource: *resource,
                quantity: *quantity,
            }),
            Node::Clause { .. } => None,
        })
    }

    /// Copy of this tree with some leaf quantities replaced
    ///
    /// `quantities` maps request id to new quantity; unknown ids are ignored.
    /// The receiver is not modified.
    pub fn with_quantities(&self, quantities: &HashMap<String, u32>) -> Self {
        let mut patched = self.clone();
        for node in &mut patched.nodes {
            if let Node::Request { key, quantity, .. } = node {
                if let Some(new_quantity) = quantities.get(key.as_str()) {
                    *quantity = *new_quantity;
                }
            }
        }
        patched.min_demand = min_demands(&patched.nodes);
        patched
    }
}

struct TreeBuilder<'a> {
    def: &'a RequirementDef,
    catalog: &'a ResourceCatalog,
    children: &'a HashMap<Option<&'a str>, Vec<PendingChild>>,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Recursively place a child and its subtree; depth was bounded by validation
    ///
    /// Validation already rejected the errors returned here, so a built tree
    /// never holds a placeholder resource, quantity or mode.
    fn place(&mut self, child: PendingChild) -> Result<NodeId, ConfigError> {
        let def = self.def;
        let children = self.children;
        match child {
            PendingChild::Request(i) => {
                let request = &def.requests[i];
                let resource = self.catalog.resolve(&request.resource_id).ok_or_else(|| {
                    ConfigError::DanglingResource {
                        request_id: request.id.clone(),
                        resource_id: request.resource_id.clone(),
                        model_id: self.catalog.model_id().to_string(),
                    }
                })?;
                let quantity = u32::try_from(request.quantity)
                    .ok()
                    .filter(|q| *q >= 1)
                    .ok_or_else(|| ConfigError::InvalidQuantity {
                        request_id: request.id.clone(),
                        quantity: request.quantity,
                    })?;
                Ok(self.push(Node::Request {
                    key: request.id.clone(),
                    resource,
                    quantity,
                    order: request.order,
                }))
            }
            PendingChild::Clause(i) => {
                let clause = &def.clauses[i];
                let mode = clause
                    .mode
                    .parse::<ClauseMode>()
                    .map_err(|mode| ConfigError::InvalidMode {
                        clause_id: clause.id.clone(),
                        mode,
                    })?;
                let pending: Vec<PendingChild> = children
                    .get(&Some(clause.id.as_str()))
                    .cloned()
                    .unwrap_or_default();
                let kids = pending
                    .into_iter()
                    .map(|c| self.place(c))
                    .collect::<Result<Vec<NodeId>, ConfigError>>()?;
                Ok(self.push(Node::Clause {
                    key: clause.id.clone(),
                    mode,
                    order: clause.order,
                    children: kids,
                }))
            }
        }
    }
}

/// Per-node minimum demand, in arena order
///
/// Children are always placed before their parent, so one forward pass sees
/// every child's bound before the clause that combines them.
fn min_demands(nodes: &[Node]) -> Vec<AllocationPlan> {
    let mut bounds: Vec<AllocationPlan> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let bound = match node {
            Node::Request {
                resource, quantity, ..
            } => AllocationPlan::new().with(*resource, *quantity),
            Node::Clause {
                mode: ClauseMode::RequireAll,
                children,
                ..
            } => {
                let mut sum = AllocationPlan::new();
                for child in children {
                    for (resource, quantity) in bounds[child.0].iter() {
                        sum.add(resource, quantity);
                    }
                }
                sum
            }
            Node::Clause {
                mode: ClauseMode::RequireAny,
                children,
                ..
            } => match children.split_first() {
                None => AllocationPlan::new(),
                Some((first, rest)) => bounds[first.0]
                    .iter()
                    .filter_map(|(resource, quantity)| {
                        rest.iter()
                            .map(|child| bounds[child.0].quantity(resource))
                            .try_fold(quantity, |low, q| (q > 0).then(|| low.min(q)))
                            .map(|low| (resource, low))
                    })
                    .collect(),
            },
        };
        bounds.push(bound);
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::definition::{ClauseDef, RequestDef, ResourceDef};

    fn catalog() -> ResourceCatalog {
        ResourceCatalog::build(
            "m",
            &[ResourceDef::new("a", 3), ResourceDef::new("b", 1)],
        )
        .unwrap()
    }

    fn request(id: &str, clause: Option<&str>, resource: &str, qty: i64, order: i64) -> RequestDef {
        RequestDef {
            id: id.to_string(),
            clause_id: clause.map(str::to_string),
            resource_id: resource.to_string(),
            quantity: qty,
            order,
        }
    }

    fn clause(id: &str, mode: &str, order: i64, parent: Option<&str>) -> ClauseDef {
        ClauseDef {
            id: id.to_string(),
            mode: mode.to_string(),
            order,
            parent_id: parent.map(str::to_string),
        }
    }

    fn child_keys(tree: &RequirementTree, id: NodeId) -> Vec<String> {
        match tree.node(id) {
            Node::Clause { children, .. } => children
                .iter()
                .map(|c| tree.node(*c).key().to_string())
                .collect(),
            Node::Request { .. } => vec![],
        }
    }

    #[test]
    fn test_single_root_clause_becomes_root() {
        let def = RequirementDef {
            id: "req".to_string(),
            name: None,
            clauses: vec![clause("top", "require_any", 0, None)],
            requests: vec![request("r1", Some("top"), "a", 1, 0)],
        };
        let tree = RequirementTree::build(&def, &catalog(), &EngineConfig::default()).unwrap();
        assert_eq!(tree.node(tree.root()).key(), "top");
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_implicit_and_root_over_several_tops() {
        let def = RequirementDef {
            id: "req".to_string(),
            name: None,
            clauses: vec![clause("c1", "require_any", 1, None)],
            requests: vec![
                request("loose", None, "b", 1, 0),
                request("inner", Some("c1"), "a", 1, 0),
            ],
        };
        let tree = RequirementTree::build(&def, &catalog(), &EngineConfig::default()).unwrap();
        match tree.node(tree.root()) {
            Node::Clause { key, mode, .. } => {
                assert_eq!(key, "req::root");
                assert_eq!(*mode, ClauseMode::RequireAll);
            }
            other => panic!("expected clause root, got {:?}", other),
        }
        assert_eq!(child_keys(&tree, tree.root()), vec!["loose", "c1"]);
    }

    #[test]
    fn test_empty_definition_gets_vacuous_root() {
        let def = RequirementDef {
            id: "nothing".to_string(),
            name: None,
            clauses: vec![],
            requests: vec![],
        };
        let tree = RequirementTree::build(&def, &catalog(), &EngineConfig::default()).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(child_keys(&tree, tree.root()).is_empty());
    }

    #[test]
    fn test_children_sorted_by_order_then_kind_then_position() {
        let def = RequirementDef {
            id: "req".to_string(),
            name: None,
            clauses: vec![
                clause("top", "require_all", 0, None),
                clause("sub", "require_any", 1, Some("top")),
            ],
            requests: vec![
                request("late", Some("top"), "a", 1, 5),
                request("tie_b", Some("top"), "a", 1, 1),
                request("first", Some("top"), "b", 1, 0),
                request("tie_a", Some("top"), "a", 1, 1),
            ],
        };
        let tree = RequirementTree::build(&def, &catalog(), &EngineConfig::default()).unwrap();
        assert_eq!(
            child_keys(&tree, tree.root()),
            vec!["first", "sub", "tie_b", "tie_a", "late"]
        );
    }

    #[test]
    fn test_with_quantities_leaves_base_untouched() {
        let def = RequirementDef {
            id: "req".to_string(),
            name: None,
            clauses: vec![],
            requests: vec![request("r1", None, "a", 1, 0)],
        };
        let base = RequirementTree::build(&def, &catalog(), &EngineConfig::default()).unwrap();
        let mut overrides = HashMap::new();
        overrides.insert("r1".to_string(), 3);
        let patched = base.with_quantities(&overrides);

        assert_eq!(patched.requests().next().unwrap().quantity, 3);
        assert_eq!(base.requests().next().unwrap().quantity, 1);
    }

    #[test]
    fn test_min_demand_sums_all_and_takes_least_of_any() {
        // top = AND( any = OR(a:2, inner = AND(a:1, b:1)), b:1 )
        let def = RequirementDef {
            id: "req".to_string(),
            name: None,
            clauses: vec![
                clause("top", "require_all", 0, None),
                clause("any", "require_any", 0, Some("top")),
                clause("inner", "require_all", 1, Some("any")),
            ],
            requests: vec![
                request("two_a", Some("any"), "a", 2, 0),
                request("in_a", Some("inner"), "a", 1, 0),
                request("in_b", Some("inner"), "b", 1, 1),
                request("need_b", Some("top"), "b", 1, 1),
            ],
        };
        let tree = RequirementTree::build(&def, &catalog(), &EngineConfig::default()).unwrap();
        let (a, b) = (ResourceIndex(0), ResourceIndex(1));

        let any = tree
            .nodes()
            .iter()
            .position(|n| n.key() == "any")
            .map(NodeId)
            .unwrap();
        // `b` is absent from the first branch, so the OR need not claim it
        assert_eq!(tree.min_demand(any), &AllocationPlan::new().with(a, 1));
        assert_eq!(
            tree.min_demand(tree.root()),
            &AllocationPlan::new().with(a, 1).with(b, 1)
        );

        let mut overrides = HashMap::new();
        overrides.insert("in_a".to_string(), 3);
        let patched = tree.with_quantities(&overrides);
        assert_eq!(patched.min_demand(any), &AllocationPlan::new().with(a, 2));
    }

    #[test]
    fn test_search_budget_taken_from_config() {
        let def = RequirementDef {
            id: "req".to_string(),
            name: None,
            clauses: vec![],
            requests: vec![request("r1", None, "a", 1, 0)],
        };
        let config = EngineConfig {
            max_search_steps: 7,
            ..EngineConfig::default()
        };
        let tree = RequirementTree::build(&def, &catalog(), &config).unwrap();
        assert_eq!(tree.search_budget(), 7);
    }

    #[test]
    fn test_placing_unvalidated_nodes_reports_errors() {
        let def = RequirementDef {
            id: "req".to_string(),
            name: None,
            clauses: vec![clause("odd", "require_some", 0, None)],
            requests: vec![
                request("ghost", None, "nowhere", 1, 0),
                request("zero", None, "a", 0, 1),
            ],
        };
        let catalog = catalog();
        let children: HashMap<Option<&str>, Vec<PendingChild>> = HashMap::new();
        let mut builder = TreeBuilder {
            def: &def,
            catalog: &catalog,
            children: &children,
            nodes: Vec::new(),
        };

        assert!(matches!(
            builder.place(PendingChild::Request(0)),
            Err(ConfigError::DanglingResource { .. })
        ));
        assert!(matches!(
            builder.place(PendingChild::Request(1)),
            Err(ConfigError::InvalidQuantity { quantity: 0, .. })
        ));
        assert!(matches!(
            builder.place(PendingChild::Clause(0)),
            Err(ConfigError::InvalidMode { .. })
        ));
        assert!(builder.nodes.is_empty());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("require_all".parse::<ClauseMode>(), Ok(ClauseMode::RequireAll));
        assert_eq!("require_any".parse::<ClauseMode>(), Ok(ClauseMode::RequireAny));
        assert!("require_some".parse::<ClauseMode>().is_err());
    }
}
