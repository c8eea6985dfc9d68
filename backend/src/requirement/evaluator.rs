//! Clause Evaluator
//!
//! Decides whether a requirement tree can be satisfied against a view of the
//! pool and, if so, which units to reserve. Evaluation never mutates the
//! pool; it only reads [`AvailabilityView::available`].
//!
//! # Semantics
//!
//! - **Request** `(r, q)`: satisfiable iff `available(r)` minus what the plan
//!   already claims for `r` is at least `q`.
//! - **require_all**: children in order, all against the same snapshot. Claims
//!   accumulate, so two leaves on the same resource are checked against one
//!   combined availability and their quantities are summed.
//! - **require_any**: children in order; the first child that leads to a full
//!   solution wins. Declared order decides, not "cheapest" or "most available".
//! - Empty `require_all` is vacuously satisfiable with an empty plan; empty
//!   `require_any` is never satisfiable.
//!
//! When a `require_any` sits inside a `require_all` and its first satisfiable
//! child starves a later sibling, the search backtracks to the next child in
//! order. The result is the first solution in declared order over the whole
//! tree. A standalone `require_any` therefore still returns its first
//! satisfiable child.
//!
//! # Search
//!
//! The search runs in a loop over an explicit goal stack. Open `require_any`
//! choices and an undo trail live on the heap, so tree width never turns into
//! native stack depth.
//!
//! Alongside the plan the search tracks the pending demand: the sum of
//! [`RequirementTree::min_demand`] over every goal still on the stack. A
//! branch is dropped as soon as claimed plus pending demand exceeds what is
//! available, which decides a requirement with an impossible mandatory leaf
//! before any choice is explored.
//!
//! Each tree carries a step budget (`EngineConfig::max_search_steps`). When a
//! search exceeds it, the tree is evaluated again without backtracking: every
//! `require_any` keeps its first satisfiable child. That pass visits each node
//! at most once and recurses only as deep as the clause nesting.

use crate::models::catalog::ResourceIndex;
use crate::pool::{AllocationPlan, AvailabilityView};
use crate::requirement::tree::{ClauseMode, Node, NodeId, RequirementTree};
use std::collections::BTreeMap;
use tracing::debug;

/// Outcome of evaluating a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Satisfiable now; the plan lists the units to reserve
    Satisfiable(AllocationPlan),

    /// Not satisfiable with current availability
    Unsatisfiable,
}

impl Evaluation {
    pub fn is_satisfiable(&self) -> bool {
        matches!(self, Evaluation::Satisfiable(_))
    }

    pub fn plan(&self) -> Option<&AllocationPlan> {
        match self {
            Evaluation::Satisfiable(plan) => Some(plan),
            Evaluation::Unsatisfiable => None,
        }
    }

    pub fn into_plan(self) -> Option<AllocationPlan> {
        match self {
            Evaluation::Satisfiable(plan) => Some(plan),
            Evaluation::Unsatisfiable => None,
        }
    }
}

/// Evaluate a whole requirement tree
///
/// # Example
///
/// ```rust
/// use resource_requirement_engine::models::{ResourceCatalog, ResourceDef, RequirementDef};
/// use resource_requirement_engine::requirement::{evaluate, RequirementTree};
/// use resource_requirement_engine::EngineConfig;
///
/// let catalog = ResourceCatalog::build("m", &[ResourceDef::new("r", 3)]).unwrap();
/// let def: RequirementDef = serde_json::from_str(r#"{
///   "id": "both",
///   "clauses": [{"id": "all", "mode": "require_all"}],
///   "requests": [
///     {"id": "x", "clause_id": "all", "resource_id": "r", "quantity": 2, "order": 0},
///     {"id": "y", "clause_id": "all", "resource_id": "r", "quantity": 1, "order": 1}
///   ]
/// }"#).unwrap();
/// let tree = RequirementTree::build(&def, &catalog, &EngineConfig::default()).unwrap();
///
/// let capacities = catalog.base_capacities();
/// let plan = evaluate(&tree, &capacities).into_plan().unwrap();
/// assert_eq!(plan.quantity(catalog.resolve("r").unwrap()), 3);
/// ```
pub fn evaluate<V: AvailabilityView + ?Sized>(tree: &RequirementTree, view: &V) -> Evaluation {
    evaluate_node(tree, tree.root(), view)
}

/// Evaluate the subtree rooted at `node`
pub fn evaluate_node<V: AvailabilityView + ?Sized>(
    tree: &RequirementTree,
    node: NodeId,
    view: &V,
) -> Evaluation {
    match Search::new(tree, view).run(node) {
        Ok(Some(plan)) => Evaluation::Satisfiable(plan),
        Ok(None) => Evaluation::Unsatisfiable,
        Err(OverBudget) => {
            debug!(
                requirement_id = tree.requirement_id(),
                budget = tree.search_budget(),
                "search budget exhausted, keeping first satisfiable choices"
            );
            let mut plan = AllocationPlan::new();
            if first_fit(tree, node, view, &mut plan) {
                Evaluation::Satisfiable(plan)
            } else {
                Evaluation::Unsatisfiable
            }
        }
    }
}

// ============================================================================
// Backtracking search
// ============================================================================

/// The search used up its step budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OverBudget;

/// One reversible change to the search state
#[derive(Debug, Clone, Copy)]
enum Trail {
    /// A goal was taken off the stack
    Popped(NodeId),

    /// This many goals were pushed
    Pushed(usize),

    /// A leaf claimed `quantity`, moving `settled` units out of pending demand
    Claimed {
        resource: ResourceIndex,
        quantity: u32,
        settled: u64,
    },

    /// Pending demand was raised by a `require_any` choice
    Raised(ResourceIndex, u64),
}

/// An open `require_any` with children left to try
#[derive(Debug, Clone, Copy)]
struct Choice<'a> {
    clause: NodeId,
    children: &'a [NodeId],
    next: usize,
    trail_len: usize,
}

struct Search<'a, V: ?Sized> {
    tree: &'a RequirementTree,
    view: &'a V,
    goals: Vec<NodeId>,
    plan: AllocationPlan,
    pending: BTreeMap<ResourceIndex, u64>,
    trail: Vec<Trail>,
    choices: Vec<Choice<'a>>,
    steps: usize,
}

impl<'a, V: AvailabilityView + ?Sized> Search<'a, V> {
    fn new(tree: &'a RequirementTree, view: &'a V) -> Self {
        Self {
            tree,
            view,
            goals: Vec::new(),
            plan: AllocationPlan::new(),
            pending: BTreeMap::new(),
            trail: Vec::new(),
            choices: Vec::new(),
            steps: 0,
        }
    }

    /// First solution in declared order, `None` if there is none
    fn run(mut self, root: NodeId) -> Result<Option<AllocationPlan>, OverBudget> {
        let tree = self.tree;
        let floor = tree.min_demand(root);
        for (resource, quantity) in floor.iter() {
            self.add_pending(resource, u64::from(quantity));
        }
        if !floor.iter().all(|(resource, _)| self.fits(resource)) {
            return Ok(None);
        }
        self.goals.push(root);

        while let Some(goal) = self.goals.pop() {
            self.tick()?;
            self.trail.push(Trail::Popped(goal));

            let progressed = match tree.node(goal) {
                Node::Request {
                    resource, quantity, ..
                } => self.claim(*resource, *quantity),

                Node::Clause {
                    mode: ClauseMode::RequireAll,
                    children,
                    ..
                } => {
                    self.goals.extend(children.iter().rev().copied());
                    self.trail.push(Trail::Pushed(children.len()));
                    true
                }

                Node::Clause {
                    mode: ClauseMode::RequireAny,
                    children,
                    ..
                } => match children.split_first() {
                    None => false,
                    Some((first, rest)) => {
                        if !rest.is_empty() {
                            self.choices.push(Choice {
                                clause: goal,
                                children,
                                next: 1,
                                trail_len: self.trail.len(),
                            });
                        }
                        self.choose(goal, *first)
                    }
                },
            };

            if !progressed && !self.backtrack()? {
                return Ok(None);
            }
        }

        Ok(Some(self.plan))
    }

    fn tick(&mut self) -> Result<(), OverBudget> {
        self.steps += 1;
        if self.steps > self.tree.search_budget() {
            Err(OverBudget)
        } else {
            Ok(())
        }
    }

    /// Resume from the most recent open choice; `false` when none is left
    fn backtrack(&mut self) -> Result<bool, OverBudget> {
        while let Some(mut choice) = self.choices.pop() {
            self.tick()?;
            self.undo_to(choice.trail_len);

            let child = choice.children[choice.next];
            choice.next += 1;
            if choice.next < choice.children.len() {
                self.choices.push(choice);
            }
            if self.choose(choice.clause, child) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Commit a `require_any` to `child`; `false` if its demand cannot fit
    fn choose(&mut self, clause: NodeId, child: NodeId) -> bool {
        self.goals.push(child);
        self.trail.push(Trail::Pushed(1));

        // The clause's own bound is already pending; add what the child needs
        // beyond it.
        let tree = self.tree;
        let floor = tree.min_demand(clause);
        let mut fits = true;
        for (resource, quantity) in tree.min_demand(child).iter() {
            let extra = u64::from(quantity.saturating_sub(floor.quantity(resource)));
            if extra > 0 {
                self.add_pending(resource, extra);
                self.trail.push(Trail::Raised(resource, extra));
                fits &= self.fits(resource);
            }
        }
        fits
    }

    fn claim(&mut self, resource: ResourceIndex, quantity: u32) -> bool {
        let available = u64::from(self.view.available(resource));
        let claimed = u64::from(self.plan.quantity(resource));
        if claimed + u64::from(quantity) > available {
            return false;
        }
        let settled = self.take_pending(resource, u64::from(quantity));
        self.plan.add(resource, quantity);
        self.trail.push(Trail::Claimed {
            resource,
            quantity,
            settled,
        });
        true
    }

    /// Claimed plus pending demand for `resource` is within availability
    fn fits(&self, resource: ResourceIndex) -> bool {
        let claimed = u64::from(self.plan.quantity(resource));
        let pending = self.pending.get(&resource).copied().unwrap_or(0);
        claimed + pending <= u64::from(self.view.available(resource))
    }

    fn add_pending(&mut self, resource: ResourceIndex, units: u64) {
        *self.pending.entry(resource).or_insert(0) += units;
    }

    /// Remove up to `units` of pending demand, returning how much was removed
    fn take_pending(&mut self, resource: ResourceIndex, units: u64) -> u64 {
        match self.pending.get_mut(&resource) {
            Some(pending) => {
                let taken = units.min(*pending);
                *pending -= taken;
                taken
            }
            None => 0,
        }
    }

    fn undo_to(&mut self, len: usize) {
        while self.trail.len() > len {
            let Some(entry) = self.trail.pop() else {
                break;
            };
            match entry {
                Trail::Popped(goal) => self.goals.push(goal),
                Trail::Pushed(count) => {
                    let keep = self.goals.len().saturating_sub(count);
                    self.goals.truncate(keep);
                }
                Trail::Claimed {
                    resource,
                    quantity,
                    settled,
                } => {
                    self.plan.subtract(resource, quantity);
                    self.add_pending(resource, settled);
                }
                Trail::Raised(resource, extra) => {
                    self.take_pending(resource, extra);
                }
            }
        }
    }
}

// ============================================================================
// First-fit pass
// ============================================================================

/// Evaluate without revisiting `require_any` choices
///
/// Leaves `plan` untouched when it returns `false`.
fn first_fit<V: AvailabilityView + ?Sized>(
    tree: &RequirementTree,
    node: NodeId,
    view: &V,
    plan: &mut AllocationPlan,
) -> bool {
    match tree.node(node) {
        Node::Request {
            resource, quantity, ..
        } => {
            let available = u64::from(view.available(*resource));
            let claimed = u64::from(plan.quantity(*resource));
            if claimed + u64::from(*quantity) > available {
                return false;
            }
            plan.add(*resource, *quantity);
            true
        }
        Node::Clause {
            mode: ClauseMode::RequireAll,
            children,
            ..
        } => {
            let before = plan.clone();
            let all = children
                .iter()
                .all(|child| first_fit(tree, *child, view, plan));
            if !all {
                *plan = before;
            }
            all
        }
        Node::Clause {
            mode: ClauseMode::RequireAny,
            children,
            ..
        } => children
            .iter()
            .any(|child| first_fit(tree, *child, view, plan)),
    }
}
