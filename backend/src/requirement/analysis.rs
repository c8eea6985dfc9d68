//! Static analysis of requirement trees
//!
//! - `is_ever_satisfiable`: can this tree run at all with the configured
//!   capacities, uncontested? Runs the ordinary evaluator against a capacity
//!   table, i.e. a pool with nothing held.
//! - `shortfalls`: which leaves are individually short right now. Used for
//!   "why is this entity waiting" diagnostics; it does not decide
//!   satisfiability (an OR may be blocked on one branch and fine on another).

use crate::models::catalog::{CapacityTable, ResourceIndex};
use crate::pool::AvailabilityView;
use crate::requirement::evaluator::evaluate;
use crate::requirement::tree::RequirementTree;

/// True if the tree is satisfiable when every resource is fully available
///
/// Independent of current holdings: a leaf asking for more than a resource's
/// capacity can never run, however long the entity waits.
pub fn is_ever_satisfiable(tree: &RequirementTree, capacities: &CapacityTable) -> bool {
    evaluate(tree, capacities).is_satisfiable()
}

/// A leaf whose quantity exceeds what is available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub request_id: String,
    pub resource: ResourceIndex,
    pub requested: u32,
    pub available: u32,
}

impl Shortfall {
    pub fn missing(&self) -> u32 {
        self.requested - self.available
    }
}

/// Leaves that cannot be met on their own against `view`, in arena order
pub fn shortfalls<V: AvailabilityView + ?Sized>(tree: &RequirementTree, view: &V) -> Vec<Shortfall> {
    tree.requests()
        .filter_map(|request| {
            let available = view.available(request.resource);
            (available < request.quantity).then(|| Shortfall {
                request_id: request.key.to_string(),
                resource: request.resource,
                requested: request.quantity,
                available,
            })
        })
        .collect()
}
