//! Allocation Transaction Manager
//!
//! Turns an evaluator verdict into an atomic acquire against a pool.
//!
//! # Flow
//!
//! ```text
//! acquire(requirement, pool)
//!     │
//!     ├─ evaluate(tree, pool)         (read-only)
//!     │      └─ Unsatisfiable → Ok(Blocked)
//!     │
//!     └─ pool.try_acquire(plan)       (all-or-nothing)
//!            └─ Ok(Acquired(reservation))
//! ```
//!
//! `Blocked` is normal discrete-event backpressure: the scheduler keeps the
//! entity queued and retries after the next release. It is an `Ok` outcome and
//! is never logged as a failure.
//!
//! Evaluation and acquisition are two steps. Within a replication nothing can
//! touch the pool in between, because the replication's event loop is
//! single-threaded; an `Unavailable` after a satisfiable verdict therefore
//! signals a bug and is returned as an error.

use crate::models::catalog::CapacityTable;
use crate::pool::{PoolError, Reservation, ResourcePool};
use crate::requirement::evaluator::{evaluate, Evaluation};
use crate::requirement::set::{RequirementSet, UnknownRequirement};
use crate::requirement::tree::RequirementTree;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors from the allocation manager
#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
    #[error(transparent)]
    UnknownRequirement(#[from] UnknownRequirement),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Result of an acquire attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Units reserved; release the handle when the step ends
    Acquired(Reservation),

    /// Not satisfiable now; nothing was reserved
    Blocked,
}

impl AcquireOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, AcquireOutcome::Blocked)
    }

    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            AcquireOutcome::Acquired(reservation) => Some(reservation),
            AcquireOutcome::Blocked => None,
        }
    }

    pub fn into_reservation(self) -> Option<Reservation> {
        match self {
            AcquireOutcome::Acquired(reservation) => Some(reservation),
            AcquireOutcome::Blocked => None,
        }
    }
}

/// Evaluate `tree` against `pool` and reserve its plan if satisfiable
pub fn acquire(tree: &RequirementTree, pool: &mut ResourcePool) -> Result<AcquireOutcome, PoolError> {
    match evaluate(tree, &*pool) {
        Evaluation::Unsatisfiable => {
            trace!(requirement_id = tree.requirement_id(), "requirement blocked");
            Ok(AcquireOutcome::Blocked)
        }
        Evaluation::Satisfiable(plan) => {
            let reservation = pool.try_acquire(&plan)?;
            debug!(
                requirement_id = tree.requirement_id(),
                reservation = %reservation.id(),
                units = plan.total_units(),
                "reserved resources"
            );
            Ok(AcquireOutcome::Acquired(reservation))
        }
    }
}

/// Return a reservation's units to the pool
pub fn release(pool: &mut ResourcePool, reservation: &Reservation) -> Result<(), PoolError> {
    pool.release(reservation)?;
    debug!(reservation = %reservation.id(), "released resources");
    Ok(())
}

/// Scheduler-facing entry point keyed by requirement id
///
/// Holds the compiled requirement set (shared read-only across replications);
/// the pool is always passed in explicitly and belongs to the caller's
/// replication.
///
/// # Example
///
/// ```rust
/// use resource_requirement_engine::allocation::AllocationManager;
/// use resource_requirement_engine::models::ModelDef;
/// use resource_requirement_engine::pool::ResourcePool;
/// use resource_requirement_engine::requirement::CompiledModel;
/// use resource_requirement_engine::EngineConfig;
/// use std::sync::Arc;
///
/// let model = ModelDef::from_json(r#"{
///   "model_id": "port",
///   "resources": [{"id": "crane", "capacity": 1}],
///   "requirements": [{"id": "unload", "requests": [
///     {"id": "r", "resource_id": "crane", "quantity": 1}
///   ]}]
/// }"#).unwrap();
/// let compiled = CompiledModel::compile(&model, &EngineConfig::default()).unwrap();
/// let manager = AllocationManager::new(Arc::new(compiled.requirements().clone()));
/// let mut pool = ResourcePool::new(&compiled.catalog().base_capacities());
///
/// let first = manager.acquire("unload", &mut pool).unwrap();
/// assert!(!first.is_blocked());
/// assert!(manager.acquire("unload", &mut pool).unwrap().is_blocked());
///
/// manager.release(&mut pool, first.reservation().unwrap()).unwrap();
/// assert!(!manager.acquire("unload", &mut pool).unwrap().is_blocked());
/// ```
#[derive(Debug, Clone)]
pub struct AllocationManager {
    requirements: Arc<RequirementSet>,
}

impl AllocationManager {
    pub fn new(requirements: Arc<RequirementSet>) -> Self {
        Self { requirements }
    }

    pub fn requirements(&self) -> &RequirementSet {
        &self.requirements
    }

    pub fn acquire(
        &self,
        requirement_id: &str,
        pool: &mut ResourcePool,
    ) -> Result<AcquireOutcome, AllocationError> {
        let tree = self.requirements.get(requirement_id)?;
        Ok(acquire(tree, pool)?)
    }

    pub fn release(
        &self,
        pool: &mut ResourcePool,
        reservation: &Reservation,
    ) -> Result<(), AllocationError> {
        Ok(release(pool, reservation)?)
    }

    pub fn is_ever_satisfiable(
        &self,
        requirement_id: &str,
        capacities: &CapacityTable,
    ) -> Result<bool, AllocationError> {
        Ok(self
            .requirements
            .is_ever_satisfiable(requirement_id, capacities)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::ModelDef;
    use crate::requirement::CompiledModel;
    use serde_json::json;

    fn manager_and_pool() -> (AllocationManager, ResourcePool) {
        let model: ModelDef = serde_json::from_value(json!({
            "model_id": "m",
            "resources": [{"id": "a", "capacity": 2}],
            "requirements": [{"id": "two_a", "requests": [
                {"id": "r", "resource_id": "a", "quantity": 2}
            ]}]
        }))
        .unwrap();
        let compiled = CompiledModel::compile(&model, &EngineConfig::default()).unwrap();
        let pool = ResourcePool::new(&compiled.catalog().base_capacities());
        (
            AllocationManager::new(Arc::new(compiled.requirements().clone())),
            pool,
        )
    }

    #[test]
    fn test_unknown_requirement_is_error_not_blocked() {
        let (manager, mut pool) = manager_and_pool();
        assert_eq!(
            manager.acquire("missing", &mut pool),
            Err(AllocationError::UnknownRequirement(UnknownRequirement(
                "missing".to_string()
            )))
        );
    }

    #[test]
    fn test_blocked_reserves_nothing() {
        let (manager, mut pool) = manager_and_pool();
        let held = manager.acquire("two_a", &mut pool).unwrap();
        assert!(held.reservation().is_some());

        let stats_before = pool.stats().clone();
        assert_eq!(manager.acquire("two_a", &mut pool), Ok(AcquireOutcome::Blocked));
        assert_eq!(pool.stats(), &stats_before);
        assert_eq!(pool.outstanding_count(), 1);
    }
}
