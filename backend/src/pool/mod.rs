//! Resource pool and allocation plans
//!
//! The pool is the single owner of availability. Everything else in the
//! engine reads availability through [`AvailabilityView`], which lets the
//! clause evaluator run against a live pool or against a plain capacity table
//! (for static "can this ever run" checks) without caring which.

pub mod plan;
pub mod resource_pool;

use crate::models::catalog::{CapacityTable, ResourceIndex};

// Re-export public API
pub use plan::AllocationPlan;
pub use resource_pool::{PoolError, PoolStats, Reservation, ReservationId, ResourcePool};

/// Read-only view of how many units of each resource can be reserved
pub trait AvailabilityView {
    /// Units available for `resource`; unknown resources have none
    fn available(&self, resource: ResourceIndex) -> u32;
}

/// A capacity table seen as a pool with nothing held
impl AvailabilityView for CapacityTable {
    fn available(&self, resource: ResourceIndex) -> u32 {
        self.capacity(resource).unwrap_or(0)
    }
}
