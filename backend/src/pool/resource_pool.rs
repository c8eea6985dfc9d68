//! Resource Pool
//!
//! Owns capacity and current holdings per resource. This is the only place
//! where availability changes.
//!
//! # Acquire Flow
//!
//! ```text
//! plan {A:2, B:1}
//!     │
//!     ├─ check every resource: available >= planned ?   (no mutation)
//!     │      └─ any shortfall → Err(Unavailable), pool untouched
//!     │
//!     └─ deduct every resource, record reservation → Ok(Reservation)
//! ```
//!
//! # Critical Invariants
//!
//! - **Atomicity**: a plan is deducted completely or not at all
//! - **Conservation**: `held(r)` equals the sum of live reservations on `r`
//! - **Bounded**: `0 <= held(r) <= capacity(r)` at all times
//! - **Single release**: each reservation is restored exactly once
//!
//! A pool belongs to exactly one replication. It is not `Sync`-shared and
//! needs no locking: the replication's event loop serializes all calls.

use crate::models::catalog::{CapacityTable, ResourceIndex};
use crate::pool::plan::AllocationPlan;
use crate::pool::AvailabilityView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by pool operations
#[derive(Debug, Error, PartialEq)]
pub enum PoolError {
    #[error("Insufficient units of '{resource_id}': requested {requested}, available {available}")]
    Unavailable {
        resource_id: String,
        requested: u32,
        available: u32,
    },

    #[error("Resource {0} is not part of this pool")]
    UnknownResource(ResourceIndex),

    #[error("Reservation {0} was already released")]
    DoubleRelease(ReservationId),

    #[error("Reservation {0} was not issued by this pool")]
    UnknownReservation(ReservationId),

    #[error("Cannot set capacity of '{resource_id}' to {capacity}: {held} units are held")]
    CapacityBelowHeld {
        resource_id: String,
        capacity: u32,
        held: u32,
    },
}

impl PoolError {
    /// True for errors that mean the caller's resource accounting is broken
    pub fn is_accounting_error(&self) -> bool {
        matches!(
            self,
            PoolError::DoubleRelease(_) | PoolError::UnknownReservation(_)
        )
    }
}

/// Identifier of a reservation, unique within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReservationId(pub u64);

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rsv_{:08}", self.0)
    }
}

/// Handle for units held by one step instance
///
/// Returned by a successful acquire and handed back to [`ResourcePool::release`]
/// when the step ends. The pool keeps its own record of what the reservation
/// holds; the plan carried here is informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pool_id: Uuid,
    id: ReservationId,
    plan: AllocationPlan,
}

impl Reservation {
    pub fn id(&self) -> ReservationId {
        self.id
    }

    pub fn pool_id(&self) -> Uuid {
        self.pool_id
    }

    pub fn plan(&self) -> &AllocationPlan {
        &self.plan
    }
}

/// Counters for one pool's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Successful acquires
    pub acquisitions: u64,

    /// Acquires refused because a resource was short
    pub rejections: u64,

    /// Reservations returned through `release`
    pub releases: u64,

    /// Reservations returned through `release_all`
    pub forced_releases: u64,

    /// Highest simultaneous holding per resource, in catalog order
    pub peak_held: Vec<u32>,
}

#[derive(Debug, Clone)]
struct Slot {
    id: String,
    capacity: u32,
    held: u32,
}

/// Replication-scoped pool of finite resources
///
/// # Example
///
/// ```rust
/// use resource_requirement_engine::models::{ResourceCatalog, ResourceDef};
/// use resource_requirement_engine::pool::{AllocationPlan, ResourcePool};
///
/// let catalog = ResourceCatalog::build("clinic", &[ResourceDef::new("bed", 2)]).unwrap();
/// let bed = catalog.resolve("bed").unwrap();
/// let mut pool = ResourcePool::new(&catalog.base_capacities());
///
/// let reservation = pool.try_acquire(&AllocationPlan::new().with(bed, 2)).unwrap();
/// assert_eq!(pool.available(bed), Some(0));
///
/// pool.release(&reservation).unwrap();
/// assert_eq!(pool.available(bed), Some(2));
/// ```
#[derive(Debug, Clone)]
pub struct ResourcePool {
    pool_id: Uuid,
    slots: Vec<Slot>,
    /// Live reservations, ordered by id so teardown is deterministic
    live: BTreeMap<ReservationId, AllocationPlan>,
    next_reservation: u64,
    stats: PoolStats,
}

impl ResourcePool {
    /// Create an idle pool with the given capacities
    pub fn new(capacities: &CapacityTable) -> Self {
        let slots: Vec<Slot> = capacities
            .iter()
            .map(|(_, id, capacity)| Slot {
                id: id.to_string(),
                capacity,
                held: 0,
            })
            .collect();
        let stats = PoolStats {
            peak_held: vec![0; slots.len()],
            ..PoolStats::default()
        };

        Self {
            pool_id: Uuid::new_v4(),
            slots,
            live: BTreeMap::new(),
            next_reservation: 0,
            stats,
        }
    }

    pub fn pool_id(&self) -> Uuid {
        self.pool_id
    }

    pub fn capacity(&self, resource: ResourceIndex) -> Option<u32> {
        self.slots.get(resource.0).map(|s| s.capacity)
    }

    /// Capacity minus units currently held
    pub fn available(&self, resource: ResourceIndex) -> Option<u32> {
        self.slots.get(resource.0).map(|s| s.capacity - s.held)
    }

    pub fn held(&self, resource: ResourceIndex) -> Option<u32> {
        self.slots.get(resource.0).map(|s| s.held)
    }

    pub fn resource_id(&self, resource: ResourceIndex) -> Option<&str> {
        self.slots.get(resource.0).map(|s| s.id.as_str())
    }

    pub fn num_resources(&self) -> usize {
        self.slots.len()
    }

    /// Atomically reserve every unit in `plan`
    ///
    /// Either all quantities are deducted or none are. On failure the pool is
    /// left exactly as it was.
    pub fn try_acquire(&mut self, plan: &AllocationPlan) -> Result<Reservation, PoolError> {
        // Phase 1: check everything before touching anything
        for (resource, requested) in plan.iter() {
            let slot = self
                .slots
                .get(resource.0)
                .ok_or(PoolError::UnknownResource(resource))?;
            let available = slot.capacity - slot.held;
            if available < requested {
                self.stats.rejections += 1;
                return Err(PoolError::Unavailable {
                    resource_id: slot.id.clone(),
                    requested,
                    available,
                });
            }
        }

        // Phase 2: deduct
        for (resource, requested) in plan.iter() {
            let slot = &mut self.slots[resource.0];
            slot.held += requested;
            let peak = &mut self.stats.peak_held[resource.0];
            *peak = (*peak).max(slot.held);
        }

        let id = ReservationId(self.next_reservation);
        self.next_reservation += 1;
        self.live.insert(id, plan.clone());
        self.stats.acquisitions += 1;

        Ok(Reservation {
            pool_id: self.pool_id,
            id,
            plan: plan.clone(),
        })
    }

    /// Return a reservation's units to the pool
    ///
    /// Releasing the same reservation twice is an accounting bug in the caller
    /// and yields `DoubleRelease`; the pool is not restored a second time.
    pub fn release(&mut self, reservation: &Reservation) -> Result<(), PoolError> {
        if reservation.pool_id != self.pool_id {
            return Err(PoolError::UnknownReservation(reservation.id));
        }
        self.release_by_id(reservation.id)?;
        self.stats.releases += 1;
        Ok(())
    }

    /// Release every outstanding reservation, returning their ids in order
    ///
    /// Used when a replication is cancelled or torn down.
    pub fn release_all(&mut self) -> Vec<ReservationId> {
        let ids: Vec<ReservationId> = self.live.keys().copied().collect();
        for id in &ids {
            if let Some(plan) = self.live.remove(id) {
                self.restore(&plan);
                self.stats.forced_releases += 1;
            }
        }
        ids
    }

    /// Release one outstanding reservation by id (forced path)
    pub fn force_release(&mut self, id: ReservationId) -> Result<(), PoolError> {
        self.release_by_id(id)?;
        self.stats.forced_releases += 1;
        Ok(())
    }

    fn release_by_id(&mut self, id: ReservationId) -> Result<(), PoolError> {
        match self.live.remove(&id) {
            Some(plan) => {
                self.restore(&plan);
                Ok(())
            }
            None if id.0 < self.next_reservation => Err(PoolError::DoubleRelease(id)),
            None => Err(PoolError::UnknownReservation(id)),
        }
    }

    fn restore(&mut self, plan: &AllocationPlan) {
        for (resource, quantity) in plan.iter() {
            if let Some(slot) = self.slots.get_mut(resource.0) {
                debug_assert!(slot.held >= quantity, "held units underflow");
                slot.held = slot.held.saturating_sub(quantity);
            }
        }
    }

    /// Patch one capacity, e.g. between replications
    pub fn set_capacity(&mut self, resource: ResourceIndex, capacity: u32) -> Result<(), PoolError> {
        let slot = self
            .slots
            .get_mut(resource.0)
            .ok_or(PoolError::UnknownResource(resource))?;
        if capacity < slot.held {
            return Err(PoolError::CapacityBelowHeld {
                resource_id: slot.id.clone(),
                capacity,
                held: slot.held,
            });
        }
        slot.capacity = capacity;
        Ok(())
    }

    pub fn is_outstanding(&self, id: ReservationId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn outstanding_count(&self) -> usize {
        self.live.len()
    }

    /// True when no units are held
    pub fn is_idle(&self) -> bool {
        self.live.is_empty()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

impl AvailabilityView for ResourcePool {
    fn available(&self, resource: ResourceIndex) -> u32 {
        ResourcePool::available(self, resource).unwrap_or(0)
    }
}
