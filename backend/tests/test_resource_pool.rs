//! Resource Pool Tests
//!
//! Atomic acquire, exactly-once release and capacity bookkeeping.

use resource_requirement_engine::models::{ResourceCatalog, ResourceDef};
use resource_requirement_engine::pool::{AllocationPlan, PoolError, ReservationId, ResourcePool};
use resource_requirement_engine::ResourceIndex;

// ============================================================================
// Test Helpers
// ============================================================================

/// Catalog with resources A (capacity `a`) and B (capacity `b`)
fn create_catalog(a: i64, b: i64) -> ResourceCatalog {
    ResourceCatalog::build("test_model", &[ResourceDef::new("A", a), ResourceDef::new("B", b)])
        .unwrap()
}

fn create_pool(a: i64, b: i64) -> (ResourcePool, ResourceIndex, ResourceIndex) {
    let catalog = create_catalog(a, b);
    let ia = catalog.resolve("A").unwrap();
    let ib = catalog.resolve("B").unwrap();
    (ResourcePool::new(&catalog.base_capacities()), ia, ib)
}

fn snapshot(pool: &ResourcePool) -> Vec<(u32, u32)> {
    (0..pool.num_resources())
        .map(|i| {
            let r = ResourceIndex(i);
            (pool.available(r).unwrap(), pool.held(r).unwrap())
        })
        .collect()
}

// ============================================================================
// Atomicity
// ============================================================================

#[test]
fn test_partial_availability_acquires_nothing() {
    // A has 2 available, B has 0
    let (mut pool, a, b) = create_pool(2, 0);
    let before = snapshot(&pool);

    let plan = AllocationPlan::new().with(a, 2).with(b, 1);
    let result = pool.try_acquire(&plan);

    assert_eq!(
        result,
        Err(PoolError::Unavailable {
            resource_id: "B".to_string(),
            requested: 1,
            available: 0,
        })
    );
    assert_eq!(snapshot(&pool), before, "Pool must be unchanged");
    assert_eq!(pool.outstanding_count(), 0);
    assert_eq!(pool.stats().rejections, 1);
}

#[test]
fn test_full_plan_deducted_together() {
    let (mut pool, a, b) = create_pool(3, 1);
    let reservation = pool
        .try_acquire(&AllocationPlan::new().with(a, 2).with(b, 1))
        .unwrap();

    assert_eq!(pool.available(a), Some(1));
    assert_eq!(pool.available(b), Some(0));
    assert_eq!(pool.held(a), Some(2));
    assert!(pool.is_outstanding(reservation.id()));
}

#[test]
fn test_unknown_resource_in_plan_rejected() {
    let (mut pool, a, _) = create_pool(1, 1);
    let plan = AllocationPlan::new().with(a, 1).with(ResourceIndex(9), 1);
    assert_eq!(
        pool.try_acquire(&plan),
        Err(PoolError::UnknownResource(ResourceIndex(9)))
    );
    assert_eq!(pool.available(a), Some(1));
}

#[test]
fn test_empty_plan_is_a_valid_reservation() {
    let (mut pool, a, _) = create_pool(1, 1);
    let reservation = pool.try_acquire(&AllocationPlan::new()).unwrap();
    assert!(reservation.plan().is_empty());
    assert_eq!(pool.available(a), Some(1));
    pool.release(&reservation).unwrap();
}

// ============================================================================
// Release
// ============================================================================

#[test]
fn test_release_restores_capacity() {
    let (mut pool, a, b) = create_pool(4, 2);
    let before = snapshot(&pool);

    let reservation = pool
        .try_acquire(&AllocationPlan::new().with(a, 3).with(b, 2))
        .unwrap();
    pool.release(&reservation).unwrap();

    assert_eq!(snapshot(&pool), before);
    assert!(pool.is_idle());
}

#[test]
fn test_double_release_rejected_without_double_restore() {
    let (mut pool, a, _) = create_pool(3, 0);
    let first = pool.try_acquire(&AllocationPlan::new().with(a, 2)).unwrap();
    let _second = pool.try_acquire(&AllocationPlan::new().with(a, 1)).unwrap();

    pool.release(&first).unwrap();
    let after_first = snapshot(&pool);

    let err = pool.release(&first).unwrap_err();
    assert_eq!(err, PoolError::DoubleRelease(first.id()));
    assert!(err.is_accounting_error());
    assert_eq!(snapshot(&pool), after_first, "Second release must not restore again");
    assert_eq!(pool.available(a), Some(2));
}

#[test]
fn test_reservation_from_other_pool_is_unknown() {
    let (mut pool_a, a, _) = create_pool(1, 0);
    let (mut pool_b, _, _) = create_pool(1, 0);

    let reservation = pool_a.try_acquire(&AllocationPlan::new().with(a, 1)).unwrap();
    assert_eq!(
        pool_b.release(&reservation),
        Err(PoolError::UnknownReservation(reservation.id()))
    );
    assert!(pool_a.is_outstanding(reservation.id()));
}

#[test]
fn test_force_release_of_never_issued_id() {
    let (mut pool, _, _) = create_pool(1, 1);
    assert_eq!(
        pool.force_release(ReservationId(42)),
        Err(PoolError::UnknownReservation(ReservationId(42)))
    );
}

#[test]
fn test_release_all_returns_ids_in_order() {
    let (mut pool, a, b) = create_pool(2, 2);
    let r0 = pool.try_acquire(&AllocationPlan::new().with(a, 1)).unwrap();
    let r1 = pool.try_acquire(&AllocationPlan::new().with(b, 2)).unwrap();
    let r2 = pool.try_acquire(&AllocationPlan::new().with(a, 1)).unwrap();
    pool.release(&r1).unwrap();

    let released = pool.release_all();
    assert_eq!(released, vec![r0.id(), r2.id()]);
    assert!(pool.is_idle());
    assert_eq!(pool.available(a), Some(2));
    assert_eq!(pool.stats().forced_releases, 2);
    assert_eq!(pool.stats().releases, 1);
}

// ============================================================================
// Capacity and statistics
// ============================================================================

#[test]
fn test_set_capacity_respects_held_units() {
    let (mut pool, a, _) = create_pool(3, 0);
    let _held = pool.try_acquire(&AllocationPlan::new().with(a, 2)).unwrap();

    assert_eq!(
        pool.set_capacity(a, 1),
        Err(PoolError::CapacityBelowHeld {
            resource_id: "A".to_string(),
            capacity: 1,
            held: 2,
        })
    );
    pool.set_capacity(a, 5).unwrap();
    assert_eq!(pool.available(a), Some(3));
}

#[test]
fn test_peak_held_tracks_high_water_mark() {
    let (mut pool, a, b) = create_pool(3, 1);
    let r1 = pool.try_acquire(&AllocationPlan::new().with(a, 2)).unwrap();
    let r2 = pool.try_acquire(&AllocationPlan::new().with(a, 1).with(b, 1)).unwrap();
    pool.release(&r1).unwrap();
    pool.release(&r2).unwrap();

    assert_eq!(pool.stats().peak_held, vec![3, 1]);
    assert_eq!(pool.stats().acquisitions, 2);
    assert_eq!(pool.stats().releases, 2);
}

#[test]
fn test_reservation_ids_display() {
    assert_eq!(ReservationId(7).to_string(), "rsv_00000007");
}
