//! Allocation Transaction Manager Tests
//!
//! Acquire/release through the scheduler-facing manager.

use resource_requirement_engine::allocation::{acquire, release, AcquireOutcome, AllocationError, AllocationManager};
use resource_requirement_engine::models::ModelDef;
use resource_requirement_engine::pool::{PoolError, ResourcePool};
use resource_requirement_engine::requirement::{CompiledModel, UnknownRequirement};
use resource_requirement_engine::EngineConfig;
use serde_json::json;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

/// Nurse (2) + Bed (1); "admit" = AND(Nurse:1, Bed:1); "consult" = OR(Doctor:1, Nurse:1)
fn create_hospital() -> CompiledModel {
    let model: ModelDef = serde_json::from_value(json!({
        "model_id": "hospital",
        "resources": [
            {"id": "Nurse", "capacity": 2},
            {"id": "Bed", "capacity": 1},
            {"id": "Doctor", "capacity": 1}
        ],
        "requirements": [
            {
                "id": "admit",
                "clauses": [{"id": "all", "mode": "require_all"}],
                "requests": [
                    {"id": "need_nurse", "clause_id": "all", "resource_id": "Nurse", "quantity": 1, "order": 0},
                    {"id": "need_bed", "clause_id": "all", "resource_id": "Bed", "quantity": 1, "order": 1}
                ]
            },
            {
                "id": "consult",
                "clauses": [{"id": "any", "mode": "require_any"}],
                "requests": [
                    {"id": "by_doctor", "clause_id": "any", "resource_id": "Doctor", "quantity": 1, "order": 0},
                    {"id": "by_nurse", "clause_id": "any", "resource_id": "Nurse", "quantity": 1, "order": 1}
                ]
            }
        ]
    }))
    .unwrap();
    CompiledModel::compile(&model, &EngineConfig::default()).unwrap()
}

fn create_manager_and_pool() -> (CompiledModel, AllocationManager, ResourcePool) {
    let model = create_hospital();
    let manager = AllocationManager::new(Arc::new(model.requirements().clone()));
    let pool = ResourcePool::new(&model.catalog().base_capacities());
    (model, manager, pool)
}

// ============================================================================
// Nurse / Bed scenario
// ============================================================================

#[test]
fn test_second_admission_blocked_by_bed() {
    let (model, manager, mut pool) = create_manager_and_pool();
    let nurse = model.catalog().resolve("Nurse").unwrap();
    let bed = model.catalog().resolve("Bed").unwrap();

    // First entity: Nurse:1 and Bed:1 held
    let first = manager.acquire("admit", &mut pool).unwrap();
    let reservation = first.reservation().expect("first admission should acquire");
    assert_eq!(reservation.plan().quantity(nurse), 1);
    assert_eq!(reservation.plan().quantity(bed), 1);
    assert_eq!(pool.held(nurse), Some(1));
    assert_eq!(pool.held(bed), Some(1));

    // Second entity: blocked although a nurse is still free
    let second = manager.acquire("admit", &mut pool).unwrap();
    assert_eq!(second, AcquireOutcome::Blocked);
    assert_eq!(pool.available(nurse), Some(1), "Blocked must not take the nurse");

    // After release the waiting entity can proceed
    manager.release(&mut pool, reservation).unwrap();
    assert!(!manager.acquire("admit", &mut pool).unwrap().is_blocked());
}

#[test]
fn test_consult_falls_back_to_nurse() {
    let (model, manager, mut pool) = create_manager_and_pool();
    let doctor = model.catalog().resolve("Doctor").unwrap();
    let nurse = model.catalog().resolve("Nurse").unwrap();

    let by_doctor = manager.acquire("consult", &mut pool).unwrap().into_reservation().unwrap();
    assert_eq!(by_doctor.plan().quantity(doctor), 1);
    assert_eq!(by_doctor.plan().quantity(nurse), 0);

    let by_nurse = manager.acquire("consult", &mut pool).unwrap().into_reservation().unwrap();
    assert_eq!(by_nurse.plan().quantity(nurse), 1);
    assert_eq!(by_nurse.plan().quantity(doctor), 0);
}

// ============================================================================
// Release
// ============================================================================

#[test]
fn test_acquire_release_restores_availability() {
    let (model, manager, mut pool) = create_manager_and_pool();
    let before: Vec<Option<u32>> = model
        .catalog()
        .iter()
        .map(|(idx, _)| pool.available(idx))
        .collect();

    let outcome = manager.acquire("admit", &mut pool).unwrap();
    manager.release(&mut pool, outcome.reservation().unwrap()).unwrap();

    let after: Vec<Option<u32>> = model
        .catalog()
        .iter()
        .map(|(idx, _)| pool.available(idx))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn test_double_release_is_an_error() {
    let (_model, manager, mut pool) = create_manager_and_pool();
    let reservation = manager
        .acquire("admit", &mut pool)
        .unwrap()
        .into_reservation()
        .unwrap();

    manager.release(&mut pool, &reservation).unwrap();
    assert_eq!(
        manager.release(&mut pool, &reservation),
        Err(AllocationError::Pool(PoolError::DoubleRelease(reservation.id())))
    );
}

// ============================================================================
// Errors vs Blocked
// ============================================================================

#[test]
fn test_unknown_requirement_is_error() {
    let (_model, manager, mut pool) = create_manager_and_pool();
    assert_eq!(
        manager.acquire("discharge", &mut pool),
        Err(AllocationError::UnknownRequirement(UnknownRequirement(
            "discharge".to_string()
        )))
    );
}

#[test]
fn test_free_functions_match_manager() {
    let model = create_hospital();
    let mut pool = ResourcePool::new(&model.catalog().base_capacities());
    let tree = model.requirements().get("admit").unwrap();

    let reservation = acquire(tree, &mut pool).unwrap().into_reservation().unwrap();
    assert!(acquire(tree, &mut pool).unwrap().is_blocked());
    release(&mut pool, &reservation).unwrap();
    assert!(pool.is_idle());
}

#[test]
fn test_is_ever_satisfiable_through_manager() {
    let (model, manager, _pool) = create_manager_and_pool();
    let mut capacities = model.catalog().base_capacities();
    assert!(manager.is_ever_satisfiable("admit", &capacities).unwrap());

    let bed = model.catalog().resolve("Bed").unwrap();
    capacities.set_capacity(bed, 0);
    assert!(!manager.is_ever_satisfiable("admit", &capacities).unwrap());
    assert!(manager.is_ever_satisfiable("consult", &capacities).unwrap());
    assert!(manager.is_ever_satisfiable("nope", &capacities).is_err());
}
