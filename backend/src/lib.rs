//! Resource Requirement Engine
//!
//! Decides whether a simulation step's resource requirements can be met and
//! reserves the units atomically when they can.
//!
//! # Architecture
//!
//! - **models**: Definitions (JSON), resource catalog, allocation event log
//! - **requirement**: AND/OR requirement trees, validation, evaluation
//! - **pool**: Replication-scoped resource pool and allocation plans
//! - **allocation**: Acquire/release transactions against a pool
//! - **scenario**: Override resolution, compiled scenarios, lifecycle
//! - **replication**: Per-replication context and parallel runner
//!
//! # Critical Invariants
//!
//! 1. `held + available == capacity` for every resource, always
//! 2. An acquire reserves every unit of its plan or none of them
//! 3. A reservation is released exactly once
//! 4. Pools are never shared between replications

// Module declarations
pub mod allocation;
pub mod config;
pub mod models;
pub mod pool;
pub mod replication;
pub mod requirement;
pub mod scenario;

// Re-exports for convenience
pub use allocation::{acquire, release, AcquireOutcome, AllocationError, AllocationManager};
pub use config::EngineConfig;
pub use models::{
    catalog::{CapacityTable, ResourceCatalog, ResourceIndex},
    definition::{ModelDef, ScenarioDef},
    event::{AllocationEvent, EventLog},
};
pub use pool::{AllocationPlan, AvailabilityView, PoolError, Reservation, ResourcePool};
pub use replication::{run_replications, CancelToken, Replication, ReplicationError, ScenarioReport};
pub use requirement::{
    evaluate, is_ever_satisfiable, CompiledModel, ConfigError, Evaluation, RequirementTree,
};
pub use scenario::{
    compile_scenario, effective_pool, CompiledScenario, ScenarioError, ScenarioStatus,
};
