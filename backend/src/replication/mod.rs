// Replications
//
// A replication is one independent run of a scenario with its own resource
// pool. Replications of the same scenario run in parallel and never share
// mutable state.
//
// Architecture:
// - context.rs: Replication (pool + holder ledger + event log), cancellation
// - runner.rs: Parallel runner and scenario report

pub mod context;
pub mod runner;

pub use context::{
    CancelToken, Replication, ReplicationError, ReplicationOutcome, ReplicationStatus,
};
pub use runner::{run_replications, run_scenario, ScenarioReport};
