//! Parallel replication runner
//!
//! Replications of one scenario run on the rayon pool. Each gets its own
//! [`Replication`] (and so its own pool); the compiled scenario is shared
//! read-only. A replication that fails does not stop its siblings.

use crate::replication::context::{CancelToken, Replication, ReplicationError, ReplicationOutcome};
use crate::scenario::{CompiledScenario, ScenarioError, ScenarioLifecycle, ScenarioStatus};
use rayon::prelude::*;
use tracing::{debug, info};

/// Aggregate result of a scenario run
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub scenario_id: String,
    pub fingerprint: String,
    pub status: ScenarioStatus,
    /// One entry per replication, in index order
    pub outcomes: Vec<ReplicationOutcome>,
}

impl ScenarioReport {
    pub fn failed(&self) -> impl Iterator<Item = &ReplicationOutcome> {
        self.outcomes.iter().filter(|o| o.is_aborted())
    }

    pub fn has_errors(&self) -> bool {
        self.failed().next().is_some()
    }
}

/// Run every replication of `scenario` in parallel
///
/// `body` drives one replication (it is the scheduler's event loop). An error
/// it returns ends that replication; accounting errors have already aborted
/// it, anything else aborts it here.
pub fn run_replications<F>(scenario: &CompiledScenario, cancel: &CancelToken, body: F) -> ScenarioReport
where
    F: Fn(&mut Replication) -> Result<(), ReplicationError> + Sync,
{
    let outcomes: Vec<ReplicationOutcome> = (0..scenario.replications())
        .into_par_iter()
        .map(|index| {
            let mut replication = Replication::new(index, scenario, cancel.clone());
            match body(&mut replication) {
                Ok(()) | Err(ReplicationError::Cancelled(_)) | Err(ReplicationError::Aborted { .. }) => {}
                Err(e) => {
                    replication.abort(e);
                }
            }
            replication.finish()
        })
        .collect();

    let status = if outcomes.iter().any(|o| o.is_aborted()) {
        ScenarioStatus::RanWithErrors
    } else if cancel.is_cancelled() {
        ScenarioStatus::Cancelled
    } else {
        ScenarioStatus::RanSuccess
    };

    info!(
        scenario_id = scenario.scenario_id(),
        replications = outcomes.len(),
        status = %status,
        "scenario run finished"
    );

    ScenarioReport {
        scenario_id: scenario.scenario_id().to_string(),
        fingerprint: scenario.fingerprint().to_string(),
        status,
        outcomes,
    }
}

/// Run a ready scenario and move its lifecycle to the matching final status
pub fn run_scenario<F>(
    lifecycle: &mut ScenarioLifecycle,
    scenario: &CompiledScenario,
    cancel: &CancelToken,
    body: F,
) -> Result<ScenarioReport, ScenarioError>
where
    F: Fn(&mut Replication) -> Result<(), ReplicationError> + Sync,
{
    lifecycle.start(scenario)?;
    debug!(scenario_id = scenario.scenario_id(), "scenario running");

    let report = run_replications(scenario, cancel, body);

    if cancel.is_cancelled() {
        lifecycle.request_cancel()?;
    }
    lifecycle.finish(report.has_errors())?;
    Ok(report)
}
