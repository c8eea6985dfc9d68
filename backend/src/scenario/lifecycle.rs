//! Scenario lifecycle
//!
//! ```text
//! Draft ──mark_ready──▶ ReadyToRun ──start──▶ Running ──finish──▶ RanSuccess
//!   ▲                       │                    │          └──▶ RanWithErrors
//!   └──────── edit ─────────┘                    ▼
//!                                            Cancelling ──finish──▶ Cancelled
//! ```
//!
//! Terminal states may go back to `Draft` when the scenario is edited.
//! `mark_ready` is where static validation gates a run: a scenario with a
//! requirement that can never be met is not allowed to leave `Draft`. It is
//! the only way into `ReadyToRun`, and it records the fingerprint it
//! validated; `start` refuses any other compiled scenario.

use crate::scenario::{CompiledScenario, ScenarioError, ValidationWarning};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Scenario status as seen by the authoring and run layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Draft,
    ReadyToRun,
    Running,
    Cancelling,
    Cancelled,
    RanSuccess,
    RanWithErrors,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Draft => "draft",
            ScenarioStatus::ReadyToRun => "ready_to_run",
            ScenarioStatus::Running => "running",
            ScenarioStatus::Cancelling => "cancelling",
            ScenarioStatus::Cancelled => "cancelled",
            ScenarioStatus::RanSuccess => "ran_success",
            ScenarioStatus::RanWithErrors => "ran_with_errors",
        }
    }

    /// No run is in progress and none will start without an edit
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScenarioStatus::Cancelled | ScenarioStatus::RanSuccess | ScenarioStatus::RanWithErrors
        )
    }

    pub fn can_transition_to(&self, next: ScenarioStatus) -> bool {
        use ScenarioStatus::*;
        matches!(
            (self, next),
            (Draft, ReadyToRun)
                | (ReadyToRun, Draft)
                | (ReadyToRun, Running)
                | (Running, Cancelling)
                | (Running, RanSuccess)
                | (Running, RanWithErrors)
                | (Cancelling, Cancelled)
                | (Cancelling, RanWithErrors)
                | (Cancelled, Draft)
                | (RanSuccess, Draft)
                | (RanWithErrors, Draft)
        )
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status holder for one scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioLifecycle {
    scenario_id: String,
    status: ScenarioStatus,
    /// Fingerprint accepted by the last successful `mark_ready`
    validated: Option<String>,
}

impl ScenarioLifecycle {
    pub fn new(scenario_id: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            status: ScenarioStatus::Draft,
            validated: None,
        }
    }

    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    pub fn status(&self) -> ScenarioStatus {
        self.status
    }

    pub fn validated_fingerprint(&self) -> Option<&str> {
        self.validated.as_deref()
    }

    /// Move to `next` if the transition is allowed
    fn transition(&mut self, next: ScenarioStatus) -> Result<(), ScenarioError> {
        if !self.status.can_transition_to(next) {
            return Err(ScenarioError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        debug!(
            scenario_id = %self.scenario_id,
            from = %self.status,
            to = %next,
            "scenario status change"
        );
        self.status = next;
        Ok(())
    }

    /// Validate `compiled` and move `Draft → ReadyToRun`
    ///
    /// Fails with `NeverSatisfiable` (status unchanged) if any requirement
    /// cannot be met by the scenario's capacities even when uncontested.
    /// Returns the (empty) warning list on success so callers can report it
    /// uniformly.
    pub fn mark_ready(
        &mut self,
        compiled: &CompiledScenario,
    ) -> Result<Vec<ValidationWarning>, ScenarioError> {
        if !self.status.can_transition_to(ScenarioStatus::ReadyToRun) {
            return Err(ScenarioError::InvalidTransition {
                from: self.status,
                to: ScenarioStatus::ReadyToRun,
            });
        }
        if compiled.replications() == 0 {
            return Err(ScenarioError::NoReplications);
        }

        let warnings = compiled.validate();
        if !warnings.is_empty() {
            let ids = warnings
                .iter()
                .map(|w| w.requirement_id().to_string())
                .collect();
            return Err(ScenarioError::NeverSatisfiable(ids));
        }

        self.transition(ScenarioStatus::ReadyToRun)?;
        self.validated = Some(compiled.fingerprint().to_string());
        Ok(warnings)
    }

    /// `ReadyToRun → Running` for the scenario `mark_ready` accepted
    pub fn start(&mut self, compiled: &CompiledScenario) -> Result<(), ScenarioError> {
        if !self.status.can_transition_to(ScenarioStatus::Running) {
            return Err(ScenarioError::InvalidTransition {
                from: self.status,
                to: ScenarioStatus::Running,
            });
        }
        if self.validated.as_deref() != Some(compiled.fingerprint()) {
            return Err(ScenarioError::NotValidated {
                scenario_id: compiled.scenario_id().to_string(),
                fingerprint: compiled.fingerprint().to_string(),
            });
        }
        self.transition(ScenarioStatus::Running)
    }

    pub fn request_cancel(&mut self) -> Result<(), ScenarioError> {
        self.transition(ScenarioStatus::Cancelling)
    }

    /// Record the end of a run
    ///
    /// From `Cancelling` the result is `Cancelled` unless replications failed.
    pub fn finish(&mut self, had_errors: bool) -> Result<ScenarioStatus, ScenarioError> {
        let next = match (self.status, had_errors) {
            (_, true) => ScenarioStatus::RanWithErrors,
            (ScenarioStatus::Cancelling, false) => ScenarioStatus::Cancelled,
            (_, false) => ScenarioStatus::RanSuccess,
        };
        self.transition(next)?;
        Ok(next)
    }

    /// Scenario was edited; back to `Draft`
    pub fn reopen(&mut self) -> Result<(), ScenarioError> {
        self.transition(ScenarioStatus::Draft)?;
        self.validated = None;
        Ok(())
    }
}
