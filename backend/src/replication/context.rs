//! Replication context
//!
//! One replication = one pool + one holder ledger + one event log, driven by a
//! single-threaded event loop. The scheduler addresses reservations by holder
//! (an entity/step instance key such as `"patient-7/triage"`).
//!
//! Accounting errors (double release, unknown reservation or holder, a holder
//! acquiring twice) abort the replication: every outstanding hold is returned,
//! the cause is logged at error level and every later call fails with
//! [`ReplicationError::Aborted`]. Sibling replications are unaffected.
//!
//! Cancellation is cooperative. The scenario flips a shared [`CancelToken`];
//! the scheduler calls [`Replication::checkpoint`] at the end of each event,
//! and that is where outstanding holds are released.

use crate::allocation::{self, AcquireOutcome, AllocationError};
use crate::models::event::{AllocationEvent, EventLog};
use crate::pool::{PoolError, PoolStats, Reservation, ReservationId, ResourcePool};
use crate::requirement::set::RequirementSet;
use crate::scenario::CompiledScenario;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

pub const REASON_CANCELLED: &str = "cancelled";
pub const REASON_ABORTED: &str = "aborted";
pub const REASON_TEARDOWN: &str = "teardown";

// ============================================================================
// Cancellation
// ============================================================================

/// Shared cancellation flag for all replications of a scenario run
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum ReplicationError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Holder '{0}' already holds a reservation")]
    HolderBusy(String),

    #[error("Holder '{0}' holds no reservation")]
    UnknownHolder(String),

    #[error("Replication {index} aborted: {reason}")]
    Aborted { index: usize, reason: String },

    #[error("Replication {0} was cancelled")]
    Cancelled(usize),
}

impl ReplicationError {
    /// Errors that mean the caller's bookkeeping no longer matches the pool
    pub fn is_accounting_error(&self) -> bool {
        match self {
            ReplicationError::Pool(e) => e.is_accounting_error(),
            ReplicationError::Allocation(AllocationError::Pool(e)) => e.is_accounting_error(),
            ReplicationError::HolderBusy(_) | ReplicationError::UnknownHolder(_) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// How a replication ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplicationStatus {
    Completed,
    Cancelled,
    Aborted { reason: String },
}

/// Result of one finished replication
#[derive(Debug, Clone)]
pub struct ReplicationOutcome {
    pub replication_id: Uuid,
    pub index: usize,
    pub status: ReplicationStatus,
    pub stats: PoolStats,
    /// Holds still outstanding at finish, released as teardown
    pub leaked_holds: usize,
    pub events: EventLog,
}

impl ReplicationOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, ReplicationStatus::Aborted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Running,
    Cancelled,
    Aborted(String),
}

// ============================================================================
// Replication
// ============================================================================

/// A single replication's allocation state
///
/// # Example
///
/// ```rust
/// use resource_requirement_engine::models::{ModelDef, ScenarioDef};
/// use resource_requirement_engine::replication::{CancelToken, Replication};
/// use resource_requirement_engine::requirement::CompiledModel;
/// use resource_requirement_engine::scenario::compile_scenario;
/// use resource_requirement_engine::EngineConfig;
///
/// let model = ModelDef::from_json(r#"{
///   "model_id": "port",
///   "resources": [{"id": "crane", "capacity": 1}],
///   "requirements": [{"id": "unload", "requests": [
///     {"id": "r", "resource_id": "crane", "quantity": 1}
///   ]}]
/// }"#).unwrap();
/// let config = EngineConfig::default();
/// let compiled = CompiledModel::compile(&model, &config).unwrap();
/// let scenario = compile_scenario(
///     &compiled,
///     &ScenarioDef::from_json(r#"{"scenario_id": "base"}"#).unwrap(),
///     &config,
/// ).unwrap();
///
/// let mut rep = Replication::new(0, &scenario, CancelToken::new());
/// assert!(!rep.acquire("unload", "ship-1").unwrap().is_blocked());
/// assert!(rep.acquire("unload", "ship-2").unwrap().is_blocked());
/// rep.release("ship-1").unwrap();
///
/// let outcome = rep.finish();
/// assert_eq!(outcome.stats.acquisitions, 1);
/// ```
#[derive(Debug)]
pub struct Replication {
    id: Uuid,
    index: usize,
    requirements: Arc<RequirementSet>,
    pool: ResourcePool,
    ledger: BTreeMap<String, Reservation>,
    events: EventLog,
    record_events: bool,
    cancel: CancelToken,
    state: State,
}

impl Replication {
    pub fn new(index: usize, scenario: &CompiledScenario, cancel: CancelToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            requirements: scenario.shared_requirements(),
            pool: scenario.new_pool(),
            ledger: BTreeMap::new(),
            events: EventLog::new(),
            record_events: scenario.config().record_events,
            cancel,
            state: State::Running,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Reservation currently held by `holder`
    pub fn holding(&self, holder: &str) -> Option<&Reservation> {
        self.ledger.get(holder)
    }

    pub fn outstanding(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.state, State::Aborted(_))
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == State::Cancelled
    }

    /// Try to start a step for `holder`
    ///
    /// `Blocked` is recorded and returned as `Ok`; the holder stays queued.
    pub fn acquire(
        &mut self,
        requirement_id: &str,
        holder: &str,
    ) -> Result<AcquireOutcome, ReplicationError> {
        self.ensure_running()?;

        if self.ledger.contains_key(holder) {
            return Err(self.abort(ReplicationError::HolderBusy(holder.to_string())));
        }

        let tree = match self.requirements.get(requirement_id) {
            Ok(tree) => tree,
            Err(e) => return Err(AllocationError::from(e).into()),
        };

        match allocation::acquire(tree, &mut self.pool) {
            Ok(AcquireOutcome::Blocked) => {
                self.record(|seq| AllocationEvent::Blocked {
                    seq,
                    holder: holder.to_string(),
                    requirement_id: requirement_id.to_string(),
                });
                Ok(AcquireOutcome::Blocked)
            }
            Ok(AcquireOutcome::Acquired(reservation)) => {
                let holds = self.describe(&reservation);
                let reservation_id = reservation.id().0;
                self.record(|seq| AllocationEvent::Acquired {
                    seq,
                    holder: holder.to_string(),
                    requirement_id: requirement_id.to_string(),
                    reservation_id,
                    holds,
                });
                self.ledger.insert(holder.to_string(), reservation.clone());
                Ok(AcquireOutcome::Acquired(reservation))
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Finish `holder`'s step and return its units
    pub fn release(&mut self, holder: &str) -> Result<(), ReplicationError> {
        self.ensure_running()?;

        let reservation = match self.ledger.remove(holder) {
            Some(reservation) => reservation,
            None => return Err(self.abort(ReplicationError::UnknownHolder(holder.to_string()))),
        };

        if let Err(e) = allocation::release(&mut self.pool, &reservation) {
            return Err(self.fail(e.into()));
        }
        self.record(|seq| AllocationEvent::Released {
            seq,
            holder: holder.to_string(),
            reservation_id: reservation.id().0,
        });
        Ok(())
    }

    /// Release by handle rather than by holder
    ///
    /// A handle that is no longer held (already released, or from another
    /// replication's pool) is an accounting error and aborts the replication.
    pub fn release_reservation(&mut self, reservation: &Reservation) -> Result<(), ReplicationError> {
        self.ensure_running()?;

        let holder = self
            .ledger
            .iter()
            .find(|(_, held)| *held == reservation)
            .map(|(holder, _)| holder.clone());

        match holder {
            Some(holder) => self.release(&holder),
            None => {
                // Not ours to hold: let the pool name the problem
                let err = match self.pool.release(reservation) {
                    Err(e) => ReplicationError::Pool(e),
                    Ok(()) => ReplicationError::UnknownHolder(reservation.id().to_string()),
                };
                Err(self.abort(err))
            }
        }
    }

    /// Safe point at the end of an event
    ///
    /// Returns `Ok(true)` when a pending cancellation was applied here.
    pub fn checkpoint(&mut self) -> Result<bool, ReplicationError> {
        if let State::Aborted(reason) = &self.state {
            return Err(ReplicationError::Aborted {
                index: self.index,
                reason: reason.clone(),
            });
        }
        if self.state == State::Cancelled || !self.cancel.is_cancelled() {
            return Ok(false);
        }

        let released = self.release_outstanding(REASON_CANCELLED);
        if released > 0 {
            warn!(
                replication = self.index,
                released, "cancellation released outstanding holds"
            );
        }
        self.state = State::Cancelled;
        Ok(true)
    }

    /// Tear down and report
    pub fn finish(mut self) -> ReplicationOutcome {
        // a pending cancellation not yet seen by a checkpoint still counts
        if self.state == State::Running && self.cancel.is_cancelled() {
            self.state = State::Cancelled;
        }

        let leaked_holds = self.release_outstanding(REASON_TEARDOWN);
        if leaked_holds > 0 {
            warn!(
                replication = self.index,
                leaked_holds, "holds outstanding at finish were released"
            );
        }

        let status = match self.state {
            State::Running => ReplicationStatus::Completed,
            State::Cancelled => ReplicationStatus::Cancelled,
            State::Aborted(reason) => ReplicationStatus::Aborted { reason },
        };
        debug!(replication = self.index, ?status, "replication finished");

        ReplicationOutcome {
            replication_id: self.id,
            index: self.index,
            status,
            stats: self.pool.stats().clone(),
            leaked_holds,
            events: self.events,
        }
    }

    /// Abort with `err` unless it is an ordinary (non-accounting) error
    pub(crate) fn fail(&mut self, err: ReplicationError) -> ReplicationError {
        if err.is_accounting_error() {
            self.abort(err)
        } else {
            err
        }
    }

    /// Mark the replication as failed and return its holds
    pub(crate) fn abort(&mut self, err: ReplicationError) -> ReplicationError {
        if let State::Aborted(reason) = &self.state {
            return ReplicationError::Aborted {
                index: self.index,
                reason: reason.clone(),
            };
        }
        error!(replication = self.index, error = %err, "replication aborted");
        self.release_outstanding(REASON_ABORTED);
        self.state = State::Aborted(err.to_string());
        err
    }

    fn ensure_running(&self) -> Result<(), ReplicationError> {
        match &self.state {
            State::Running => Ok(()),
            State::Cancelled => Err(ReplicationError::Cancelled(self.index)),
            State::Aborted(reason) => Err(ReplicationError::Aborted {
                index: self.index,
                reason: reason.clone(),
            }),
        }
    }

    /// Force-release every ledger entry in holder order; returns the count
    fn release_outstanding(&mut self, reason: &str) -> usize {
        let ledger = std::mem::take(&mut self.ledger);
        let mut released = 0;
        for (holder, reservation) in ledger {
            if self.pool.force_release(reservation.id()).is_ok() {
                released += 1;
                self.record(|seq| AllocationEvent::ForcedRelease {
                    seq,
                    holder,
                    reservation_id: reservation.id().0,
                    reason: reason.to_string(),
                });
            }
        }
        // anything acquired outside the ledger
        let stray: Vec<ReservationId> = self.pool.release_all();
        released + stray.len()
    }

    fn describe(&self, reservation: &Reservation) -> Vec<(String, u32)> {
        reservation
            .plan()
            .iter()
            .map(|(resource, units)| {
                let id = self.pool.resource_id(resource).unwrap_or("?").to_string();
                (id, units)
            })
            .collect()
    }

    fn record(&mut self, event: impl FnOnce(u64) -> AllocationEvent) {
        if self.record_events {
            let seq = self.events.next_seq();
            self.events.log(event(seq));
        }
    }
}
