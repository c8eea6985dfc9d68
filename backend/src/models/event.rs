//! Allocation event log
//!
//! Every replication records what happened to its resource pool, in order.
//! The log enables:
//! - Comparing replications run from the same compiled scenario
//! - Debugging (which entity held what, and when it was returned)
//! - Auditing (every acquire is matched by exactly one release)
//!
//! Events carry a `seq` number assigned by the log, not a simulation clock:
//! time advance belongs to the scheduler, not to this engine.
//!
//! # Example
//!
//! ```rust
//! use resource_requirement_engine::models::{AllocationEvent, EventLog};
//!
//! let mut log = EventLog::new();
//! log.log(AllocationEvent::Blocked {
//!     seq: 0,
//!     holder: "patient-1/triage".to_string(),
//!     requirement_id: "triage".to_string(),
//! });
//! assert_eq!(log.events()[0].event_type(), "blocked");
//! ```

/// One state change (or refused change) of a replication's pool
#[derive(Debug, Clone, PartialEq)]
pub enum AllocationEvent {
    /// Units were reserved for a step instance
    Acquired {
        seq: u64,
        holder: String,
        requirement_id: String,
        reservation_id: u64,
        /// (resource id, units) in catalog order
        holds: Vec<(String, u32)>,
    },

    /// Requirement not satisfiable right now; entity stays queued
    Blocked {
        seq: u64,
        holder: String,
        requirement_id: String,
    },

    /// Step finished and returned its units
    Released {
        seq: u64,
        holder: String,
        reservation_id: u64,
    },

    /// Units returned by cancellation or teardown rather than step completion
    ForcedRelease {
        seq: u64,
        holder: String,
        reservation_id: u64,
        reason: String,
    },
}

impl AllocationEvent {
    pub fn seq(&self) -> u64 {
        match self {
            AllocationEvent::Acquired { seq, .. } => *seq,
            AllocationEvent::Blocked { seq, .. } => *seq,
            AllocationEvent::Released { seq, .. } => *seq,
            AllocationEvent::ForcedRelease { seq, .. } => *seq,
        }
    }

    pub fn holder(&self) -> &str {
        match self {
            AllocationEvent::Acquired { holder, .. } => holder,
            AllocationEvent::Blocked { holder, .. } => holder,
            AllocationEvent::Released { holder, .. } => holder,
            AllocationEvent::ForcedRelease { holder, .. } => holder,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            AllocationEvent::Acquired { .. } => "acquired",
            AllocationEvent::Blocked { .. } => "blocked",
            AllocationEvent::Released { .. } => "released",
            AllocationEvent::ForcedRelease { .. } => "forced_release",
        }
    }

    pub fn reservation_id(&self) -> Option<u64> {
        match self {
            AllocationEvent::Acquired { reservation_id, .. } => Some(*reservation_id),
            AllocationEvent::Released { reservation_id, .. } => Some(*reservation_id),
            AllocationEvent::ForcedRelease { reservation_id, .. } => Some(*reservation_id),
            AllocationEvent::Blocked { .. } => None,
        }
    }
}

/// Ordered event log for one replication
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<AllocationEvent>,
    next_seq: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number to stamp on an event
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn log(&mut self, event: AllocationEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[AllocationEvent] {
        &self.events
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&AllocationEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_holder(&self, holder: &str) -> Vec<&AllocationEvent> {
        self.events.iter().filter(|e| e.holder() == holder).collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
