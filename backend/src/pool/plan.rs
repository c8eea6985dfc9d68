//! Allocation plans
//!
//! A plan is the concrete answer of the clause evaluator: how many units of
//! which resources a step needs right now. Quantities requested twice for the
//! same resource are summed, so the pool checks one combined number per
//! resource.

use crate::models::catalog::ResourceIndex;
use std::collections::BTreeMap;

/// Units to reserve, per resource
///
/// Backed by a `BTreeMap` so iteration (and therefore acquire order and event
/// contents) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationPlan {
    holds: BTreeMap<ResourceIndex, u32>,
}

impl AllocationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add units for a resource, summing with anything already planned
    pub fn add(&mut self, resource: ResourceIndex, quantity: u32) {
        let entry = self.holds.entry(resource).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    /// Undo an earlier `add`; entries that reach zero are dropped
    pub(crate) fn subtract(&mut self, resource: ResourceIndex, quantity: u32) {
        if let Some(entry) = self.holds.get_mut(&resource) {
            *entry = entry.saturating_sub(quantity);
            if *entry == 0 {
                self.holds.remove(&resource);
            }
        }
    }

    /// Builder form of [`AllocationPlan::add`]
    pub fn with(mut self, resource: ResourceIndex, quantity: u32) -> Self {
        self.add(resource, quantity);
        self
    }

    /// Units planned for `resource` (0 if absent)
    pub fn quantity(&self, resource: ResourceIndex) -> u32 {
        self.holds.get(&resource).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceIndex, u32)> + '_ {
        self.holds.iter().map(|(r, q)| (*r, *q))
    }

    pub fn is_empty(&self) -> bool {
        self.holds.is_empty()
    }

    /// Number of distinct resources in the plan
    pub fn len(&self) -> usize {
        self.holds.len()
    }

    pub fn total_units(&self) -> u64 {
        self.holds.values().map(|q| u64::from(*q)).sum()
    }
}

impl FromIterator<(ResourceIndex, u32)> for AllocationPlan {
    fn from_iter<I: IntoIterator<Item = (ResourceIndex, u32)>>(iter: I) -> Self {
        let mut plan = AllocationPlan::new();
        for (resource, quantity) in iter {
            plan.add(resource, quantity);
        }
        plan
    }
}
