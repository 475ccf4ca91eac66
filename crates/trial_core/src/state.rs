//! Per-replication mutable state. Created at run start, dropped at run end,
//! never shared between runs or threads.

use std::collections::BTreeMap;

use crate::clock::SimulationClock;
use crate::model::ResourceDemand;
use crate::telemetry::RunMetrics;

#[derive(Debug, Clone, PartialEq)]
struct Allocation {
    resource_id: String,
    units: f64,
    start: f64,
    end: f64,
}

/// Progress of a schedulable entity (site or activity).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityProgress {
    /// In the event queue, due to be evaluated at `start`.
    Queued { start: f64 },
    /// Executed; finishes (or finished) at the given time.
    Running { end: f64 },
    /// Rejected by a validity constraint; it will never finish.
    Rejected,
}

#[derive(Debug, Default)]
pub struct SimulationState {
    pub clock: SimulationClock,
    metrics: RunMetrics,
    next_event_id: u64,
    progress: BTreeMap<String, EntityProgress>,
    allocations: Vec<Allocation>,
    spent: f64,
    enrolled: u32,
    active_patients: u32,
    outstanding_activities: usize,
    last_end: f64,
}

impl SimulationState {
    pub fn new(outstanding_activities: usize) -> Self {
        Self {
            outstanding_activities,
            ..Default::default()
        }
    }

    pub fn allocate_event_id(&mut self) -> u64 {
        let id = self.next_event_id;
        self.next_event_id += 1;
        id
    }

    pub fn metrics_mut(&mut self) -> &mut RunMetrics {
        &mut self.metrics
    }

    pub(crate) fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn progress(&self, entity_id: &str) -> Option<EntityProgress> {
        self.progress.get(entity_id).copied()
    }

    /// `true` once the entity has executed and its end time is not after `at`.
    pub fn finished_by(&self, entity_id: &str, at: f64) -> bool {
        matches!(self.progress(entity_id), Some(EntityProgress::Running { end }) if end <= at)
    }

    pub fn mark_queued(&mut self, entity_id: &str, start: f64) {
        self.progress
            .insert(entity_id.to_string(), EntityProgress::Queued { start });
    }

    pub fn mark_running(&mut self, entity_id: &str, end: f64) {
        self.progress
            .insert(entity_id.to_string(), EntityProgress::Running { end });
    }

    pub fn mark_rejected(&mut self, entity_id: &str) {
        self.progress
            .insert(entity_id.to_string(), EntityProgress::Rejected);
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn record_spend(&mut self, amount: f64) {
        self.spent += amount;
    }

    /// Units of `resource_id` held at time `at`.
    pub fn in_use(&self, resource_id: &str, at: f64) -> f64 {
        self.allocations
            .iter()
            .filter(|a| a.resource_id == resource_id && a.start <= at && at < a.end)
            .map(|a| a.units)
            .sum()
    }

    /// Hold `demands` over `[start, end)`.
    pub fn allocate(&mut self, demands: &[ResourceDemand], start: f64, end: f64) {
        if end <= start {
            return;
        }
        for demand in demands {
            self.allocations.push(Allocation {
                resource_id: demand.resource_id.clone(),
                units: demand.units,
                start,
                end,
            });
        }
    }

    /// Drop allocations that ended at or before `now`.
    pub fn release_until(&mut self, now: f64) {
        self.allocations.retain(|a| a.end > now);
    }

    pub fn enrolled(&self) -> u32 {
        self.enrolled
    }

    pub fn enroll_patient(&mut self) -> u32 {
        self.enrolled += 1;
        self.active_patients += 1;
        self.enrolled
    }

    pub fn resolve_patient(&mut self) {
        self.active_patients = self.active_patients.saturating_sub(1);
    }

    pub fn active_patients(&self) -> u32 {
        self.active_patients
    }

    pub fn settle_activity(&mut self) {
        self.outstanding_activities = self.outstanding_activities.saturating_sub(1);
    }

    pub fn outstanding_activities(&self) -> usize {
        self.outstanding_activities
    }

    pub fn observe_end(&mut self, end: f64) {
        if end > self.last_end {
            self.last_end = end;
        }
    }

    /// Latest end time of any executed event.
    pub fn last_end(&self) -> f64 {
        self.last_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_by_respects_end_time() {
        let mut state = SimulationState::new(0);
        assert!(!state.finished_by("protocol", 100.0));
        state.mark_running("protocol", 30.0);
        assert!(!state.finished_by("protocol", 29.9));
        assert!(state.finished_by("protocol", 30.0));
        state.mark_rejected("other");
        assert_eq!(state.progress("other"), Some(EntityProgress::Rejected));
        state.mark_queued("amendment", 800.0);
        assert!(!state.finished_by("amendment", 900.0));
        assert_eq!(
            state.progress("amendment"),
            Some(EntityProgress::Queued { start: 800.0 })
        );
    }

    #[test]
    fn allocations_are_half_open_and_released() {
        let mut state = SimulationState::new(0);
        state.allocate(&[ResourceDemand::new("cra", 2.0)], 10.0, 20.0);
        state.allocate(&[ResourceDemand::new("cra", 1.0)], 15.0, 30.0);
        assert_eq!(state.in_use("cra", 9.0), 0.0);
        assert_eq!(state.in_use("cra", 16.0), 3.0);
        assert_eq!(state.in_use("cra", 20.0), 1.0);
        state.release_until(25.0);
        assert_eq!(state.in_use("cra", 16.0), 1.0);
        assert_eq!(state.in_use("other", 16.0), 0.0);
    }

    #[test]
    fn event_ids_are_sequential() {
        let mut state = SimulationState::new(0);
        assert_eq!(state.allocate_event_id(), 0);
        assert_eq!(state.allocate_event_id(), 1);
    }
}
