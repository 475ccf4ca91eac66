//! Event queue and simulation clock. Times are in days.
//!
//! Events pop in non-decreasing time order; ties break by insertion sequence,
//! so processing order never depends on the heap implementation.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::model::ResourceDemand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SiteActivation,
    PatientEnrollment,
    PatientTransition,
    Activity,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SiteActivation => "site_activation",
            EventKind::PatientEnrollment => "patient_enrollment",
            EventKind::PatientTransition => "patient_transition",
            EventKind::Activity => "activity",
        }
    }
}

/// Patient-flow edge carried by a transition event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRef {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub cost: f64,
    pub demands: Vec<ResourceDemand>,
    /// Number of times this logical event has been rescheduled.
    pub attempt: u32,
    pub transition: Option<TransitionRef>,
    /// Site a patient-enrollment event recruits for.
    pub site_id: Option<String>,
}

/// A unit of work in one replication. `time` is when the work starts and
/// `base_duration` how long it takes before any constraint modification.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: u64,
    pub kind: EventKind,
    pub entity_id: String,
    pub time: f64,
    pub base_duration: f64,
    pub metadata: EventMetadata,
}

impl Event {
    pub fn new(
        id: u64,
        kind: EventKind,
        entity_id: impl Into<String>,
        time: f64,
        base_duration: f64,
    ) -> Self {
        Self {
            id,
            kind,
            entity_id: entity_id.into(),
            time,
            base_duration,
            metadata: EventMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// A fresh copy of this logical event starting at `time`, one attempt later.
    pub fn rescheduled(&self, time: f64) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.attempt += 1;
        Self {
            id: self.id,
            kind: self.kind,
            entity_id: self.entity_id.clone(),
            time,
            base_duration: self.base_duration,
            metadata,
        }
    }
}

#[derive(Debug)]
struct Queued {
    seq: u64,
    event: Event,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by time, then sequence.
        other
            .event
            .time
            .total_cmp(&self.event.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct SimulationClock {
    now: f64,
    next_seq: u64,
    events: BinaryHeap<Queued>,
}

impl SimulationClock {
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn schedule(&mut self, event: Event) {
        debug_assert!(event.time >= self.now, "event time must be >= current time");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Queued { seq, event });
    }

    pub fn pop_next(&mut self) -> Option<Event> {
        let queued = self.events.pop()?;
        self.now = queued.event.time;
        Some(queued.event)
    }

    pub fn next_event_time(&self) -> Option<f64> {
        self.events.peek().map(|q| q.event.time)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: u64, time: f64) -> Event {
        Event::new(id, EventKind::Activity, format!("a{id}"), time, 1.0)
    }

    #[test]
    fn clock_pops_events_in_time_order() {
        let mut clock = SimulationClock::default();
        clock.schedule(event(0, 10.0));
        clock.schedule(event(1, 5.0));
        clock.schedule(event(2, 20.0));
        assert_eq!(clock.len(), 3);
        assert_eq!(clock.next_event_time(), Some(5.0));

        let first = clock.pop_next().expect("first event");
        assert_eq!(first.time, 5.0);
        assert_eq!(clock.now(), 5.0);

        let second = clock.pop_next().expect("second event");
        assert_eq!(second.time, 10.0);

        let third = clock.pop_next().expect("third event");
        assert_eq!(third.time, 20.0);
        assert_eq!(clock.now(), 20.0);

        assert!(clock.pop_next().is_none());
        assert!(clock.is_empty());
        assert_eq!(clock.next_event_time(), None);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut clock = SimulationClock::default();
        for id in [7, 3, 9, 1] {
            clock.schedule(event(id, 4.0));
        }
        let order: Vec<u64> = std::iter::from_fn(|| clock.pop_next()).map(|e| e.id).collect();
        assert_eq!(order, vec![7, 3, 9, 1]);
    }

    #[test]
    fn rescheduled_event_is_a_new_value() {
        let original = event(4, 2.0);
        let moved = original.rescheduled(6.5);
        assert_eq!(original.time, 2.0);
        assert_eq!(original.metadata.attempt, 0);
        assert_eq!(moved.id, 4);
        assert_eq!(moved.time, 6.5);
        assert_eq!(moved.metadata.attempt, 1);
    }
}
