//! Telemetry: per-run timeline and write-only counters.
//!
//! Counters observe a replication; nothing in the engine reads them back to
//! make a decision. Consumers get an immutable [MetricsSnapshot] at run end.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::EventKind;

pub const EVENTS_PROCESSED: &str = "events_processed";
pub const EVENTS_EXECUTED: &str = "events_executed";
pub const EVENTS_REJECTED: &str = "events_rejected";
pub const EVENTS_RESCHEDULED: &str = "events_rescheduled";
pub const EVENTS_DELAYED: &str = "events_delayed";
pub const EVENTS_MODIFIED: &str = "events_modified";
pub const ENROLLMENTS_CAPPED: &str = "enrollments_capped";
pub const SITES_ACTIVATED: &str = "sites_activated";
pub const PATIENTS_ENROLLED: &str = "patients_enrolled";
pub const PATIENTS_RESOLVED: &str = "patients_resolved";
pub const ACTIVITIES_COMPLETED: &str = "activities_completed";

/// Counter for patients that ended in a given terminal state.
pub fn terminal_state_metric(state: &str) -> String {
    format!("patients_terminal.{state}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TimelineOutcome {
    Executed,
    Rejected { reason: String },
    Rescheduled { to: f64, reason: String },
    Delayed { to: f64 },
}

/// One processed event. For executed events `end` is start plus the
/// effective duration; for the rest `end == start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub event_id: u64,
    pub kind: EventKind,
    pub entity_id: String,
    pub start: f64,
    pub end: f64,
    pub base_duration: f64,
    pub multiplier: f64,
    pub cost: f64,
    #[serde(flatten)]
    pub outcome: TimelineOutcome,
    /// Explanations from every constraint that modified or blocked the event.
    pub explanation: Vec<String>,
}

impl TimelineEntry {
    pub fn effective_duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_executed(&self) -> bool {
        matches!(self.outcome, TimelineOutcome::Executed)
    }
}

/// Write-only counter set owned by a replication.
#[derive(Debug, Default)]
pub struct RunMetrics {
    counters: BTreeMap<String, u64>,
}

impl RunMetrics {
    pub fn increment(&mut self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&mut self, name: &str, amount: u64) {
        match self.counters.get_mut(name) {
            Some(count) => *count += amount,
            None => {
                self.counters.insert(name.to_string(), amount);
            }
        }
    }

    pub fn record_kind(&mut self, prefix: &str, kind: EventKind) {
        self.increment(&format!("{prefix}.{}", kind.as_str()));
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot(self.counters.clone())
    }
}

/// Frozen counters of a finished replication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsSnapshot(BTreeMap<String, u64>);

impl MetricsSnapshot {
    /// Counter value; counters never incremented read as zero.
    pub fn get(&self, name: &str) -> u64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_default_to_zero() {
        let mut metrics = RunMetrics::default();
        metrics.increment(EVENTS_EXECUTED);
        metrics.increment(EVENTS_EXECUTED);
        metrics.add(PATIENTS_ENROLLED, 5);
        metrics.record_kind(EVENTS_EXECUTED, EventKind::Activity);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.get(EVENTS_EXECUTED), 2);
        assert_eq!(snapshot.get(PATIENTS_ENROLLED), 5);
        assert_eq!(snapshot.get("events_executed.activity"), 1);
        assert_eq!(snapshot.get(EVENTS_REJECTED), 0);
    }

    #[test]
    fn timeline_entry_serializes_outcome_inline() {
        let entry = TimelineEntry {
            event_id: 3,
            kind: EventKind::SiteActivation,
            entity_id: "site-a".to_string(),
            start: 0.0,
            end: 0.0,
            base_duration: 40.0,
            multiplier: 1.0,
            cost: 0.0,
            outcome: TimelineOutcome::Rejected {
                reason: "beyond horizon".to_string(),
            },
            explanation: vec![],
        };
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["outcome"], "rejected");
        assert_eq!(json["reason"], "beyond horizon");
        assert_eq!(json["kind"], "site_activation");
    }
}
