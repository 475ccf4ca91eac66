//! Single-replication engine: pops events off the [SimulationClock], runs them
//! through the constraint pipeline and applies the decision.
//!
//! A replication owns its [SimulationState] outright. All randomness is drawn
//! from seeds derived from the run seed and the event id, so a replication is
//! a pure function of `(trial, constraints, config, run seed)`.
//!
//! [SimulationClock]: crate::clock::SimulationClock

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::clock::{Event, EventKind, EventMetadata, TransitionRef};
use crate::config::EngineConfig;
use crate::constraints::{evaluate_all, Constraint, Decision, EvaluationContext};
use crate::distributions::Distribution;
use crate::error::RunError;
use crate::model::{FlowTransition, Trial};
use crate::seed::{derive_event_seed, derive_purpose_seed, unit_interval, SeedPurpose};
use crate::state::SimulationState;
use crate::telemetry::{
    terminal_state_metric, MetricsSnapshot, TimelineEntry, TimelineOutcome, ACTIVITIES_COMPLETED,
    ENROLLMENTS_CAPPED, EVENTS_DELAYED, EVENTS_EXECUTED, EVENTS_MODIFIED, EVENTS_PROCESSED,
    EVENTS_REJECTED, EVENTS_RESCHEDULED, PATIENTS_ENROLLED, PATIENTS_RESOLVED, SITES_ACTIVATED,
};

/// Outcome of one completed replication. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: u64,
    pub seed: u64,
    /// Latest end time of any executed event, in days.
    pub completion_time: f64,
    pub total_cost: f64,
    /// Whether the target enrollment was reached.
    pub enrollment_complete: bool,
    pub timeline: Vec<TimelineEntry>,
    pub metrics_snapshot: MetricsSnapshot,
    /// Entity-level inputs drawn in this run, keyed `site.<id>.activation_time`,
    /// `site.<id>.enrollment_rate` and `activity.<id>.duration`.
    pub sampled_inputs: BTreeMap<String, f64>,
}

/// Run replication `run_id` of a batch with its derived `run_seed`.
///
/// The trial is assumed to have passed [`Trial::validate`].
pub fn run_replication(
    trial: &Trial,
    constraints: &[Constraint],
    config: &EngineConfig,
    run_id: u64,
    run_seed: u64,
) -> Result<RunResult, RunError> {
    debug!(run_id, run_seed, trial = %trial.name, "replication started");
    let mut replication = Replication::new(trial, constraints, config, run_seed);
    replication.schedule_initial_events();
    replication.run()?;
    let result = replication.finish(run_id);
    debug!(
        run_id,
        completion_time = result.completion_time,
        total_cost = result.total_cost,
        enrollment_complete = result.enrollment_complete,
        "replication finished"
    );
    Ok(result)
}

struct Replication<'a> {
    trial: &'a Trial,
    constraints: &'a [Constraint],
    config: &'a EngineConfig,
    run_seed: u64,
    state: SimulationState,
    timeline: Vec<TimelineEntry>,
    sampled_inputs: BTreeMap<String, f64>,
    enrollment_rates: BTreeMap<String, f64>,
}

impl<'a> Replication<'a> {
    fn new(
        trial: &'a Trial,
        constraints: &'a [Constraint],
        config: &'a EngineConfig,
        run_seed: u64,
    ) -> Self {
        Self {
            trial,
            constraints,
            config,
            run_seed,
            state: SimulationState::new(trial.activities.len()),
            timeline: Vec::new(),
            sampled_inputs: BTreeMap::new(),
            enrollment_rates: BTreeMap::new(),
        }
    }

    fn event_seed(&self, event_id: u64) -> u64 {
        derive_event_seed(self.run_seed, event_id)
    }

    fn draw(&self, event_id: u64, purpose: SeedPurpose, dist: &Distribution) -> f64 {
        dist.sample(derive_purpose_seed(self.event_seed(event_id), purpose))
    }

    /// Site activations and activities, in declaration order.
    fn schedule_initial_events(&mut self) {
        let trial = self.trial;
        for site in &trial.sites {
            let id = self.state.allocate_event_id();
            let activation = self.draw(id, SeedPurpose::Duration, &site.activation_time).max(0.0);
            let rate = self.draw(id, SeedPurpose::EnrollmentRate, &site.enrollment_rate);
            self.sampled_inputs
                .insert(format!("site.{}.activation_time", site.id), activation);
            self.sampled_inputs
                .insert(format!("site.{}.enrollment_rate", site.id), rate);
            self.enrollment_rates.insert(site.id.clone(), rate);

            let event = Event::new(id, EventKind::SiteActivation, site.id.as_str(), 0.0, activation)
                .with_metadata(EventMetadata {
                    cost: site.activation_cost,
                    demands: site.demands.clone(),
                    ..Default::default()
                });
            self.state.mark_queued(&site.id, 0.0);
            self.state.clock.schedule(event);
        }

        for activity in &trial.activities {
            let id = self.state.allocate_event_id();
            let duration = self.draw(id, SeedPurpose::Duration, &activity.duration).max(0.0);
            self.sampled_inputs
                .insert(format!("activity.{}.duration", activity.id), duration);
            let event = Event::new(
                id,
                EventKind::Activity,
                activity.id.as_str(),
                activity.earliest_start,
                duration,
            )
            .with_metadata(EventMetadata {
                cost: activity.cost,
                demands: activity.demands.clone(),
                ..Default::default()
            });
            self.state.mark_queued(&activity.id, activity.earliest_start);
            self.state.clock.schedule(event);
        }
    }

    fn is_finished(&self) -> bool {
        self.state.enrolled() >= self.trial.target_enrollment
            && self.state.active_patients() == 0
            && self.state.outstanding_activities() == 0
    }

    fn run(&mut self) -> Result<(), RunError> {
        let mut processed: u64 = 0;
        while let Some(event) = self.state.clock.pop_next() {
            processed += 1;
            if processed > self.config.max_events_per_run {
                return Err(RunError::EventLimitExceeded {
                    limit: self.config.max_events_per_run,
                });
            }
            self.state.metrics_mut().increment(EVENTS_PROCESSED);
            self.state.release_until(event.time);
            self.process(event)?;
            if self.is_finished() {
                break;
            }
        }
        Ok(())
    }

    fn process(&mut self, event: Event) -> Result<(), RunError> {
        if event.kind == EventKind::PatientEnrollment
            && self.state.enrolled() >= self.trial.target_enrollment
        {
            self.state.metrics_mut().increment(ENROLLMENTS_CAPPED);
            return Ok(());
        }

        let decision = {
            let ctx = EvaluationContext {
                trial: self.trial,
                state: &self.state,
                event_seed: self.event_seed(event.id),
            };
            evaluate_all(self.constraints, &ctx, &event, self.config.retry_interval)
        };
        trace!(
            event_id = event.id,
            kind = event.kind.as_str(),
            entity = %event.entity_id,
            time = event.time,
            ?decision,
            "event evaluated"
        );

        match decision {
            Decision::Reject { reason } => {
                self.reject(&event, reason);
                Ok(())
            }
            Decision::Retry { to, reason } => {
                self.state.metrics_mut().increment(EVENTS_RESCHEDULED);
                let outcome = TimelineOutcome::Rescheduled {
                    to,
                    reason: reason.clone(),
                };
                self.reschedule(&event, to, outcome, vec![reason])
            }
            Decision::Delay { to, explanation } => {
                self.state.metrics_mut().increment(EVENTS_DELAYED);
                self.reschedule(&event, to, TimelineOutcome::Delayed { to }, explanation)
            }
            Decision::Execute {
                multiplier,
                explanation,
            } => self.execute(event, multiplier, explanation),
        }
    }

    fn record(
        &mut self,
        event: &Event,
        end: f64,
        multiplier: f64,
        outcome: TimelineOutcome,
        explanation: Vec<String>,
    ) {
        self.timeline.push(TimelineEntry {
            event_id: event.id,
            kind: event.kind,
            entity_id: event.entity_id.clone(),
            start: event.time,
            end,
            base_duration: event.base_duration,
            multiplier,
            cost: event.metadata.cost,
            outcome,
            explanation,
        });
    }

    fn reject(&mut self, event: &Event, reason: String) {
        let metrics = self.state.metrics_mut();
        metrics.increment(EVENTS_REJECTED);
        metrics.record_kind(EVENTS_REJECTED, event.kind);
        match event.kind {
            EventKind::SiteActivation => self.state.mark_rejected(&event.entity_id),
            EventKind::Activity => {
                self.state.mark_rejected(&event.entity_id);
                self.state.settle_activity();
            }
            // A patient whose visit is refused leaves the trial.
            EventKind::PatientTransition => self.state.resolve_patient(),
            EventKind::PatientEnrollment => {}
        }
        let explanation = vec![reason.clone()];
        self.record(
            event,
            event.time,
            1.0,
            TimelineOutcome::Rejected { reason },
            explanation,
        );
    }

    fn reschedule(
        &mut self,
        event: &Event,
        to: f64,
        outcome: TimelineOutcome,
        explanation: Vec<String>,
    ) -> Result<(), RunError> {
        if event.metadata.attempt >= self.config.max_reschedules {
            warn!(
                event_id = event.id,
                entity = %event.entity_id,
                attempts = event.metadata.attempt,
                "retry bound exceeded"
            );
            return Err(RunError::RetryBoundExceeded {
                event_id: event.id,
                entity_id: event.entity_id.clone(),
                attempts: event.metadata.attempt,
            });
        }
        if !to.is_finite() {
            return Err(RunError::NonFiniteTime {
                event_id: event.id,
                entity_id: event.entity_id.clone(),
            });
        }
        self.record(event, event.time, 1.0, outcome, explanation);
        if matches!(event.kind, EventKind::SiteActivation | EventKind::Activity) {
            self.state.mark_queued(&event.entity_id, to);
        }
        self.state.clock.schedule(event.rescheduled(to));
        Ok(())
    }

    fn execute(
        &mut self,
        event: Event,
        multiplier: f64,
        explanation: Vec<String>,
    ) -> Result<(), RunError> {
        let end = event.time + event.base_duration * multiplier;
        if !end.is_finite() {
            return Err(RunError::NonFiniteTime {
                event_id: event.id,
                entity_id: event.entity_id.clone(),
            });
        }

        {
            let metrics = self.state.metrics_mut();
            metrics.increment(EVENTS_EXECUTED);
            metrics.record_kind(EVENTS_EXECUTED, event.kind);
            if multiplier != 1.0 {
                metrics.increment(EVENTS_MODIFIED);
            }
        }
        self.state.record_spend(event.metadata.cost);
        self.state.allocate(&event.metadata.demands, event.time, end);
        self.state.observe_end(end);
        self.record(&event, end, multiplier, TimelineOutcome::Executed, explanation);

        match event.kind {
            EventKind::SiteActivation => {
                self.state.mark_running(&event.entity_id, end);
                self.state.metrics_mut().increment(SITES_ACTIVATED);
                self.schedule_enrollment(&event.entity_id, end);
            }
            EventKind::Activity => {
                self.state.mark_running(&event.entity_id, end);
                self.state.metrics_mut().increment(ACTIVITIES_COMPLETED);
                self.state.settle_activity();
            }
            EventKind::PatientEnrollment => {
                let patient = self.state.enroll_patient();
                self.state.metrics_mut().increment(PATIENTS_ENROLLED);
                let initial = self.trial.patient_flow.initial_state.clone();
                self.enter_state(format!("patient-{patient}"), &initial, end);
                if self.state.enrolled() < self.trial.target_enrollment {
                    if let Some(site_id) = &event.metadata.site_id {
                        self.schedule_enrollment(site_id, end);
                    }
                }
            }
            EventKind::PatientTransition => {
                if let Some(transition) = &event.metadata.transition {
                    self.enter_state(event.entity_id.clone(), &transition.to, end);
                }
            }
        }
        Ok(())
    }

    /// Next enrollment for `site_id` after an exponential gap from `after`.
    fn schedule_enrollment(&mut self, site_id: &str, after: f64) {
        let rate = self.enrollment_rates.get(site_id).copied().unwrap_or(0.0);
        if !(rate > 0.0 && rate.is_finite()) {
            return;
        }
        let Some(site) = self.trial.site(site_id) else {
            return;
        };
        let id = self.state.allocate_event_id();
        let gap = self.draw(id, SeedPurpose::InterArrival, &Distribution::exponential(1.0 / rate));
        let event = Event::new(id, EventKind::PatientEnrollment, site_id, after + gap, 0.0)
            .with_metadata(EventMetadata {
                cost: site.cost_per_patient,
                site_id: Some(site_id.to_string()),
                ..Default::default()
            });
        self.state.clock.schedule(event);
    }

    /// Move `patient` into `state` at `time`: resolve it when terminal, otherwise
    /// schedule the next transition chosen by a seeded draw.
    fn enter_state(&mut self, patient: String, state: &str, time: f64) {
        let trial = self.trial;
        let flow = &trial.patient_flow;
        if flow.is_terminal(state) {
            self.state.resolve_patient();
            let metrics = self.state.metrics_mut();
            metrics.increment(PATIENTS_RESOLVED);
            metrics.increment(&terminal_state_metric(state));
            return;
        }

        let id = self.state.allocate_event_id();
        let branch = unit_interval(derive_purpose_seed(self.event_seed(id), SeedPurpose::Branch));
        let Some(transition) = flow.choose(state, branch) else {
            // Validation guarantees every non-terminal state has an exit.
            self.state.resolve_patient();
            return;
        };
        let event = self.transition_event(id, patient, transition, time);
        self.state.clock.schedule(event);
    }

    fn transition_event(
        &self,
        id: u64,
        patient: String,
        transition: &FlowTransition,
        time: f64,
    ) -> Event {
        let dwell = self.draw(id, SeedPurpose::Duration, &transition.duration).max(0.0);
        Event::new(id, EventKind::PatientTransition, patient, time, dwell).with_metadata(
            EventMetadata {
                cost: transition.cost,
                demands: transition.demands.clone(),
                transition: Some(TransitionRef {
                    from: transition.from.clone(),
                    to: transition.to.clone(),
                }),
                ..Default::default()
            },
        )
    }

    fn finish(self, run_id: u64) -> RunResult {
        RunResult {
            run_id,
            seed: self.run_seed,
            completion_time: self.state.last_end(),
            total_cost: self.state.spent(),
            enrollment_complete: self.state.enrolled() >= self.trial.target_enrollment,
            timeline: self.timeline,
            metrics_snapshot: self.state.metrics().snapshot(),
            sampled_inputs: self.sampled_inputs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{PredecessorConstraint, TemporalConstraint};
    use crate::model::{Activity, PatientFlow, Site};

    fn fixed_trial() -> Trial {
        let flow = PatientFlow::new("screening")
            .terminal("completed")
            .transition(FlowTransition::new(
                "screening",
                "completed",
                1.0,
                Distribution::fixed(10.0),
            ));
        Trial::new("fixed", 3, flow)
            .with_site(
                Site::new("site-a", Distribution::fixed(30.0), Distribution::fixed(1.0))
                    .with_costs(1_000.0, 100.0),
            )
            .with_activity(Activity::new("protocol", Distribution::fixed(20.0)).with_cost(500.0))
    }

    fn run(trial: &Trial, constraints: &[Constraint]) -> Result<RunResult, RunError> {
        run_replication(trial, constraints, &EngineConfig::default(), 0, 1234)
    }

    #[test]
    fn replication_enrolls_to_target_and_settles() {
        let trial = fixed_trial();
        let result = run(&trial, &[]).expect("run succeeds");
        assert!(result.enrollment_complete);
        assert_eq!(result.metrics_snapshot.get(PATIENTS_ENROLLED), 3);
        assert_eq!(result.metrics_snapshot.get(PATIENTS_RESOLVED), 3);
        assert_eq!(result.metrics_snapshot.get("patients_terminal.completed"), 3);
        // 1000 activation + 3 * 100 per patient + 500 activity.
        assert_eq!(result.total_cost, 1_800.0);
        // Every patient finishes 10 days after enrolling, which is after activation.
        assert!(result.completion_time > 40.0);
        assert_eq!(result.sampled_inputs["site.site-a.activation_time"], 30.0);
        assert_eq!(result.sampled_inputs["activity.protocol.duration"], 20.0);
    }

    #[test]
    fn replication_is_deterministic() {
        let mut trial = fixed_trial();
        trial.sites[0].activation_time = Distribution::triangular(30.0, 45.0, 90.0);
        trial.sites[0].enrollment_rate = Distribution::uniform(0.2, 1.5);
        let a = run(&trial, &[]).expect("run succeeds");
        let b = run(&trial, &[]).expect("run succeeds");
        assert_eq!(a, b);
    }

    #[test]
    fn predecessor_orders_activities() {
        let trial = fixed_trial()
            .with_activity(Activity::new("lock", Distribution::fixed(5.0)).depends_on("protocol"));
        let result = run(&trial, &[PredecessorConstraint::new().into()]).expect("run succeeds");
        let lock = result
            .timeline
            .iter()
            .find(|e| e.entity_id == "lock" && e.is_executed())
            .expect("lock executed");
        assert_eq!(lock.start, 20.0);
        assert_eq!(result.metrics_snapshot.get(EVENTS_RESCHEDULED), 1);
        assert_eq!(result.metrics_snapshot.get("events_executed.activity"), 2);
    }

    #[test]
    fn rejected_activity_is_recorded_not_raised() {
        let trial = fixed_trial().with_activity(
            Activity::new("late", Distribution::fixed(5.0)).with_earliest_start(400.0),
        );
        let horizon = TemporalConstraint::with_horizon(365.0).expect("valid horizon");
        let result = run(&trial, &[horizon.into()]).expect("run succeeds");
        assert_eq!(result.metrics_snapshot.get(EVENTS_REJECTED), 1);
        let rejected = result
            .timeline
            .iter()
            .find(|e| e.entity_id == "late")
            .expect("entry for rejected activity");
        assert!(matches!(rejected.outcome, TimelineOutcome::Rejected { .. }));
        assert!(result.enrollment_complete);
    }

    #[test]
    fn retry_bound_ends_the_run() {
        // `after` waits once for `late` to start and once more for it to end.
        let trial = fixed_trial()
            .with_activity(
                Activity::new("late", Distribution::fixed(5.0)).with_earliest_start(400.0),
            )
            .with_activity(Activity::new("after", Distribution::fixed(5.0)).depends_on("late"));
        let constraints: Vec<Constraint> = vec![PredecessorConstraint::new().into()];
        let config = EngineConfig::default().with_max_reschedules(1);
        let err = run_replication(&trial, &constraints, &config, 0, 1).unwrap_err();
        assert_eq!(
            err,
            RunError::RetryBoundExceeded {
                event_id: 3,
                entity_id: "after".to_string(),
                attempts: 1,
            }
        );
    }

    #[test]
    fn long_wait_on_queued_predecessor_is_not_a_retry() {
        let trial = fixed_trial()
            .with_activity(
                Activity::new("late", Distribution::fixed(10.0)).with_earliest_start(800.0),
            )
            .with_activity(Activity::new("final", Distribution::fixed(5.0)).depends_on("late"));
        let constraints: Vec<Constraint> = vec![PredecessorConstraint::new().into()];
        let result = run(&trial, &constraints).expect("a late predecessor is a valid wait");
        let executed = result
            .timeline
            .iter()
            .find(|e| e.entity_id == "final" && e.is_executed())
            .expect("final executes");
        assert_eq!(executed.start, 810.0);
        assert_eq!(executed.effective_duration(), 5.0);
        let waits = result
            .timeline
            .iter()
            .filter(|e| e.entity_id == "final" && !e.is_executed())
            .count();
        assert_eq!(waits, 2);
    }

    #[test]
    fn dependents_of_a_rejected_predecessor_are_rejected_past_the_horizon() {
        let trial = fixed_trial()
            .with_activity(
                Activity::new("late", Distribution::fixed(5.0)).with_earliest_start(400.0),
            )
            .with_activity(Activity::new("after", Distribution::fixed(5.0)).depends_on("late"));
        let constraints: Vec<Constraint> = vec![
            PredecessorConstraint::new().into(),
            TemporalConstraint::with_horizon(365.0).expect("valid").into(),
        ];
        let result = run(&trial, &constraints).expect("rejections do not fail the run");
        assert_eq!(result.metrics_snapshot.get(EVENTS_REJECTED), 2);
    }

    #[test]
    fn event_limit_is_enforced() {
        let config = EngineConfig::default().with_max_events_per_run(3);
        let err = run_replication(&fixed_trial(), &[], &config, 0, 1).unwrap_err();
        assert_eq!(err, RunError::EventLimitExceeded { limit: 3 });
    }

    #[test]
    fn zero_rate_site_never_completes_enrollment() {
        let mut trial = fixed_trial();
        trial.sites[0].enrollment_rate = Distribution::fixed(0.0);
        let result = run(&trial, &[]).expect("run succeeds");
        assert!(!result.enrollment_complete);
        assert_eq!(result.metrics_snapshot.get(PATIENTS_ENROLLED), 0);
        assert_eq!(result.metrics_snapshot.get(EVENTS_EXECUTED), 2);
    }
}
