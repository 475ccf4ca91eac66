//! Constraint pipeline.
//!
//! Every event is checked against the full constraint list before it runs.
//! Validity constraints accept or reject, feasibility constraints stretch
//! durations through a response curve, calendar constraints postpone. The
//! per-constraint results are folded into one [Decision] by [compose].

pub mod calendar;
pub mod compose;
pub mod feasibility;
pub mod types;
pub mod validity;

use crate::clock::Event;
use crate::error::ValidationError;
use crate::model::Trial;
use crate::state::SimulationState;

pub use calendar::{BlackoutConstraint, BlackoutWindow};
pub use compose::{compose, Decision};
pub use feasibility::{
    BudgetConstraint, BudgetConstraintBuilder, ResourceCapacityConstraint,
    ResourceCapacityConstraintBuilder,
};
pub use types::{ConstraintResult, FieldOverrides, Rejection, RetryHint};
pub use validity::{PredecessorConstraint, TemporalConstraint};

/// Read-only view handed to constraints for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub trial: &'a Trial,
    pub state: &'a SimulationState,
    /// Seed derived for the event under evaluation.
    pub event_seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintFamily {
    Validity,
    Feasibility,
    Calendar,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Predecessor(PredecessorConstraint),
    Temporal(TemporalConstraint),
    Budget(BudgetConstraint),
    ResourceCapacity(ResourceCapacityConstraint),
    Blackout(BlackoutConstraint),
}

impl Constraint {
    /// Stable identifier; also salts the constraint's random draws.
    pub fn key(&self) -> &str {
        match self {
            Constraint::Predecessor(_) => "predecessor",
            Constraint::Temporal(_) => "temporal",
            Constraint::Budget(_) => BudgetConstraint::KEY,
            Constraint::ResourceCapacity(c) => c.key(),
            Constraint::Blackout(_) => BlackoutConstraint::KEY,
        }
    }

    pub fn family(&self) -> ConstraintFamily {
        match self {
            Constraint::Predecessor(_) | Constraint::Temporal(_) => ConstraintFamily::Validity,
            Constraint::Budget(_) | Constraint::ResourceCapacity(_) => {
                ConstraintFamily::Feasibility
            }
            Constraint::Blackout(_) => ConstraintFamily::Calendar,
        }
    }

    pub fn evaluate(&self, ctx: &EvaluationContext<'_>, event: &Event) -> ConstraintResult {
        match self {
            Constraint::Predecessor(c) => c.evaluate(ctx, event),
            Constraint::Temporal(c) => c.evaluate(ctx, event),
            Constraint::Budget(c) => c.evaluate(ctx, event),
            Constraint::ResourceCapacity(c) => c.evaluate(ctx, event),
            Constraint::Blackout(c) => c.evaluate(event),
        }
    }

    /// Reject constraints that reference entities the trial does not have.
    pub fn check_against(&self, trial: &Trial) -> Result<(), ValidationError> {
        if let Constraint::ResourceCapacity(c) = self {
            if let Some(resource) = c.resource_id() {
                if trial.resource(resource).is_none() {
                    return Err(ValidationError::UnknownResource {
                        entity: c.key().to_string(),
                        resource: resource.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl From<PredecessorConstraint> for Constraint {
    fn from(c: PredecessorConstraint) -> Self {
        Constraint::Predecessor(c)
    }
}

impl From<TemporalConstraint> for Constraint {
    fn from(c: TemporalConstraint) -> Self {
        Constraint::Temporal(c)
    }
}

impl From<BudgetConstraint> for Constraint {
    fn from(c: BudgetConstraint) -> Self {
        Constraint::Budget(c)
    }
}

impl From<ResourceCapacityConstraint> for Constraint {
    fn from(c: ResourceCapacityConstraint) -> Self {
        Constraint::ResourceCapacity(c)
    }
}

impl From<BlackoutConstraint> for Constraint {
    fn from(c: BlackoutConstraint) -> Self {
        Constraint::Blackout(c)
    }
}

/// Run every constraint against `event` and fold the results.
pub fn evaluate_all(
    constraints: &[Constraint],
    ctx: &EvaluationContext<'_>,
    event: &Event,
    retry_interval: f64,
) -> Decision {
    let results = constraints
        .iter()
        .map(|c| (c.key().to_string(), c.evaluate(ctx, event)))
        .collect();
    compose(results, event.time, retry_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{EventKind, EventMetadata};
    use crate::curves::{LinearResponseCurve, NoCapacityDegradation};
    use crate::distributions::Distribution;
    use crate::error::ConfigurationError;
    use crate::model::{Activity, PatientFlow, Resource, ResourceDemand, Site};

    fn trial() -> Trial {
        Trial::new("T", 5, PatientFlow::new("enrolled").terminal("enrolled"))
            .with_site(Site::new(
                "site-a",
                Distribution::fixed(30.0),
                Distribution::fixed(1.0),
            ))
            .with_activity(Activity::new("protocol", Distribution::fixed(20.0)))
            .with_activity(Activity::new("lock", Distribution::fixed(5.0)).depends_on("protocol"))
            .with_resource(Resource::new("cra", 2.0))
    }

    fn activity_event(entity: &str, time: f64, cost: f64) -> Event {
        Event::new(1, EventKind::Activity, entity, time, 10.0).with_metadata(EventMetadata {
            cost,
            demands: vec![ResourceDemand::new("cra", 1.0)],
            ..Default::default()
        })
    }

    #[test]
    fn feasibility_constraint_requires_curve() {
        assert_eq!(
            BudgetConstraint::builder(1_000.0).build().unwrap_err(),
            ConfigurationError::MissingResponseCurve {
                constraint: "BudgetConstraint"
            }
        );
        assert!(ResourceCapacityConstraint::builder().build().is_err());
    }

    #[test]
    fn predecessor_waits_for_running_dependency() {
        let trial = trial();
        let mut state = SimulationState::new(2);
        let ctx = EvaluationContext {
            trial: &trial,
            state: &state,
            event_seed: 1,
        };
        let event = activity_event("lock", 0.0, 0.0);
        match PredecessorConstraint::new().evaluate(&ctx, &event) {
            ConstraintResult::Invalid(rejection) => {
                assert_eq!(rejection.retry, Some(RetryHint::Later))
            }
            other => panic!("unexpected {other:?}"),
        }

        state.mark_queued("protocol", 12.0);
        let ctx = EvaluationContext {
            trial: &trial,
            state: &state,
            event_seed: 1,
        };
        match PredecessorConstraint::new().evaluate(&ctx, &event) {
            ConstraintResult::Invalid(rejection) => {
                assert_eq!(rejection.retry, Some(RetryHint::At(12.0)))
            }
            other => panic!("unexpected {other:?}"),
        }

        state.mark_running("protocol", 20.0);
        let ctx = EvaluationContext {
            trial: &trial,
            state: &state,
            event_seed: 1,
        };
        match PredecessorConstraint::new().evaluate(&ctx, &event) {
            ConstraintResult::Invalid(rejection) => {
                assert_eq!(rejection.retry, Some(RetryHint::At(20.0)))
            }
            other => panic!("unexpected {other:?}"),
        }
        let later = activity_event("lock", 20.0, 0.0);
        assert!(PredecessorConstraint::new().evaluate(&ctx, &later).is_valid());
    }

    #[test]
    fn temporal_horizon_rejects_permanently() {
        let trial = trial();
        let state = SimulationState::new(0);
        let ctx = EvaluationContext {
            trial: &trial,
            state: &state,
            event_seed: 1,
        };
        let temporal = TemporalConstraint::with_horizon(365.0).expect("valid horizon");
        match temporal.evaluate(&ctx, &activity_event("protocol", 400.0, 0.0)) {
            ConstraintResult::Invalid(rejection) => assert!(!rejection.is_retryable()),
            other => panic!("unexpected {other:?}"),
        }
        assert!(temporal
            .evaluate(&ctx, &activity_event("protocol", 100.0, 0.0))
            .is_valid());
        assert!(TemporalConstraint::with_horizon(-1.0).is_err());
    }

    #[test]
    fn budget_slows_when_funds_run_short() {
        let trial = trial();
        let mut state = SimulationState::new(0);
        state.record_spend(900.0);
        let ctx = EvaluationContext {
            trial: &trial,
            state: &state,
            event_seed: 9,
        };
        let budget = BudgetConstraint::builder(1_000.0)
            .response_curve(LinearResponseCurve::scarcity(1.0, 0.5).expect("curve"))
            .build()
            .expect("constraint");
        // 100 available for a 200 cost event: ratio 0.5, speed 0.75.
        match budget.evaluate(&ctx, &activity_event("protocol", 0.0, 200.0)) {
            ConstraintResult::Modified { overrides, .. } => {
                let m = overrides.duration_multiplier.expect("multiplier");
                assert!((m - 1.0 / 0.75).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(budget
            .evaluate(&ctx, &activity_event("protocol", 0.0, 50.0))
            .is_valid());
    }

    #[test]
    fn resource_capacity_uses_bottleneck_utilization() {
        let trial = trial();
        let mut state = SimulationState::new(0);
        state.allocate(&[ResourceDemand::new("cra", 2.0)], 0.0, 50.0);
        let ctx = EvaluationContext {
            trial: &trial,
            state: &state,
            event_seed: 3,
        };
        let capacity = ResourceCapacityConstraint::builder()
            .resource("cra")
            .response_curve(LinearResponseCurve::overload(1.0, 2.0, 0.5).expect("curve"))
            .build()
            .expect("constraint");
        assert_eq!(capacity.key(), "resource_capacity:cra");
        // (2 in use + 1 demanded) / 2 capacity = 1.5, halfway to saturation.
        match capacity.evaluate(&ctx, &activity_event("protocol", 10.0, 0.0)) {
            ConstraintResult::Modified { overrides, .. } => {
                let m = overrides.duration_multiplier.expect("multiplier");
                assert!((m - 1.0 / 0.75).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(capacity
            .evaluate(&ctx, &activity_event("protocol", 60.0, 0.0))
            .is_valid());
    }

    #[test]
    fn no_degradation_curve_reports_valid() {
        let trial = trial();
        let mut state = SimulationState::new(0);
        state.allocate(&[ResourceDemand::new("cra", 10.0)], 0.0, 50.0);
        let ctx = EvaluationContext {
            trial: &trial,
            state: &state,
            event_seed: 3,
        };
        let constraint: Constraint = ResourceCapacityConstraint::builder()
            .response_curve(NoCapacityDegradation)
            .build()
            .expect("constraint")
            .into();
        assert_eq!(constraint.family(), ConstraintFamily::Feasibility);
        assert!(constraint
            .evaluate(&ctx, &activity_event("protocol", 10.0, 0.0))
            .is_valid());
    }

    #[test]
    fn scoped_constraint_must_name_known_resource() {
        let constraint: Constraint = ResourceCapacityConstraint::builder()
            .resource("pharmacy")
            .response_curve(NoCapacityDegradation)
            .build()
            .expect("constraint")
            .into();
        assert!(matches!(
            constraint.check_against(&trial()),
            Err(ValidationError::UnknownResource { .. })
        ));
    }
}
