//! Shared trial fixtures for tests and benchmarks.
//!
//! Compiled with the `test-helpers` feature so integration tests and
//! downstream crates reuse the same specifications.

use crate::constraints::{
    BudgetConstraint, Constraint, PredecessorConstraint, ResourceCapacityConstraint,
    TemporalConstraint,
};
use crate::curves::{Curve, LinearResponseCurve};
use crate::distributions::Distribution;
use crate::error::ConfigurationError;
use crate::model::{Activity, FlowTransition, PatientFlow, Resource, ResourceDemand, Site, Trial};

/// Screening, then treatment or screen failure, then completion or dropout.
pub fn standard_flow() -> PatientFlow {
    PatientFlow::new("screening")
        .terminal("completed")
        .terminal("screen_failed")
        .terminal("dropped_out")
        .transition(
            FlowTransition::new("screening", "treatment", 0.8, Distribution::uniform(7.0, 21.0))
                .with_cost(1_500.0),
        )
        .transition(
            FlowTransition::new("screening", "screen_failed", 0.2, Distribution::fixed(7.0))
                .with_cost(500.0),
        )
        .transition(
            FlowTransition::new(
                "treatment",
                "completed",
                0.9,
                Distribution::triangular(60.0, 90.0, 120.0),
            )
            .with_cost(8_000.0)
            .with_demand(ResourceDemand::new("monitors", 0.1)),
        )
        .transition(
            FlowTransition::new("treatment", "dropped_out", 0.1, Distribution::uniform(10.0, 60.0))
                .with_cost(2_000.0),
        )
}

/// One site with activation `Triangular(30, 45, 90)` days and a fixed rate.
pub fn single_site_trial() -> Trial {
    Trial::new("single-site", 20, standard_flow())
        .with_resource(Resource::new("monitors", 2.0))
        .with_site(
            Site::new(
                "site-001",
                Distribution::triangular(30.0, 45.0, 90.0),
                Distribution::fixed(0.5),
            )
            .with_costs(25_000.0, 500.0),
        )
}

/// Three sites gated on protocol approval, a database lock at the end and a
/// shared monitoring pool.
pub fn multi_site_trial() -> Trial {
    let site = |id: &str, low: f64, mode: f64, high: f64, rate: (f64, f64)| {
        Site::new(
            id,
            Distribution::triangular(low, mode, high),
            Distribution::uniform(rate.0, rate.1),
        )
        .with_costs(30_000.0, 750.0)
        .depends_on("protocol-approval")
        .with_demand(ResourceDemand::new("monitors", 1.0))
    };
    Trial::new("multi-site", 60, standard_flow())
        .with_resource(Resource::new("monitors", 2.0))
        .with_activity(
            Activity::new("protocol-approval", Distribution::triangular(20.0, 30.0, 60.0))
                .with_cost(40_000.0),
        )
        .with_activity(
            Activity::new("database-lock", Distribution::normal(21.0, 3.0))
                .with_cost(15_000.0)
                .with_earliest_start(300.0),
        )
        .with_site(site("site-001", 30.0, 45.0, 90.0, (0.3, 0.6)))
        .with_site(site("site-002", 20.0, 40.0, 70.0, (0.2, 0.5)))
        .with_site(site("site-003", 45.0, 60.0, 120.0, (0.1, 0.4)))
}

pub fn budget_curve(min_speed_ratio: f64) -> Result<Curve, ConfigurationError> {
    Ok(LinearResponseCurve::scarcity(1.0, min_speed_ratio)?.into())
}

/// Predecessor, temporal, budget and capacity constraints for
/// [multi_site_trial].
pub fn standard_constraints(
    total_budget: f64,
    min_speed_ratio: f64,
) -> Result<Vec<Constraint>, ConfigurationError> {
    Ok(vec![
        PredecessorConstraint::new().into(),
        TemporalConstraint::new().into(),
        BudgetConstraint::builder(total_budget)
            .response_curve(budget_curve(min_speed_ratio)?)
            .build()?
            .into(),
        ResourceCapacityConstraint::builder()
            .resource("monitors")
            .response_curve(LinearResponseCurve::overload(1.0, 2.0, 0.5)?)
            .build()?
            .into(),
    ])
}
