//! Feasibility constraints: organizational pressures that stretch an event's
//! duration. Each one computes a pressure ratio and hands it to its response
//! curve; the curve alone decides how much slower the work gets.

use crate::clock::Event;
use crate::curves::{Curve, ResponseCurve};
use crate::error::ConfigurationError;
use crate::seed::derive_keyed_seed;

use super::types::{ConstraintResult, FieldOverrides};
use super::EvaluationContext;

fn modified_or_valid(multiplier: f64, explanation: impl FnOnce() -> String) -> ConstraintResult {
    if multiplier == 1.0 {
        ConstraintResult::Valid
    } else {
        ConstraintResult::Modified {
            overrides: FieldOverrides::duration(multiplier),
            explanation: explanation(),
        }
    }
}

/// Slows work as the remaining budget stops covering an event's cost.
/// Ratio: `max(budget - spent, 0) / event cost`.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetConstraint {
    total_budget: f64,
    curve: Curve,
}

#[derive(Debug, Clone, Default)]
pub struct BudgetConstraintBuilder {
    total_budget: f64,
    curve: Option<Curve>,
}

impl BudgetConstraintBuilder {
    pub fn response_curve(mut self, curve: impl Into<Curve>) -> Self {
        self.curve = Some(curve.into());
        self
    }

    pub fn build(self) -> Result<BudgetConstraint, ConfigurationError> {
        if !(self.total_budget.is_finite() && self.total_budget >= 0.0) {
            return Err(ConfigurationError::invalid(
                "BudgetConstraint",
                "total_budget",
                format!("must be finite and non-negative (got {})", self.total_budget),
            ));
        }
        let curve = self.curve.ok_or(ConfigurationError::MissingResponseCurve {
            constraint: "BudgetConstraint",
        })?;
        Ok(BudgetConstraint {
            total_budget: self.total_budget,
            curve,
        })
    }
}

impl BudgetConstraint {
    pub const KEY: &'static str = "budget";

    pub fn builder(total_budget: f64) -> BudgetConstraintBuilder {
        BudgetConstraintBuilder {
            total_budget,
            curve: None,
        }
    }

    pub fn total_budget(&self) -> f64 {
        self.total_budget
    }

    pub fn curve(&self) -> &Curve {
        &self.curve
    }

    pub fn evaluate(&self, ctx: &EvaluationContext<'_>, event: &Event) -> ConstraintResult {
        let required = event.metadata.cost;
        if required <= 0.0 {
            return ConstraintResult::Valid;
        }
        let available = (self.total_budget - ctx.state.spent()).max(0.0);
        let ratio = available / required;
        let multiplier = self
            .curve
            .sample_multiplier(ratio, derive_keyed_seed(ctx.event_seed, Self::KEY));
        modified_or_valid(multiplier, || {
            format!("{ratio:.3} available/required -> duration x{multiplier:.3}")
        })
    }
}

/// Slows work on overloaded resources. Ratio: `(units in use + units
/// demanded) / capacity` for the most loaded demanded resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceCapacityConstraint {
    resource_id: Option<String>,
    curve: Curve,
    key: String,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceCapacityConstraintBuilder {
    resource_id: Option<String>,
    curve: Option<Curve>,
}

impl ResourceCapacityConstraintBuilder {
    /// Restrict the constraint to one resource; by default it covers all.
    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn response_curve(mut self, curve: impl Into<Curve>) -> Self {
        self.curve = Some(curve.into());
        self
    }

    pub fn build(self) -> Result<ResourceCapacityConstraint, ConfigurationError> {
        let curve = self.curve.ok_or(ConfigurationError::MissingResponseCurve {
            constraint: "ResourceCapacityConstraint",
        })?;
        let key = match &self.resource_id {
            Some(id) => format!("{}:{id}", ResourceCapacityConstraint::KEY),
            None => ResourceCapacityConstraint::KEY.to_string(),
        };
        Ok(ResourceCapacityConstraint {
            resource_id: self.resource_id,
            curve,
            key,
        })
    }
}

impl ResourceCapacityConstraint {
    pub const KEY: &'static str = "resource_capacity";

    pub fn builder() -> ResourceCapacityConstraintBuilder {
        ResourceCapacityConstraintBuilder::default()
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn evaluate(&self, ctx: &EvaluationContext<'_>, event: &Event) -> ConstraintResult {
        let mut bottleneck: Option<(&str, f64)> = None;
        for demand in &event.metadata.demands {
            if let Some(scope) = &self.resource_id {
                if &demand.resource_id != scope {
                    continue;
                }
            }
            let Some(resource) = ctx.trial.resource(&demand.resource_id) else {
                continue;
            };
            let utilization =
                (ctx.state.in_use(&resource.id, event.time) + demand.units) / resource.capacity;
            if bottleneck.map_or(true, |(_, worst)| utilization > worst) {
                bottleneck = Some((resource.id.as_str(), utilization));
            }
        }

        let Some((resource_id, ratio)) = bottleneck else {
            return ConstraintResult::Valid;
        };
        let multiplier = self
            .curve
            .sample_multiplier(ratio, derive_keyed_seed(ctx.event_seed, &self.key));
        modified_or_valid(multiplier, || {
            format!("`{resource_id}` at {ratio:.3} utilization -> duration x{multiplier:.3}")
        })
    }
}
