//! Calibration profiles: constraint lists and their response curves described
//! as data, so slowdown assumptions can be retuned from a JSON file.

use serde::{Deserialize, Serialize};

use crate::clock::EventKind;
use crate::constraints::{
    BlackoutConstraint, BlackoutWindow, BudgetConstraint, Constraint, PredecessorConstraint,
    ResourceCapacityConstraint, TemporalConstraint,
};
use crate::curves::{Curve, LinearResponseCurve, NoCapacityDegradation, StochasticResponseCurve};
use crate::error::ConfigurationError;

fn default_max_speed() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CurveSpec {
    NoDegradation,
    Linear {
        onset_ratio: f64,
        saturation_ratio: f64,
        min_speed_ratio: f64,
        #[serde(default = "default_max_speed")]
        max_speed_ratio: f64,
    },
    Scarcity {
        threshold: f64,
        min_speed_ratio: f64,
    },
    Overload {
        threshold: f64,
        max_ratio: f64,
        min_speed_ratio: f64,
    },
    /// Jitter around a linear-family base curve.
    Stochastic { base: Box<CurveSpec>, spread: f64 },
}

impl CurveSpec {
    pub fn build(&self) -> Result<Curve, ConfigurationError> {
        match self {
            CurveSpec::NoDegradation => Ok(NoCapacityDegradation.into()),
            CurveSpec::Stochastic { base, spread } => {
                let base = base.build_linear()?;
                Ok(StochasticResponseCurve::new(base, *spread)?.into())
            }
            _ => Ok(self.build_linear()?.into()),
        }
    }

    fn build_linear(&self) -> Result<LinearResponseCurve, ConfigurationError> {
        match *self {
            CurveSpec::Linear {
                onset_ratio,
                saturation_ratio,
                min_speed_ratio,
                max_speed_ratio,
            } => LinearResponseCurve::new(
                onset_ratio,
                saturation_ratio,
                min_speed_ratio,
                max_speed_ratio,
            ),
            CurveSpec::Scarcity {
                threshold,
                min_speed_ratio,
            } => LinearResponseCurve::scarcity(threshold, min_speed_ratio),
            CurveSpec::Overload {
                threshold,
                max_ratio,
                min_speed_ratio,
            } => LinearResponseCurve::overload(threshold, max_ratio, min_speed_ratio),
            CurveSpec::NoDegradation | CurveSpec::Stochastic { .. } => {
                Err(ConfigurationError::invalid(
                    "StochasticResponseCurve",
                    "base",
                    "base curve must be linear, scarcity or overload",
                ))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintSpec {
    Predecessor,
    Temporal {
        #[serde(default)]
        horizon: Option<f64>,
    },
    Budget {
        total_budget: f64,
        #[serde(default)]
        curve: Option<CurveSpec>,
    },
    ResourceCapacity {
        #[serde(default)]
        resource: Option<String>,
        #[serde(default)]
        curve: Option<CurveSpec>,
    },
    Blackout {
        windows: Vec<BlackoutWindow>,
        #[serde(default)]
        kinds: Option<Vec<EventKind>>,
    },
}

impl ConstraintSpec {
    pub fn build(&self) -> Result<Constraint, ConfigurationError> {
        let constraint = match self {
            ConstraintSpec::Predecessor => PredecessorConstraint::new().into(),
            ConstraintSpec::Temporal { horizon: None } => TemporalConstraint::new().into(),
            ConstraintSpec::Temporal {
                horizon: Some(horizon),
            } => TemporalConstraint::with_horizon(*horizon)?.into(),
            ConstraintSpec::Budget {
                total_budget,
                curve,
            } => {
                let mut builder = BudgetConstraint::builder(*total_budget);
                if let Some(curve) = curve {
                    builder = builder.response_curve(curve.build()?);
                }
                builder.build()?.into()
            }
            ConstraintSpec::ResourceCapacity { resource, curve } => {
                let mut builder = ResourceCapacityConstraint::builder();
                if let Some(resource) = resource {
                    builder = builder.resource(resource.clone());
                }
                if let Some(curve) = curve {
                    builder = builder.response_curve(curve.build()?);
                }
                builder.build()?.into()
            }
            ConstraintSpec::Blackout { windows, kinds } => {
                let blackout = BlackoutConstraint::new(windows.clone())?;
                match kinds {
                    Some(kinds) => blackout.for_kinds(kinds.clone()).into(),
                    None => blackout.into(),
                }
            }
        };
        Ok(constraint)
    }
}

/// A named set of constraints with their curves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    #[serde(default)]
    pub name: String,
    pub constraints: Vec<ConstraintSpec>,
}

impl CalibrationProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraints: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, spec: ConstraintSpec) -> Self {
        self.constraints.push(spec);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|e| ConfigurationError::Parse(e.to_string()))
    }

    /// Construct and validate every constraint in the profile.
    pub fn build(&self) -> Result<Vec<Constraint>, ConfigurationError> {
        self.constraints.iter().map(ConstraintSpec::build).collect()
    }
}
