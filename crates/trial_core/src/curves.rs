//! Response curves: pressure ratio to duration multiplier.
//!
//! A ratio is unitless (available/required for budgets, utilization/capacity
//! for resources) and may exceed 1.0. Curves are validated when they are
//! built; evaluation is pure and cannot fail.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::seed::unit_interval;

/// Two-method capability every curve provides. `sample_multiplier` must
/// average to `mean_multiplier` over seeds.
pub trait ResponseCurve: Send + Sync + std::fmt::Debug {
    fn mean_multiplier(&self, ratio: f64) -> f64;

    fn sample_multiplier(&self, ratio: f64, seed: u64) -> f64;
}

/// Multiplier is always 1.0. Stands in for behavior that is not modeled yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NoCapacityDegradation;

impl ResponseCurve for NoCapacityDegradation {
    fn mean_multiplier(&self, _ratio: f64) -> f64 {
        1.0
    }

    fn sample_multiplier(&self, _ratio: f64, _seed: u64) -> f64 {
        1.0
    }
}

/// Piecewise-linear speed curve.
///
/// Speed is `max_speed_ratio` on the unpressured side of `onset_ratio`, ramps
/// linearly to `min_speed_ratio` at `saturation_ratio` and stays there beyond.
/// The multiplier is `1 / speed`. When `onset_ratio > saturation_ratio` the
/// curve models scarcity (lower ratio is worse); otherwise overload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearResponseCurve {
    onset_ratio: f64,
    saturation_ratio: f64,
    min_speed_ratio: f64,
    max_speed_ratio: f64,
}

impl LinearResponseCurve {
    pub fn new(
        onset_ratio: f64,
        saturation_ratio: f64,
        min_speed_ratio: f64,
        max_speed_ratio: f64,
    ) -> Result<Self, ConfigurationError> {
        const COMPONENT: &str = "LinearResponseCurve";
        if !(min_speed_ratio > 0.0
            && min_speed_ratio <= max_speed_ratio
            && max_speed_ratio <= 1.0)
        {
            return Err(ConfigurationError::invalid(
                COMPONENT,
                "min_speed_ratio",
                format!(
                    "requires 0 < min_speed_ratio <= max_speed_ratio <= 1.0 (got {min_speed_ratio}, {max_speed_ratio})"
                ),
            ));
        }
        let breakpoints = [("onset_ratio", onset_ratio), ("saturation_ratio", saturation_ratio)];
        for (name, value) in breakpoints {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigurationError::invalid(
                    COMPONENT,
                    name,
                    format!("must be finite and non-negative (got {value})"),
                ));
            }
        }
        if onset_ratio == saturation_ratio {
            return Err(ConfigurationError::invalid(
                COMPONENT,
                "saturation_ratio",
                format!("must differ from onset_ratio ({onset_ratio})"),
            ));
        }
        Ok(Self {
            onset_ratio,
            saturation_ratio,
            min_speed_ratio,
            max_speed_ratio,
        })
    }

    /// Budget-style curve: full speed at or above `threshold` available/required,
    /// `min_speed_ratio` when nothing is available.
    pub fn scarcity(threshold: f64, min_speed_ratio: f64) -> Result<Self, ConfigurationError> {
        Self::new(threshold, 0.0, min_speed_ratio, 1.0)
    }

    /// Capacity-style curve: full speed up to `threshold` utilization, slowest at
    /// `max_ratio` and beyond.
    pub fn overload(
        threshold: f64,
        max_ratio: f64,
        min_speed_ratio: f64,
    ) -> Result<Self, ConfigurationError> {
        if max_ratio < threshold {
            return Err(ConfigurationError::invalid(
                "LinearResponseCurve",
                "max_ratio",
                format!("must be above the threshold {threshold} (got {max_ratio})"),
            ));
        }
        Self::new(threshold, max_ratio, min_speed_ratio, 1.0)
    }

    pub fn min_speed_ratio(&self) -> f64 {
        self.min_speed_ratio
    }

    pub fn max_speed_ratio(&self) -> f64 {
        self.max_speed_ratio
    }

    fn speed(&self, ratio: f64) -> f64 {
        if ratio.is_nan() {
            return self.max_speed_ratio;
        }
        let span = self.saturation_ratio - self.onset_ratio;
        let progress = ((ratio - self.onset_ratio) / span).clamp(0.0, 1.0);
        self.max_speed_ratio - (self.max_speed_ratio - self.min_speed_ratio) * progress
    }
}

impl ResponseCurve for LinearResponseCurve {
    fn mean_multiplier(&self, ratio: f64) -> f64 {
        1.0 / self.speed(ratio)
    }

    fn sample_multiplier(&self, ratio: f64, _seed: u64) -> f64 {
        self.mean_multiplier(ratio)
    }
}

/// Adds seeded noise to the excess slowdown of a deterministic base curve:
/// `1 + (m - 1) * u` with `u` uniform in `[1 - spread, 1 + spread]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StochasticResponseCurve {
    base: LinearResponseCurve,
    spread: f64,
}

impl StochasticResponseCurve {
    pub fn new(base: LinearResponseCurve, spread: f64) -> Result<Self, ConfigurationError> {
        if !(0.0..=1.0).contains(&spread) {
            return Err(ConfigurationError::invalid(
                "StochasticResponseCurve",
                "spread",
                format!("must lie in [0, 1] (got {spread})"),
            ));
        }
        Ok(Self { base, spread })
    }
}

impl ResponseCurve for StochasticResponseCurve {
    fn mean_multiplier(&self, ratio: f64) -> f64 {
        self.base.mean_multiplier(ratio)
    }

    fn sample_multiplier(&self, ratio: f64, seed: u64) -> f64 {
        let excess = self.base.mean_multiplier(ratio) - 1.0;
        let u = 1.0 - self.spread + 2.0 * self.spread * unit_interval(seed);
        1.0 + excess * u
    }
}

/// Closed set of curve families a feasibility constraint can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Curve {
    NoDegradation(NoCapacityDegradation),
    Linear(LinearResponseCurve),
    Stochastic(StochasticResponseCurve),
}

impl ResponseCurve for Curve {
    fn mean_multiplier(&self, ratio: f64) -> f64 {
        match self {
            Curve::NoDegradation(curve) => curve.mean_multiplier(ratio),
            Curve::Linear(curve) => curve.mean_multiplier(ratio),
            Curve::Stochastic(curve) => curve.mean_multiplier(ratio),
        }
    }

    fn sample_multiplier(&self, ratio: f64, seed: u64) -> f64 {
        match self {
            Curve::NoDegradation(curve) => curve.sample_multiplier(ratio, seed),
            Curve::Linear(curve) => curve.sample_multiplier(ratio, seed),
            Curve::Stochastic(curve) => curve.sample_multiplier(ratio, seed),
        }
    }
}

impl From<NoCapacityDegradation> for Curve {
    fn from(curve: NoCapacityDegradation) -> Self {
        Curve::NoDegradation(curve)
    }
}

impl From<LinearResponseCurve> for Curve {
    fn from(curve: LinearResponseCurve) -> Self {
        Curve::Linear(curve)
    }
}

impl From<StochasticResponseCurve> for Curve {
    fn from(curve: StochasticResponseCurve) -> Self {
        Curve::Stochastic(curve)
    }
}
