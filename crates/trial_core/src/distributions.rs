//! Probability distributions referenced by trial entities.
//!
//! Entities only carry a [Distribution]; the engine samples it with an
//! explicitly derived seed. Sampling primitives come from `statrs`, this
//! module only adapts them to the seed-in, value-out interface.

use rand::distributions::Distribution as Sampler;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Exp, LogNormal, Normal, Triangular, Uniform};
use thiserror::Error;

use crate::model::DictRepr;

/// Parameters that `statrs` (or the checks here) rejected.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct DistributionError(String);

/// A parametric distribution over durations, rates or costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distribution {
    Fixed { value: f64 },
    Uniform { min: f64, max: f64 },
    Triangular { low: f64, mode: f64, high: f64 },
    Normal { mean: f64, std_dev: f64 },
    LogNormal { location: f64, scale: f64 },
    Exponential { mean: f64 },
}

impl DictRepr for Distribution {}

impl Distribution {
    pub fn fixed(value: f64) -> Self {
        Self::Fixed { value }
    }

    pub fn uniform(min: f64, max: f64) -> Self {
        Self::Uniform { min, max }
    }

    pub fn triangular(low: f64, mode: f64, high: f64) -> Self {
        Self::Triangular { low, mode, high }
    }

    pub fn normal(mean: f64, std_dev: f64) -> Self {
        Self::Normal { mean, std_dev }
    }

    pub fn log_normal(location: f64, scale: f64) -> Self {
        Self::LogNormal { location, scale }
    }

    pub fn exponential(mean: f64) -> Self {
        Self::Exponential { mean }
    }

    /// Draw one value. The same seed always yields the same value.
    pub fn sample(&self, seed: u64) -> f64 {
        let mut rng = StdRng::seed_from_u64(seed);
        // Parameters are checked by `validate` before a run starts; a
        // distribution that still fails to build degrades to its mean.
        match self {
            Distribution::Fixed { value } => *value,
            Distribution::Uniform { min, max } => Uniform::new(*min, *max)
                .map(|d| d.sample(&mut rng))
                .unwrap_or_else(|_| self.mean()),
            Distribution::Triangular { low, mode, high } => Triangular::new(*low, *high, *mode)
                .map(|d| d.sample(&mut rng))
                .unwrap_or_else(|_| self.mean()),
            Distribution::Normal { mean, std_dev } => Normal::new(*mean, *std_dev)
                .map(|d| d.sample(&mut rng))
                .unwrap_or(*mean),
            Distribution::LogNormal { location, scale } => LogNormal::new(*location, *scale)
                .map(|d| d.sample(&mut rng))
                .unwrap_or_else(|_| self.mean()),
            Distribution::Exponential { mean } => Exp::new(1.0 / *mean)
                .map(|d| d.sample(&mut rng))
                .unwrap_or(*mean),
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            Distribution::Fixed { value } => *value,
            Distribution::Uniform { min, max } => (min + max) / 2.0,
            Distribution::Triangular { low, mode, high } => (low + mode + high) / 3.0,
            Distribution::Normal { mean, .. } => *mean,
            Distribution::LogNormal { location, scale } => (location + scale * scale / 2.0).exp(),
            Distribution::Exponential { mean } => *mean,
        }
    }

    /// Check parameters against the underlying `statrs` constructors.
    pub fn validate(&self) -> Result<(), DistributionError> {
        let params: &[f64] = match self {
            Distribution::Fixed { value } => &[*value],
            Distribution::Uniform { min, max } => &[*min, *max],
            Distribution::Triangular { low, mode, high } => &[*low, *mode, *high],
            Distribution::Normal { mean, std_dev } => &[*mean, *std_dev],
            Distribution::LogNormal { location, scale } => &[*location, *scale],
            Distribution::Exponential { mean } => &[*mean],
        };
        if params.iter().any(|p| !p.is_finite()) {
            return Err(DistributionError("parameters must be finite".to_string()));
        }

        match self {
            Distribution::Fixed { .. } => Ok(()),
            Distribution::Uniform { min, max } => {
                if min >= max {
                    return Err(DistributionError(format!(
                        "uniform requires min < max (got {min} >= {max})"
                    )));
                }
                Uniform::new(*min, *max)
                    .map(|_| ())
                    .map_err(|e| DistributionError(e.to_string()))
            }
            Distribution::Triangular { low, mode, high } => {
                if !(low <= mode && mode <= high && low < high) {
                    return Err(DistributionError(format!(
                        "triangular requires low <= mode <= high and low < high (got {low}, {mode}, {high})"
                    )));
                }
                Triangular::new(*low, *high, *mode)
                    .map(|_| ())
                    .map_err(|e| DistributionError(e.to_string()))
            }
            Distribution::Normal { mean, std_dev } => Normal::new(*mean, *std_dev)
                .map(|_| ())
                .map_err(|e| DistributionError(e.to_string())),
            Distribution::LogNormal { location, scale } => LogNormal::new(*location, *scale)
                .map(|_| ())
                .map_err(|e| DistributionError(e.to_string())),
            Distribution::Exponential { mean } => {
                if *mean <= 0.0 {
                    return Err(DistributionError(format!(
                        "exponential requires a positive mean (got {mean})"
                    )));
                }
                Exp::new(1.0 / *mean)
                    .map(|_| ())
                    .map_err(|e| DistributionError(e.to_string()))
            }
        }
    }

    /// The same family with every sampled value multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        match self {
            Distribution::Fixed { value } => Distribution::Fixed {
                value: value * factor,
            },
            Distribution::Uniform { min, max } => Distribution::Uniform {
                min: min * factor,
                max: max * factor,
            },
            Distribution::Triangular { low, mode, high } => Distribution::Triangular {
                low: low * factor,
                mode: mode * factor,
                high: high * factor,
            },
            Distribution::Normal { mean, std_dev } => Distribution::Normal {
                mean: mean * factor,
                std_dev: std_dev * factor,
            },
            Distribution::LogNormal { location, scale } => Distribution::LogNormal {
                location: location + factor.ln(),
                scale: *scale,
            },
            Distribution::Exponential { mean } => Distribution::Exponential {
                mean: mean * factor,
            },
        }
    }
}
