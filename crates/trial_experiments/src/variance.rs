//! Variance attribution: which sampled inputs move an outcome the most.
//!
//! Each driver's contribution is its squared Pearson correlation with the
//! outcome across runs. Squared correlations only decompose variance exactly
//! for independent inputs, so the contributions are rescaled to sum to one
//! whenever they overshoot.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use trial_core::runner::RunResult;

/// Minimum runs an input must appear in to be attributed.
const MIN_OBSERVATIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    CompletionTime,
    TotalCost,
}

impl Outcome {
    fn of(self, run: &RunResult) -> f64 {
        match self {
            Outcome::CompletionTime => run.completion_time,
            Outcome::TotalCost => run.total_cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceDriver {
    pub input_name: String,
    /// Estimated share of outcome variance, in `[0, 1]`.
    pub variance_contribution: f64,
    /// Pearson correlation between the input and the outcome.
    pub correlation: f64,
}

/// Rank sampled inputs by their contribution to `outcome` variance.
///
/// # Arguments
///
/// * `runs` - Successful replications; order does not matter
/// * `outcome` - Which per-run result the inputs are attributed against
///
/// # Returns
///
/// Drivers sorted by descending contribution, ties broken by input name.
/// Inputs seen in fewer than three runs or with a constant value are left
/// out. Empty when the outcome itself never varies.
pub fn attribute_variance(runs: &[RunResult], outcome: Outcome) -> Vec<VarianceDriver> {
    let mut ordered: Vec<&RunResult> = runs.iter().collect();
    ordered.sort_by_key(|r| r.run_id);

    let outcomes: Vec<f64> = ordered.iter().map(|r| outcome.of(r)).collect();
    if distinct(&outcomes) < 2 {
        return Vec::new();
    }

    let names: BTreeSet<&str> = ordered
        .iter()
        .flat_map(|r| r.sampled_inputs.keys().map(String::as_str))
        .collect();

    let mut correlations: BTreeMap<&str, f64> = BTreeMap::new();
    for name in names {
        let (xs, ys): (Vec<f64>, Vec<f64>) = ordered
            .iter()
            .filter_map(|r| r.sampled_inputs.get(name).map(|x| (*x, outcome.of(r))))
            .unzip();
        if xs.len() < MIN_OBSERVATIONS || distinct(&xs) < 2 || distinct(&ys) < 2 {
            continue;
        }
        let r = pearson(&xs, &ys);
        if r.is_finite() {
            correlations.insert(name, r.clamp(-1.0, 1.0));
        }
    }

    let total: f64 = correlations.values().map(|r| r * r).sum();
    let scale = if total > 1.0 { total } else { 1.0 };
    let mut drivers: Vec<VarianceDriver> = correlations
        .into_iter()
        .map(|(name, r)| VarianceDriver {
            input_name: name.to_string(),
            variance_contribution: r * r / scale,
            correlation: r,
        })
        .collect();
    drivers.sort_by(|a, b| {
        b.variance_contribution
            .total_cmp(&a.variance_contribution)
            .then_with(|| a.input_name.cmp(&b.input_name))
    });
    drivers
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let covariance = xs.iter().covariance(ys.iter());
    covariance / (xs.iter().std_dev() * ys.iter().std_dev())
}

fn distinct(values: &[f64]) -> usize {
    let mut bits: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
    bits.sort_unstable();
    bits.dedup();
    bits.len()
}
