//! Aggregation of replication results into distribution summaries.
//!
//! Every reduction runs over sorted values, so a summary never depends on the
//! order in which runs finished.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use trial_core::runner::RunResult;

use crate::variance::{attribute_variance, Outcome, VarianceDriver};

/// Percentile summary of a numeric series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; 0 for fewer than two values.
    pub std: f64,
    pub min: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub max: f64,
}

impl AggregatedResult {
    /// Summarize `values`; `None` when there is nothing to summarize.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let std = if sorted.len() < 2 {
            0.0
        } else {
            sorted.iter().std_dev()
        };
        Some(Self {
            count: sorted.len(),
            mean: sorted.iter().mean(),
            std,
            min: sorted[0],
            p10: percentile(&sorted, 0.10)?,
            p25: percentile(&sorted, 0.25)?,
            p50: percentile(&sorted, 0.50)?,
            p75: percentile(&sorted, 0.75)?,
            p90: percentile(&sorted, 0.90)?,
            p95: percentile(&sorted, 0.95)?,
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Linear interpolation between order statistics at rank `p * (n - 1)`.
///
/// `sorted` must be ascending; `p` is clamped to `[0, 1]`.
///
/// # Returns
///
/// `None` for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n <= 1 {
        return sorted.first().copied();
    }
    let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(n - 1);
    let fraction = rank - lower as f64;
    let value = sorted[lower] + (sorted[upper] - sorted[lower]) * fraction;
    // Keep rounding from escaping the bracketing order statistics.
    Some(value.clamp(sorted[lower], sorted[upper]))
}

/// Batch-level summaries over successful runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResults {
    pub completion_time: Option<AggregatedResult>,
    pub total_cost: Option<AggregatedResult>,
    /// Fraction of runs that reached target enrollment.
    pub enrollment_success_rate: Option<f64>,
    /// One summary per counter seen in any run; absent counters count as 0.
    pub metrics: BTreeMap<String, AggregatedResult>,
    pub completion_time_drivers: Vec<VarianceDriver>,
    pub cost_drivers: Vec<VarianceDriver>,
}

/// Aggregate runs. Runs are ordered by id first, so callers may pass them in
/// any order.
pub fn aggregate(runs: &[RunResult]) -> AggregatedResults {
    if runs.is_empty() {
        return AggregatedResults::default();
    }
    let mut ordered: Vec<&RunResult> = runs.iter().collect();
    ordered.sort_by_key(|r| r.run_id);

    let completion: Vec<f64> = ordered.iter().map(|r| r.completion_time).collect();
    let cost: Vec<f64> = ordered.iter().map(|r| r.total_cost).collect();
    let complete = ordered.iter().filter(|r| r.enrollment_complete).count();

    let names: BTreeSet<&str> = ordered
        .iter()
        .flat_map(|r| r.metrics_snapshot.names())
        .collect();
    let metrics = names
        .into_iter()
        .filter_map(|name| {
            let values: Vec<f64> = ordered
                .iter()
                .map(|r| r.metrics_snapshot.get(name) as f64)
                .collect();
            AggregatedResult::from_values(&values).map(|summary| (name.to_string(), summary))
        })
        .collect();

    AggregatedResults {
        completion_time: AggregatedResult::from_values(&completion),
        total_cost: AggregatedResult::from_values(&cost),
        enrollment_success_rate: Some(complete as f64 / ordered.len() as f64),
        metrics,
        completion_time_drivers: attribute_variance(runs, Outcome::CompletionTime),
        cost_drivers: attribute_variance(runs, Outcome::TotalCost),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn percentiles_interpolate_linearly() {
        let sorted = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&sorted, 0.0), Some(10.0));
        assert_eq!(percentile(&sorted, 0.5), Some(30.0));
        assert_eq!(percentile(&sorted, 1.0), Some(50.0));
        // rank 0.9 * 4 = 3.6 -> 40 + 0.6 * 10
        assert!((percentile(&sorted, 0.9).unwrap() - 46.0).abs() < 1e-12);
        assert!((percentile(&sorted, 0.1).unwrap() - 14.0).abs() < 1e-12);
    }

    #[test]
    fn empty_series_has_no_percentile() {
        assert_eq!(percentile(&[], 0.5), None);
        assert_eq!(percentile(&[3.0], 0.9), Some(3.0));
    }

    #[test]
    fn single_value_summary() {
        let summary = AggregatedResult::from_values(&[7.5]).expect("summary");
        assert_eq!(summary.count, 1);
        assert_eq!(summary.std, 0.0);
        assert_eq!(summary.p10, 7.5);
        assert_eq!(summary.p95, 7.5);
        assert!(AggregatedResult::from_values(&[]).is_none());
    }

    #[test]
    fn summary_uses_sample_std() {
        let summary = AggregatedResult::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0])
            .expect("summary");
        assert!((summary.mean - 5.0).abs() < 1e-12);
        // Sum of squared deviations is 32; sample variance 32 / 7.
        assert!((summary.std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 9.0);
    }

    proptest! {
        #[test]
        fn summaries_are_ordered_and_order_independent(
            values in prop::collection::vec(-1.0e6f64..1.0e6, 1..200)
        ) {
            let summary = AggregatedResult::from_values(&values).unwrap();
            prop_assert!(summary.min <= summary.p10);
            prop_assert!(summary.p10 <= summary.p25);
            prop_assert!(summary.p25 <= summary.p50);
            prop_assert!(summary.p50 <= summary.p75);
            prop_assert!(summary.p75 <= summary.p90);
            prop_assert!(summary.p90 <= summary.p95);
            prop_assert!(summary.p95 <= summary.max);

            let mut reversed = values.clone();
            reversed.reverse();
            prop_assert_eq!(AggregatedResult::from_values(&reversed).unwrap(), summary);
        }
    }
}
