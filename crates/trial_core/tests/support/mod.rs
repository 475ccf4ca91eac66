#![allow(dead_code)]

use trial_core::config::EngineConfig;
use trial_core::constraints::Constraint;
use trial_core::error::RunError;
use trial_core::model::Trial;
use trial_core::runner::{run_replication, RunResult};
use trial_core::seed::derive_run_seed;

/// Run `runs` replications sequentially with the default engine config.
pub fn run_many(
    trial: &Trial,
    constraints: &[Constraint],
    runs: u64,
    master_seed: u64,
) -> Vec<Result<RunResult, RunError>> {
    run_many_with(trial, constraints, &EngineConfig::default(), runs, master_seed)
}

pub fn run_many_with(
    trial: &Trial,
    constraints: &[Constraint],
    config: &EngineConfig,
    runs: u64,
    master_seed: u64,
) -> Vec<Result<RunResult, RunError>> {
    (0..runs)
        .map(|run_id| {
            run_replication(
                trial,
                constraints,
                config,
                run_id,
                derive_run_seed(master_seed, run_id),
            )
        })
        .collect()
}

/// Serialized form used for byte-level comparisons.
pub fn to_json(results: &[Result<RunResult, RunError>]) -> Vec<String> {
    results
        .iter()
        .map(|r| match r {
            Ok(run) => serde_json::to_string(run).expect("serialize run"),
            Err(err) => format!("error: {err}"),
        })
        .collect()
}

pub fn completion_times(results: &[Result<RunResult, RunError>]) -> Vec<f64> {
    results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|r| r.completion_time)
        .collect()
}

/// Linearly interpolated 90th percentile.
pub fn p90(mut values: Vec<f64>) -> f64 {
    assert!(!values.is_empty(), "no values");
    values.sort_by(f64::total_cmp);
    let rank = 0.9 * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(values.len() - 1);
    values[lower] + (values[upper] - values[lower]) * (rank - lower as f64)
}
