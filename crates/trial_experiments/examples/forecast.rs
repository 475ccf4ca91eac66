//! Example: forecast a multi-site trial under a base case and a slow-activation
//! scenario, then export the results.
//!
//! Run with: cargo run -p trial_experiments --example forecast

use trial_core::config::EngineConfig;
use trial_core::scenario::{apply_scenario, ScenarioProfile};
use trial_core::test_helpers::{multi_site_trial, standard_constraints};
use trial_experiments::{export_batch_to_json, export_runs_to_csv, BatchResult, MonteCarloEngine};

const RUNS: u64 = 500;
const MASTER_SEED: u64 = 42;

fn report(label: &str, batch: &BatchResult) {
    println!("\n=== {label} ===");
    println!(
        "Runs: {} completed, {} failed ({:.2}s)",
        batch.metadata.completed_runs, batch.metadata.failed_runs, batch.metadata.wall_clock_secs
    );
    if let Some(completion) = &batch.aggregated.completion_time {
        println!(
            "Completion days  P10 {:>7.1}  P50 {:>7.1}  P90 {:>7.1}",
            completion.p10, completion.p50, completion.p90
        );
    }
    if let Some(cost) = &batch.aggregated.total_cost {
        println!("Total cost       P50 {:>12.0}  P90 {:>12.0}", cost.p50, cost.p90);
    }
    println!("Top completion drivers:");
    for driver in batch.aggregated.completion_time_drivers.iter().take(3) {
        println!(
            "  {:<36} {:>5.1}% (r = {:+.2})",
            driver.input_name,
            driver.variance_contribution * 100.0,
            driver.correlation
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let engine = MonteCarloEngine::new(EngineConfig::default().with_progress(true))?;
    let constraints = standard_constraints(550_000.0, 0.3)?;

    let base = multi_site_trial();
    let slow = apply_scenario(
        &base,
        &ScenarioProfile::new("slow-activation").with_activation_time_scale(1.2),
    )?;

    let base_batch = engine.run(&base, RUNS, MASTER_SEED, &constraints)?;
    let slow_batch = engine.run(&slow, RUNS, MASTER_SEED, &constraints)?;
    report("Base case", &base_batch);
    report("Activation x1.2", &slow_batch);

    export_batch_to_json(&base_batch, "forecast_results/base.json")?;
    export_runs_to_csv(&base_batch.runs, "forecast_results/base_runs.csv")?;
    export_batch_to_json(&slow_batch, "forecast_results/slow_activation.json")?;
    println!("\nResults written to forecast_results/");
    Ok(())
}
