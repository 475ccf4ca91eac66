//! Run one replication of the multi-site fixture trial and print its timeline.
//!
//! Run with: cargo run -p trial_core --example single_replication

use trial_core::config::EngineConfig;
use trial_core::runner::run_replication;
use trial_core::seed::derive_run_seed;
use trial_core::telemetry::TimelineOutcome;
use trial_core::test_helpers::{multi_site_trial, standard_constraints};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    const MASTER_SEED: u64 = 123;
    const BUDGET: f64 = 600_000.0;

    let trial = multi_site_trial();
    trial.validate()?;
    let constraints = standard_constraints(BUDGET, 0.4)?;
    let result = run_replication(
        &trial,
        &constraints,
        &EngineConfig::default(),
        0,
        derive_run_seed(MASTER_SEED, 0),
    )?;

    println!(
        "--- {} (target {}, budget {:.0}, seed {}) ---",
        trial.name, trial.target_enrollment, BUDGET, MASTER_SEED
    );
    println!("Completion: {:.1} days", result.completion_time);
    println!("Total cost: {:.0}", result.total_cost);
    println!("Enrollment complete: {}", result.enrollment_complete);

    println!("\nSampled inputs:");
    for (name, value) in &result.sampled_inputs {
        println!("  {name:<40} {value:>10.2}");
    }

    println!("\nNon-patient timeline:");
    for entry in result
        .timeline
        .iter()
        .filter(|e| !e.entity_id.starts_with("patient-"))
    {
        let outcome = match &entry.outcome {
            TimelineOutcome::Executed => {
                format!("executed until {:.1} (x{:.2})", entry.end, entry.multiplier)
            }
            TimelineOutcome::Rejected { reason } => format!("rejected: {reason}"),
            TimelineOutcome::Rescheduled { to, .. } => format!("rescheduled to {to:.1}"),
            TimelineOutcome::Delayed { to } => format!("delayed to {to:.1}"),
        };
        println!(
            "  {:>7.1}  {:<18} {:<20} {}",
            entry.start,
            entry.kind.as_str(),
            entry.entity_id,
            outcome
        );
    }

    println!("\nCounters:");
    for (name, value) in result.metrics_snapshot.iter() {
        println!("  {name:<40} {value:>8}");
    }
    Ok(())
}
