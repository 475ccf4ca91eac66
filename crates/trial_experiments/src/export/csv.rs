use std::collections::BTreeSet;

use trial_core::runner::RunResult;
use trial_core::telemetry::TimelineOutcome;

pub(crate) fn export_runs_impl(
    runs: &[RunResult],
    file: std::fs::File,
) -> Result<(), Box<dyn std::error::Error>> {
    let inputs: BTreeSet<&str> = runs
        .iter()
        .flat_map(|r| r.sampled_inputs.keys().map(String::as_str))
        .collect();

    let mut wtr = csv::Writer::from_writer(file);

    let mut header = vec![
        "run_id",
        "seed",
        "completion_time",
        "total_cost",
        "enrollment_complete",
        "events",
    ];
    header.extend(inputs.iter().copied());
    wtr.write_record(&header)?;

    for run in runs {
        let mut record = vec![
            run.run_id.to_string(),
            run.seed.to_string(),
            run.completion_time.to_string(),
            run.total_cost.to_string(),
            run.enrollment_complete.to_string(),
            run.timeline.len().to_string(),
        ];
        record.extend(inputs.iter().map(|name| {
            run.sampled_inputs
                .get(*name)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub(crate) fn export_timeline_impl(
    run: &RunResult,
    file: std::fs::File,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = csv::Writer::from_writer(file);

    wtr.write_record([
        "event_id",
        "kind",
        "entity_id",
        "start",
        "end",
        "base_duration",
        "multiplier",
        "cost",
        "outcome",
        "detail",
        "explanation",
    ])?;

    for entry in &run.timeline {
        let (outcome, detail) = match &entry.outcome {
            TimelineOutcome::Executed => ("executed", String::new()),
            TimelineOutcome::Rejected { reason } => ("rejected", reason.clone()),
            TimelineOutcome::Rescheduled { to, reason } => {
                ("rescheduled", format!("{to}: {reason}"))
            }
            TimelineOutcome::Delayed { to } => ("delayed", to.to_string()),
        };
        wtr.write_record([
            entry.event_id.to_string(),
            entry.kind.as_str().to_string(),
            entry.entity_id.clone(),
            entry.start.to_string(),
            entry.end.to_string(),
            entry.base_duration.to_string(),
            entry.multiplier.to_string(),
            entry.cost.to_string(),
            outcome.to_string(),
            detail,
            entry.explanation.join(" | "),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
