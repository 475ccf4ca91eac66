//! Result export.
//!
//! Per-run tables go to CSV, batch summaries to JSON.

use std::path::Path;

use trial_core::runner::RunResult;

use crate::runner::BatchResult;

#[path = "export/csv.rs"]
mod csv;
#[path = "export/json.rs"]
mod json;
#[path = "export/writer_utils.rs"]
mod writer_utils;

/// Export one row per run: outcome columns followed by every sampled input.
///
/// Input columns are the sorted union over all runs; a run that did not sample
/// an input leaves the cell empty.
///
/// # Errors
///
/// Returns an error if `runs` is empty or file creation or CSV writing fails.
pub fn export_runs_to_csv(
    runs: &[RunResult],
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    writer_utils::ensure_not_empty(runs)?;
    let file = writer_utils::create_output_file(path)?;
    csv::export_runs_impl(runs, file)
}

/// Export the event timeline of a single run, one row per processed event.
pub fn export_timeline_to_csv(
    run: &RunResult,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    writer_utils::ensure_not_empty(&run.timeline)?;
    let file = writer_utils::create_output_file(path)?;
    csv::export_timeline_impl(run, file)
}

/// Export aggregated results, failures and metadata of a batch as JSON.
///
/// Individual runs are left out; use [`export_runs_to_csv`] for those.
pub fn export_batch_to_json(
    batch: &BatchResult,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = writer_utils::create_output_file(path)?;
    json::export_batch_impl(batch, file)
}
