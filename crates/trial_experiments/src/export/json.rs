use serde::Serialize;

use crate::metrics::AggregatedResults;
use crate::runner::{BatchMetadata, BatchResult, RunFailure};

#[derive(Serialize)]
struct BatchSummary<'a> {
    aggregated: &'a AggregatedResults,
    failures: &'a [RunFailure],
    metadata: &'a BatchMetadata,
}

pub(crate) fn export_batch_impl(
    batch: &BatchResult,
    file: std::fs::File,
) -> Result<(), Box<dyn std::error::Error>> {
    let summary = BatchSummary {
        aggregated: &batch.aggregated,
        failures: &batch.failures,
        metadata: &batch.metadata,
    };
    serde_json::to_writer_pretty(file, &summary)?;
    Ok(())
}
