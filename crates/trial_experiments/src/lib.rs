//! Monte Carlo batch execution and analysis for trial forecasts.
//!
//! This crate runs many independent replications of a [`trial_core`] trial in
//! parallel, isolates failing replications, and reduces the survivors to
//! percentile summaries and variance drivers.
//!
//! # Quick Start
//!
//! ```no_run
//! use trial_core::config::EngineConfig;
//! use trial_core::test_helpers::{multi_site_trial, standard_constraints};
//! use trial_experiments::{export_batch_to_json, MonteCarloEngine};
//!
//! let engine = MonteCarloEngine::new(EngineConfig::default()).unwrap();
//! let constraints = standard_constraints(500_000.0, 0.3).unwrap();
//! let batch = engine.run(&multi_site_trial(), 1_000, 42, &constraints).unwrap();
//!
//! if let Some(completion) = &batch.aggregated.completion_time {
//!     println!("P50 {:.0} days, P90 {:.0} days", completion.p50, completion.p90);
//! }
//! export_batch_to_json(&batch, "forecast.json").unwrap();
//! ```
//!
//! # Architecture
//!
//! - [`runner`]: Parallel replication using rayon, cancellation and failure isolation
//! - [`metrics`]: Percentile aggregation over successful runs
//! - [`variance`]: Correlation-based variance attribution of sampled inputs
//! - [`export`]: Result export to CSV/JSON

pub mod error;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod variance;

pub use error::BatchError;
pub use export::{export_batch_to_json, export_runs_to_csv, export_timeline_to_csv};
pub use metrics::{aggregate, percentile, AggregatedResult, AggregatedResults};
pub use runner::{
    BatchControl, BatchMetadata, BatchResult, CancellationToken, MonteCarloEngine, RunFailure,
};
pub use variance::{attribute_variance, Outcome, VarianceDriver};
