use thiserror::Error;
use trial_core::error::{ConfigurationError, ValidationError};

/// Failures that abort a whole batch before any replication runs.
///
/// Individual replication failures are not batch errors; they are reported as
/// [`RunFailure`](crate::runner::RunFailure)s inside the batch result.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("a batch needs at least one run")]
    NoRuns,
    #[error("failed to build the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
