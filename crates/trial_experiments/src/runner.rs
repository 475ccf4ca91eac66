//! Parallel replication of a trial using rayon.
//!
//! Every replication gets its own state and a seed derived from
//! `(master_seed, run_index)`, so results are identical regardless of thread
//! count or scheduling. A failing replication becomes a [RunFailure] and the
//! batch carries on.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};
use trial_core::config::EngineConfig;
use trial_core::constraints::Constraint;
use trial_core::error::RunError;
use trial_core::model::Trial;
use trial_core::runner::{run_replication, RunResult};
use trial_core::seed::derive_run_seed;

use crate::error::BatchError;
use crate::metrics::{aggregate, AggregatedResults};

/// Shared flag that stops a batch between replications.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// External controls for a running batch. Both are checked only between
/// replications; a replication in flight always finishes.
#[derive(Debug, Clone, Default)]
pub struct BatchControl {
    pub cancellation: CancellationToken,
    /// Wall-clock budget for the whole batch.
    pub deadline: Option<Duration>,
}

impl BatchControl {
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// A replication that ended with an error instead of a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunFailure {
    pub run_id: u64,
    pub seed: u64,
    pub cause: RunError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchMetadata {
    pub trial_name: String,
    pub master_seed: u64,
    pub requested_runs: u64,
    pub completed_runs: u64,
    pub failed_runs: u64,
    pub wall_clock_secs: f64,
    /// `true` when cancellation or the deadline cut the batch short.
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub aggregated: AggregatedResults,
    /// Successful replications ordered by run id.
    pub runs: Vec<RunResult>,
    pub failures: Vec<RunFailure>,
    pub metadata: BatchMetadata,
}

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

enum Replicate {
    Done(RunResult),
    Failed(RunFailure),
    Skipped,
}

/// Monte Carlo driver. Execution knobs live here, never on individual calls.
#[derive(Debug, Clone)]
pub struct MonteCarloEngine {
    config: EngineConfig,
}

impl MonteCarloEngine {
    pub fn new(config: EngineConfig) -> Result<Self, BatchError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `num_runs` replications of `trial` under `constraints`.
    pub fn run(
        &self,
        trial: &Trial,
        num_runs: u64,
        master_seed: u64,
        constraints: &[Constraint],
    ) -> Result<BatchResult, BatchError> {
        self.run_with_control(trial, num_runs, master_seed, constraints, &BatchControl::default())
    }

    /// [`run`](Self::run) with cancellation and a deadline.
    ///
    /// # Arguments
    ///
    /// * `trial` - Validated once up front, then shared read-only by every replication
    /// * `num_runs` - Number of replications to attempt; run ids are `0..num_runs`
    /// * `master_seed` - Root of the per-run seeds, see [`derive_run_seed`]
    /// * `constraints` - Applied to every event of every replication
    /// * `control` - Cancellation token and optional wall-clock deadline
    ///
    /// # Returns
    ///
    /// Successful runs ordered by run id, one [`RunFailure`] per failed
    /// replication, and aggregates over the successful runs only. When the
    /// batch is cut short, `metadata.cancelled` is set and the replications
    /// that never started appear in neither list.
    ///
    /// # Errors
    ///
    /// [`BatchError::NoRuns`] for `num_runs == 0`, a validation error when the
    /// trial or a constraint is inconsistent, and [`BatchError::ThreadPool`]
    /// when the worker pool cannot be built. Failures inside a replication
    /// never surface here.
    pub fn run_with_control(
        &self,
        trial: &Trial,
        num_runs: u64,
        master_seed: u64,
        constraints: &[Constraint],
        control: &BatchControl,
    ) -> Result<BatchResult, BatchError> {
        if num_runs == 0 {
            return Err(BatchError::NoRuns);
        }
        trial.validate()?;
        for constraint in constraints {
            constraint.check_against(trial)?;
        }

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = self.config.num_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;

        let progress = self.progress_bar(num_runs);
        let started = Instant::now();
        let run_ids: Vec<u64> = (0..num_runs).collect();
        let outcomes: Vec<Replicate> = pool.install(|| {
            run_ids
                .par_iter()
                .map(|&run_id| {
                    let outcome =
                        self.replicate(trial, constraints, run_id, master_seed, control, started);
                    if let Some(bar) = &progress {
                        bar.inc(1);
                    }
                    outcome
                })
                .collect()
        });
        if let Some(bar) = &progress {
            bar.finish_with_message("Completed");
        }

        let mut runs = Vec::new();
        let mut failures = Vec::new();
        let mut cancelled = false;
        for outcome in outcomes {
            match outcome {
                Replicate::Done(run) => runs.push(run),
                Replicate::Failed(failure) => failures.push(failure),
                Replicate::Skipped => cancelled = true,
            }
        }

        let metadata = BatchMetadata {
            trial_name: trial.name.clone(),
            master_seed,
            requested_runs: num_runs,
            completed_runs: runs.len() as u64,
            failed_runs: failures.len() as u64,
            wall_clock_secs: started.elapsed().as_secs_f64(),
            cancelled,
        };
        info!(
            trial = %metadata.trial_name,
            requested = metadata.requested_runs,
            completed = metadata.completed_runs,
            failed = metadata.failed_runs,
            cancelled = metadata.cancelled,
            wall_clock_secs = metadata.wall_clock_secs,
            "batch finished"
        );

        Ok(BatchResult {
            aggregated: aggregate(&runs),
            runs,
            failures,
            metadata,
        })
    }

    fn replicate(
        &self,
        trial: &Trial,
        constraints: &[Constraint],
        run_id: u64,
        master_seed: u64,
        control: &BatchControl,
        started: Instant,
    ) -> Replicate {
        if control.cancellation.is_cancelled() {
            return Replicate::Skipped;
        }
        if control.deadline.is_some_and(|limit| started.elapsed() >= limit) {
            return Replicate::Skipped;
        }

        let seed = derive_run_seed(master_seed, run_id);
        let result = catch_unwind(AssertUnwindSafe(|| {
            run_replication(trial, constraints, &self.config, run_id, seed)
        }))
        .unwrap_or_else(|payload| Err(RunError::Panicked(panic_message(payload.as_ref()))));

        match result {
            Ok(run) => Replicate::Done(run),
            Err(cause) => {
                warn!(run_id, seed, %cause, "replication failed");
                Replicate::Failed(RunFailure { run_id, seed, cause })
            }
        }
    }

    fn progress_bar(&self, total: u64) -> Option<ProgressBar> {
        if !self.config.show_progress {
            return None;
        }
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Some(bar)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
