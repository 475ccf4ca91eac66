use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Default number of times one logical event may be rescheduled.
const DEFAULT_MAX_RESCHEDULES: u32 = 100;

/// Default wait (days) before retrying an event blocked on something that has
/// not started yet.
const DEFAULT_RETRY_INTERVAL_DAYS: f64 = 7.0;

/// Default cap on processed events per replication.
const DEFAULT_MAX_EVENTS_PER_RUN: u64 = 1_000_000;

/// Execution knobs for the simulation engine. These belong to the engine value,
/// never to an individual `run` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reschedules allowed per logical event before the run fails.
    pub max_reschedules: u32,
    /// Days to wait before retrying an event whose blocker has not started.
    pub retry_interval: f64,
    /// Processed events allowed per replication before the run fails.
    pub max_events_per_run: u64,
    /// Worker threads for batch execution; `None` uses rayon's default.
    pub num_threads: Option<usize>,
    /// Draw an indicatif progress bar while a batch runs.
    pub show_progress: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_reschedules: DEFAULT_MAX_RESCHEDULES,
            retry_interval: DEFAULT_RETRY_INTERVAL_DAYS,
            max_events_per_run: DEFAULT_MAX_EVENTS_PER_RUN,
            num_threads: None,
            show_progress: false,
        }
    }
}

impl EngineConfig {
    pub fn with_max_reschedules(mut self, max_reschedules: u32) -> Self {
        self.max_reschedules = max_reschedules;
        self
    }

    pub fn with_retry_interval(mut self, days: f64) -> Self {
        self.retry_interval = days;
        self
    }

    pub fn with_max_events_per_run(mut self, max_events: u64) -> Self {
        self.max_events_per_run = max_events;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Parse from JSON; missing fields take their defaults. The result is
    /// validated.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.retry_interval.is_finite() && self.retry_interval > 0.0) {
            return Err(ConfigurationError::invalid(
                "EngineConfig",
                "retry_interval",
                format!("must be a positive number of days (got {})", self.retry_interval),
            ));
        }
        if self.max_events_per_run == 0 {
            return Err(ConfigurationError::invalid(
                "EngineConfig",
                "max_events_per_run",
                "must be at least 1",
            ));
        }
        if self.num_threads == Some(0) {
            return Err(ConfigurationError::invalid(
                "EngineConfig",
                "num_threads",
                "must be at least 1 when set",
            ));
        }
        Ok(())
    }
}
