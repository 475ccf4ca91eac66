#![allow(dead_code)]

use tracing_subscriber::EnvFilter;
use trial_core::config::EngineConfig;
use trial_experiments::MonteCarloEngine;

/// Route engine logs to the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn engine(threads: usize) -> MonteCarloEngine {
    engine_with(EngineConfig::default().with_num_threads(threads))
}

pub fn engine_with(config: EngineConfig) -> MonteCarloEngine {
    init_tracing();
    MonteCarloEngine::new(config).expect("valid engine config")
}

pub fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values
}
