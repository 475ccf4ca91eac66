pub mod calibration;
pub mod clock;
pub mod config;
pub mod constraints;
pub mod curves;
pub mod distributions;
pub mod error;
pub mod model;
pub mod runner;
pub mod scenario;
pub mod seed;
pub mod state;
pub mod telemetry;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
