//! Error taxonomy for trial simulation.
//!
//! Configuration and validation errors are surfaced to the caller before any
//! replication starts. [`RunError`] is the cause attached to a single failed
//! replication and never aborts a batch.

use thiserror::Error;

/// Invalid curve, constraint or engine parameters. Detected at construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("invalid parameter `{parameter}` for {component}: {reason}")]
    InvalidParameter {
        component: &'static str,
        parameter: &'static str,
        reason: String,
    },
    #[error("{constraint} requires a response curve")]
    MissingResponseCurve { constraint: &'static str },
    #[error("calibration profile could not be parsed: {0}")]
    Parse(String),
}

impl ConfigurationError {
    pub(crate) fn invalid(
        component: &'static str,
        parameter: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            component,
            parameter,
            reason: reason.into(),
        }
    }
}

/// Malformed trial, entity or scenario specification.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("trial `{trial}` must have a positive target enrollment")]
    ZeroTargetEnrollment { trial: String },
    #[error("trial `{trial}` has no sites")]
    NoSites { trial: String },
    #[error("duplicate entity id `{id}`")]
    DuplicateId { id: String },
    #[error("`{entity}` depends on unknown entity `{dependency}`")]
    UnknownDependency { entity: String, dependency: String },
    #[error("dependency cycle through `{entity}`")]
    DependencyCycle { entity: String },
    #[error("`{entity}` references unknown resource `{resource}`")]
    UnknownResource { entity: String, resource: String },
    #[error("`{entity}` field `{field}` has an invalid distribution: {reason}")]
    InvalidDistribution {
        entity: String,
        field: &'static str,
        reason: String,
    },
    #[error("`{entity}` field `{field}` is invalid: {reason}")]
    InvalidField {
        entity: String,
        field: &'static str,
        reason: String,
    },
    #[error("patient flow is invalid: {reason}")]
    InvalidPatientFlow { reason: String },
    #[error("scenario `{scenario}` is invalid: {reason}")]
    InvalidScenario { scenario: String, reason: String },
}

/// Why a single replication failed.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize)]
pub enum RunError {
    #[error("event {event_id} for `{entity_id}` was rescheduled {attempts} times without executing")]
    RetryBoundExceeded {
        event_id: u64,
        entity_id: String,
        attempts: u32,
    },
    #[error("replication exceeded {limit} processed events")]
    EventLimitExceeded { limit: u64 },
    #[error("event {event_id} for `{entity_id}` produced a non-finite time")]
    NonFiniteTime { event_id: u64, entity_id: String },
    #[error("replication panicked: {0}")]
    Panicked(String),
}
