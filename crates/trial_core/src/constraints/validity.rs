//! Validity constraints: structural preconditions that accept or reject an
//! event outright. These take no response curve.

use crate::clock::{Event, EventKind};
use crate::error::ConfigurationError;
use crate::state::EntityProgress;

use super::types::{ConstraintResult, Rejection, RetryHint};
use super::EvaluationContext;

/// A site activation or activity cannot start before every entity it
/// depends on has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PredecessorConstraint;

impl PredecessorConstraint {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, ctx: &EvaluationContext<'_>, event: &Event) -> ConstraintResult {
        if !matches!(event.kind, EventKind::SiteActivation | EventKind::Activity) {
            return ConstraintResult::Valid;
        }

        let mut waiting_on: Vec<&str> = Vec::new();
        let mut clears_at: Option<f64> = None;
        let mut unknown = false;
        for dep in ctx.trial.dependencies_of(&event.entity_id) {
            match ctx.state.progress(dep) {
                _ if ctx.state.finished_by(dep, event.time) => {}
                // Nothing can clear before the predecessor ends, or before it
                // is next evaluated when still queued.
                Some(EntityProgress::Running { end: at })
                | Some(EntityProgress::Queued { start: at }) => {
                    waiting_on.push(dep.as_str());
                    clears_at = Some(clears_at.map_or(at, |t: f64| t.max(at)));
                }
                Some(EntityProgress::Rejected) | None => {
                    waiting_on.push(dep.as_str());
                    unknown = true;
                }
            }
        }

        if waiting_on.is_empty() {
            return ConstraintResult::Valid;
        }
        let reason = format!(
            "`{}` waits on unfinished predecessor(s): {}",
            event.entity_id,
            waiting_on.join(", ")
        );
        let hint = match (unknown, clears_at) {
            (false, Some(at)) => RetryHint::At(at),
            _ => RetryHint::Later,
        };
        ConstraintResult::Invalid(Rejection::retry(reason, hint))
    }
}

/// Events may not start before the current simulation time, nor after an
/// optional trial horizon.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TemporalConstraint {
    horizon: Option<f64>,
}

impl TemporalConstraint {
    pub fn new() -> Self {
        Self { horizon: None }
    }

    /// Reject any event starting after `horizon` days.
    pub fn with_horizon(horizon: f64) -> Result<Self, ConfigurationError> {
        if !(horizon.is_finite() && horizon > 0.0) {
            return Err(ConfigurationError::invalid(
                "TemporalConstraint",
                "horizon",
                format!("must be a positive number of days (got {horizon})"),
            ));
        }
        Ok(Self {
            horizon: Some(horizon),
        })
    }

    pub fn horizon(&self) -> Option<f64> {
        self.horizon
    }

    pub fn evaluate(&self, ctx: &EvaluationContext<'_>, event: &Event) -> ConstraintResult {
        if event.time < ctx.state.now() {
            return ConstraintResult::Invalid(Rejection::permanent(format!(
                "`{}` starts at {:.2}, before the current time {:.2}",
                event.entity_id,
                event.time,
                ctx.state.now()
            )));
        }
        match self.horizon {
            Some(horizon) if event.time > horizon => {
                ConstraintResult::Invalid(Rejection::permanent(format!(
                    "`{}` starts at {:.2}, beyond the trial horizon {:.2}",
                    event.entity_id, event.time, horizon
                )))
            }
            _ => ConstraintResult::Valid,
        }
    }
}
