/// Fields a constraint is allowed to override on an event. Nothing else about
/// an event can be changed by a constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldOverrides {
    pub duration_multiplier: Option<f64>,
    pub start_time: Option<f64>,
}

impl FieldOverrides {
    pub fn duration(multiplier: f64) -> Self {
        Self {
            duration_multiplier: Some(multiplier),
            start_time: None,
        }
    }
}

/// When a blocked event may be tried again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryHint {
    /// The blocking dependency is known to clear at this time.
    At(f64),
    /// The blocking dependency has not started; try again after the engine's
    /// retry interval.
    Later,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub reason: String,
    pub retry: Option<RetryHint>,
}

impl Rejection {
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retry: None,
        }
    }

    pub fn retry(reason: impl Into<String>, hint: RetryHint) -> Self {
        Self {
            reason: reason.into(),
            retry: Some(hint),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry.is_some()
    }
}

/// Outcome of one (constraint, event) evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintResult {
    Valid,
    Invalid(Rejection),
    Delayed(f64),
    Modified {
        overrides: FieldOverrides,
        explanation: String,
    },
}

impl ConstraintResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ConstraintResult::Valid)
    }
}
