//! Folding per-constraint results into one decision for an event.
//!
//! Precedence: permanent rejection, then retryable rejection, then the
//! combined modifications. Multipliers are multiplied in sorted order and
//! explanations sorted by constraint key, so the decision is identical for any
//! ordering of the constraint list.

use super::types::{ConstraintResult, RetryHint};

/// What the engine does with an evaluated event.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Run the event now with its duration stretched by `multiplier`.
    Execute {
        multiplier: f64,
        explanation: Vec<String>,
    },
    /// Drop the event for good.
    Reject { reason: String },
    /// Blocked for now; try again at `to`.
    Retry { to: f64, reason: String },
    /// Postponed by a proposed start time; re-evaluated at `to`.
    Delay { to: f64, explanation: Vec<String> },
}

/// Combine `(constraint key, result)` pairs for an event starting at
/// `event_time`. `retry_interval` resolves [`RetryHint::Later`].
pub fn compose(
    mut results: Vec<(String, ConstraintResult)>,
    event_time: f64,
    retry_interval: f64,
) -> Decision {
    results.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut permanent = Vec::new();
    let mut blocked = Vec::new();
    let mut retry_at: Option<f64> = None;
    let mut multipliers = Vec::new();
    let mut proposed: Option<f64> = None;
    let mut explanation = Vec::new();

    for (key, result) in &results {
        match result {
            ConstraintResult::Valid => {}
            ConstraintResult::Invalid(rejection) => match rejection.retry {
                None => permanent.push(format!("{key}: {}", rejection.reason)),
                Some(hint) => {
                    let at = match hint {
                        RetryHint::At(time) => time.max(event_time),
                        RetryHint::Later => event_time + retry_interval,
                    };
                    retry_at = Some(retry_at.map_or(at, |t| t.max(at)));
                    blocked.push(format!("{key}: {}", rejection.reason));
                }
            },
            ConstraintResult::Delayed(time) => {
                proposed = Some(proposed.map_or(*time, |t| t.max(*time)));
                explanation.push(format!("{key}: delayed to {time:.2}"));
            }
            ConstraintResult::Modified {
                overrides,
                explanation: text,
            } => {
                if let Some(multiplier) = overrides.duration_multiplier {
                    multipliers.push(multiplier);
                }
                if let Some(start) = overrides.start_time {
                    proposed = Some(proposed.map_or(start, |t| t.max(start)));
                }
                explanation.push(format!("{key}: {text}"));
            }
        }
    }

    if !permanent.is_empty() {
        permanent.sort();
        return Decision::Reject {
            reason: permanent.join("; "),
        };
    }
    if let Some(to) = retry_at {
        blocked.sort();
        return Decision::Retry {
            to,
            reason: blocked.join("; "),
        };
    }

    // Same-key entries keep list order from the stable sort; settle them too.
    explanation.sort();
    match proposed {
        Some(to) if to > event_time => Decision::Delay { to, explanation },
        _ => {
            multipliers.sort_by(f64::total_cmp);
            let multiplier = multipliers.iter().product();
            Decision::Execute {
                multiplier,
                explanation,
            }
        }
    }
}
