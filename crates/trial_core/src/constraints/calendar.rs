//! Calendar constraint: pushes events out of blackout windows (holiday
//! shutdowns, review-board recesses).

use serde::{Deserialize, Serialize};

use crate::clock::{Event, EventKind};
use crate::error::ConfigurationError;

use super::types::ConstraintResult;

/// Half-open window `[start, end)` in days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlackoutWindow {
    pub start: f64,
    pub end: f64,
}

impl BlackoutWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    fn contains(&self, time: f64) -> bool {
        self.start <= time && time < self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlackoutConstraint {
    windows: Vec<BlackoutWindow>,
    kinds: Option<Vec<EventKind>>,
}

impl BlackoutConstraint {
    pub const KEY: &'static str = "blackout";

    pub fn new(windows: Vec<BlackoutWindow>) -> Result<Self, ConfigurationError> {
        for window in &windows {
            if !(window.start.is_finite() && window.end.is_finite() && window.start < window.end) {
                return Err(ConfigurationError::invalid(
                    "BlackoutConstraint",
                    "windows",
                    format!(
                        "window [{}, {}) must be finite with start < end",
                        window.start, window.end
                    ),
                ));
            }
        }
        Ok(Self {
            windows,
            kinds: None,
        })
    }

    /// Only postpone events of these kinds.
    pub fn for_kinds(mut self, kinds: Vec<EventKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn evaluate(&self, event: &Event) -> ConstraintResult {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return ConstraintResult::Valid;
            }
        }
        // Windows may chain; follow them until the time is clear.
        let mut time = event.time;
        let mut moved = true;
        while moved {
            moved = false;
            for window in &self.windows {
                if window.contains(time) {
                    time = window.end;
                    moved = true;
                }
            }
        }
        if time > event.time {
            ConstraintResult::Delayed(time)
        } else {
            ConstraintResult::Valid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_at(time: f64, kind: EventKind) -> Event {
        Event::new(1, kind, "site-a", time, 5.0)
    }

    #[test]
    fn delays_to_window_end() {
        let constraint =
            BlackoutConstraint::new(vec![BlackoutWindow::new(10.0, 20.0)]).expect("valid");
        assert_eq!(
            constraint.evaluate(&event_at(12.0, EventKind::Activity)),
            ConstraintResult::Delayed(20.0)
        );
        assert_eq!(
            constraint.evaluate(&event_at(20.0, EventKind::Activity)),
            ConstraintResult::Valid
        );
    }

    #[test]
    fn follows_adjacent_windows() {
        let constraint = BlackoutConstraint::new(vec![
            BlackoutWindow::new(20.0, 25.0),
            BlackoutWindow::new(10.0, 20.0),
        ])
        .expect("valid");
        assert_eq!(
            constraint.evaluate(&event_at(15.0, EventKind::Activity)),
            ConstraintResult::Delayed(25.0)
        );
    }

    #[test]
    fn kind_filter_skips_other_events() {
        let constraint = BlackoutConstraint::new(vec![BlackoutWindow::new(0.0, 30.0)])
            .expect("valid")
            .for_kinds(vec![EventKind::SiteActivation]);
        assert_eq!(
            constraint.evaluate(&event_at(5.0, EventKind::PatientTransition)),
            ConstraintResult::Valid
        );
        assert!(matches!(
            constraint.evaluate(&event_at(5.0, EventKind::SiteActivation)),
            ConstraintResult::Delayed(_)
        ));
    }

    #[test]
    fn inverted_window_is_a_configuration_error() {
        assert!(BlackoutConstraint::new(vec![BlackoutWindow::new(5.0, 5.0)]).is_err());
    }
}
