//! Scenario overrides: "what if" variations of a trial, applied strictly
//! before the engine sees it.
//!
//! A [ScenarioProfile] scales distributions and costs or replaces individual
//! inputs. [apply_scenario] is pure: it returns a new, validated [Trial] and
//! never touches the original.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distributions::Distribution;
use crate::error::ValidationError;
use crate::model::{DictRepr, Trial};

fn unit_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioProfile {
    pub name: String,
    /// Multiplies every site's activation time.
    #[serde(default = "unit_scale")]
    pub activation_time_scale: f64,
    /// Multiplies every site's enrollment rate.
    #[serde(default = "unit_scale")]
    pub enrollment_rate_scale: f64,
    #[serde(default = "unit_scale")]
    pub activity_duration_scale: f64,
    /// Multiplies every cost: activation, per patient, activity and visit.
    #[serde(default = "unit_scale")]
    pub cost_scale: f64,
    #[serde(default)]
    pub target_enrollment: Option<u32>,
    /// Replacement activation-time distributions by site id, applied before
    /// scaling.
    #[serde(default)]
    pub site_activation_overrides: BTreeMap<String, Distribution>,
}

impl DictRepr for ScenarioProfile {}

impl ScenarioProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            activation_time_scale: 1.0,
            enrollment_rate_scale: 1.0,
            activity_duration_scale: 1.0,
            cost_scale: 1.0,
            target_enrollment: None,
            site_activation_overrides: BTreeMap::new(),
        }
    }

    pub fn with_activation_time_scale(mut self, scale: f64) -> Self {
        self.activation_time_scale = scale;
        self
    }

    pub fn with_enrollment_rate_scale(mut self, scale: f64) -> Self {
        self.enrollment_rate_scale = scale;
        self
    }

    pub fn with_activity_duration_scale(mut self, scale: f64) -> Self {
        self.activity_duration_scale = scale;
        self
    }

    pub fn with_cost_scale(mut self, scale: f64) -> Self {
        self.cost_scale = scale;
        self
    }

    pub fn with_target_enrollment(mut self, target: u32) -> Self {
        self.target_enrollment = Some(target);
        self
    }

    pub fn with_site_activation(mut self, site_id: impl Into<String>, dist: Distribution) -> Self {
        self.site_activation_overrides.insert(site_id.into(), dist);
        self
    }

    fn invalid(&self, reason: String) -> ValidationError {
        ValidationError::InvalidScenario {
            scenario: self.name.clone(),
            reason,
        }
    }

    fn check(&self) -> Result<(), ValidationError> {
        let scales = [
            ("activation_time_scale", self.activation_time_scale),
            ("enrollment_rate_scale", self.enrollment_rate_scale),
            ("activity_duration_scale", self.activity_duration_scale),
            ("cost_scale", self.cost_scale),
        ];
        for (name, scale) in scales {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(
                    self.invalid(format!("{name} must be positive and finite (got {scale})"))
                );
            }
        }
        if self.target_enrollment == Some(0) {
            return Err(self.invalid("target_enrollment override must be positive".to_string()));
        }
        Ok(())
    }
}

/// Produce the trial described by `profile` applied to `trial`.
///
/// # Arguments
///
/// * `trial` - Baseline trial, left untouched
/// * `profile` - Overrides and multiplicative scales to apply
///
/// # Returns
///
/// A new trial with site activation overrides substituted first, then every
/// scale applied. The result is validated before it is returned.
///
/// # Errors
///
/// [`ValidationError`] when a scale is not positive and finite, an override
/// names a site the trial does not have, or the resulting trial is invalid.
pub fn apply_scenario(
    trial: &Trial,
    profile: &ScenarioProfile,
) -> Result<Trial, ValidationError> {
    profile.check()?;
    for site_id in profile.site_activation_overrides.keys() {
        if trial.site(site_id).is_none() {
            return Err(profile.invalid(format!("override names unknown site `{site_id}`")));
        }
    }

    let mut scenario = trial.clone();
    if let Some(target) = profile.target_enrollment {
        scenario.target_enrollment = target;
    }
    for site in &mut scenario.sites {
        if let Some(dist) = profile.site_activation_overrides.get(&site.id) {
            site.activation_time = dist.clone();
        }
        site.activation_time = site.activation_time.scaled(profile.activation_time_scale);
        site.enrollment_rate = site.enrollment_rate.scaled(profile.enrollment_rate_scale);
        site.activation_cost *= profile.cost_scale;
        site.cost_per_patient *= profile.cost_scale;
    }
    for activity in &mut scenario.activities {
        activity.duration = activity.duration.scaled(profile.activity_duration_scale);
        activity.cost *= profile.cost_scale;
    }
    for transition in &mut scenario.patient_flow.transitions {
        transition.cost *= profile.cost_scale;
    }

    scenario.validate()?;
    debug!(trial = %trial.name, scenario = %profile.name, "scenario applied");
    Ok(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlowTransition, PatientFlow, Site};

    fn trial() -> Trial {
        let flow = PatientFlow::new("enrolled")
            .terminal("done")
            .transition(
                FlowTransition::new("enrolled", "done", 1.0, Distribution::fixed(30.0))
                    .with_cost(200.0),
            );
        Trial::new("base", 50, flow).with_site(
            Site::new(
                "site-a",
                Distribution::triangular(30.0, 45.0, 90.0),
                Distribution::fixed(0.5),
            )
            .with_costs(10_000.0, 1_000.0),
        )
    }

    #[test]
    fn scaling_produces_new_trial_and_leaves_original() {
        let base = trial();
        let profile = ScenarioProfile::new("slow-startup")
            .with_activation_time_scale(1.2)
            .with_cost_scale(2.0);
        let scenario = apply_scenario(&base, &profile).expect("valid scenario");

        assert_eq!(base.sites[0].activation_time, Distribution::triangular(30.0, 45.0, 90.0));
        assert_eq!(
            scenario.sites[0].activation_time,
            Distribution::triangular(36.0, 54.0, 108.0)
        );
        assert_eq!(scenario.sites[0].activation_cost, 20_000.0);
        assert_eq!(scenario.patient_flow.transitions[0].cost, 400.0);
        assert_eq!(scenario.target_enrollment, 50);
    }

    #[test]
    fn overrides_replace_before_scaling() {
        let profile = ScenarioProfile::new("fast-site")
            .with_site_activation("site-a", Distribution::fixed(10.0))
            .with_activation_time_scale(2.0)
            .with_target_enrollment(20);
        let scenario = apply_scenario(&trial(), &profile).expect("valid scenario");
        assert_eq!(scenario.sites[0].activation_time, Distribution::fixed(20.0));
        assert_eq!(scenario.target_enrollment, 20);
    }

    #[test]
    fn bad_profiles_are_validation_errors() {
        let zero_scale = ScenarioProfile::new("zero").with_enrollment_rate_scale(0.0);
        assert!(matches!(
            apply_scenario(&trial(), &zero_scale),
            Err(ValidationError::InvalidScenario { .. })
        ));
        let ghost = ScenarioProfile::new("ghost")
            .with_site_activation("nowhere", Distribution::fixed(1.0));
        assert!(apply_scenario(&trial(), &ghost).is_err());
        let zero_target = ScenarioProfile::new("empty").with_target_enrollment(0);
        assert!(apply_scenario(&trial(), &zero_target).is_err());
    }

    #[test]
    fn profile_reads_from_dict_with_defaults() {
        let profile = ScenarioProfile::from_dict(serde_json::json!({
            "name": "delayed",
            "activation_time_scale": 1.2
        }))
        .expect("deserialize");
        assert_eq!(profile.activation_time_scale, 1.2);
        assert_eq!(profile.cost_scale, 1.0);
        assert!(profile.site_activation_overrides.is_empty());
    }
}
