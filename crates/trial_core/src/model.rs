//! Trial entity model: immutable specifications consumed by the engine.
//!
//! Entities reference [Distribution]s but never sample them. The engine pulls
//! the distribution out and samples it with a seed it derived itself.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::distributions::Distribution;
use crate::error::ValidationError;

const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Plain-data conversion to and from a JSON object.
pub trait DictRepr: Serialize + DeserializeOwned + Sized {
    fn to_dict(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn from_dict(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Units of a resource held for the duration of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDemand {
    pub resource_id: String,
    pub units: f64,
}

impl ResourceDemand {
    pub fn new(resource_id: impl Into<String>, units: f64) -> Self {
        Self {
            resource_id: resource_id.into(),
            units,
        }
    }
}

/// A shared pool with finite capacity (monitors, pharmacy slots, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub capacity: f64,
}

impl Resource {
    pub fn new(id: impl Into<String>, capacity: f64) -> Self {
        Self {
            id: id.into(),
            capacity,
        }
    }
}

/// A recruiting site. Times are in days, rates in patients per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub activation_time: Distribution,
    pub enrollment_rate: Distribution,
    #[serde(default)]
    pub activation_cost: f64,
    #[serde(default)]
    pub cost_per_patient: f64,
    /// Entities (sites or activities) that must finish before activation starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub demands: Vec<ResourceDemand>,
}

impl Site {
    pub fn new(
        id: impl Into<String>,
        activation_time: Distribution,
        enrollment_rate: Distribution,
    ) -> Self {
        Self {
            id: id.into(),
            activation_time,
            enrollment_rate,
            activation_cost: 0.0,
            cost_per_patient: 0.0,
            depends_on: Vec::new(),
            demands: Vec::new(),
        }
    }

    pub fn with_costs(mut self, activation_cost: f64, cost_per_patient: f64) -> Self {
        self.activation_cost = activation_cost;
        self.cost_per_patient = cost_per_patient;
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn with_demand(mut self, demand: ResourceDemand) -> Self {
        self.demands.push(demand);
        self
    }
}

/// A trial-level task (protocol approval, database lock, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub duration: Distribution,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub earliest_start: f64,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub demands: Vec<ResourceDemand>,
}

impl Activity {
    pub fn new(id: impl Into<String>, duration: Distribution) -> Self {
        Self {
            id: id.into(),
            duration,
            cost: 0.0,
            earliest_start: 0.0,
            depends_on: Vec::new(),
            demands: Vec::new(),
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_earliest_start(mut self, day: f64) -> Self {
        self.earliest_start = day;
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn with_demand(mut self, demand: ResourceDemand) -> Self {
        self.demands.push(demand);
        self
    }
}

/// One edge of the patient-flow state machine. `duration` is the dwell time
/// in `from` before the patient reaches `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTransition {
    pub from: String,
    pub to: String,
    pub probability: f64,
    pub duration: Distribution,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub demands: Vec<ResourceDemand>,
}

impl FlowTransition {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        probability: f64,
        duration: Distribution,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            probability,
            duration,
            cost: 0.0,
            demands: Vec::new(),
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_demand(mut self, demand: ResourceDemand) -> Self {
        self.demands.push(demand);
        self
    }
}

/// Patient state machine from enrollment to a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientFlow {
    pub initial_state: String,
    pub terminal_states: Vec<String>,
    pub transitions: Vec<FlowTransition>,
}

impl PatientFlow {
    pub fn new(initial_state: impl Into<String>) -> Self {
        Self {
            initial_state: initial_state.into(),
            terminal_states: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn terminal(mut self, state: impl Into<String>) -> Self {
        self.terminal_states.push(state.into());
        self
    }

    pub fn transition(mut self, transition: FlowTransition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn is_terminal(&self, state: &str) -> bool {
        self.terminal_states.iter().any(|s| s == state)
    }

    /// Pick the outgoing transition selected by a uniform draw `u` in `[0, 1)`.
    pub fn choose(&self, state: &str, u: f64) -> Option<&FlowTransition> {
        let mut cumulative = 0.0;
        let mut last = None;
        for transition in self.transitions.iter().filter(|t| t.from == state) {
            cumulative += transition.probability;
            last = Some(transition);
            if u < cumulative {
                return Some(transition);
            }
        }
        // Rounding can leave the cumulative sum a hair under 1.0.
        last
    }

    fn validate(&self, known_resources: &BTreeSet<&str>) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidPatientFlow { reason };

        let mut states: BTreeSet<&str> = BTreeSet::new();
        states.insert(self.initial_state.as_str());
        for transition in &self.transitions {
            states.insert(transition.from.as_str());
            states.insert(transition.to.as_str());
        }
        if self.terminal_states.is_empty() {
            return Err(invalid("at least one terminal state is required".to_string()));
        }

        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
        for (index, transition) in self.transitions.iter().enumerate() {
            let entity = format!("transition {} -> {}", transition.from, transition.to);
            if self.is_terminal(&transition.from) {
                return Err(invalid(format!(
                    "terminal state `{}` has an outgoing transition",
                    transition.from
                )));
            }
            if !(0.0..=1.0).contains(&transition.probability) {
                return Err(invalid(format!(
                    "transition #{index} probability {} is outside [0, 1]",
                    transition.probability
                )));
            }
            check_distribution(&entity, "duration", &transition.duration)?;
            check_cost(&entity, "cost", transition.cost)?;
            check_demands(&entity, &transition.demands, known_resources)?;
            *totals.entry(transition.from.as_str()).or_insert(0.0) += transition.probability;
        }

        for state in &states {
            if self.is_terminal(state) {
                continue;
            }
            match totals.get(state) {
                None => {
                    return Err(invalid(format!(
                        "state `{state}` is neither terminal nor has outgoing transitions"
                    )))
                }
                Some(total) if (total - 1.0).abs() > PROBABILITY_TOLERANCE => {
                    return Err(invalid(format!(
                        "outgoing probabilities of `{state}` sum to {total}, expected 1"
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// The full trial specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub name: String,
    pub target_enrollment: u32,
    pub sites: Vec<Site>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    pub patient_flow: PatientFlow,
}

impl DictRepr for Trial {}
impl DictRepr for Site {}
impl DictRepr for Activity {}
impl DictRepr for Resource {}
impl DictRepr for PatientFlow {}

impl Trial {
    pub fn new(name: impl Into<String>, target_enrollment: u32, patient_flow: PatientFlow) -> Self {
        Self {
            name: name.into(),
            target_enrollment,
            sites: Vec::new(),
            activities: Vec::new(),
            resources: Vec::new(),
            patient_flow,
        }
    }

    pub fn with_site(mut self, site: Site) -> Self {
        self.sites.push(site);
        self
    }

    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.activities.push(activity);
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn site(&self, id: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.id == id)
    }

    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.activities.iter().find(|a| a.id == id)
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Dependencies declared by a site or activity.
    pub fn dependencies_of(&self, entity_id: &str) -> &[String] {
        if let Some(site) = self.site(entity_id) {
            return &site.depends_on;
        }
        if let Some(activity) = self.activity(entity_id) {
            return &activity.depends_on;
        }
        &[]
    }

    /// Reject structurally malformed specifications before any event exists.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.target_enrollment == 0 {
            return Err(ValidationError::ZeroTargetEnrollment {
                trial: self.name.clone(),
            });
        }
        if self.sites.is_empty() {
            return Err(ValidationError::NoSites {
                trial: self.name.clone(),
            });
        }

        let mut ids: BTreeSet<&str> = BTreeSet::new();
        let schedulable = self
            .sites
            .iter()
            .map(|s| s.id.as_str())
            .chain(self.activities.iter().map(|a| a.id.as_str()));
        for id in schedulable.chain(self.resources.iter().map(|r| r.id.as_str())) {
            if !ids.insert(id) {
                return Err(ValidationError::DuplicateId { id: id.to_string() });
            }
        }

        let mut resources: BTreeSet<&str> = BTreeSet::new();
        for resource in &self.resources {
            if !(resource.capacity.is_finite() && resource.capacity > 0.0) {
                return Err(ValidationError::InvalidField {
                    entity: resource.id.clone(),
                    field: "capacity",
                    reason: format!("must be positive and finite (got {})", resource.capacity),
                });
            }
            resources.insert(resource.id.as_str());
        }

        for site in &self.sites {
            check_distribution(&site.id, "activation_time", &site.activation_time)?;
            check_distribution(&site.id, "enrollment_rate", &site.enrollment_rate)?;
            check_cost(&site.id, "activation_cost", site.activation_cost)?;
            check_cost(&site.id, "cost_per_patient", site.cost_per_patient)?;
            check_demands(&site.id, &site.demands, &resources)?;
        }
        for activity in &self.activities {
            check_distribution(&activity.id, "duration", &activity.duration)?;
            check_cost(&activity.id, "cost", activity.cost)?;
            if !(activity.earliest_start.is_finite() && activity.earliest_start >= 0.0) {
                return Err(ValidationError::InvalidField {
                    entity: activity.id.clone(),
                    field: "earliest_start",
                    reason: format!("must be a non-negative day (got {})", activity.earliest_start),
                });
            }
            check_demands(&activity.id, &activity.demands, &resources)?;
        }

        self.validate_dependencies()?;
        self.patient_flow.validate(&resources)
    }

    fn validate_dependencies(&self) -> Result<(), ValidationError> {
        let graph: BTreeMap<&str, &[String]> = self
            .sites
            .iter()
            .map(|s| (s.id.as_str(), s.depends_on.as_slice()))
            .chain(
                self.activities
                    .iter()
                    .map(|a| (a.id.as_str(), a.depends_on.as_slice())),
            )
            .collect();

        for (entity, deps) in &graph {
            for dep in deps.iter() {
                if !graph.contains_key(dep.as_str()) {
                    return Err(ValidationError::UnknownDependency {
                        entity: entity.to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // Iterative three-colour DFS.
        let mut done: BTreeSet<&str> = BTreeSet::new();
        for root in graph.keys().copied() {
            if done.contains(root) {
                continue;
            }
            let mut on_path: BTreeSet<&str> = BTreeSet::new();
            let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
            on_path.insert(root);
            while let Some((node, next)) = stack.pop() {
                let deps = graph.get(node).copied().unwrap_or(&[]);
                if let Some(dep) = deps.get(next) {
                    stack.push((node, next + 1));
                    let dep = dep.as_str();
                    if on_path.contains(dep) {
                        return Err(ValidationError::DependencyCycle {
                            entity: dep.to_string(),
                        });
                    }
                    if !done.contains(dep) {
                        on_path.insert(dep);
                        stack.push((dep, 0));
                    }
                } else {
                    on_path.remove(node);
                    done.insert(node);
                }
            }
        }
        Ok(())
    }
}

fn check_distribution(
    entity: &str,
    field: &'static str,
    dist: &Distribution,
) -> Result<(), ValidationError> {
    dist.validate()
        .map_err(|e| ValidationError::InvalidDistribution {
            entity: entity.to_string(),
            field,
            reason: e.to_string(),
        })?;
    if dist.mean() < 0.0 {
        return Err(ValidationError::InvalidDistribution {
            entity: entity.to_string(),
            field,
            reason: format!("mean must be non-negative (got {})", dist.mean()),
        });
    }
    Ok(())
}

fn check_cost(entity: &str, field: &'static str, cost: f64) -> Result<(), ValidationError> {
    if cost.is_finite() && cost >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidField {
            entity: entity.to_string(),
            field,
            reason: format!("must be non-negative and finite (got {cost})"),
        })
    }
}

fn check_demands(
    entity: &str,
    demands: &[ResourceDemand],
    known: &BTreeSet<&str>,
) -> Result<(), ValidationError> {
    for demand in demands {
        if !known.contains(demand.resource_id.as_str()) {
            return Err(ValidationError::UnknownResource {
                entity: entity.to_string(),
                resource: demand.resource_id.clone(),
            });
        }
        if !(demand.units.is_finite() && demand.units > 0.0) {
            return Err(ValidationError::InvalidField {
                entity: entity.to_string(),
                field: "demands",
                reason: format!(
                    "units of `{}` must be positive (got {})",
                    demand.resource_id, demand.units
                ),
            });
        }
    }
    Ok(())
}
