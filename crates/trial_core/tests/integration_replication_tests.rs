mod support;

use support::{completion_times, p90, run_many, to_json};
use trial_core::constraints::{BudgetConstraint, Constraint, PredecessorConstraint};
use trial_core::curves::NoCapacityDegradation;
use trial_core::telemetry::{
    EVENTS_EXECUTED, EVENTS_PROCESSED, PATIENTS_ENROLLED, PATIENTS_RESOLVED, SITES_ACTIVATED,
};
use trial_core::test_helpers::{multi_site_trial, single_site_trial, standard_constraints};

#[test]
fn same_seed_same_results() {
    let trial = multi_site_trial();
    let constraints = standard_constraints(1_500_000.0, 0.5).expect("constraints");
    let first = to_json(&run_many(&trial, &constraints, 20, 42));
    let second = to_json(&run_many(&trial, &constraints, 20, 42));
    assert_eq!(first, second);
}

#[test]
fn different_master_seeds_diverge() {
    let trial = single_site_trial();
    let a = completion_times(&run_many(&trial, &[], 10, 1));
    let b = completion_times(&run_many(&trial, &[], 10, 2));
    assert_ne!(a, b);
}

#[test]
fn every_run_reaches_target_and_resolves_patients() {
    let trial = multi_site_trial();
    let constraints = standard_constraints(5_000_000.0, 0.5).expect("constraints");
    for result in run_many(&trial, &constraints, 10, 7) {
        let run = result.expect("run succeeds");
        assert!(run.enrollment_complete);
        let metrics = &run.metrics_snapshot;
        assert_eq!(metrics.get(PATIENTS_ENROLLED), 60);
        assert_eq!(metrics.get(PATIENTS_RESOLVED), 60);
        assert_eq!(metrics.get(SITES_ACTIVATED), 3);
        assert!(metrics.get(EVENTS_PROCESSED) >= metrics.get(EVENTS_EXECUTED));
        let terminal: u64 = ["completed", "screen_failed", "dropped_out"]
            .iter()
            .map(|s| metrics.get(&format!("patients_terminal.{s}")))
            .sum();
        assert_eq!(terminal, 60);
    }
}

#[test]
fn sites_wait_for_protocol_approval() {
    let trial = multi_site_trial();
    let constraints = standard_constraints(5_000_000.0, 0.5).expect("constraints");
    let run = run_many(&trial, &constraints, 1, 11)
        .pop()
        .expect("one run")
        .expect("run succeeds");
    let approval_end = run
        .timeline
        .iter()
        .find(|e| e.entity_id == "protocol-approval" && e.is_executed())
        .map(|e| e.end)
        .expect("approval executed");
    let executed_sites = run
        .timeline
        .iter()
        .filter(|e| e.entity_id.starts_with("site-") && e.is_executed());
    for entry in executed_sites {
        if entry.kind == trial_core::clock::EventKind::SiteActivation {
            assert!(entry.start >= approval_end);
        }
    }
}

#[test]
fn timeline_is_ordered_by_start_time() {
    let trial = multi_site_trial();
    let constraints = standard_constraints(5_000_000.0, 0.5).expect("constraints");
    let run = run_many(&trial, &constraints, 1, 3)
        .pop()
        .expect("one run")
        .expect("run succeeds");
    assert!(run.timeline.windows(2).all(|w| w[0].start <= w[1].start));
    for entry in run.timeline.iter().filter(|e| e.is_executed()) {
        assert!(entry.multiplier >= 1.0);
        assert!(entry.end >= entry.start);
    }
}

#[test]
fn no_degradation_curve_matches_omitting_the_constraint() {
    let trial = multi_site_trial();
    let without: Vec<Constraint> = vec![PredecessorConstraint::new().into()];
    let with: Vec<Constraint> = vec![
        PredecessorConstraint::new().into(),
        BudgetConstraint::builder(1.0)
            .response_curve(NoCapacityDegradation)
            .build()
            .expect("constraint")
            .into(),
    ];
    assert_eq!(
        to_json(&run_many(&trial, &without, 25, 42)),
        to_json(&run_many(&trial, &with, 25, 42))
    );
}

#[test]
fn harsher_calibration_does_not_lower_p90() {
    let trial = multi_site_trial();
    for budget in [300_000.0, 400_000.0] {
        let gentle = standard_constraints(budget, 0.5).expect("constraints");
        let harsh = standard_constraints(budget, 0.2).expect("constraints");
        for master_seed in [42, 7, 2024] {
            let gentle_p90 = p90(completion_times(&run_many(&trial, &gentle, 30, master_seed)));
            let harsh_p90 = p90(completion_times(&run_many(&trial, &harsh, 30, master_seed)));
            assert!(
                harsh_p90 >= gentle_p90,
                "budget {budget}, seed {master_seed}: harsh {harsh_p90} < gentle {gentle_p90}"
            );
        }
    }
}
