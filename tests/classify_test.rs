//! Classifier behaviour: membership detection, health transitions, filtering.

use std::collections::BTreeSet;

use governor_broker::classify::classify;
use governor_broker::model::{Delta, DomainEvent, WorkloadStatus};
use governor_broker::snapshot::ActiveUnits;

const GOVERNOR: &str = "governor-charm";

fn known(units: &[&str]) -> BTreeSet<String> {
    units.iter().map(|u| u.to_string()).collect()
}

fn change(unit: &str, status: WorkloadStatus, message: &str) -> Delta {
    Delta::unit_change(unit, status, message)
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[test]
fn new_unit_reported_once_per_batch() {
    let mut seen = known(&["app/0"]);
    let mut active = ActiveUnits::from_iter(["app/0"]);

    let mut events = Vec::new();
    for _ in 0..2 {
        events.extend(classify(
            &change("app/1", WorkloadStatus::Active, ""),
            GOVERNOR,
            &mut seen,
            &mut active,
        ));
    }

    assert_eq!(
        events,
        vec![DomainEvent::UnitAdded {
            unit_name: "app/1".to_string()
        }]
    );
    assert_eq!(active, ActiveUnits::from_iter(["app/0", "app/1"]));
}

#[test]
fn known_unit_change_is_not_an_addition() {
    let mut seen = known(&["app/0"]);
    let mut active = ActiveUnits::new();

    let events = classify(
        &change("app/0", WorkloadStatus::Active, ""),
        GOVERNOR,
        &mut seen,
        &mut active,
    );
    assert!(events.is_empty());
    assert!(active.contains("app/0"));
}

#[test]
fn new_blocked_unit_reports_addition_then_status() {
    let mut seen = BTreeSet::new();
    let mut active = ActiveUnits::new();

    let events = classify(
        &change("app/2", WorkloadStatus::Blocked, "no relation"),
        GOVERNOR,
        &mut seen,
        &mut active,
    );
    assert_eq!(
        events,
        vec![
            DomainEvent::UnitAdded {
                unit_name: "app/2".to_string()
            },
            DomainEvent::UnitBlocked {
                unit_name: "app/2".to_string(),
                was_active: false,
                message: "no relation".to_string(),
            },
        ]
    );
}

#[test]
fn remove_always_reports_removal() {
    for mut active in [ActiveUnits::from_iter(["app/0"]), ActiveUnits::new()] {
        let mut seen = known(&["app/0"]);
        let events = classify(&Delta::unit_remove("app/0"), GOVERNOR, &mut seen, &mut active);
        assert_eq!(
            events,
            vec![DomainEvent::UnitRemoved {
                unit_name: "app/0".to_string()
            }]
        );
    }
}

#[test]
fn remove_leaves_active_snapshot_untouched() {
    let mut seen = known(&["app/0"]);
    let mut active = ActiveUnits::from_iter(["app/0"]);

    classify(&Delta::unit_remove("app/0"), GOVERNOR, &mut seen, &mut active);
    assert!(active.contains("app/0"));

    // A unit reusing the name inherits the stale entry.
    let events = classify(
        &change("app/0", WorkloadStatus::Error, "hook failed"),
        GOVERNOR,
        &mut seen,
        &mut active,
    );
    assert!(events.contains(&DomainEvent::UnitError {
        unit_name: "app/0".to_string(),
        was_active: true,
        message: "hook failed".to_string(),
    }));
}

// ---------------------------------------------------------------------------
// Health transitions
// ---------------------------------------------------------------------------

#[test]
fn blocked_active_unit_reports_was_active() {
    let mut seen = known(&["app/0"]);
    let mut active = ActiveUnits::from_iter(["app/0"]);

    let events = classify(
        &change("app/0", WorkloadStatus::Blocked, "oom"),
        GOVERNOR,
        &mut seen,
        &mut active,
    );
    assert_eq!(
        events,
        vec![DomainEvent::UnitBlocked {
            unit_name: "app/0".to_string(),
            was_active: true,
            message: "oom".to_string(),
        }]
    );
    assert!(active.is_empty());
}

#[test]
fn repeated_degraded_status_reports_was_not_active() {
    for status in [WorkloadStatus::Blocked, WorkloadStatus::Error] {
        let mut seen = known(&["app/0"]);
        let mut active = ActiveUnits::from_iter(["app/0"]);

        let first = classify(&change("app/0", status.clone(), "x"), GOVERNOR, &mut seen, &mut active);
        let second = classify(&change("app/0", status.clone(), "x"), GOVERNOR, &mut seen, &mut active);

        let was_active = |events: &[DomainEvent]| match events {
            [DomainEvent::UnitBlocked { was_active, .. }] | [DomainEvent::UnitError { was_active, .. }] => {
                *was_active
            }
            other => panic!("unexpected events {other:?}"),
        };
        assert!(was_active(&first));
        assert!(!was_active(&second));
        assert!(active.is_empty());
    }
}

#[test]
fn recovery_to_active_emits_nothing() {
    let mut seen = known(&["app/0"]);
    let mut active = ActiveUnits::new();

    let events = classify(
        &change("app/0", WorkloadStatus::Active, ""),
        GOVERNOR,
        &mut seen,
        &mut active,
    );
    assert!(events.is_empty());
    assert!(active.contains("app/0"));
}

#[test]
fn unrecognized_status_is_a_no_op() {
    let mut seen = known(&["app/0"]);
    let mut active = ActiveUnits::from_iter(["app/0"]);

    let events = classify(
        &change("app/0", WorkloadStatus::Other("maintenance".to_string()), "upgrading"),
        GOVERNOR,
        &mut seen,
        &mut active,
    );
    assert!(events.is_empty());
    assert!(active.contains("app/0"));
}

#[test]
fn last_delta_in_batch_wins_on_snapshot() {
    let mut seen = known(&["app/0"]);
    let mut active = ActiveUnits::new();

    let mut events = Vec::new();
    for status in [WorkloadStatus::Active, WorkloadStatus::Error, WorkloadStatus::Active] {
        events.extend(classify(&change("app/0", status, ""), GOVERNOR, &mut seen, &mut active));
    }

    assert_eq!(
        events,
        vec![DomainEvent::UnitError {
            unit_name: "app/0".to_string(),
            was_active: true,
            message: String::new(),
        }]
    );
    assert!(active.contains("app/0"));
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

#[test]
fn governor_units_are_ignored() {
    let mut seen = BTreeSet::new();
    let mut active = ActiveUnits::new();

    for delta in [
        change("governor-charm/0", WorkloadStatus::Blocked, "x"),
        Delta::unit_remove("governor-charm/1"),
    ] {
        assert!(classify(&delta, GOVERNOR, &mut seen, &mut active).is_empty());
    }
    assert!(seen.is_empty());
}

#[test]
fn non_unit_entities_are_ignored() {
    let mut seen = BTreeSet::new();
    let mut active = ActiveUnits::new();

    let mut delta = change("app/0", WorkloadStatus::Blocked, "x");
    delta.entity_kind = "application".to_string();

    assert!(classify(&delta, GOVERNOR, &mut seen, &mut active).is_empty());
    assert!(seen.is_empty());
}
