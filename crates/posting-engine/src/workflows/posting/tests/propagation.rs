use rust_decimal_macros::dec;

use super::common::*;
use crate::workflows::posting::domain::{LocationCategory, SchoolId};
use crate::workflows::posting::repository::PostingRepository;
use crate::workflows::posting::PropagationReport;

#[test]
fn primary_posting_creates_zero_allowance_dependent() {
    let (service, store) = build_service();

    let outcome = service
        .create_posting(&session_id(), request("sup-1", "school-a", 1, 1))
        .expect("posting created");

    assert!(outcome.posting.is_primary);
    assert_eq!(outcome.dependents.len(), 1);
    assert!(outcome.propagation_failures.is_empty());

    let dependent = &outcome.dependents[0];
    assert_eq!(dependent.slot, slot("school-b", 2, 1));
    assert!(!dependent.is_primary);
    assert_eq!(dependent.merged_with_posting_id, Some(outcome.posting.id));
    assert_eq!(dependent.supervisor_id, outcome.posting.supervisor_id);
    assert!(dependent.allowance.is_zero());
    assert_eq!(dependent.allowance.distance_km, dec!(20));
    assert_eq!(
        dependent.allowance.location_category,
        LocationCategory::Outside
    );
    assert!(dependent.other_allowances.is_empty());

    let stored = store
        .active_in_slot(&slot("school-b", 2, 1))
        .expect("lookup runs")
        .expect("dependent stored");
    assert_eq!(stored.id, dependent.id);
}

#[test]
fn repropagation_is_idempotent() {
    let (service, store) = build_service();
    let outcome = service
        .create_posting(&session_id(), request("sup-1", "school-a", 1, 1))
        .expect("posting created");

    let report = service
        .propagate_merged_groups(outcome.posting.id)
        .expect("propagation runs");

    assert!(report.created.is_empty());
    assert_eq!(report.skipped, vec![slot("school-b", 2, 1)]);
    assert_eq!(store.snapshot().expect("snapshot").len(), 2);
}

#[test]
fn propagation_is_one_hop() {
    let inst = institution();
    let reference = reference_data()
        .with_approved_students(&inst, &session_id(), &SchoolId::new("school-c"), 3, 2)
        .with_merged_group(&inst, merged("school-b", 2, "school-c", 3));
    let (service, _) = build_service_with(reference);

    let outcome = service
        .create_posting(&session_id(), request("sup-1", "school-a", 1, 1))
        .expect("posting created");

    let slots: Vec<_> = outcome
        .dependents
        .iter()
        .map(|posting| posting.slot.clone())
        .collect();
    assert_eq!(slots, vec![slot("school-b", 2, 1)]);
}

#[test]
fn inactive_links_are_ignored() {
    let inst = institution();
    let mut link = merged("school-c", 1, "school-x", 3);
    link.active = false;
    let (service, _) = build_service_with(reference_data().with_merged_group(&inst, link));

    let outcome = service
        .create_posting(&session_id(), request("sup-1", "school-c", 1, 1))
        .expect("posting created");

    assert!(outcome.dependents.is_empty());
    assert!(outcome.propagation_failures.is_empty());
}

#[test]
fn unlinked_secondary_school_is_reported_beside_success() {
    let inst = institution();
    let reference = reference_data().with_merged_group(&inst, merged("school-c", 1, "school-z", 1));
    let (service, store) = build_service_with(reference);

    let outcome = service
        .create_posting(&session_id(), request("sup-2", "school-c", 1, 1))
        .expect("primary survives propagation failure");

    assert!(outcome.dependents.is_empty());
    assert_eq!(outcome.propagation_failures.len(), 1);
    let failure = &outcome.propagation_failures[0];
    assert_eq!(failure.primary_posting_id, outcome.posting.id);
    assert_eq!(failure.secondary_school_id, Some(SchoolId::new("school-z")));
    assert!(failure.reason.contains("not linked"));
    assert_eq!(store.snapshot().expect("snapshot").len(), 1);
}

#[test]
fn occupied_secondary_slot_is_skipped() {
    let (service, store) = build_service();
    let existing = seed_posting(&store, &bello(), "school-b", 2, 1);

    let outcome = service
        .create_posting(&session_id(), request("sup-1", "school-a", 1, 1))
        .expect("posting created");

    assert!(outcome.dependents.is_empty());
    let holder = store
        .active_in_slot(&slot("school-b", 2, 1))
        .expect("lookup runs")
        .expect("slot still held");
    assert_eq!(holder.id, existing.id);
}

#[test]
fn cancelled_primary_keeps_dependents_and_stops_propagating() {
    let (service, store) = build_service();
    let outcome = service
        .create_posting(&session_id(), request("sup-1", "school-a", 1, 2))
        .expect("posting created");
    assert_eq!(outcome.dependents.len(), 1);
    service
        .cancel_posting(outcome.posting.id)
        .expect("cancel succeeds");

    let report = service
        .propagate_merged_groups(outcome.posting.id)
        .expect("propagation runs");

    assert_eq!(report, PropagationReport::default());
    let dependent = store
        .active_in_slot(&slot("school-b", 2, 2))
        .expect("lookup runs")
        .expect("dependent left active");
    assert_eq!(dependent.id, outcome.dependents[0].id);
}
