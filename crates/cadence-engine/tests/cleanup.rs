//! Effect records never outlive their tick.

use cadence_core::{PartitionId, Tick};
use cadence_engine::Roster;
use cadence_test_utils::{
    read_entries, standard_registry, Harness, RouteActor, APPEND_KIND, ROUTE_KIND,
};

#[test]
fn orphaned_effects_are_discarded_unapplied() {
    let roster = Roster::new()
        .with_partition("p1", APPEND_KIND)
        .with_actor("a1", ROUTE_KIND)
        .with_actor("a2", ROUTE_KIND);
    let routes = RouteActor::new()
        .route("a1", "p1", ["kept"])
        .route("a2", "gone", ["lost"]);
    let mut harness = Harness::new(standard_registry(routes));
    harness.spawn_processors(1).spawn_runners(2);
    harness.seed(&roster);

    let report = harness.driver(roster).run_tick().unwrap();

    assert_eq!(report.orphaned, vec![PartitionId::new("gone")]);
    assert_eq!(report.metrics.orphaned_effects, 1);
    assert!(!report.contributions.contains_key(&PartitionId::new("gone")));
    assert!(harness.store.inner().keys_with_prefix("effect/").is_empty());
    assert!(harness.partition_state("gone").is_none());
    assert_eq!(
        read_entries(&harness.partition_state("p1").unwrap()),
        ["a1:kept"]
    );
}

#[test]
fn failed_deletes_do_not_hold_the_tick_back() {
    let roster = Roster::new()
        .with_partition("p1", APPEND_KIND)
        .with_actor("a1", ROUTE_KIND);
    let routes = RouteActor::new().route("a1", "p1", ["x"]);
    let mut harness = Harness::new(standard_registry(routes));
    harness.spawn_processors(1).spawn_runners(1);
    harness.seed(&roster);
    harness.store.fail_deletes("effect/");

    let mut driver = harness.driver(roster);
    let report = driver.run_tick().unwrap();
    assert_eq!(report.metrics.cleanup_failures, 1);
    assert_eq!(report.metrics.effects_deleted, 0);
    assert_eq!(report.next_tick, Tick(2));

    // the leftover record is keyed by its tick, so the next tick is unaffected
    harness.store.heal();
    let report = driver.run_tick().unwrap();
    assert_eq!(report.metrics.effects_deleted, 1);
    assert_eq!(
        harness.store.inner().keys_with_prefix("effect/"),
        vec!["effect/1/p1/a1".to_owned()]
    );
}
