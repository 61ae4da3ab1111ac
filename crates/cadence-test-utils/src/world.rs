//! Seeded random worlds and the standard fixture registry.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use cadence_engine::{LogicRegistry, Roster};

use crate::fixtures::{
    AppendPartition, CountingPartition, FailingActor, RouteActor, APPEND_KIND, COUNTING_KIND,
    FAILING_KIND, ROUTE_KIND,
};

/// A registry holding every fixture, with `routes` as the route actor.
pub fn standard_registry(routes: RouteActor) -> LogicRegistry {
    LogicRegistry::new()
        .with_actor(ROUTE_KIND, Arc::new(routes))
        .with_actor(FAILING_KIND, Arc::new(FailingActor))
        .with_partition(APPEND_KIND, Arc::new(AppendPartition))
        .with_partition(COUNTING_KIND, Arc::new(CountingPartition))
}

/// A reproducible world of `actors` route actors and `partitions` append
/// partitions. Each actor routes one to three stamped payloads to each of
/// zero to two random partitions.
pub fn random_world(seed: u64, actors: usize, partitions: usize) -> (Roster, RouteActor) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut roster = Roster::new();
    for p in 0..partitions {
        roster = roster.with_partition(format!("p{p:03}"), APPEND_KIND);
    }

    let mut routes = RouteActor::new().stamped();
    for a in 0..actors {
        let actor = format!("a{a:03}");
        roster = roster.with_actor(actor.as_str(), ROUTE_KIND);
        if partitions == 0 {
            continue;
        }
        let targets = rng.random_range(0..=2);
        for t in 0..targets {
            let partition = format!("p{:03}", rng.random_range(0..partitions));
            let count = rng.random_range(1..=3);
            let payloads = (0..count).map(|i| format!("e{a}.{t}.{i}"));
            routes = routes.route(&actor, &partition, payloads);
        }
    }
    (roster, routes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_world() {
        let (roster_a, _) = random_world(7, 20, 5);
        let (roster_b, _) = random_world(7, 20, 5);
        assert_eq!(roster_a, roster_b);
        assert_eq!(roster_a.actor_count(), 20);
        assert_eq!(roster_a.partition_count(), 5);
    }

    #[test]
    fn standard_registry_covers_random_worlds() {
        let (roster, routes) = random_world(3, 10, 4);
        assert!(standard_registry(routes).check_roster(&roster).is_ok());
    }
}
