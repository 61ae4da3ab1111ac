//! Kind registry and the active roster.
//!
//! Queue items carry a [`KindTag`]; workers resolve it through a
//! [`LogicRegistry`] built once at startup. The [`Roster`] is the driver's
//! list of active actors and partitions with their kinds.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use cadence_core::keys::partition_key;
use cadence_core::{ActorId, ActorLogic, DurableStore, KindTag, PartitionId, PartitionLogic};

use crate::config::ConfigError;

/// Maps kind tags to actor logic and partition logic.
#[derive(Clone, Default)]
pub struct LogicRegistry {
    actors: IndexMap<KindTag, Arc<dyn ActorLogic>>,
    partitions: IndexMap<KindTag, Arc<dyn PartitionLogic>>,
}

impl LogicRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the logic run for actors of `kind`. Replaces any earlier entry.
    pub fn with_actor(mut self, kind: impl Into<KindTag>, logic: Arc<dyn ActorLogic>) -> Self {
        self.actors.insert(kind.into(), logic);
        self
    }

    /// Register the apply logic for partitions of `kind`. Replaces any
    /// earlier entry.
    pub fn with_partition(
        mut self,
        kind: impl Into<KindTag>,
        logic: Arc<dyn PartitionLogic>,
    ) -> Self {
        self.partitions.insert(kind.into(), logic);
        self
    }

    /// Logic for actors of `kind`.
    pub fn actor(&self, kind: &KindTag) -> Option<&Arc<dyn ActorLogic>> {
        self.actors.get(kind)
    }

    /// Apply logic for partitions of `kind`.
    pub fn partition(&self, kind: &KindTag) -> Option<&Arc<dyn PartitionLogic>> {
        self.partitions.get(kind)
    }

    /// Check that every kind `roster` uses is registered.
    pub fn check_roster(&self, roster: &Roster) -> Result<(), ConfigError> {
        if let Some(kind) = roster.actors.values().find(|k| !self.actors.contains_key(*k)) {
            return Err(ConfigError::UnregisteredKind {
                role: "actor",
                kind: kind.clone(),
            });
        }
        if let Some(kind) = roster
            .partitions
            .values()
            .find(|k| !self.partitions.contains_key(*k))
        {
            return Err(ConfigError::UnregisteredKind {
                role: "partition",
                kind: kind.clone(),
            });
        }
        Ok(())
    }
}

/// Active actors and partitions, each with its kind.
///
/// Insertion order is dispatch order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Roster {
    actors: IndexMap<ActorId, KindTag>,
    partitions: IndexMap<PartitionId, KindTag>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or re-kind) an active actor.
    pub fn with_actor(mut self, actor: impl Into<ActorId>, kind: impl Into<KindTag>) -> Self {
        self.actors.insert(actor.into(), kind.into());
        self
    }

    /// Add (or re-kind) an active partition.
    pub fn with_partition(
        mut self,
        partition: impl Into<PartitionId>,
        kind: impl Into<KindTag>,
    ) -> Self {
        self.partitions.insert(partition.into(), kind.into());
        self
    }

    /// Add (or re-kind) an active actor in place.
    pub fn insert_actor(&mut self, actor: impl Into<ActorId>, kind: impl Into<KindTag>) {
        self.actors.insert(actor.into(), kind.into());
    }

    /// Add (or re-kind) an active partition in place.
    pub fn insert_partition(
        &mut self,
        partition: impl Into<PartitionId>,
        kind: impl Into<KindTag>,
    ) {
        self.partitions.insert(partition.into(), kind.into());
    }

    /// Remove an actor from the active set. Returns whether it was present.
    pub fn remove_actor(&mut self, actor: &ActorId) -> bool {
        self.actors.shift_remove(actor).is_some()
    }

    /// Remove a partition from the active set. Returns whether it was present.
    pub fn remove_partition(&mut self, partition: &PartitionId) -> bool {
        self.partitions.shift_remove(partition).is_some()
    }

    /// Active actors with their kinds, in dispatch order.
    pub fn actors(&self) -> impl Iterator<Item = (&ActorId, &KindTag)> {
        self.actors.iter()
    }

    /// Active partitions with their kinds, in dispatch order.
    pub fn partitions(&self) -> impl Iterator<Item = (&PartitionId, &KindTag)> {
        self.partitions.iter()
    }

    /// Whether `partition` is active.
    pub fn has_partition(&self, partition: &PartitionId) -> bool {
        self.partitions.contains_key(partition)
    }

    /// Number of active actors.
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Number of active partitions.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Check that every active partition has state in `store`. Phase A
    /// cannot process a partition that was never seeded.
    pub fn check_seeded(&self, store: &dyn DurableStore) -> Result<(), ConfigError> {
        for partition in self.partitions.keys() {
            let state = store
                .load_optional(&partition_key(partition))
                .map_err(|e| ConfigError::StoreUnavailable {
                    reason: e.to_string(),
                })?;
            if state.is_none() {
                return Err(ConfigError::UnseededPartition {
                    partition: partition.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A [`Roster`] shared between the driver and the host.
///
/// The driver takes a snapshot at the start of every tick; changes made
/// mid-tick take effect on the next one.
#[derive(Clone, Debug, Default)]
pub struct SharedRoster(Arc<Mutex<Roster>>);

impl SharedRoster {
    /// Share `roster`.
    pub fn new(roster: Roster) -> Self {
        Self(Arc::new(Mutex::new(roster)))
    }

    /// Copy of the current roster.
    pub fn snapshot(&self) -> Roster {
        self.0.lock().expect("roster poisoned").clone()
    }

    /// Change the roster in place, unchecked.
    ///
    /// A kind with no registered logic, or a partition with no stored
    /// state, stalls the next tick. A running pipeline should go through
    /// [`Pipeline::update_roster`](crate::Pipeline::update_roster), which
    /// checks both.
    pub fn update<R>(&self, f: impl FnOnce(&mut Roster) -> R) -> R {
        f(&mut self.0.lock().expect("roster poisoned"))
    }

    /// Apply `f` to a copy of the roster and commit it only if `check`
    /// accepts the result. On error the roster is unchanged.
    pub fn try_update<R, E>(
        &self,
        f: impl FnOnce(&mut Roster) -> R,
        check: impl FnOnce(&Roster) -> Result<(), E>,
    ) -> Result<R, E> {
        let mut roster = self.0.lock().expect("roster poisoned");
        let mut next = roster.clone();
        let out = f(&mut next);
        check(&next)?;
        *roster = next;
        Ok(out)
    }
}

impl From<Roster> for SharedRoster {
    fn from(roster: Roster) -> Self {
        Self::new(roster)
    }
}
