//! Callback points supplied by the domain layer, and the durable store seam.
//!
//! The pipeline never interprets actor state, partition state or effect
//! payloads. Everything a callback needs arrives through its context
//! argument; there is no ambient "current world".

use crate::effect::{Effect, EffectRecord};
use crate::error::{ActorError, ApplyError, StoreError};
use crate::id::{ActorId, PartitionId, Tick};

/// Keyed blob storage shared by every process in the pipeline.
///
/// No versioning beyond what callers encode into keys, and no locking: the
/// one-writer-per-partition-per-tick rule is upheld by the phase protocol.
pub trait DurableStore: Send + Sync {
    /// Load the blob stored under `key`.
    ///
    /// Returns [`StoreError::NotFound`] if nothing is stored there.
    fn load(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Store `data` under `key`, replacing any previous blob.
    fn save(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Remove the blob under `key`. Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Like [`load`](Self::load), but maps `NotFound` to `Ok(None)`.
    fn load_optional(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.load(key) {
            Ok(data) => Ok(Some(data)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Arguments available to an actor-logic callback.
pub struct ActorContext<'a> {
    /// The tick being run.
    pub tick: Tick,
    /// The actor being run.
    pub actor: &'a ActorId,
    /// Read access to durable state. Effects must be returned, not saved.
    pub store: &'a dyn DurableStore,
}

/// What an actor's logic produced for one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActorOutput {
    /// Effects in emission order.
    pub effects: Vec<Effect>,
    /// New actor state to persist, or `None` to leave it untouched.
    pub state: Option<Vec<u8>>,
}

/// Per-actor logic, run once per actor per tick by a runner.
///
/// Must be deterministic given identical inputs.
pub trait ActorLogic: Send + Sync {
    /// Run the actor for `ctx.tick`.
    ///
    /// `state` is the blob previously persisted for this actor, if any;
    /// `inputs` are pending external inputs in arrival order.
    fn run(
        &self,
        ctx: &ActorContext<'_>,
        state: Option<&[u8]>,
        inputs: &[Vec<u8>],
    ) -> Result<ActorOutput, ActorError>;
}

/// Arguments available to a partition-apply callback.
pub struct PartitionContext<'a> {
    tick: Tick,
    partition: &'a PartitionId,
    store: &'a dyn DurableStore,
    updated: bool,
    wake_at: Option<Tick>,
}

impl<'a> PartitionContext<'a> {
    /// Create a context for processing `partition` during `tick`.
    pub fn new(tick: Tick, partition: &'a PartitionId, store: &'a dyn DurableStore) -> Self {
        Self {
            tick,
            partition,
            store,
            updated: false,
            wake_at: None,
        }
    }

    /// The tick being processed.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// The partition being processed.
    pub fn partition(&self) -> &PartitionId {
        self.partition
    }

    /// Read access to durable state. The partition's own state is passed
    /// to the callback directly and must not be saved through this handle.
    pub fn store(&self) -> &dyn DurableStore {
        self.store
    }

    /// Mark the partition as changed, forcing it to be persisted in phase B
    /// even if its bytes are identical.
    pub fn did_update(&mut self) {
        self.updated = true;
    }

    /// Whether [`did_update`](Self::did_update) was called.
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Ask for the per-tick hook to run again no later than `tick`.
    /// Keeps the earliest request.
    pub fn wake_at(&mut self, tick: Tick) {
        self.wake_at = Some(match self.wake_at {
            Some(current) => current.min(tick),
            None => tick,
        });
    }

    /// The earliest wake request made during this tick.
    pub fn requested_wake(&self) -> Option<Tick> {
        self.wake_at
    }
}

/// Partition logic, run by a processor in phase A.
pub trait PartitionLogic: Send + Sync {
    /// Apply `effects` to `state`, in the given order.
    ///
    /// Effects are grouped by producer, producers ascending by actor ID,
    /// each producer's effects in emission order. A payload that cannot be
    /// interpreted must fail with [`ApplyError::MalformedEffect`], never be
    /// skipped.
    fn apply(
        &self,
        ctx: &mut PartitionContext<'_>,
        state: &mut Vec<u8>,
        effects: &[EffectRecord],
    ) -> Result<(), ApplyError>;

    /// Per-tick hook, invoked once after all effects are applied.
    fn tick(&self, ctx: &mut PartitionContext<'_>, state: &mut Vec<u8>) -> Result<(), ApplyError> {
        let _ = (ctx, state);
        Ok(())
    }
}

/// Source of pending external inputs for an actor (e.g. queued player
/// commands).
pub trait InputSource: Send + Sync {
    /// Inputs waiting for `actor` at `tick`, in arrival order.
    fn pending(&self, actor: &ActorId, tick: Tick) -> Vec<Vec<u8>>;
}

/// An [`InputSource`] with nothing pending, ever.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInputs;

impl InputSource for NoInputs {
    fn pending(&self, _actor: &ActorId, _tick: Tick) -> Vec<Vec<u8>> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapStore(Mutex<HashMap<String, Vec<u8>>>);

    impl DurableStore for MapStore {
        fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            self.0
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::NotFound { key: key.into() })
        }
        fn save(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
            self.0.lock().unwrap().insert(key.into(), data.to_vec());
            Ok(())
        }
        fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[test]
    fn load_optional_maps_not_found() {
        let store = MapStore(Mutex::new(HashMap::new()));
        assert_eq!(store.load_optional("actor/a1").unwrap(), None);
        store.save("actor/a1", b"mem").unwrap();
        assert_eq!(store.load_optional("actor/a1").unwrap(), Some(b"mem".to_vec()));
    }

    #[test]
    fn wake_at_keeps_earliest() {
        let store = MapStore(Mutex::new(HashMap::new()));
        let partition = PartitionId::new("p1");
        let mut ctx = PartitionContext::new(Tick(3), &partition, &store);
        assert_eq!(ctx.requested_wake(), None);
        ctx.wake_at(Tick(20));
        ctx.wake_at(Tick(9));
        ctx.wake_at(Tick(15));
        assert_eq!(ctx.requested_wake(), Some(Tick(9)));
        assert!(!ctx.is_updated());
        ctx.did_update();
        assert!(ctx.is_updated());
    }
}
