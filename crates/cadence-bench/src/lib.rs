//! Benchmark profiles for the Cadence tick pipeline.
//!
//! - [`reference_profile`]: a fan-in world where every actor writes one
//!   fixed-size effect to one of a handful of partitions.
//! - [`seed_partitions`]: zero every partition's state before the first
//!   tick.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use cadence_core::keys::partition_key;
use cadence_core::{
    ActorContext, ActorError, ActorLogic, ActorOutput, ApplyError, DurableStore, Effect,
    EffectRecord, PartitionContext, PartitionId, PartitionLogic, StoreError,
};
use cadence_engine::{LogicRegistry, Roster};

/// Kind tag for [`Emitter`].
pub const EMITTER_KIND: &str = "emitter";
/// Kind tag for [`Summer`].
pub const SUMMER_KIND: &str = "summer";

/// Emits one 8-byte effect per tick to the partition picked by its name.
pub struct Emitter {
    partitions: Vec<PartitionId>,
}

impl ActorLogic for Emitter {
    fn run(
        &self,
        ctx: &ActorContext<'_>,
        _state: Option<&[u8]>,
        _inputs: &[Vec<u8>],
    ) -> Result<ActorOutput, ActorError> {
        if self.partitions.is_empty() {
            return Ok(ActorOutput::default());
        }
        let hash: usize = ctx.actor.as_str().bytes().map(usize::from).sum();
        let target = self.partitions[hash % self.partitions.len()].clone();
        Ok(ActorOutput {
            effects: vec![Effect::new(target, ctx.tick.0.to_le_bytes().to_vec())],
            state: None,
        })
    }
}

/// Sums effect payloads into a little-endian `u64`.
pub struct Summer;

impl PartitionLogic for Summer {
    fn apply(
        &self,
        _ctx: &mut PartitionContext<'_>,
        state: &mut Vec<u8>,
        effects: &[EffectRecord],
    ) -> Result<(), ApplyError> {
        let mut sum: u64 = state.as_slice().try_into().map(u64::from_le_bytes).unwrap_or(0);
        for e in effects {
            let arr: [u8; 8] = e.payload.as_slice().try_into().map_err(|_| {
                ApplyError::MalformedEffect {
                    producer: e.producer.clone(),
                    reason: "expected 8 bytes".into(),
                }
            })?;
            sum = sum.wrapping_add(u64::from_le_bytes(arr));
        }
        *state = sum.to_le_bytes().to_vec();
        Ok(())
    }
}

/// Build a world of `actors` emitters fanning into `partitions` summers.
pub fn reference_profile(actors: usize, partitions: usize) -> (LogicRegistry, Roster) {
    let ids: Vec<PartitionId> = (0..partitions)
        .map(|p| PartitionId::new(format!("p{p:03}")))
        .collect();
    let mut roster = Roster::new();
    for id in &ids {
        roster = roster.with_partition(id.clone(), SUMMER_KIND);
    }
    for a in 0..actors {
        roster = roster.with_actor(format!("a{a:05}"), EMITTER_KIND);
    }
    let registry = LogicRegistry::new()
        .with_actor(EMITTER_KIND, Arc::new(Emitter { partitions: ids }))
        .with_partition(SUMMER_KIND, Arc::new(Summer));
    (registry, roster)
}

/// Write empty state for every partition in `roster`.
pub fn seed_partitions(store: &dyn DurableStore, roster: &Roster) -> Result<(), StoreError> {
    for (partition, _) in roster.partitions() {
        store.save(&partition_key(partition), &[])?;
    }
    Ok(())
}
