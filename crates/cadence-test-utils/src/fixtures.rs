//! Reusable actor and partition fixtures.
//!
//! - [`RouteActor`]: emits a fixed table of effects per actor.
//! - [`FailingActor`]: its logic always errors.
//! - [`AppendPartition`]: appends `producer:payload;` for every effect.
//! - [`CountingPartition`]: counts effects and requests a wake-up.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use cadence_core::{
    ActorContext, ActorError, ActorId, ActorLogic, ActorOutput, ApplyError, Effect, EffectRecord,
    PartitionContext, PartitionId, PartitionLogic,
};

/// Kind tag [`standard_registry`](crate::standard_registry) uses for
/// [`RouteActor`].
pub const ROUTE_KIND: &str = "route";
/// Kind tag for [`AppendPartition`].
pub const APPEND_KIND: &str = "append";
/// Kind tag for [`FailingActor`].
pub const FAILING_KIND: &str = "failing";
/// Kind tag for [`CountingPartition`].
pub const COUNTING_KIND: &str = "counting";

/// Emits the effects routed to each actor, in insertion order.
///
/// With [`stamped`](Self::stamped), every payload gets `@<tick>` appended
/// so consecutive ticks produce distinguishable state. Actor state holds
/// the number of runs as a little-endian `u64`.
#[derive(Clone, Debug, Default)]
pub struct RouteActor {
    routes: BTreeMap<ActorId, Vec<(PartitionId, Vec<u8>)>>,
    stamp: bool,
    runs: std::sync::Arc<AtomicUsize>,
}

impl RouteActor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `payloads` from `actor` to `partition`.
    pub fn route<I, S>(mut self, actor: &str, partition: &str, payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.routes.entry(ActorId::new(actor)).or_default();
        for p in payloads {
            entry.push((PartitionId::new(partition), Into::<String>::into(p).into_bytes()));
        }
        self
    }

    /// Route one raw payload, which need not be UTF-8.
    pub fn route_bytes(mut self, actor: &str, partition: &str, payload: &[u8]) -> Self {
        self.routes
            .entry(ActorId::new(actor))
            .or_default()
            .push((PartitionId::new(partition), payload.to_vec()));
        self
    }

    /// Append `@<tick>` to every payload.
    pub fn stamped(mut self) -> Self {
        self.stamp = true;
        self
    }

    /// Total runs across all actors and ticks.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl ActorLogic for RouteActor {
    fn run(
        &self,
        ctx: &ActorContext<'_>,
        state: Option<&[u8]>,
        _inputs: &[Vec<u8>],
    ) -> Result<ActorOutput, ActorError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let effects = self
            .routes
            .get(ctx.actor)
            .map(|routes| {
                routes
                    .iter()
                    .map(|(partition, payload)| {
                        let mut payload = payload.clone();
                        if self.stamp {
                            payload.extend_from_slice(format!("@{}", ctx.tick).as_bytes());
                        }
                        Effect::new(partition.clone(), payload)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let previous = state
            .and_then(|s| s.try_into().ok())
            .map(u64::from_le_bytes)
            .unwrap_or(0);
        Ok(ActorOutput {
            effects,
            state: Some((previous + 1).to_le_bytes().to_vec()),
        })
    }
}

/// Actor logic that always fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingActor;

impl ActorLogic for FailingActor {
    fn run(
        &self,
        ctx: &ActorContext<'_>,
        _state: Option<&[u8]>,
        _inputs: &[Vec<u8>],
    ) -> Result<ActorOutput, ActorError> {
        Err(ActorError::Failed {
            reason: format!("{} refused to act", ctx.actor),
        })
    }
}

/// Appends `producer:payload;` per effect. Rejects payloads that are not
/// UTF-8 as malformed.
#[derive(Clone, Copy, Debug, Default)]
pub struct AppendPartition;

impl PartitionLogic for AppendPartition {
    fn apply(
        &self,
        _ctx: &mut PartitionContext<'_>,
        state: &mut Vec<u8>,
        effects: &[EffectRecord],
    ) -> Result<(), ApplyError> {
        for effect in effects {
            let payload =
                std::str::from_utf8(&effect.payload).map_err(|e| ApplyError::MalformedEffect {
                    producer: effect.producer.clone(),
                    reason: e.to_string(),
                })?;
            state.extend_from_slice(effect.producer.as_str().as_bytes());
            state.push(b':');
            state.extend_from_slice(payload.as_bytes());
            state.push(b';');
        }
        Ok(())
    }
}

/// Keeps a little-endian `u64` count of effects applied, marks itself
/// updated every tick and asks to be woken on the next one.
#[derive(Clone, Copy, Debug, Default)]
pub struct CountingPartition;

impl PartitionLogic for CountingPartition {
    fn apply(
        &self,
        _ctx: &mut PartitionContext<'_>,
        state: &mut Vec<u8>,
        effects: &[EffectRecord],
    ) -> Result<(), ApplyError> {
        let count = match state.as_slice() {
            [] => 0,
            bytes => {
                let arr: [u8; 8] = bytes.try_into().map_err(|_| ApplyError::Rejected {
                    reason: format!("counter state is {} bytes", bytes.len()),
                })?;
                u64::from_le_bytes(arr)
            }
        };
        *state = (count + effects.len() as u64).to_le_bytes().to_vec();
        Ok(())
    }

    fn tick(&self, ctx: &mut PartitionContext<'_>, _state: &mut Vec<u8>) -> Result<(), ApplyError> {
        ctx.did_update();
        let next = ctx.tick().next();
        ctx.wake_at(next);
        Ok(())
    }
}

/// Read a [`CountingPartition`] state blob.
pub fn read_count(state: &[u8]) -> u64 {
    state
        .try_into()
        .map(u64::from_le_bytes)
        .unwrap_or_default()
}

/// Read an [`AppendPartition`] state blob as its entries.
pub fn read_entries(state: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(state)
        .split(';')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
