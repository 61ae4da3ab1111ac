//! Runner worker: runs actor logic and persists effect records.
//!
//! A runner subscribes to the runner channel, announces itself with
//! `connected`, and on every `run` drains the runner queue at that tick's
//! version. For each actor it runs the registered logic, groups the
//! resulting effects by target partition, saves one effect record per
//! partition, and only then acknowledges with `actorProcessed`, echoing
//! the attempt the item was queued under.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error, warn};

use cadence_core::keys::{actor_key, effect_key};
use cadence_core::{
    encode_batch, ActorContext, InputSource, PartitionId, RunnerMessage, RunnerTask, Tick,
    TouchedPartitions,
};

use crate::backplane::{Backplane, ShutdownSignal};
use crate::error::WorkerError;
use crate::registry::LogicRegistry;

/// Counters reported by a runner when it exits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunnerStats {
    /// Actors acknowledged with `actorProcessed`.
    pub actors_processed: u64,
    /// Actors whose logic returned an error. Still acknowledged, with no
    /// effects.
    pub logic_errors: u64,
    /// Actors reported with `actorFailed`.
    pub actors_failed: u64,
    /// Effect records saved.
    pub records_saved: u64,
}

impl RunnerStats {
    /// Add `other` into these counters.
    pub fn merge(&mut self, other: &RunnerStats) {
        self.actors_processed += other.actors_processed;
        self.logic_errors += other.logic_errors;
        self.actors_failed += other.actors_failed;
        self.records_saved += other.records_saved;
    }
}

/// One runner: pulls actors, runs them, persists their effects.
pub struct RunnerWorker {
    id: usize,
    backplane: Backplane,
    registry: Arc<LogicRegistry>,
    inputs: Arc<dyn InputSource>,
    shutdown: ShutdownSignal,
    stats: RunnerStats,
}

impl RunnerWorker {
    /// Create runner `id` on `backplane`.
    pub fn new(
        id: usize,
        backplane: Backplane,
        registry: Arc<LogicRegistry>,
        inputs: Arc<dyn InputSource>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            id,
            backplane,
            registry,
            inputs,
            shutdown,
            stats: RunnerStats::default(),
        }
    }

    /// Subscribe, announce, and serve `run` commands until `shutdown`.
    pub fn run(mut self) -> RunnerStats {
        let channel = Arc::clone(&self.backplane.runner_channel);
        let inbox = channel.subscribe();
        channel.publish(RunnerMessage::Connected);
        debug!(runner = self.id, "runner connected");

        for msg in inbox {
            match msg {
                RunnerMessage::Run { tick } => self.run_tick(tick),
                RunnerMessage::Shutdown => break,
                _ => {}
            }
            if self.shutdown.is_raised() {
                break;
            }
        }

        debug!(runner = self.id, stats = ?self.stats, "runner exiting");
        self.stats
    }

    /// Pull and complete actors at version `tick` until the queue is
    /// exhausted, the version moves on, or shutdown is raised.
    pub fn run_tick(&mut self, tick: Tick) {
        let queue = Arc::clone(&self.backplane.runner_queue);
        while !self.shutdown.is_raised() {
            let Some(task) = queue.pop(tick) else {
                break;
            };
            match self.process_actor(tick, &task) {
                Ok(partitions) => {
                    self.stats.actors_processed += 1;
                    self.backplane
                        .runner_channel
                        .publish(RunnerMessage::ActorProcessed {
                            tick,
                            attempt: task.attempt,
                            actor: task.actor,
                            partitions,
                        });
                }
                Err(e) => {
                    error!(runner = self.id, %tick, actor = %task.actor, error = %e, "actor failed");
                    self.stats.actors_failed += 1;
                    self.backplane
                        .runner_channel
                        .publish(RunnerMessage::ActorFailed {
                            tick,
                            attempt: task.attempt,
                            actor: task.actor,
                            reason: e.to_string(),
                        });
                }
            }
        }
    }

    /// Run one actor and persist its output. Returns the partitions it
    /// stored effect records for.
    ///
    /// An error from the actor's own logic is logged and yields an empty
    /// result. Store and registry errors are returned and the actor is not
    /// acknowledged.
    pub fn process_actor(
        &mut self,
        tick: Tick,
        task: &RunnerTask,
    ) -> Result<TouchedPartitions, WorkerError> {
        let logic = self
            .registry
            .actor(&task.kind)
            .ok_or_else(|| WorkerError::UnknownKind {
                kind: task.kind.clone(),
            })?;
        let store = self.backplane.store.as_ref();

        let state = store.load_optional(&actor_key(&task.actor))?;
        let inputs = self.inputs.pending(&task.actor, tick);
        let ctx = ActorContext {
            tick,
            actor: &task.actor,
            store,
        };

        let output = match logic.run(&ctx, state.as_deref(), &inputs) {
            Ok(output) => output,
            Err(e) => {
                warn!(runner = self.id, %tick, actor = %task.actor, error = %e, "actor logic failed; no effects stored");
                self.stats.logic_errors += 1;
                return Ok(TouchedPartitions::new());
            }
        };

        let mut batches: IndexMap<PartitionId, Vec<Vec<u8>>> = IndexMap::new();
        for effect in output.effects {
            batches
                .entry(effect.partition)
                .or_default()
                .push(effect.payload);
        }

        for (partition, payloads) in &batches {
            store.save(
                &effect_key(tick, partition, &task.actor),
                &encode_batch(payloads),
            )?;
            self.stats.records_saved += 1;
        }
        if let Some(state) = output.state {
            store.save(&actor_key(&task.actor), &state)?;
        }

        Ok(batches.into_keys().collect())
    }

    /// Counters so far.
    pub fn stats(&self) -> &RunnerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{
        decode_batch, ActorError, ActorLogic, ActorOutput, ActorId, Attempt, DurableStore, Effect,
        NoInputs,
    };

    struct TwoRooms;

    impl ActorLogic for TwoRooms {
        fn run(
            &self,
            ctx: &ActorContext<'_>,
            state: Option<&[u8]>,
            _inputs: &[Vec<u8>],
        ) -> Result<ActorOutput, ActorError> {
            let runs = state.map_or(0, |s| s[0]) + 1;
            Ok(ActorOutput {
                effects: vec![
                    Effect::new("p1", format!("{}:x", ctx.actor)),
                    Effect::new("p2", "y"),
                    Effect::new("p1", "z"),
                ],
                state: Some(vec![runs]),
            })
        }
    }

    struct Broken;

    impl ActorLogic for Broken {
        fn run(
            &self,
            _ctx: &ActorContext<'_>,
            _state: Option<&[u8]>,
            _inputs: &[Vec<u8>],
        ) -> Result<ActorOutput, ActorError> {
            Err(ActorError::Failed {
                reason: "bad command".into(),
            })
        }
    }

    fn worker() -> (RunnerWorker, Backplane) {
        let (backplane, _store) = Backplane::in_memory();
        let registry = LogicRegistry::new()
            .with_actor("rooms", Arc::new(TwoRooms))
            .with_actor("broken", Arc::new(Broken));
        let worker = RunnerWorker::new(
            0,
            backplane.clone(),
            Arc::new(registry),
            Arc::new(NoInputs),
            ShutdownSignal::new(),
        );
        (worker, backplane)
    }

    fn task(actor: &str, kind: &str) -> RunnerTask {
        RunnerTask {
            actor: actor.into(),
            kind: kind.into(),
            attempt: Attempt(1),
        }
    }

    #[test]
    fn effects_grouped_per_partition_in_emission_order() {
        let (mut worker, backplane) = worker();
        let touched = worker.process_actor(Tick(3), &task("a1", "rooms")).unwrap();
        assert_eq!(touched.as_slice(), [PartitionId::new("p1"), PartitionId::new("p2")]);

        let blob = backplane.store.load("effect/3/p1/a1").unwrap();
        assert_eq!(
            decode_batch(&blob).unwrap(),
            vec![b"a1:x".to_vec(), b"z".to_vec()]
        );
        assert_eq!(worker.stats().records_saved, 2);
    }

    #[test]
    fn actor_state_persists_between_ticks() {
        let (mut worker, backplane) = worker();
        worker.process_actor(Tick(1), &task("a1", "rooms")).unwrap();
        worker.process_actor(Tick(2), &task("a1", "rooms")).unwrap();
        assert_eq!(backplane.store.load("actor/a1").unwrap(), vec![2]);
    }

    #[test]
    fn logic_error_is_acknowledged_without_effects() {
        let (mut worker, backplane) = worker();
        let touched = worker.process_actor(Tick(1), &task("a9", "broken")).unwrap();
        assert!(touched.is_empty());
        assert_eq!(worker.stats().logic_errors, 1);
        assert!(backplane.store.load_optional("actor/a9").unwrap().is_none());
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let (mut worker, _backplane) = worker();
        let err = worker.process_actor(Tick(1), &task("a1", "ghost")).unwrap_err();
        assert!(matches!(err, WorkerError::UnknownKind { .. }));
    }

    #[test]
    fn run_tick_acknowledges_each_actor_once() {
        let (mut worker, backplane) = worker();
        let sub = backplane.runner_channel.subscribe();
        backplane.runner_queue.set_version(Tick(4));
        backplane
            .runner_queue
            .push([task("a1", "rooms"), task("a2", "ghost")]);

        worker.run_tick(Tick(4));

        let msgs: Vec<_> = std::iter::from_fn(|| sub.try_recv().unwrap()).collect();
        assert_eq!(msgs.len(), 2);
        assert!(matches!(
            &msgs[0],
            RunnerMessage::ActorProcessed { tick: Tick(4), attempt: Attempt(1), actor, .. }
                if *actor == ActorId::new("a1")
        ));
        assert!(matches!(
            &msgs[1],
            RunnerMessage::ActorFailed { attempt: Attempt(1), .. }
        ));
        assert!(backplane.runner_queue.is_empty());
    }

    #[test]
    fn stale_version_pulls_nothing() {
        let (mut worker, backplane) = worker();
        backplane.runner_queue.set_version(Tick(5));
        backplane.runner_queue.push([task("a1", "rooms")]);
        worker.run_tick(Tick(4));
        assert_eq!(backplane.runner_queue.len(), 1);
        assert_eq!(worker.stats().actors_processed, 0);
    }

    struct Echo;

    impl ActorLogic for Echo {
        fn run(
            &self,
            _ctx: &ActorContext<'_>,
            _state: Option<&[u8]>,
            inputs: &[Vec<u8>],
        ) -> Result<ActorOutput, ActorError> {
            Ok(ActorOutput {
                effects: inputs.iter().map(|i| Effect::new("p1", i.clone())).collect(),
                state: None,
            })
        }
    }

    struct Mailbox;

    impl InputSource for Mailbox {
        fn pending(&self, actor: &ActorId, tick: Tick) -> Vec<Vec<u8>> {
            vec![format!("{actor}@{tick}").into_bytes(), b"again".to_vec()]
        }
    }

    #[test]
    fn pending_inputs_reach_the_logic() {
        let (backplane, _store) = Backplane::in_memory();
        let registry = LogicRegistry::new().with_actor("echo", Arc::new(Echo));
        let mut worker = RunnerWorker::new(
            1,
            backplane.clone(),
            Arc::new(registry),
            Arc::new(Mailbox),
            ShutdownSignal::new(),
        );
        worker.process_actor(Tick(7), &task("a1", "echo")).unwrap();

        let blob = backplane.store.load("effect/7/p1/a1").unwrap();
        assert_eq!(
            decode_batch(&blob).unwrap(),
            vec![b"a1@7".to_vec(), b"again".to_vec()]
        );
    }
}
