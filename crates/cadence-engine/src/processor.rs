//! Processor worker: the two-phase apply around the flush barrier.
//!
//! Phase A (on `process`) pulls partitions from the processor queue, reads
//! each partition's state and its contributors' effect records, applies
//! them, and holds the result in memory. Phase B (on `flush`) persists the
//! held results. No partition state is written until every partition in
//! the tick has finished phase A, so no reader ever sees a half-advanced
//! world.
//!
//! Held results are tagged with the attempt of the item that produced
//! them. A flush persists only its own attempt's results, so a re-run of
//! a tick never writes what an abandoned run staged.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error, warn};

use cadence_core::keys::{effect_key, partition_key};
use cadence_core::{
    decode_batch, Attempt, EffectRecord, PartitionContext, PartitionId, PartitionTask, ProcessorMessage,
    StoreError, Tick,
};

use crate::backplane::{Backplane, ShutdownSignal};
use crate::error::WorkerError;
use crate::registry::LogicRegistry;

/// A phase-A result held until the flush barrier.
#[derive(Clone, Debug)]
struct Staged {
    tick: Tick,
    attempt: Attempt,
    state: Vec<u8>,
    changed: bool,
    wake_at: Option<Tick>,
}

/// Counters reported by a processor when it exits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Partitions acknowledged with `partitionProcessed`.
    pub partitions_processed: u64,
    /// Partitions reported with `partitionFailed`.
    pub partitions_failed: u64,
    /// Partitions written back in phase B.
    pub partitions_saved: u64,
    /// Partitions flushed without a write because nothing changed.
    pub partitions_unchanged: u64,
    /// Staged results discarded because their tick or attempt was abandoned.
    pub stale_discarded: u64,
}

impl ProcessorStats {
    /// Add `other` into these counters.
    pub fn merge(&mut self, other: &ProcessorStats) {
        self.partitions_processed += other.partitions_processed;
        self.partitions_failed += other.partitions_failed;
        self.partitions_saved += other.partitions_saved;
        self.partitions_unchanged += other.partitions_unchanged;
        self.stale_discarded += other.stale_discarded;
    }
}

/// One processor: phase A on `process`, phase B on `flush`.
pub struct ProcessorWorker {
    id: usize,
    backplane: Backplane,
    registry: Arc<LogicRegistry>,
    shutdown: ShutdownSignal,
    staged: IndexMap<PartitionId, Staged>,
    stats: ProcessorStats,
}

impl ProcessorWorker {
    /// Create processor `id` on `backplane`.
    pub fn new(
        id: usize,
        backplane: Backplane,
        registry: Arc<LogicRegistry>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            id,
            backplane,
            registry,
            shutdown,
            staged: IndexMap::new(),
            stats: ProcessorStats::default(),
        }
    }

    /// Subscribe, announce, and serve `process`/`flush` until `shutdown`.
    pub fn run(mut self) -> ProcessorStats {
        let channel = Arc::clone(&self.backplane.processor_channel);
        let inbox = channel.subscribe();
        channel.publish(ProcessorMessage::Connected);
        debug!(processor = self.id, "processor connected");

        for msg in inbox {
            match msg {
                ProcessorMessage::Process { tick } => self.phase_a(tick),
                ProcessorMessage::Flush { tick, attempt } => self.phase_b(tick, attempt),
                ProcessorMessage::Shutdown => break,
                _ => {}
            }
            if self.shutdown.is_raised() {
                break;
            }
        }

        if !self.staged.is_empty() {
            warn!(
                processor = self.id,
                staged = self.staged.len(),
                "processor exiting with unflushed partitions"
            );
        }
        debug!(processor = self.id, stats = ?self.stats, "processor exiting");
        self.stats
    }

    /// Phase A: pull partitions at version `tick` until the queue is
    /// exhausted, the version moves on, or shutdown is raised.
    pub fn phase_a(&mut self, tick: Tick) {
        self.discard_stale(tick, |s| s.tick == tick);
        let queue = Arc::clone(&self.backplane.processor_queue);
        while !self.shutdown.is_raised() {
            let Some(task) = queue.pop(tick) else {
                break;
            };
            let attempt = task.attempt;
            self.discard_stale(tick, |s| s.attempt == attempt);
            match self.process_partition(tick, &task) {
                Ok(staged) => {
                    self.staged.insert(task.partition.clone(), staged);
                    self.stats.partitions_processed += 1;
                    self.backplane
                        .processor_channel
                        .publish(ProcessorMessage::PartitionProcessed {
                            tick,
                            attempt,
                            partition: task.partition,
                        });
                }
                Err(e) => {
                    error!(processor = self.id, %tick, partition = %task.partition, error = %e, "partition failed in phase A");
                    self.stats.partitions_failed += 1;
                    self.backplane
                        .processor_channel
                        .publish(ProcessorMessage::PartitionFailed {
                            tick,
                            attempt,
                            partition: task.partition,
                            reason: e.to_string(),
                        });
                }
            }
        }
    }

    /// Phase B: persist every partition this worker staged for `attempt`,
    /// then acknowledge them in one `partitionFlushed`. Publishes nothing if
    /// it staged none.
    pub fn phase_b(&mut self, tick: Tick, attempt: Attempt) {
        let ready: Vec<PartitionId> = self
            .staged
            .iter()
            .filter(|(_, s)| s.tick == tick && s.attempt == attempt)
            .map(|(p, _)| p.clone())
            .collect();
        if ready.is_empty() {
            return;
        }

        let store = Arc::clone(&self.backplane.store);
        let mut flushed = Vec::with_capacity(ready.len());
        for partition in ready {
            let Some(staged) = self.staged.shift_remove(&partition) else {
                continue;
            };
            if staged.changed {
                if let Err(e) = store.save(&partition_key(&partition), &staged.state) {
                    error!(processor = self.id, %tick, %partition, error = %e, "partition failed in phase B");
                    self.stats.partitions_failed += 1;
                    self.backplane
                        .processor_channel
                        .publish(ProcessorMessage::PartitionFailed {
                            tick,
                            attempt,
                            partition,
                            reason: e.to_string(),
                        });
                    continue;
                }
                self.stats.partitions_saved += 1;
            } else {
                self.stats.partitions_unchanged += 1;
            }
            if let Some(wake) = staged.wake_at {
                debug!(processor = self.id, %partition, %wake, "partition requested wake");
            }
            flushed.push(partition);
        }

        if !flushed.is_empty() {
            self.backplane
                .processor_channel
                .publish(ProcessorMessage::PartitionFlushed {
                    tick,
                    attempt,
                    partitions: flushed,
                });
        }
    }

    /// Read, apply and stage one partition. Reads the partition state once
    /// and each contributor's effect record once, in ascending actor order.
    fn process_partition(&self, tick: Tick, task: &PartitionTask) -> Result<Staged, WorkerError> {
        let logic = self
            .registry
            .partition(&task.kind)
            .ok_or_else(|| WorkerError::UnknownKind {
                kind: task.kind.clone(),
            })?;
        let store = self.backplane.store.as_ref();

        let original = store.load(&partition_key(&task.partition))?;

        let mut contributors = task.contributors.clone();
        contributors.sort();
        contributors.dedup();

        let mut effects = Vec::new();
        for producer in &contributors {
            let key = effect_key(tick, &task.partition, producer);
            let blob = store.load(&key).map_err(|e| match e {
                StoreError::NotFound { key } => WorkerError::MissingEffect { key },
                other => WorkerError::Store(other),
            })?;
            let payloads = decode_batch(&blob).map_err(|source| WorkerError::Decode {
                producer: producer.clone(),
                source,
            })?;
            effects.extend(payloads.into_iter().map(|payload| EffectRecord {
                producer: producer.clone(),
                payload,
            }));
        }

        let mut state = original.clone();
        let mut ctx = PartitionContext::new(tick, &task.partition, store);
        logic.apply(&mut ctx, &mut state, &effects)?;
        logic.tick(&mut ctx, &mut state)?;

        Ok(Staged {
            tick,
            attempt: task.attempt,
            changed: ctx.is_updated() || state != original,
            wake_at: ctx.requested_wake(),
            state,
        })
    }

    /// Drop staged results that `keep` rejects. They belong to a tick or an
    /// attempt whose flush never arrived.
    fn discard_stale(&mut self, tick: Tick, keep: impl Fn(&Staged) -> bool) {
        let before = self.staged.len();
        self.staged.retain(|_, s| keep(s));
        let dropped = before - self.staged.len();
        if dropped > 0 {
            warn!(processor = self.id, %tick, dropped, "discarding results of an unflushed attempt");
            self.stats.stale_discarded += dropped as u64;
        }
    }

    /// Partitions staged and awaiting flush.
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Counters so far.
    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }
}
