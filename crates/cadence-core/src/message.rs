//! Broadcast message vocabulary and queue work items.
//!
//! Channel messages are signals, not data: every critical payload travels
//! through a versioned queue or the durable store. A message published
//! before a listener subscribes is never replayed to it.
//!
//! Acknowledgments echo the [`Attempt`] of the queue item they answer, so
//! a driver re-running a tick can tell its own acknowledgments from those
//! of an earlier run.

use smallvec::SmallVec;

use crate::id::{ActorId, Attempt, KindTag, PartitionId, Tick};

/// Partitions touched by one actor in one tick. Most actors touch one.
pub type TouchedPartitions = SmallVec<[PartitionId; 4]>;

/// Messages on the runner channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunnerMessage {
    /// A runner started (or restarted) and wants the current command resent.
    Connected,
    /// Start pulling actors from the runner queue at version `tick`.
    Run {
        /// The queue version to pull.
        tick: Tick,
    },
    /// An actor's logic ran and its effects are persisted.
    ActorProcessed {
        /// Tick the actor ran for.
        tick: Tick,
        /// Attempt of the queue item.
        attempt: Attempt,
        /// The actor.
        actor: ActorId,
        /// Partitions the actor stored effect records for.
        partitions: TouchedPartitions,
    },
    /// A runner could not complete an actor. Diagnostic only: never counts
    /// as an acknowledgment.
    ActorFailed {
        /// Tick the actor was pulled for.
        tick: Tick,
        /// Attempt of the queue item.
        attempt: Attempt,
        /// The actor.
        actor: ActorId,
        /// Why the actor could not be completed.
        reason: String,
    },
    /// Stop pulling work and exit.
    Shutdown,
}

/// Messages on the processor channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessorMessage {
    /// A processor started (or restarted) and wants the current command resent.
    Connected,
    /// Start phase A: pull partitions from the processor queue at version `tick`.
    Process {
        /// The queue version to pull.
        tick: Tick,
    },
    /// Phase A finished for a partition; its updated state is held in memory.
    PartitionProcessed {
        /// Tick being processed.
        tick: Tick,
        /// Attempt of the queue item.
        attempt: Attempt,
        /// The partition.
        partition: PartitionId,
    },
    /// Phase A failed for a partition. Diagnostic only: never counts as an
    /// acknowledgment, so the barrier stalls.
    PartitionFailed {
        /// Tick being processed.
        tick: Tick,
        /// Attempt the partition was staged or pulled for.
        attempt: Attempt,
        /// The partition.
        partition: PartitionId,
        /// Why phase A failed.
        reason: String,
    },
    /// The barrier: every partition finished phase A; start phase B.
    Flush {
        /// Tick being flushed.
        tick: Tick,
        /// Only results staged for this attempt are persisted.
        attempt: Attempt,
    },
    /// Phase B persisted these partitions.
    PartitionFlushed {
        /// Tick being flushed.
        tick: Tick,
        /// Attempt named by the `flush`.
        attempt: Attempt,
        /// Partitions this processor persisted (or found unchanged).
        partitions: Vec<PartitionId>,
    },
    /// Stop pulling work and exit.
    Shutdown,
}

/// Messages on the main channel, consumed by read-only observers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MainMessage {
    /// A tick driver started.
    DriverConnected,
    /// The driver finished a tick; `tick` is the new current tick.
    TickAdvanced {
        /// The tick now current.
        tick: Tick,
    },
}

/// Runner queue item: one actor to run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerTask {
    /// The actor.
    pub actor: ActorId,
    /// Registry tag selecting the actor's logic.
    pub kind: KindTag,
    /// The driver attempt that queued this item.
    pub attempt: Attempt,
}

/// Processor queue item: one partition to process in phase A.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionTask {
    /// The partition.
    pub partition: PartitionId,
    /// Registry tag selecting the partition's apply logic.
    pub kind: KindTag,
    /// Actors that stored effect records for this partition this tick,
    /// ascending by ID.
    pub contributors: Vec<ActorId>,
    /// The driver attempt that queued this item.
    pub attempt: Attempt,
}
