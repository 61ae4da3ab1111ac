//! The shared resources one pipeline coordinates through.
//!
//! A [`Backplane`] is the full set of named primitives: the durable store,
//! two versioned queues, three broadcast channels and the driver lock.
//! Every driver and worker gets a clone; clones share the same underlying
//! primitives and nothing else.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cadence_coord::{AdvisoryLock, BroadcastChannel, MemoryStore, PublishObserver, VersionedQueue};
use cadence_core::{
    Attempt, DurableStore, MainMessage, PartitionTask, ProcessorMessage, RunnerMessage,
    RunnerTask,
};

/// Name of the runner work queue.
pub const RUNNER_QUEUE: &str = "runnerActors";
/// Name of the processor work queue.
pub const PROCESSOR_QUEUE: &str = "processPartitions";
/// Name of the runner channel.
pub const RUNNER_CHANNEL: &str = "runner";
/// Name of the processor channel.
pub const PROCESSOR_CHANNEL: &str = "processor";
/// Name of the main (observer) channel.
pub const MAIN_CHANNEL: &str = "main";
/// Name of the lock held around every tick body.
pub const DRIVER_LOCK: &str = "tickDriver";

/// Cloneable bundle of the pipeline's shared primitives.
#[derive(Clone)]
pub struct Backplane {
    /// Partition snapshots, effect records, actor state, the tick counter.
    pub store: Arc<dyn DurableStore>,
    /// Actors to run this tick.
    pub runner_queue: Arc<VersionedQueue<RunnerTask>>,
    /// Partitions to process this tick.
    pub processor_queue: Arc<VersionedQueue<PartitionTask>>,
    /// Driver ↔ runner signals.
    pub runner_channel: Arc<BroadcastChannel<RunnerMessage>>,
    /// Driver ↔ processor signals.
    pub processor_channel: Arc<BroadcastChannel<ProcessorMessage>>,
    /// Driver → observer notifications.
    pub main_channel: Arc<BroadcastChannel<MainMessage>>,
    /// Held by the driver for the duration of each tick body.
    pub driver_lock: Arc<AdvisoryLock>,
    attempts: Arc<AtomicU64>,
}

impl Backplane {
    /// Build a backplane around `store` with fresh queues, channels and lock.
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        BackplaneBuilder::new(store).build()
    }

    /// Build a backplane on a fresh [`MemoryStore`], returning a typed
    /// handle to the store as well.
    pub fn in_memory() -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Self::new(store.clone()), store)
    }

    /// A fresh tick attempt, distinct from every other attempt handed out
    /// by this backplane or its clones.
    pub fn next_attempt(&self) -> Attempt {
        Attempt(self.attempts.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Builder for a [`Backplane`] whose channels report to publish observers.
pub struct BackplaneBuilder {
    store: Arc<dyn DurableStore>,
    runner_observer: Option<PublishObserver<RunnerMessage>>,
    processor_observer: Option<PublishObserver<ProcessorMessage>>,
}

impl BackplaneBuilder {
    /// Start from `store`.
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            runner_observer: None,
            processor_observer: None,
        }
    }

    /// Observe every message published on the runner channel.
    pub fn runner_observer(mut self, observer: PublishObserver<RunnerMessage>) -> Self {
        self.runner_observer = Some(observer);
        self
    }

    /// Observe every message published on the processor channel.
    pub fn processor_observer(mut self, observer: PublishObserver<ProcessorMessage>) -> Self {
        self.processor_observer = Some(observer);
        self
    }

    /// Assemble the backplane.
    pub fn build(self) -> Backplane {
        let runner_channel = match self.runner_observer {
            Some(obs) => BroadcastChannel::with_observer(RUNNER_CHANNEL, obs),
            None => BroadcastChannel::new(RUNNER_CHANNEL),
        };
        let processor_channel = match self.processor_observer {
            Some(obs) => BroadcastChannel::with_observer(PROCESSOR_CHANNEL, obs),
            None => BroadcastChannel::new(PROCESSOR_CHANNEL),
        };
        Backplane {
            store: self.store,
            runner_queue: Arc::new(VersionedQueue::new(RUNNER_QUEUE)),
            processor_queue: Arc::new(VersionedQueue::new(PROCESSOR_QUEUE)),
            runner_channel: Arc::new(runner_channel),
            processor_channel: Arc::new(processor_channel),
            main_channel: Arc::new(BroadcastChannel::new(MAIN_CHANNEL)),
            driver_lock: Arc::new(AdvisoryLock::new(DRIVER_LOCK)),
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Cooperative stop flag shared by the driver and all workers.
///
/// Workers check it between queue items, so an in-flight item always
/// finishes. The driver checks it between ticks and while waiting.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    /// Create a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether shutdown was requested.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_primitives() {
        let (a, _store) = Backplane::in_memory();
        let b = a.clone();
        let sub = b.runner_channel.subscribe();
        a.runner_channel.publish(RunnerMessage::Connected);
        assert_eq!(sub.try_recv(), Ok(Some(RunnerMessage::Connected)));
        assert!(Arc::ptr_eq(&a.driver_lock, &b.driver_lock));
    }

    #[test]
    fn attempts_are_unique_across_clones() {
        let (a, _store) = Backplane::in_memory();
        let b = a.clone();
        let first = a.next_attempt();
        let second = b.next_attempt();
        assert_ne!(first, second);
        assert!(a.next_attempt() > second);

        let (other, _store) = Backplane::in_memory();
        assert_eq!(other.next_attempt(), first);
    }

    #[test]
    fn shutdown_signal_is_shared() {
        let signal = ShutdownSignal::new();
        let other = signal.clone();
        assert!(!other.is_raised());
        signal.raise();
        assert!(other.is_raised());
    }
}
