//! Versioned work queue with destructive, at-most-once consumption.
//!
//! [`VersionedQueue`] holds items tagged with a single current version
//! (the tick). Setting a new version discards everything queued under the
//! old one. A consumer pulls with the version it was told to work on; a
//! stale version sees an empty queue.
//!
//! Pulling is destructive and unacknowledged: an item handed out is gone
//! from the queue. If the puller dies before acting on it, the item is
//! lost. There is no lease or return path.

use std::collections::VecDeque;
use std::sync::Mutex;

use cadence_core::Tick;

struct QueueState<T> {
    version: Option<Tick>,
    items: VecDeque<T>,
}

/// A shared queue whose items belong to one version at a time.
///
/// No ordering guarantee is part of the contract, although this
/// implementation hands items out in push order.
pub struct VersionedQueue<T> {
    name: String,
    state: Mutex<QueueState<T>>,
}

// Compile-time assertion: VersionedQueue must be Send + Sync for Send items.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<VersionedQueue<String>>();
};

impl<T> VersionedQueue<T> {
    /// Create an empty queue with no version set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                version: None,
                items: VecDeque::new(),
            }),
        }
    }

    /// The queue's name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState<T>> {
        self.state.lock().expect("versioned queue lock poisoned")
    }

    /// Reset the queue to accept and emit items tagged `version`.
    ///
    /// Any items still queued are discarded, even when `version` equals
    /// the current version.
    pub fn set_version(&self, version: Tick) {
        let mut state = self.lock();
        let dropped = state.items.len();
        state.items.clear();
        state.version = Some(version);
        if dropped > 0 {
            tracing::warn!(queue = %self.name, %version, dropped, "discarded unconsumed items");
        }
    }

    /// The current version, or `None` if never set.
    pub fn version(&self) -> Option<Tick> {
        self.lock().version
    }

    /// Append items under the current version.
    pub fn push(&self, items: impl IntoIterator<Item = T>) {
        self.lock().items.extend(items);
    }

    /// Remove and return the next item if the queue is at `version`.
    ///
    /// Returns `None` when the queue is exhausted or has moved to a
    /// different version.
    pub fn pop(&self, version: Tick) -> Option<T> {
        let mut state = self.lock();
        if state.version != Some(version) {
            return None;
        }
        state.items.pop_front()
    }

    /// Iterate items of `version`, consuming each as it is yielded.
    ///
    /// The iterator ends at exhaustion or as soon as the version changes.
    pub fn drain(&self, version: Tick) -> Drain<'_, T> {
        Drain {
            queue: self,
            version,
        }
    }

    /// Number of items queued under the current version.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether no items are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consuming iterator returned by [`VersionedQueue::drain`].
pub struct Drain<'q, T> {
    queue: &'q VersionedQueue<T>,
    version: Tick,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.pop(self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn pop_requires_matching_version() {
        let q = VersionedQueue::new("actors");
        q.set_version(Tick(5));
        q.push(["a1", "a2"]);
        assert_eq!(q.pop(Tick(4)), None);
        assert_eq!(q.pop(Tick(5)), Some("a1"));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn unversioned_queue_yields_nothing() {
        let q = VersionedQueue::new("actors");
        q.push([1, 2, 3]);
        assert_eq!(q.version(), None);
        assert_eq!(q.pop(Tick(0)), None);
    }

    #[test]
    fn set_version_discards_leftovers() {
        let q = VersionedQueue::new("actors");
        q.set_version(Tick(1));
        q.push([1, 2, 3]);
        assert_eq!(q.pop(Tick(1)), Some(1));
        q.set_version(Tick(2));
        assert!(q.is_empty());
        assert_eq!(q.drain(Tick(2)).count(), 0);
    }

    #[test]
    fn drain_stops_when_version_moves() {
        let q = VersionedQueue::new("actors");
        q.set_version(Tick(1));
        q.push([1, 2, 3]);
        let mut drain = q.drain(Tick(1));
        assert_eq!(drain.next(), Some(1));
        q.set_version(Tick(2));
        q.push([9]);
        assert_eq!(drain.next(), None);
        assert_eq!(q.pop(Tick(2)), Some(9));
    }

    #[test]
    fn concurrent_consumers_each_item_delivered_once() {
        let q = Arc::new(VersionedQueue::new("actors"));
        q.set_version(Tick(7));
        q.push(0..1000u32);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || q.drain(Tick(7)).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn drained_items_equal_pushed_items(
            batches in proptest::collection::vec(proptest::collection::vec(any::<u16>(), 0..8), 0..8),
            version in any::<u64>(),
        ) {
            let q = VersionedQueue::new("prop");
            q.set_version(Tick(version));
            let mut expected = Vec::new();
            for batch in &batches {
                expected.extend(batch.iter().copied());
                q.push(batch.iter().copied());
            }
            let got: Vec<u16> = q.drain(Tick(version)).collect();
            prop_assert_eq!(got, expected);
            prop_assert!(q.is_empty());
        }
    }
}
