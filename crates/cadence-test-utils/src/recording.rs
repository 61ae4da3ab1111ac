//! An instrumented store and a shared event log.
//!
//! Every store access and every message published on the worker channels
//! is appended to one [`EventLog`], in the order it happened, so tests can
//! assert cross-cutting orderings like "no partition write before the
//! flush signal".

use std::collections::BTreeSet;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use cadence_coord::MemoryStore;
use cadence_core::{DurableStore, ProcessorMessage, RunnerMessage, StoreError};
use cadence_engine::{Backplane, BackplaneBuilder};

/// One recorded happening.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Load(String),
    Save(String),
    Delete(String),
    Runner(RunnerMessage),
    Processor(ProcessorMessage),
}

impl Event {
    /// The store key, for store events.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Load(k) | Self::Save(k) | Self::Delete(k) => Some(k.as_str()),
            _ => None,
        }
    }
}

/// Append-only, shareable, waitable event log.
#[derive(Clone, Default)]
pub struct EventLog {
    inner: Arc<(Mutex<Vec<Event>>, Condvar)>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn events_mut(&self) -> MutexGuard<'_, Vec<Event>> {
        self.inner.0.lock().unwrap()
    }

    pub fn push(&self, event: Event) {
        self.events_mut().push(event);
        self.inner.1.notify_all();
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.events_mut().clone()
    }

    pub fn clear(&self) {
        self.events_mut().clear();
    }

    /// Number of events matching `pred`.
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events_mut().iter().filter(|e| pred(e)).count()
    }

    /// Index of the first event matching `pred`.
    pub fn first(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events_mut().iter().position(pred)
    }

    /// Index of the last event matching `pred`.
    pub fn last(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events_mut().iter().rposition(pred)
    }

    /// Block until at least `n` events match `pred`, or `timeout`.
    pub fn wait_for(&self, n: usize, timeout: Duration, pred: impl Fn(&Event) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.events_mut();
        loop {
            if events.iter().filter(|e| pred(e)).count() >= n {
                return true;
            }
            let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            events = self.inner.1.wait_timeout(events, left).unwrap().0;
        }
    }
}

/// A [`MemoryStore`] that logs every access and can be told to fail.
pub struct RecordingStore {
    inner: MemoryStore,
    log: EventLog,
    failing_saves: Mutex<BTreeSet<String>>,
    failing_deletes: Mutex<BTreeSet<String>>,
}

impl RecordingStore {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: MemoryStore::new(),
            log,
            failing_saves: Mutex::new(BTreeSet::new()),
            failing_deletes: Mutex::new(BTreeSet::new()),
        }
    }

    /// The underlying store, bypassing the log.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Make saves of keys starting with `prefix` fail with an I/O error.
    pub fn fail_saves(&self, prefix: &str) {
        self.failing_saves.lock().unwrap().insert(prefix.to_owned());
    }

    /// Make deletes of keys starting with `prefix` fail with an I/O error.
    pub fn fail_deletes(&self, prefix: &str) {
        self.failing_deletes.lock().unwrap().insert(prefix.to_owned());
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        self.failing_saves.lock().unwrap().clear();
        self.failing_deletes.lock().unwrap().clear();
    }
}

fn check(failing: &Mutex<BTreeSet<String>>, key: &str) -> Result<(), StoreError> {
    if failing
        .lock()
        .unwrap()
        .iter()
        .any(|p| key.starts_with(p.as_str()))
    {
        return Err(StoreError::Io {
            key: key.to_owned(),
            source: io::Error::other("injected failure"),
        });
    }
    Ok(())
}

impl DurableStore for RecordingStore {
    fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.log.push(Event::Load(key.to_owned()));
        self.inner.load(key)
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        check(&self.failing_saves, key)?;
        self.log.push(Event::Save(key.to_owned()));
        self.inner.save(key, data)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        check(&self.failing_deletes, key)?;
        self.log.push(Event::Delete(key.to_owned()));
        self.inner.delete(key)
    }
}

/// A backplane over a [`RecordingStore`] whose worker channels also
/// report into `log`.
pub fn recording_backplane(log: &EventLog) -> (Backplane, Arc<RecordingStore>) {
    let store = Arc::new(RecordingStore::new(log.clone()));
    let runner_log = log.clone();
    let processor_log = log.clone();
    let backplane = BackplaneBuilder::new(store.clone())
        .runner_observer(Box::new(move |m: &RunnerMessage| {
            runner_log.push(Event::Runner(m.clone()))
        }))
        .processor_observer(Box::new(move |m: &ProcessorMessage| {
            processor_log.push(Event::Processor(m.clone()))
        }))
        .build();
    (backplane, store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_accesses_are_logged_in_order() {
        let log = EventLog::new();
        let store = RecordingStore::new(log.clone());
        store.save("partition/p1", b"x").unwrap();
        store.load("partition/p1").unwrap();
        store.delete("partition/p1").unwrap();
        assert_eq!(
            log.events(),
            vec![
                Event::Save("partition/p1".into()),
                Event::Load("partition/p1".into()),
                Event::Delete("partition/p1".into()),
            ]
        );
    }

    #[test]
    fn injected_failures_match_prefix() {
        let store = RecordingStore::new(EventLog::new());
        store.fail_saves("partition/");
        store.fail_deletes("effect/");
        assert!(store.save("partition/p1", b"x").is_err());
        assert!(store.save("actor/a1", b"x").is_ok());
        assert!(store.delete("effect/1/p1/a1").is_err());
        store.heal();
        assert!(store.save("partition/p1", b"x").is_ok());
    }

    #[test]
    fn channel_publishes_reach_the_log() {
        let log = EventLog::new();
        let (backplane, _store) = recording_backplane(&log);
        backplane.runner_channel.publish(RunnerMessage::Connected);
        assert_eq!(log.events(), vec![Event::Runner(RunnerMessage::Connected)]);
    }
}
