//! Worker pools on a recording backplane, driven tick by tick from the
//! test thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cadence_core::keys::partition_key;
use cadence_core::{DurableStore, NoInputs, ProcessorMessage, RunnerMessage};
use cadence_engine::{
    Backplane, LogicRegistry, PipelineConfig, ProcessorStats, ProcessorWorker, Roster,
    RunnerStats, RunnerWorker, SharedRoster, ShutdownSignal, TickDriver,
};

use crate::recording::{recording_backplane, Event, EventLog, RecordingStore};

/// How long the harness waits for a worker to announce itself.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// No pacing and a short stall interval, so stalled tests stay fast.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        target_tick_duration: Duration::ZERO,
        stall_report_interval: Duration::from_millis(25),
        runner_count: Some(1),
        processor_count: Some(1),
        ..Default::default()
    }
}

/// Runner and processor threads sharing one recording backplane.
///
/// Create drivers with [`driver`](Self::driver) after spawning workers so
/// the workers' `connected` announcements are not mistaken for late joins.
pub struct Harness {
    pub backplane: Backplane,
    pub store: Arc<RecordingStore>,
    pub log: EventLog,
    pub shutdown: ShutdownSignal,
    registry: Arc<LogicRegistry>,
    runners: Vec<JoinHandle<RunnerStats>>,
    processors: Vec<JoinHandle<ProcessorStats>>,
}

impl Harness {
    pub fn new(registry: LogicRegistry) -> Self {
        let log = EventLog::new();
        let (backplane, store) = recording_backplane(&log);
        Self {
            backplane,
            store,
            log,
            shutdown: ShutdownSignal::new(),
            registry: Arc::new(registry),
            runners: Vec::new(),
            processors: Vec::new(),
        }
    }

    /// Start `n` runners and wait until each has announced itself.
    pub fn spawn_runners(&mut self, n: usize) -> &mut Self {
        let is_connect = |e: &Event| *e == Event::Runner(RunnerMessage::Connected);
        let before = self.log.count(is_connect);
        for _ in 0..n {
            let id = self.runners.len();
            let worker = RunnerWorker::new(
                id,
                self.backplane.clone(),
                Arc::clone(&self.registry),
                Arc::new(NoInputs),
                self.shutdown.clone(),
            );
            let handle = thread::Builder::new()
                .name(format!("test-runner-{id}"))
                .spawn(move || worker.run())
                .unwrap();
            self.runners.push(handle);
        }
        assert!(
            self.log.wait_for(before + n, CONNECT_TIMEOUT, is_connect),
            "runners did not connect"
        );
        self
    }

    /// Start `n` processors and wait until each has announced itself.
    pub fn spawn_processors(&mut self, n: usize) -> &mut Self {
        let is_connect = |e: &Event| *e == Event::Processor(ProcessorMessage::Connected);
        let before = self.log.count(is_connect);
        for _ in 0..n {
            let id = self.processors.len();
            let worker = ProcessorWorker::new(
                id,
                self.backplane.clone(),
                Arc::clone(&self.registry),
                self.shutdown.clone(),
            );
            let handle = thread::Builder::new()
                .name(format!("test-processor-{id}"))
                .spawn(move || worker.run())
                .unwrap();
            self.processors.push(handle);
        }
        assert!(
            self.log.wait_for(before + n, CONNECT_TIMEOUT, is_connect),
            "processors did not connect"
        );
        self
    }

    /// Give every roster partition an empty state, without logging.
    pub fn seed(&self, roster: &Roster) {
        for (partition, _) in roster.partitions() {
            self.store
                .inner()
                .save(&partition_key(partition), b"")
                .unwrap();
        }
    }

    /// A driver on this backplane with [`fast_config`].
    pub fn driver(&self, roster: impl Into<SharedRoster>) -> TickDriver {
        self.driver_with(roster, fast_config())
    }

    pub fn driver_with(&self, roster: impl Into<SharedRoster>, config: PipelineConfig) -> TickDriver {
        TickDriver::new(self.backplane.clone(), roster, config, self.shutdown.clone()).unwrap()
    }

    /// Partition state as stored, bypassing the log.
    pub fn partition_state(&self, partition: &str) -> Option<Vec<u8>> {
        self.store
            .inner()
            .load_optional(&partition_key(&partition.into()))
            .unwrap()
    }

    /// Stop and join every worker, returning the summed counters of those
    /// that exited cleanly.
    pub fn stop(&mut self) -> (RunnerStats, ProcessorStats) {
        self.shutdown.raise();
        self.backplane
            .runner_channel
            .publish(RunnerMessage::Shutdown);
        self.backplane
            .processor_channel
            .publish(ProcessorMessage::Shutdown);

        let mut runner_stats = RunnerStats::default();
        for h in self.runners.drain(..) {
            if let Ok(s) = h.join() {
                runner_stats.merge(&s);
            }
        }
        let mut processor_stats = ProcessorStats::default();
        for h in self.processors.drain(..) {
            if let Ok(s) = h.join() {
                processor_stats.merge(&s);
            }
        }
        (runner_stats, processor_stats)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if !self.runners.is_empty() || !self.processors.is_empty() {
            self.stop();
        }
    }
}
