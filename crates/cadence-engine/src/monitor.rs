//! Externally observable driver state for liveness monitoring.
//!
//! A lost queue item stalls the tick forever; it is never retried. The
//! [`DriverMonitor`] makes that visible: it exposes the phase the driver
//! is in and exactly which actors or partitions it is still waiting on.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use indexmap::IndexSet;

use cadence_core::{ActorId, PartitionId, Tick};

use crate::metrics::TickMetrics;

/// The driver's position in the per-tick state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriverPhase {
    /// Between ticks (pacing) or not started.
    Idle,
    /// Queueing actors and publishing `run`.
    DispatchRunners,
    /// Collecting `actorProcessed` acknowledgments.
    AwaitRunners,
    /// Queueing partitions and publishing `process`.
    DispatchProcessorsA,
    /// Collecting `partitionProcessed` acknowledgments.
    AwaitProcessorsA,
    /// Publishing the `flush` barrier.
    DispatchFlush,
    /// Collecting `partitionFlushed` acknowledgments.
    AwaitFlush,
    /// Cleaning up effect records and incrementing the tick.
    Advance,
}

impl fmt::Display for DriverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::DispatchRunners => "DISPATCH_RUNNERS",
            Self::AwaitRunners => "AWAIT_RUNNERS",
            Self::DispatchProcessorsA => "DISPATCH_PROCESSORS_A",
            Self::AwaitProcessorsA => "AWAIT_PROCESSORS_A",
            Self::DispatchFlush => "DISPATCH_FLUSH",
            Self::AwaitFlush => "AWAIT_FLUSH",
            Self::Advance => "ADVANCE",
        };
        f.write_str(name)
    }
}

/// A failure signal a worker broadcast during the current tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReport {
    /// `actorFailed`.
    Actor {
        /// The actor that could not be completed.
        actor: ActorId,
        /// The worker's reason.
        reason: String,
    },
    /// `partitionFailed`.
    Partition {
        /// The partition that could not be completed.
        partition: PartitionId,
        /// The worker's reason.
        reason: String,
    },
}

/// Point-in-time copy of the driver's observable state.
#[derive(Clone, Debug)]
pub struct MonitorSnapshot {
    /// The tick being driven (or next to be driven when idle).
    pub tick: Tick,
    /// Current phase.
    pub phase: DriverPhase,
    /// Actors dispatched but not yet acknowledged.
    pub pending_actors: IndexSet<ActorId>,
    /// Partitions not yet acknowledged in the current await phase.
    pub pending_partitions: IndexSet<PartitionId>,
    /// Failure signals received during the current tick.
    pub failures: Vec<FailureReport>,
    /// Number of stall warnings logged during the current tick.
    pub stall_reports: u64,
    /// Ticks completed by this driver.
    pub ticks_completed: u64,
    /// Metrics of the last completed tick.
    pub last_metrics: Option<TickMetrics>,
    /// When the current phase was entered.
    pub phase_entered: Instant,
}

/// Cloneable, thread-safe handle onto a driver's state.
#[derive(Clone)]
pub struct DriverMonitor {
    inner: Arc<(Mutex<MonitorSnapshot>, Condvar)>,
}

impl Default for DriverMonitor {
    fn default() -> Self {
        Self::new(Tick(0))
    }
}

impl DriverMonitor {
    pub(crate) fn new(tick: Tick) -> Self {
        let snapshot = MonitorSnapshot {
            tick,
            phase: DriverPhase::Idle,
            pending_actors: IndexSet::new(),
            pending_partitions: IndexSet::new(),
            failures: Vec::new(),
            stall_reports: 0,
            ticks_completed: 0,
            last_metrics: None,
            phase_entered: Instant::now(),
        };
        Self {
            inner: Arc::new((Mutex::new(snapshot), Condvar::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MonitorSnapshot> {
        self.inner.0.lock().expect("driver monitor poisoned")
    }

    fn update(&self, f: impl FnOnce(&mut MonitorSnapshot)) {
        f(&mut self.state());
        self.inner.1.notify_all();
    }

    /// Copy the current state.
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.state().clone()
    }

    /// Current phase.
    pub fn phase(&self) -> DriverPhase {
        self.state().phase
    }

    /// Tick being driven.
    pub fn tick(&self) -> Tick {
        self.state().tick
    }

    /// Actors still owing an acknowledgment.
    pub fn pending_actors(&self) -> Vec<ActorId> {
        self.state().pending_actors.iter().cloned().collect()
    }

    /// Partitions still owing an acknowledgment.
    pub fn pending_partitions(&self) -> Vec<PartitionId> {
        self.state().pending_partitions.iter().cloned().collect()
    }

    /// Failure signals received this tick.
    pub fn failures(&self) -> Vec<FailureReport> {
        self.state().failures.clone()
    }

    /// How long the driver has been in its current phase.
    pub fn time_in_phase(&self) -> Duration {
        self.state().phase_entered.elapsed()
    }

    /// Block until `pred` holds or `timeout` elapses. Returns whether it held.
    pub fn wait_until(&self, timeout: Duration, pred: impl Fn(&MonitorSnapshot) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        loop {
            if pred(&state) {
                return true;
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, _) = self
                .inner
                .1
                .wait_timeout(state, remaining)
                .expect("driver monitor poisoned");
            state = guard;
        }
    }

    // ── Driver-side updates ─────────────────────────────────────

    pub(crate) fn begin_tick(&self, tick: Tick) {
        self.update(|s| {
            s.tick = tick;
            s.failures.clear();
            s.stall_reports = 0;
        });
    }

    pub(crate) fn enter(&self, phase: DriverPhase) {
        self.update(|s| {
            s.phase = phase;
            s.phase_entered = Instant::now();
        });
    }

    pub(crate) fn set_pending_actors(&self, pending: &IndexSet<ActorId>) {
        self.update(|s| s.pending_actors = pending.clone());
    }

    pub(crate) fn set_pending_partitions(&self, pending: &IndexSet<PartitionId>) {
        self.update(|s| s.pending_partitions = pending.clone());
    }

    pub(crate) fn record_failure(&self, failure: FailureReport) {
        self.update(|s| s.failures.push(failure));
    }

    pub(crate) fn record_stall_report(&self) {
        self.update(|s| s.stall_reports += 1);
    }

    pub(crate) fn finish_tick(&self, next: Tick, metrics: TickMetrics) {
        self.update(|s| {
            s.tick = next;
            s.phase = DriverPhase::Idle;
            s.phase_entered = Instant::now();
            s.pending_actors.clear();
            s.pending_partitions.clear();
            s.ticks_completed += 1;
            s.last_metrics = Some(metrics);
        });
    }

    pub(crate) fn go_idle(&self) {
        self.enter(DriverPhase::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn phase_names_match_state_machine() {
        assert_eq!(DriverPhase::AwaitProcessorsA.to_string(), "AWAIT_PROCESSORS_A");
        assert_eq!(DriverPhase::DispatchFlush.to_string(), "DISPATCH_FLUSH");
    }

    #[test]
    fn wait_until_wakes_on_update() {
        let monitor = DriverMonitor::new(Tick(1));
        let m = monitor.clone();
        let h = thread::spawn(move || {
            m.wait_until(Duration::from_secs(5), |s| s.phase == DriverPhase::AwaitFlush)
        });
        monitor.enter(DriverPhase::AwaitFlush);
        assert!(h.join().unwrap());
    }

    #[test]
    fn wait_until_times_out() {
        let monitor = DriverMonitor::new(Tick(1));
        assert!(!monitor.wait_until(Duration::from_millis(10), |s| s.ticks_completed > 0));
    }

    #[test]
    fn begin_tick_clears_previous_failures() {
        let monitor = DriverMonitor::new(Tick(1));
        monitor.record_failure(FailureReport::Actor {
            actor: ActorId::new("a1"),
            reason: "store offline".into(),
        });
        assert_eq!(monitor.failures().len(), 1);
        monitor.begin_tick(Tick(2));
        assert!(monitor.failures().is_empty());
        assert_eq!(monitor.tick(), Tick(2));
    }

    #[test]
    fn finish_tick_resets_pending_and_counts() {
        let monitor = DriverMonitor::new(Tick(1));
        let pending: IndexSet<ActorId> = [ActorId::new("a1")].into_iter().collect();
        monitor.set_pending_actors(&pending);
        monitor.finish_tick(Tick(2), TickMetrics::default());
        let snap = monitor.snapshot();
        assert!(snap.pending_actors.is_empty());
        assert_eq!(snap.ticks_completed, 1);
        assert_eq!(snap.phase, DriverPhase::Idle);
        assert!(snap.last_metrics.is_some());
    }
}
