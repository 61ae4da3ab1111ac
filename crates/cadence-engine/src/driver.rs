//! The tick driver.
//!
//! One driver advances the world one tick at a time through a fixed
//! sequence of states:
//!
//! ```text
//! DISPATCH_RUNNERS → AWAIT_RUNNERS → DISPATCH_PROCESSORS_A → AWAIT_PROCESSORS_A
//!     → DISPATCH_FLUSH → AWAIT_FLUSH → ADVANCE
//! ```
//!
//! The whole tick body runs while holding the backplane's driver lock, so
//! two drivers sharing a backplane never interleave their phases. Await
//! states block on the relevant channel until every dispatched item has
//! acknowledged. A lost item stalls the tick; the driver reports the stall
//! periodically and never retries on its own.
//!
//! Each run of the tick body is a fresh [`Attempt`]. Only acknowledgments
//! echoing it count, and the inboxes are drained before dispatch, so a
//! driver re-running a tick is never satisfied by an earlier run's work.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Write as _};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexSet;
use tracing::{debug, error, info, warn};

use cadence_coord::Subscription;
use cadence_core::keys::{decode_tick, effect_key, encode_tick, TICK_KEY};
use cadence_core::{
    ActorId, Attempt, MainMessage, PartitionId, PartitionTask, ProcessorMessage, RunnerMessage,
    RunnerTask, Tick,
};

use crate::backplane::{Backplane, ShutdownSignal};
use crate::config::{ConfigError, PipelineConfig};
use crate::error::TickError;
use crate::metrics::TickMetrics;
use crate::monitor::{DriverMonitor, DriverPhase, FailureReport};
use crate::pacing::{AveragingTimer, TickPacer};
use crate::registry::{Roster, SharedRoster};

/// Ticks averaged for the `avg_ms` log field.
const AVERAGE_WINDOW: usize = 64;

/// Pending IDs named in one stall warning.
const STALL_IDS_SHOWN: usize = 8;

/// Actors that stored effect records for each partition in one tick.
pub type Contributions = BTreeMap<PartitionId, BTreeSet<ActorId>>;

/// Outcome of one completed tick.
#[derive(Clone, Debug)]
pub struct TickReport {
    /// The tick that was driven.
    pub tick: Tick,
    /// The attempt that drove it.
    pub attempt: Attempt,
    /// The tick now current.
    pub next_tick: Tick,
    /// Contributors per active partition.
    pub contributions: Contributions,
    /// Partitions outside the roster that runners stored effects for.
    /// Their records were deleted unapplied.
    pub orphaned: Vec<PartitionId>,
    /// Phase timings and counts.
    pub metrics: TickMetrics,
}

/// Drives ticks over a [`Backplane`].
pub struct TickDriver {
    backplane: Backplane,
    roster: SharedRoster,
    config: PipelineConfig,
    shutdown: ShutdownSignal,
    monitor: DriverMonitor,
    runner_inbox: Subscription<RunnerMessage>,
    processor_inbox: Subscription<ProcessorMessage>,
    current: Tick,
    pacer: TickPacer,
    timer: AveragingTimer,
}

impl TickDriver {
    /// Create a driver and announce it on the main channel.
    ///
    /// The driver subscribes to both worker channels here, before it ever
    /// publishes, so no acknowledgment can slip past it.
    pub fn new(
        backplane: Backplane,
        roster: impl Into<SharedRoster>,
        config: PipelineConfig,
        shutdown: ShutdownSignal,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let runner_inbox = backplane.runner_channel.subscribe();
        let processor_inbox = backplane.processor_channel.subscribe();
        backplane.main_channel.publish(MainMessage::DriverConnected);

        Ok(Self {
            roster: roster.into(),
            shutdown,
            monitor: DriverMonitor::new(config.start_tick),
            runner_inbox,
            processor_inbox,
            current: config.start_tick,
            pacer: TickPacer::new(config.target_tick_duration),
            timer: AveragingTimer::new(AVERAGE_WINDOW),
            config,
            backplane,
        })
    }

    /// Handle for observing this driver from other threads.
    pub fn monitor(&self) -> DriverMonitor {
        self.monitor.clone()
    }

    /// The roster this driver dispatches from.
    pub fn roster(&self) -> &SharedRoster {
        &self.roster
    }

    /// The tick this driver will drive next, as last known.
    pub fn current_tick(&self) -> Tick {
        self.current
    }

    /// Drive ticks until shutdown, pacing each to the target duration.
    /// Returns the tick current at exit.
    pub fn run(&mut self) -> Tick {
        info!(tick = %self.current, "tick driver started");
        while !self.shutdown.is_raised() {
            let started = Instant::now();
            match self.run_tick() {
                Ok(_) => {
                    self.pacer.pace(started, &self.shutdown);
                }
                Err(TickError::Interrupted { phase }) => {
                    info!(tick = %self.current, %phase, "tick interrupted by shutdown");
                    break;
                }
                Err(e) => {
                    error!(tick = %self.current, error = %e, "tick failed; retrying");
                    TickPacer::new(self.config.stall_report_interval).pace(started, &self.shutdown);
                }
            }
        }
        info!(tick = %self.current, "tick driver stopped");
        self.current
    }

    /// Drive exactly one tick, holding the driver lock throughout.
    pub fn run_tick(&mut self) -> Result<TickReport, TickError> {
        let lock = Arc::clone(&self.backplane.driver_lock);
        let result = lock.scope(|| self.tick_body());
        if result.is_err() {
            self.monitor.go_idle();
        }
        result
    }

    fn tick_body(&mut self) -> Result<TickReport, TickError> {
        let started = Instant::now();
        let tick = self.load_tick()?;
        self.current = tick;
        let attempt = self.backplane.next_attempt();
        let discarded = self.drain_inboxes();
        let roster = self.roster.snapshot();
        self.monitor.begin_tick(tick);
        debug!(%tick, %attempt, discarded, "tick attempt started");

        let mut metrics = TickMetrics {
            actors_dispatched: roster.actor_count(),
            partitions_dispatched: roster.partition_count(),
            ..Default::default()
        };

        // ── Runners ──
        let phase_started = Instant::now();
        self.dispatch_runners(tick, attempt, &roster);
        let all = self.await_runners(tick, attempt, &roster, &mut metrics)?;
        metrics.runners_us = micros(phase_started);

        let (contributions, orphans): (Contributions, Contributions) = all
            .into_iter()
            .partition(|(partition, _)| roster.has_partition(partition));
        for (partition, actors) in &orphans {
            warn!(%tick, %partition, producers = actors.len(), "effects addressed to inactive partition; discarding");
            metrics.orphaned_effects += actors.len();
        }

        // ── Processors, phase A ──
        let phase_started = Instant::now();
        self.dispatch_processors(tick, attempt, &roster, &contributions);
        self.await_processors(tick, attempt, &roster, &mut metrics)?;
        metrics.processors_us = micros(phase_started);

        // ── Flush barrier, phase B ──
        let phase_started = Instant::now();
        self.monitor.enter(DriverPhase::DispatchFlush);
        self.backplane
            .processor_channel
            .publish(ProcessorMessage::Flush { tick, attempt });
        self.await_flush(tick, attempt, &roster, &mut metrics)?;
        metrics.flush_us = micros(phase_started);

        // ── Advance ──
        self.monitor.enter(DriverPhase::Advance);
        let phase_started = Instant::now();
        self.delete_effects(tick, &contributions, &mut metrics);
        self.delete_effects(tick, &orphans, &mut metrics);
        metrics.cleanup_us = micros(phase_started);

        let next = tick.next();
        self.current = next;
        if let Err(e) = self.backplane.store.save(TICK_KEY, &encode_tick(next)) {
            error!(%tick, error = %e, "could not persist tick counter");
        }

        metrics.total_us = micros(started);
        self.timer.record(metrics.total_us);
        metrics.avg_tick_us = self.timer.average_us();

        self.backplane
            .main_channel
            .publish(MainMessage::TickAdvanced { tick: next });
        self.monitor.finish_tick(next, metrics.clone());
        info!(
            %tick,
            %attempt,
            elapsed_ms = metrics.total_ms(),
            avg_ms = metrics.avg_tick_us as f64 / 1000.0,
            "tick advanced"
        );

        Ok(TickReport {
            tick,
            attempt,
            next_tick: next,
            contributions,
            orphaned: orphans.into_keys().collect(),
            metrics,
        })
    }

    /// The durable tick, or the in-memory one if the store is behind it.
    fn load_tick(&self) -> Result<Tick, TickError> {
        match self.backplane.store.load_optional(TICK_KEY)? {
            Some(bytes) => {
                let stored =
                    decode_tick(&bytes).ok_or(TickError::CorruptTick { len: bytes.len() })?;
                Ok(stored.max(self.current))
            }
            None => Ok(self.current),
        }
    }

    /// Discard everything already queued in both inboxes. None of it can
    /// answer an attempt that has not dispatched yet.
    fn drain_inboxes(&self) -> usize {
        let mut discarded = 0;
        while let Ok(Some(_)) = self.runner_inbox.try_recv() {
            discarded += 1;
        }
        while let Ok(Some(_)) = self.processor_inbox.try_recv() {
            discarded += 1;
        }
        discarded
    }

    // ── Dispatch ───────────────────────────────────────────────

    fn dispatch_runners(&self, tick: Tick, attempt: Attempt, roster: &Roster) {
        self.monitor.enter(DriverPhase::DispatchRunners);
        let queue = &self.backplane.runner_queue;
        queue.set_version(tick);
        queue.push(roster.actors().map(|(actor, kind)| RunnerTask {
            actor: actor.clone(),
            kind: kind.clone(),
            attempt,
        }));
        self.backplane
            .runner_channel
            .publish(RunnerMessage::Run { tick });
        debug!(%tick, actors = roster.actor_count(), "runners dispatched");
    }

    fn dispatch_processors(
        &self,
        tick: Tick,
        attempt: Attempt,
        roster: &Roster,
        contributions: &Contributions,
    ) {
        self.monitor.enter(DriverPhase::DispatchProcessorsA);
        let queue = &self.backplane.processor_queue;
        queue.set_version(tick);
        queue.push(roster.partitions().map(|(partition, kind)| PartitionTask {
            partition: partition.clone(),
            kind: kind.clone(),
            contributors: contributions
                .get(partition)
                .map(|actors| actors.iter().cloned().collect())
                .unwrap_or_default(),
            attempt,
        }));
        self.backplane
            .processor_channel
            .publish(ProcessorMessage::Process { tick });
        debug!(%tick, partitions = roster.partition_count(), "processors dispatched");
    }

    // ── Await ──────────────────────────────────────────────────

    fn await_runners(
        &self,
        tick: Tick,
        attempt: Attempt,
        roster: &Roster,
        metrics: &mut TickMetrics,
    ) -> Result<Contributions, TickError> {
        let phase = DriverPhase::AwaitRunners;
        self.monitor.enter(phase);
        let mut pending: IndexSet<ActorId> = roster.actors().map(|(a, _)| a.clone()).collect();
        self.monitor.set_pending_actors(&pending);

        let mut contributions = Contributions::new();
        while !pending.is_empty() {
            let Some(msg) = self.next_message(&self.runner_inbox, phase, tick, &pending, metrics)?
            else {
                continue;
            };
            match msg {
                RunnerMessage::Connected => {
                    debug!(%tick, "runner joined mid-tick; re-publishing run");
                    metrics.late_joins += 1;
                    self.backplane
                        .runner_channel
                        .publish(RunnerMessage::Run { tick });
                }
                RunnerMessage::ActorProcessed {
                    attempt: acked,
                    actor,
                    partitions,
                    ..
                } if acked == attempt => {
                    if !pending.shift_remove(&actor) {
                        debug!(%tick, %actor, "ignoring repeated acknowledgment");
                        continue;
                    }
                    for partition in partitions {
                        contributions
                            .entry(partition)
                            .or_default()
                            .insert(actor.clone());
                    }
                    self.monitor.set_pending_actors(&pending);
                }
                RunnerMessage::ActorFailed {
                    attempt: failed,
                    actor,
                    reason,
                    ..
                } if failed == attempt => {
                    error!(%tick, %actor, %reason, "runner could not complete actor");
                    metrics.failures_reported += 1;
                    self.monitor
                        .record_failure(FailureReport::Actor { actor, reason });
                }
                _ => {}
            }
        }
        Ok(contributions)
    }

    fn await_processors(
        &self,
        tick: Tick,
        attempt: Attempt,
        roster: &Roster,
        metrics: &mut TickMetrics,
    ) -> Result<(), TickError> {
        let phase = DriverPhase::AwaitProcessorsA;
        self.monitor.enter(phase);
        let mut pending = active_partitions(roster);
        self.monitor.set_pending_partitions(&pending);

        while !pending.is_empty() {
            let Some(msg) =
                self.next_message(&self.processor_inbox, phase, tick, &pending, metrics)?
            else {
                continue;
            };
            match msg {
                ProcessorMessage::Connected => {
                    debug!(%tick, "processor joined mid-tick; re-publishing process");
                    metrics.late_joins += 1;
                    self.backplane
                        .processor_channel
                        .publish(ProcessorMessage::Process { tick });
                }
                ProcessorMessage::PartitionProcessed {
                    attempt: acked,
                    partition,
                    ..
                } if acked == attempt => {
                    if pending.shift_remove(&partition) {
                        self.monitor.set_pending_partitions(&pending);
                    }
                }
                ProcessorMessage::PartitionFailed {
                    attempt: failed,
                    partition,
                    reason,
                    ..
                } if failed == attempt => self.partition_failed(tick, partition, reason, metrics),
                _ => {}
            }
        }
        Ok(())
    }

    fn await_flush(
        &self,
        tick: Tick,
        attempt: Attempt,
        roster: &Roster,
        metrics: &mut TickMetrics,
    ) -> Result<(), TickError> {
        let phase = DriverPhase::AwaitFlush;
        self.monitor.enter(phase);
        let mut pending = active_partitions(roster);
        self.monitor.set_pending_partitions(&pending);

        while !pending.is_empty() {
            let Some(msg) =
                self.next_message(&self.processor_inbox, phase, tick, &pending, metrics)?
            else {
                continue;
            };
            match msg {
                ProcessorMessage::PartitionFlushed {
                    attempt: acked,
                    partitions,
                    ..
                } if acked == attempt => {
                    for partition in &partitions {
                        pending.shift_remove(partition);
                    }
                    self.monitor.set_pending_partitions(&pending);
                }
                ProcessorMessage::PartitionFailed {
                    attempt: failed,
                    partition,
                    reason,
                    ..
                } if failed == attempt => self.partition_failed(tick, partition, reason, metrics),
                // A processor that joins now holds nothing staged for this tick.
                ProcessorMessage::Connected => {
                    debug!(%tick, "processor joined during flush");
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn partition_failed(
        &self,
        tick: Tick,
        partition: PartitionId,
        reason: String,
        metrics: &mut TickMetrics,
    ) {
        error!(%tick, %partition, %reason, "processor could not complete partition");
        metrics.failures_reported += 1;
        self.monitor
            .record_failure(FailureReport::Partition { partition, reason });
    }

    /// Wait one stall interval for the next message on `inbox`.
    ///
    /// Returns `Ok(None)` after logging a stall report if nothing arrived,
    /// and `Interrupted` once shutdown has been raised.
    fn next_message<M, K: Display + Hash + Eq>(
        &self,
        inbox: &Subscription<M>,
        phase: DriverPhase,
        tick: Tick,
        pending: &IndexSet<K>,
        metrics: &mut TickMetrics,
    ) -> Result<Option<M>, TickError> {
        if self.shutdown.is_raised() {
            return Err(TickError::Interrupted { phase });
        }
        match inbox.recv_timeout(self.config.stall_report_interval) {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => {
                metrics.stall_reports += 1;
                self.monitor.record_stall_report();
                warn!(
                    %tick,
                    %phase,
                    waiting = pending.len(),
                    pending = %describe(pending),
                    stalled_ms = self.monitor.time_in_phase().as_millis() as u64,
                    "tick stalled awaiting acknowledgments"
                );
                Ok(None)
            }
            Err(_closed) => Err(TickError::Interrupted { phase }),
        }
    }

    // ── Cleanup ────────────────────────────────────────────────

    /// Delete every effect record written for `tick`. Failures are logged
    /// and counted; they never hold the tick back.
    fn delete_effects(&self, tick: Tick, contributions: &Contributions, metrics: &mut TickMetrics) {
        for (partition, actors) in contributions {
            for actor in actors {
                let key = effect_key(tick, partition, actor);
                match self.backplane.store.delete(&key) {
                    Ok(()) => metrics.effects_deleted += 1,
                    Err(e) => {
                        error!(%tick, %key, error = %e, "could not delete effect record");
                        metrics.cleanup_failures += 1;
                    }
                }
            }
        }
    }
}

fn active_partitions(roster: &Roster) -> IndexSet<PartitionId> {
    roster.partitions().map(|(p, _)| p.clone()).collect()
}

fn describe<K: Display>(pending: &IndexSet<K>) -> String {
    let mut out = String::new();
    for (i, id) in pending.iter().take(STALL_IDS_SHOWN).enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{id}");
    }
    if pending.len() > STALL_IDS_SHOWN {
        let _ = write!(out, " (+{} more)", pending.len() - STALL_IDS_SHOWN);
    }
    out
}

fn micros(since: Instant) -> u64 {
    since.elapsed().as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::DurableStore;
    use std::time::Duration;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            target_tick_duration: Duration::ZERO,
            stall_report_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    #[test]
    fn empty_roster_advances_without_workers() {
        let (backplane, store) = Backplane::in_memory();
        let main = backplane.main_channel.subscribe();
        let mut driver =
            TickDriver::new(backplane, Roster::new(), fast_config(), ShutdownSignal::new())
                .unwrap();

        let report = driver.run_tick().unwrap();
        assert_eq!(report.tick, Tick(1));
        assert_eq!(report.next_tick, Tick(2));
        assert_eq!(store.load(TICK_KEY).unwrap(), encode_tick(Tick(2)));
        assert_eq!(main.try_recv().unwrap(), Some(MainMessage::DriverConnected));
        assert_eq!(
            main.try_recv().unwrap(),
            Some(MainMessage::TickAdvanced { tick: Tick(2) })
        );
    }

    #[test]
    fn resumes_from_persisted_tick() {
        let (backplane, store) = Backplane::in_memory();
        store.save(TICK_KEY, &encode_tick(Tick(41))).unwrap();
        let mut driver =
            TickDriver::new(backplane, Roster::new(), fast_config(), ShutdownSignal::new())
                .unwrap();
        assert_eq!(driver.run_tick().unwrap().tick, Tick(41));
        assert_eq!(driver.current_tick(), Tick(42));
    }

    #[test]
    fn corrupt_tick_is_an_error() {
        let (backplane, store) = Backplane::in_memory();
        store.save(TICK_KEY, &[1, 2, 3]).unwrap();
        let mut driver =
            TickDriver::new(backplane, Roster::new(), fast_config(), ShutdownSignal::new())
                .unwrap();
        assert!(matches!(
            driver.run_tick(),
            Err(TickError::CorruptTick { len: 3 })
        ));
    }

    #[test]
    fn missing_runner_interrupts_on_shutdown() {
        let (backplane, _store) = Backplane::in_memory();
        let shutdown = ShutdownSignal::new();
        let roster = Roster::new().with_actor("a1", "player");
        let mut driver =
            TickDriver::new(backplane, roster, fast_config(), shutdown.clone()).unwrap();
        let monitor = driver.monitor();

        let handle = std::thread::spawn(move || driver.run_tick().map(|r| r.tick));
        assert!(monitor.wait_until(Duration::from_secs(5), |s| s.stall_reports > 0));
        assert_eq!(monitor.phase(), DriverPhase::AwaitRunners);
        assert_eq!(monitor.pending_actors(), vec![ActorId::new("a1")]);

        shutdown.raise();
        let result = handle.join().unwrap();
        assert!(matches!(
            result,
            Err(TickError::Interrupted {
                phase: DriverPhase::AwaitRunners
            })
        ));
    }

    #[test]
    fn acknowledgment_for_another_attempt_is_ignored() {
        let (backplane, _store) = Backplane::in_memory();
        let roster = Roster::new().with_actor("a1", "player");
        let mut driver =
            TickDriver::new(backplane.clone(), roster, fast_config(), ShutdownSignal::new())
                .unwrap();
        let monitor = driver.monitor();
        let handle = std::thread::spawn(move || driver.run_tick());

        let wait = Duration::from_secs(5);
        assert!(monitor.wait_until(wait, |s| s.phase == DriverPhase::AwaitRunners));
        let task = backplane.runner_queue.pop(Tick(1)).unwrap();
        let ack = |attempt| RunnerMessage::ActorProcessed {
            tick: Tick(1),
            attempt,
            actor: task.actor.clone(),
            partitions: Default::default(),
        };

        backplane
            .runner_channel
            .publish(ack(Attempt(task.attempt.0 + 1)));
        // two timeouts after the publish: the foreign ack has been consumed
        let before = monitor.snapshot().stall_reports;
        assert!(monitor.wait_until(wait, |s| s.stall_reports > before + 1));
        assert_eq!(monitor.phase(), DriverPhase::AwaitRunners);
        assert_eq!(monitor.pending_actors(), vec![ActorId::new("a1")]);

        backplane.runner_channel.publish(ack(task.attempt));
        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.tick, Tick(1));
        assert_eq!(report.attempt, task.attempt);
    }

    #[test]
    fn acknowledgments_queued_before_a_tick_are_discarded() {
        let (backplane, _store) = Backplane::in_memory();
        let roster = Roster::new().with_actor("a1", "player");
        let shutdown = ShutdownSignal::new();
        let mut driver =
            TickDriver::new(backplane.clone(), roster, fast_config(), shutdown.clone()).unwrap();
        let monitor = driver.monitor();

        // queued early, carrying the attempt the driver is about to take
        let guess = backplane.next_attempt();
        backplane
            .runner_channel
            .publish(RunnerMessage::ActorProcessed {
                tick: Tick(1),
                attempt: Attempt(guess.0 + 1),
                actor: ActorId::new("a1"),
                partitions: Default::default(),
            });

        let handle = std::thread::spawn(move || driver.run_tick().map(|r| r.tick));
        assert!(monitor.wait_until(Duration::from_secs(5), |s| s.stall_reports > 0));
        assert_eq!(monitor.pending_actors(), vec![ActorId::new("a1")]);

        shutdown.raise();
        assert!(matches!(
            handle.join().unwrap(),
            Err(TickError::Interrupted {
                phase: DriverPhase::AwaitRunners
            })
        ));
    }

    #[test]
    fn describe_truncates_long_pending_sets() {
        let pending: IndexSet<String> = (0..10).map(|i| format!("a{i}")).collect();
        let text = describe(&pending);
        assert!(text.starts_with("a0, a1"));
        assert!(text.ends_with("(+2 more)"));
    }

    #[test]
    fn invalid_config_rejected() {
        let (backplane, _store) = Backplane::in_memory();
        let config = PipelineConfig {
            stall_report_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            TickDriver::new(backplane, Roster::new(), config, ShutdownSignal::new()),
            Err(ConfigError::ZeroStallInterval)
        ));
    }
}
