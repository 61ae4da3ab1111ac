//! Thread host for a complete pipeline: one driver, a runner pool and a
//! processor pool on a shared backplane.
//!
//! Shutdown is a small state machine (Running → Draining → Stopped):
//! raise the shared signal, publish `shutdown` on both worker channels,
//! then join every thread. Workers finish the item in hand and stop
//! pulling; the driver notices at its next stall-report timeout or between
//! ticks.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info, warn};

use cadence_core::{InputSource, NoInputs, ProcessorMessage, RunnerMessage, Tick};

use crate::backplane::{Backplane, ShutdownSignal};
use crate::config::{ConfigError, PipelineConfig};
use crate::driver::TickDriver;
use crate::monitor::DriverMonitor;
use crate::processor::{ProcessorStats, ProcessorWorker};
use crate::registry::{LogicRegistry, Roster, SharedRoster};
use crate::runner::{RunnerStats, RunnerWorker};

// ── ShutdownReport ───────────────────────────────────────────────

/// Report from [`Pipeline::shutdown`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Whether the driver thread was joined successfully.
    pub driver_joined: bool,
    /// Runner threads joined.
    pub runners_joined: usize,
    /// Processor threads joined.
    pub processors_joined: usize,
    /// The tick current when the driver stopped, if it was joined.
    pub final_tick: Option<Tick>,
    /// Summed runner counters.
    pub runner_stats: RunnerStats,
    /// Summed processor counters.
    pub processor_stats: ProcessorStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Running,
    Stopped,
}

// ── Pipeline ─────────────────────────────────────────────────────

/// A running pipeline.
///
/// Dropping a running pipeline shuts it down.
pub struct Pipeline {
    backplane: Backplane,
    registry: Arc<LogicRegistry>,
    roster: SharedRoster,
    shutdown: ShutdownSignal,
    monitor: DriverMonitor,
    state: PipelineState,
    driver_thread: Option<JoinHandle<Tick>>,
    runner_threads: Vec<JoinHandle<RunnerStats>>,
    processor_threads: Vec<JoinHandle<ProcessorStats>>,
}

impl Pipeline {
    /// Start a pipeline whose actors have no external inputs.
    pub fn start(
        config: PipelineConfig,
        backplane: Backplane,
        registry: LogicRegistry,
        roster: impl Into<SharedRoster>,
    ) -> Result<Self, ConfigError> {
        Self::start_with_inputs(config, backplane, registry, roster, Arc::new(NoInputs))
    }

    /// Validate, then spawn the processor pool, the runner pool and the
    /// driver thread.
    pub fn start_with_inputs(
        config: PipelineConfig,
        backplane: Backplane,
        registry: LogicRegistry,
        roster: impl Into<SharedRoster>,
        inputs: Arc<dyn InputSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let roster = roster.into();
        registry.check_roster(&roster.snapshot())?;
        let registry = Arc::new(registry);
        let shutdown = ShutdownSignal::new();

        let mut driver =
            TickDriver::new(backplane.clone(), roster.clone(), config.clone(), shutdown.clone())?;

        let mut pipeline = Self {
            backplane: backplane.clone(),
            registry: Arc::clone(&registry),
            roster,
            shutdown: shutdown.clone(),
            monitor: driver.monitor(),
            state: PipelineState::Running,
            driver_thread: None,
            runner_threads: Vec::new(),
            processor_threads: Vec::new(),
        };

        for i in 0..config.resolved_processor_count() {
            let worker = ProcessorWorker::new(
                i,
                backplane.clone(),
                Arc::clone(&registry),
                shutdown.clone(),
            );
            let handle = thread::Builder::new()
                .name(format!("cadence-processor-{i}"))
                .spawn(move || worker.run())
                .map_err(|e| ConfigError::ThreadSpawnFailed {
                    reason: format!("processor {i}: {e}"),
                })?;
            pipeline.processor_threads.push(handle);
        }

        for i in 0..config.resolved_runner_count() {
            let worker = RunnerWorker::new(
                i,
                backplane.clone(),
                Arc::clone(&registry),
                Arc::clone(&inputs),
                shutdown.clone(),
            );
            let handle = thread::Builder::new()
                .name(format!("cadence-runner-{i}"))
                .spawn(move || worker.run())
                .map_err(|e| ConfigError::ThreadSpawnFailed {
                    reason: format!("runner {i}: {e}"),
                })?;
            pipeline.runner_threads.push(handle);
        }

        let handle = thread::Builder::new()
            .name("cadence-driver".into())
            .spawn(move || driver.run())
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("driver: {e}"),
            })?;
        pipeline.driver_thread = Some(handle);

        info!(
            runners = pipeline.runner_threads.len(),
            processors = pipeline.processor_threads.len(),
            "pipeline started"
        );
        Ok(pipeline)
    }

    /// Observe the driver.
    pub fn monitor(&self) -> &DriverMonitor {
        &self.monitor
    }

    /// The shared primitives.
    pub fn backplane(&self) -> &Backplane {
        &self.backplane
    }

    /// The active roster. Changes apply from the next tick.
    pub fn roster(&self) -> &SharedRoster {
        &self.roster
    }

    /// Change the active roster from the next tick on.
    ///
    /// The result is committed only if every kind it names is registered
    /// and every partition already has stored state; otherwise the roster
    /// is left as it was. Seed a new partition before adding it.
    pub fn update_roster<R>(&self, f: impl FnOnce(&mut Roster) -> R) -> Result<R, ConfigError> {
        let store = self.backplane.store.as_ref();
        self.roster.try_update(f, |next| {
            self.registry.check_roster(next)?;
            next.check_seeded(store)
        })
    }

    /// Whether the pipeline is still running.
    pub fn is_running(&self) -> bool {
        self.state == PipelineState::Running
    }

    /// Stop every thread and report how it went. Idempotent.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.state == PipelineState::Stopped {
            return ShutdownReport {
                driver_joined: true,
                ..Default::default()
            };
        }
        let start = Instant::now();

        self.shutdown.raise();
        self.backplane
            .runner_channel
            .publish(RunnerMessage::Shutdown);
        self.backplane
            .processor_channel
            .publish(ProcessorMessage::Shutdown);
        self.state = PipelineState::Stopped;

        let mut report = ShutdownReport::default();

        match self.driver_thread.take() {
            Some(handle) => match handle.join() {
                Ok(tick) => {
                    report.driver_joined = true;
                    report.final_tick = Some(tick);
                }
                Err(_) => warn!("driver thread panicked"),
            },
            None => report.driver_joined = true,
        }

        for handle in self.runner_threads.drain(..) {
            match handle.join() {
                Ok(stats) => {
                    report.runner_stats.merge(&stats);
                    report.runners_joined += 1;
                }
                Err(_) => warn!("runner thread panicked"),
            }
        }
        for handle in self.processor_threads.drain(..) {
            match handle.join() {
                Ok(stats) => {
                    report.processor_stats.merge(&stats);
                    report.processors_joined += 1;
                }
                Err(_) => warn!("processor thread panicked"),
            }
        }

        report.total_ms = start.elapsed().as_millis() as u64;
        debug!(?report, "pipeline stopped");
        report
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.state != PipelineState::Stopped {
            self.shutdown();
        }
    }
}
