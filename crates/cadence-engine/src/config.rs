//! Pipeline configuration, validation, and error types.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use cadence_core::{KindTag, PartitionId, Tick};

/// Default target duration of one tick.
pub const DEFAULT_TICK_DURATION: Duration = Duration::from_millis(250);

/// Default interval between stall warnings while acknowledgments are pending.
pub const DEFAULT_STALL_REPORT_INTERVAL: Duration = Duration::from_secs(5);

// ── PipelineConfig ─────────────────────────────────────────────────

/// Configuration for the tick driver and the worker pools.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Target wall-clock duration of one tick. After a tick finishes the
    /// driver sleeps for whatever is left of it. `Duration::ZERO` disables
    /// pacing. Default: 250 ms.
    pub target_tick_duration: Duration,
    /// How long the driver waits for an acknowledgment before logging the
    /// pending set and re-checking for shutdown. Default: 5 s.
    pub stall_report_interval: Duration,
    /// Number of runner threads. `None` = auto-detect.
    pub runner_count: Option<usize>,
    /// Number of processor threads. `None` = auto-detect.
    pub processor_count: Option<usize>,
    /// Tick to start from when the store holds no persisted tick.
    /// Default: 1.
    pub start_tick: Tick,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_tick_duration: DEFAULT_TICK_DURATION,
            stall_report_interval: DEFAULT_STALL_REPORT_INTERVAL,
            runner_count: None,
            processor_count: None,
            start_tick: Tick(1),
        }
    }
}

impl PipelineConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stall_report_interval.is_zero() {
            return Err(ConfigError::ZeroStallInterval);
        }
        if self.runner_count == Some(0) {
            return Err(ConfigError::ZeroWorkers { pool: "runner" });
        }
        if self.processor_count == Some(0) {
            return Err(ConfigError::ZeroWorkers { pool: "processor" });
        }
        Ok(())
    }

    /// Resolve the runner pool size.
    pub fn resolved_runner_count(&self) -> usize {
        resolve_pool(self.runner_count)
    }

    /// Resolve the processor pool size.
    pub fn resolved_processor_count(&self) -> usize {
        resolve_pool(self.processor_count)
    }
}

/// Explicit values are clamped to `[1, 64]`; `None` uses half the
/// available parallelism, clamped to `[1, 16]`.
fn resolve_pool(requested: Option<usize>) -> usize {
    match requested {
        Some(n) => n.clamp(1, 64),
        None => {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4);
            (cpus / 2).clamp(1, 16)
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while validating or starting a pipeline, or changing
/// its roster.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `stall_report_interval` is zero.
    ZeroStallInterval,
    /// A worker pool was configured with zero workers.
    ZeroWorkers {
        /// Which pool.
        pool: &'static str,
    },
    /// The roster names a kind with no registered logic.
    UnregisteredKind {
        /// `"actor"` or `"partition"`.
        role: &'static str,
        /// The unknown kind.
        kind: KindTag,
    },
    /// The roster names a partition with no stored state.
    UnseededPartition {
        /// The partition.
        partition: PartitionId,
    },
    /// The store could not be read while checking the roster.
    StoreUnavailable {
        /// The store's error, rendered.
        reason: String,
    },
    /// A background thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroStallInterval => write!(f, "stall_report_interval must be non-zero"),
            Self::ZeroWorkers { pool } => write!(f, "{pool} pool must have at least 1 worker"),
            Self::UnregisteredKind { role, kind } => {
                write!(f, "no {role} logic registered for kind '{kind}'")
            }
            Self::UnseededPartition { partition } => {
                write!(f, "partition '{partition}' has no stored state")
            }
            Self::StoreUnavailable { reason } => write!(f, "store unavailable: {reason}"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.target_tick_duration, Duration::from_millis(250));
        assert_eq!(config.start_tick, Tick(1));
    }

    #[test]
    fn zero_stall_interval_rejected() {
        let config = PipelineConfig {
            stall_report_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroStallInterval));
    }

    #[test]
    fn zero_workers_rejected() {
        let config = PipelineConfig {
            processor_count: Some(0),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroWorkers { pool: "processor" })
        );
    }

    #[test]
    fn pool_sizes_are_clamped() {
        let config = PipelineConfig {
            runner_count: Some(500),
            processor_count: None,
            ..Default::default()
        };
        assert_eq!(config.resolved_runner_count(), 64);
        let auto = config.resolved_processor_count();
        assert!((1..=16).contains(&auto));
    }

    #[test]
    fn zero_tick_duration_is_allowed() {
        let config = PipelineConfig {
            target_tick_duration: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
