//! Tick driver and worker pools for the Cadence pipeline.
//!
//! A [`TickDriver`] advances a shared world one tick at a time. Within a
//! tick, [`RunnerWorker`]s run every active actor's logic and persist the
//! resulting effects; [`ProcessorWorker`]s then apply those effects to
//! their partitions in two phases separated by a flush barrier, so
//! partition state is persisted only after every partition has finished
//! computing.
//!
//! All coordination goes through a [`Backplane`] of shared primitives.
//! [`Pipeline`] hosts the driver and both worker pools on named threads.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod backplane;
pub mod config;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod pacing;
pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod runner;

pub use backplane::{Backplane, BackplaneBuilder, ShutdownSignal};
pub use config::{ConfigError, PipelineConfig};
pub use driver::{Contributions, TickDriver, TickReport};
pub use error::{TickError, WorkerError};
pub use metrics::TickMetrics;
pub use monitor::{DriverMonitor, DriverPhase, FailureReport, MonitorSnapshot};
pub use pacing::{AveragingTimer, TickPacer};
pub use pipeline::{Pipeline, ShutdownReport};
pub use processor::{ProcessorStats, ProcessorWorker};
pub use registry::{LogicRegistry, Roster, SharedRoster};
pub use runner::{RunnerStats, RunnerWorker};

// Compile-time assertion: the driver and workers move onto their own threads.
const _: fn() = || {
    fn assert_send<T: Send>() {}
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send::<TickDriver>();
    assert_send::<RunnerWorker>();
    assert_send::<ProcessorWorker>();
    assert_send_sync::<Backplane>();
    assert_send_sync::<DriverMonitor>();
};
