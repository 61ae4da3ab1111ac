//! Cadence: a tick-synchronized pipeline for actor simulations.
//!
//! This is the facade crate that re-exports the public API of the Cadence
//! sub-crates. For most users, adding `cadence` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cadence::prelude::*;
//!
//! // Every actor sends a single byte to the "tally" partition.
//! struct Voter;
//! impl ActorLogic for Voter {
//!     fn run(
//!         &self,
//!         _ctx: &ActorContext<'_>,
//!         _state: Option<&[u8]>,
//!         _inputs: &[Vec<u8>],
//!     ) -> Result<ActorOutput, ActorError> {
//!         Ok(ActorOutput {
//!             effects: vec![Effect::new("tally", vec![1])],
//!             state: None,
//!         })
//!     }
//! }
//!
//! // The partition appends one byte per vote.
//! struct Tally;
//! impl PartitionLogic for Tally {
//!     fn apply(
//!         &self,
//!         _ctx: &mut PartitionContext<'_>,
//!         state: &mut Vec<u8>,
//!         effects: &[EffectRecord],
//!     ) -> Result<(), ApplyError> {
//!         state.extend(effects.iter().flat_map(|e| e.payload.iter().copied()));
//!         Ok(())
//!     }
//! }
//!
//! let registry = LogicRegistry::new()
//!     .with_actor("voter", Arc::new(Voter))
//!     .with_partition("tally", Arc::new(Tally));
//! let roster = Roster::new()
//!     .with_partition("tally", "tally")
//!     .with_actor("alice", "voter")
//!     .with_actor("bob", "voter");
//!
//! let (backplane, store) = Backplane::in_memory();
//! store.save(&cadence::types::keys::partition_key(&"tally".into()), &[]).unwrap();
//!
//! let config = PipelineConfig {
//!     target_tick_duration: Duration::ZERO,
//!     ..Default::default()
//! };
//! let mut pipeline = Pipeline::start(config, backplane, registry, roster).unwrap();
//! assert!(pipeline
//!     .monitor()
//!     .wait_until(Duration::from_secs(5), |s| s.ticks_completed >= 2));
//! let report = pipeline.shutdown();
//! assert!(report.driver_joined);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `cadence-core` | IDs, messages, durable keys, callback traits |
//! | [`coord`] | `cadence-coord` | Queue, broadcast channel, lock, stores |
//! | [`engine`] | `cadence-engine` | Tick driver, workers, pipeline host |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`cadence-core`).
///
/// Contains the message vocabulary, the [`types::keys`] layout and the
/// callback traits ([`types::ActorLogic`], [`types::PartitionLogic`],
/// [`types::DurableStore`]).
pub use cadence_core as types;

/// Coordination primitives (`cadence-coord`).
///
/// [`coord::VersionedQueue`], [`coord::BroadcastChannel`],
/// [`coord::AdvisoryLock`] and the [`coord::MemoryStore`] and
/// [`coord::FileStore`] backends.
pub use cadence_coord as coord;

/// Tick driver and worker pools (`cadence-engine`).
///
/// [`engine::Pipeline`] hosts everything on background threads;
/// [`engine::TickDriver`] can also be stepped directly.
pub use cadence_engine as engine;

/// Common imports for typical Cadence usage.
///
/// ```rust
/// use cadence::prelude::*;
/// ```
pub mod prelude {
    // Identifiers and effects
    pub use cadence_core::{ActorId, Effect, EffectRecord, KindTag, PartitionId, Tick};

    // Callback traits and their contexts
    pub use cadence_core::{
        ActorContext, ActorLogic, ActorOutput, DurableStore, InputSource, PartitionContext,
        PartitionLogic,
    };

    // Errors
    pub use cadence_core::{ActorError, ApplyError, StoreError};
    pub use cadence_engine::{ConfigError, TickError};

    // Stores
    pub use cadence_coord::{FileStore, MemoryStore};

    // Engine
    pub use cadence_engine::{
        Backplane, DriverMonitor, DriverPhase, LogicRegistry, Pipeline, PipelineConfig, Roster,
        ShutdownReport, TickDriver, TickMetrics, TickReport,
    };
}
