//! Test utilities for Cadence development.
//!
//! Provides deterministic actor and partition fixtures, a
//! [`RecordingStore`] that logs every store access into a shared
//! [`EventLog`] alongside every worker-channel message, a [`Harness`] that
//! runs worker pools on that backplane, and seeded random worlds.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod harness;
pub mod recording;
pub mod world;

pub use fixtures::{
    read_count, read_entries, AppendPartition, CountingPartition, FailingActor, RouteActor,
    APPEND_KIND, COUNTING_KIND, FAILING_KIND, ROUTE_KIND,
};
pub use harness::{fast_config, Harness};
pub use recording::{recording_backplane, Event, EventLog, RecordingStore};
pub use world::{random_world, standard_registry};
