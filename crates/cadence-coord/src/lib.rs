//! Coordination primitives for the Cadence tick pipeline.
//!
//! Four minimal building blocks with no simulation knowledge:
//!
//! - [`VersionedQueue`]: work items tagged with the current tick, consumed
//!   destructively (at-most-once).
//! - [`BroadcastChannel`]: fan-out signals with no backlog.
//! - [`AdvisoryLock`]: named cooperative mutual exclusion.
//! - [`DurableStore`](cadence_core::DurableStore) implementations:
//!   [`MemoryStore`] and [`FileStore`].
//!
//! Every primitive is shared between workers by `Arc`; workers share
//! nothing else.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod channel;
pub mod file;
pub mod lock;
pub mod memory;
pub mod queue;

pub use channel::{BroadcastChannel, ChannelClosed, PublishObserver, Subscription};
pub use file::FileStore;
pub use lock::AdvisoryLock;
pub use memory::MemoryStore;
pub use queue::{Drain, VersionedQueue};
