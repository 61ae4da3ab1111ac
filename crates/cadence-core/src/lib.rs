//! Core types and traits for the Cadence tick pipeline.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! identifiers, the broadcast message vocabulary, the durable key layout,
//! effect-batch framing, and the callback traits the domain layer
//! implements.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod effect;
pub mod error;
pub mod id;
pub mod keys;
pub mod message;
pub mod traits;

pub use effect::{decode_batch, encode_batch, Effect, EffectRecord};
pub use error::{ActorError, ApplyError, EffectDecodeError, StoreError};
pub use id::{ActorId, Attempt, KindTag, PartitionId, Tick};
pub use message::{
    MainMessage, PartitionTask, ProcessorMessage, RunnerMessage, RunnerTask, TouchedPartitions,
};
pub use traits::{
    ActorContext, ActorLogic, ActorOutput, DurableStore, InputSource, NoInputs, PartitionContext,
    PartitionLogic,
};
