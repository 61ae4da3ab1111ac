//! Error types for workers and the tick driver.

use std::error::Error;
use std::fmt;

use cadence_core::{ActorId, ApplyError, EffectDecodeError, KindTag, StoreError};

use crate::monitor::DriverPhase;

/// Why a worker could not complete a queue item.
///
/// The item is never acknowledged; the worker broadcasts a failure signal
/// and moves on, leaving the tick stalled for an operator to resolve.
#[derive(Debug)]
pub enum WorkerError {
    /// The durable store failed.
    Store(StoreError),
    /// No logic is registered for the item's kind.
    UnknownKind {
        /// The unknown kind.
        kind: KindTag,
    },
    /// An effect record referenced by the task does not exist.
    MissingEffect {
        /// The effect key.
        key: String,
    },
    /// An effect record could not be unframed.
    Decode {
        /// The actor whose record was malformed.
        producer: ActorId,
        /// The framing error.
        source: EffectDecodeError,
    },
    /// The partition-apply callback failed.
    Apply(ApplyError),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store: {e}"),
            Self::UnknownKind { kind } => write!(f, "no logic registered for kind '{kind}'"),
            Self::MissingEffect { key } => write!(f, "effect record '{key}' is missing"),
            Self::Decode { producer, source } => {
                write!(f, "effect record from '{producer}' is malformed: {source}")
            }
            Self::Apply(e) => write!(f, "apply: {e}"),
        }
    }
}

impl Error for WorkerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Decode { source, .. } => Some(source),
            Self::Apply(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for WorkerError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<ApplyError> for WorkerError {
    fn from(e: ApplyError) -> Self {
        Self::Apply(e)
    }
}

/// Why the driver did not finish a tick.
#[derive(Debug)]
pub enum TickError {
    /// Shutdown was requested while the driver was waiting in `phase`.
    /// The tick did not advance and may be resumed by a later driver.
    Interrupted {
        /// Where the driver was waiting.
        phase: DriverPhase,
    },
    /// The durable store failed while reading or advancing the tick.
    Store(StoreError),
    /// The persisted tick counter is not an 8-byte little-endian integer.
    CorruptTick {
        /// Length of the blob found under the tick key.
        len: usize,
    },
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted { phase } => write!(f, "tick interrupted in {phase}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::CorruptTick { len } => {
                write!(f, "persisted tick is {len} bytes, expected 8")
            }
        }
    }
}

impl Error for TickError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Interrupted { .. } | Self::CorruptTick { .. } => None,
        }
    }
}

impl From<StoreError> for TickError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
