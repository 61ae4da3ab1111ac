//! Error types shared across the Cadence workspace.
//!
//! Organized by who raises them: the durable store, effect-batch framing,
//! and the two domain callbacks (actor logic and partition apply).

use std::error::Error;
use std::fmt;
use std::io;

use crate::id::ActorId;

/// Errors from a [`DurableStore`](crate::DurableStore) operation.
#[derive(Debug)]
pub enum StoreError {
    /// No blob is stored under the key.
    NotFound {
        /// The missing key.
        key: String,
    },
    /// The key cannot be mapped onto the backing storage.
    InvalidKey {
        /// The rejected key.
        key: String,
    },
    /// The backing storage failed.
    Io {
        /// The key being accessed.
        key: String,
        /// The underlying I/O error.
        source: io::Error,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "no blob stored under '{key}'"),
            Self::InvalidKey { key } => write!(f, "invalid store key '{key}'"),
            Self::Io { key, source } => write!(f, "I/O error on '{key}': {source}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors decoding an effect batch blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EffectDecodeError {
    /// The blob ended before a declared field or payload.
    Truncated {
        /// Byte offset at which more data was expected.
        offset: usize,
        /// Number of bytes still needed.
        needed: usize,
    },
    /// Bytes remain after the declared number of payloads.
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },
    /// The declared payload count cannot fit in the blob.
    CountOverflow {
        /// The declared count.
        count: u32,
    },
}

impl fmt::Display for EffectDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { offset, needed } => {
                write!(f, "truncated at byte {offset}: {needed} more bytes expected")
            }
            Self::TrailingBytes { remaining } => {
                write!(f, "{remaining} trailing bytes after last payload")
            }
            Self::CountOverflow { count } => {
                write!(f, "declared payload count {count} exceeds blob size")
            }
        }
    }
}

impl Error for EffectDecodeError {}

/// Failure reported by an actor-logic callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActorError {
    /// The actor's logic failed this tick.
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for ActorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "actor logic failed: {reason}"),
        }
    }
}

impl Error for ActorError {}

/// Failure reported by a partition-apply callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyError {
    /// An effect payload could not be interpreted.
    MalformedEffect {
        /// The actor that produced the payload.
        producer: ActorId,
        /// What was wrong with it.
        reason: String,
    },
    /// The partition state itself could not be interpreted or updated.
    Rejected {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedEffect { producer, reason } => {
                write!(f, "malformed effect from '{producer}': {reason}")
            }
            Self::Rejected { reason } => write!(f, "partition update rejected: {reason}"),
        }
    }
}

impl Error for ApplyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_chains_io_source() {
        let err = StoreError::Io {
            key: "partition/p1".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("partition/p1"));
        assert!(StoreError::NotFound { key: "k".into() }.source().is_none());
    }

    #[test]
    fn apply_error_names_producer() {
        let err = ApplyError::MalformedEffect {
            producer: ActorId::new("a7"),
            reason: "bad opcode".into(),
        };
        assert_eq!(err.to_string(), "malformed effect from 'a7': bad opcode");
    }
}
