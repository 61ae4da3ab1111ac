//! Strongly-typed identifiers: ticks, actors, partitions and kind tags.

use std::fmt;

/// Monotonically increasing tick counter.
///
/// The version tag for every queue operation and every durable key written
/// during one global step. Owned by the tick driver; read-only to workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// The tick that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Tick {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// One driver's run of one tick.
///
/// Unique per backplane. A tick re-run after a crash or a lost tick save
/// gets a fresh attempt, and workers echo it in every acknowledgment, so a
/// driver never counts work done for an earlier run of the same tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Attempt(pub u64);

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Wrap an identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(v: &str) -> Self {
                Self(v.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(v: String) -> Self {
                Self(v)
            }
        }
    };
}

string_id! {
    /// Opaque, stable identifier of an actor.
    ///
    /// An actor's logic runs once per tick and produces effect records
    /// addressed to partitions.
    ActorId
}

string_id! {
    /// Opaque, stable identifier of a state partition (e.g. a spatial region).
    PartitionId
}

string_id! {
    /// Tag selecting which registered logic handles an actor or partition.
    ///
    /// Resolved through an explicit registry at startup, never by
    /// inspecting the state itself.
    KindTag
}
