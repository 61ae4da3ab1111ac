//! Durable key conventions.
//!
//! | Key | Contents |
//! |-----|----------|
//! | `partition/<id>` | partition snapshot |
//! | `effect/<tick>/<partition>/<producer>` | one actor's effect batch for one partition |
//! | `actor/<id>` | actor state carried between ticks |
//! | `tick` | the driver's current tick, 8 bytes little-endian |
//!
//! The store has no versioning of its own; the tick is encoded into the
//! effect keys instead.
//!
//! Any string is a valid ID. Each ID becomes exactly one key segment: `%`,
//! `/` and `\` are percent-encoded, as is a leading `.`, and the empty ID
//! is written `%`. Plain IDs appear in keys unchanged, and distinct IDs
//! never share a key.

use std::borrow::Cow;

use crate::id::{ActorId, PartitionId, Tick};

/// Key holding the driver's current tick.
pub const TICK_KEY: &str = "tick";

/// Key of a partition snapshot.
pub fn partition_key(partition: &PartitionId) -> String {
    format!("partition/{}", segment(partition.as_str()))
}

/// Key of the effect batch `producer` emitted for `partition` during `tick`.
pub fn effect_key(tick: Tick, partition: &PartitionId, producer: &ActorId) -> String {
    format!(
        "effect/{tick}/{}/{}",
        segment(partition.as_str()),
        segment(producer.as_str())
    )
}

/// Prefix shared by every effect key of `tick`.
pub fn effect_tick_prefix(tick: Tick) -> String {
    format!("effect/{tick}/")
}

/// Key of an actor's persisted state.
pub fn actor_key(actor: &ActorId) -> String {
    format!("actor/{}", segment(actor.as_str()))
}

/// One ID as a single key segment.
fn segment(id: &str) -> Cow<'_, str> {
    if id.is_empty() {
        return Cow::Borrowed("%");
    }
    if !id.starts_with('.') && !id.contains(|c: char| matches!(c, '%' | '/' | '\\')) {
        return Cow::Borrowed(id);
    }
    let mut out = String::with_capacity(id.len() + 6);
    for (i, c) in id.char_indices() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            '.' if i == 0 => out.push_str("%2E"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Encode a tick for storage under [`TICK_KEY`].
pub fn encode_tick(tick: Tick) -> [u8; 8] {
    tick.0.to_le_bytes()
}

/// Decode a tick stored under [`TICK_KEY`]. Returns `None` if the blob is
/// not exactly 8 bytes.
pub fn decode_tick(bytes: &[u8]) -> Option<Tick> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(Tick(u64::from_le_bytes(raw)))
}
