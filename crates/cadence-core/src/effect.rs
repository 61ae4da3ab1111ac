//! Effect records and the batch framing used to persist them.
//!
//! Every payload one actor emits for one partition during a tick is stored
//! as a single blob under [`effect_key`](crate::keys::effect_key):
//!
//! ```text
//! u32 count | count × (u32 len | len bytes)
//! ```
//!
//! All integers are little-endian. The payloads themselves are opaque.

use crate::error::EffectDecodeError;
use crate::id::{ActorId, PartitionId};

/// A payload emitted by actor logic, addressed to one partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Effect {
    /// The partition that must apply this effect.
    pub partition: PartitionId,
    /// Opaque domain payload.
    pub payload: Vec<u8>,
}

impl Effect {
    /// Create an effect for `partition`.
    pub fn new(partition: impl Into<PartitionId>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            partition: partition.into(),
            payload: payload.into(),
        }
    }
}

/// An effect as seen by the partition-apply callback: the payload plus the
/// actor that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectRecord {
    /// The actor whose logic emitted this payload.
    pub producer: ActorId,
    /// Opaque domain payload.
    pub payload: Vec<u8>,
}

const LEN_BYTES: usize = 4;

/// Encode an ordered list of payloads as one effect batch blob.
pub fn encode_batch<P: AsRef<[u8]>>(payloads: &[P]) -> Vec<u8> {
    let body: usize = payloads
        .iter()
        .map(|p| LEN_BYTES + p.as_ref().len())
        .sum();
    let mut out = Vec::with_capacity(LEN_BYTES + body);
    out.extend_from_slice(&(payloads.len() as u32).to_le_bytes());
    for payload in payloads {
        let bytes = payload.as_ref();
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(bytes);
    }
    out
}

/// Decode an effect batch blob back into its payloads, in emission order.
pub fn decode_batch(blob: &[u8]) -> Result<Vec<Vec<u8>>, EffectDecodeError> {
    let mut cursor = Cursor { blob, pos: 0 };
    let count = cursor.read_u32()?;
    // Every payload needs at least its length prefix.
    if (count as usize).saturating_mul(LEN_BYTES) > cursor.remaining() {
        return Err(EffectDecodeError::CountOverflow { count });
    }
    let mut payloads = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = cursor.read_u32()? as usize;
        payloads.push(cursor.take(len)?.to_vec());
    }
    match cursor.remaining() {
        0 => Ok(payloads),
        remaining => Err(EffectDecodeError::TrailingBytes { remaining }),
    }
}

struct Cursor<'a> {
    blob: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.blob.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], EffectDecodeError> {
        if n > self.remaining() {
            return Err(EffectDecodeError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.blob[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, EffectDecodeError> {
        let bytes = self.take(LEN_BYTES)?;
        let mut raw = [0u8; LEN_BYTES];
        raw.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn batch_preserves_emission_order() {
        let blob = encode_batch(&[b"move".as_slice(), b"", b"build"]);
        let decoded = decode_batch(&blob).unwrap();
        assert_eq!(decoded, vec![b"move".to_vec(), Vec::new(), b"build".to_vec()]);
    }

    #[test]
    fn empty_batch_is_four_zero_bytes() {
        let blob = encode_batch::<&[u8]>(&[]);
        assert_eq!(blob, vec![0, 0, 0, 0]);
        assert!(decode_batch(&blob).unwrap().is_empty());
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut blob = encode_batch(&[b"abcdef".as_slice()]);
        blob.truncate(blob.len() - 2);
        assert_eq!(
            decode_batch(&blob),
            Err(EffectDecodeError::Truncated {
                offset: 8,
                needed: 2
            })
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut blob = encode_batch(&[b"x".as_slice()]);
        blob.push(0xff);
        assert_eq!(
            decode_batch(&blob),
            Err(EffectDecodeError::TrailingBytes { remaining: 1 })
        );
    }

    #[test]
    fn absurd_count_is_rejected_before_allocating() {
        let blob = u32::MAX.to_le_bytes().to_vec();
        assert_eq!(
            decode_batch(&blob),
            Err(EffectDecodeError::CountOverflow { count: u32::MAX })
        );
    }

    proptest! {
        #[test]
        fn decode_never_panics(blob in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_batch(&blob);
        }
    }
}
