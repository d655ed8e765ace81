//! Raw sample storage backing decoded and encoded audio messages (`spec.md` §3.3).
//!
//! `DecodedAudio` and `EncodedAudio` are pooled, append-only byte buffers. They are
//! shared by reference between a message and any messages produced by splitting it, so
//! a split never copies sample data — only the `(offset, len)` window a `MsgAudioPcm`/
//! `MsgAudioDsd`/`MsgAudioEncoded` views into the buffer changes.

use crate::error::{AudioError, Result};
use crate::msg::pool::{Clearable, Pool, PoolHandle};
use std::sync::Arc;

/// Feedback hook for queued pipeline audio, attachable to any audio message envelope
/// (`spec.md` §4.5 `IPipelineBufferObserver`). Attachment reports `+size` immediately;
/// a message's destruction reports `-size`; split re-attributes by letting each half
/// report its own remaining share at its own destruction, and clone does not propagate
/// attribution at all (each clone's owner is responsible for its own).
///
/// For decoded PCM/DSD messages `size` is jiffies; for still-encoded messages it is
/// bytes, mirroring the reservoir's separate jiffies/encoded-bytes counters (`spec.md`
/// §4.3).
pub trait PipelineBufferObserver: Send + Sync {
    fn report_delta(&self, delta: i64);
}

/// A shared handle to an attached [`PipelineBufferObserver`].
pub type BufferObserver = Arc<dyn PipelineBufferObserver>;

/// Capacity, in bytes, of one `DecodedAudio`/`EncodedAudio` cell. Chosen so a single
/// cell holds a few encoded or decoded frames without forcing the allocator to loop
/// (`spec.md` §3.3, default ≈9 KiB — see [`crate::config::PipelineConfig`]).
pub const DEFAULT_BUFFER_BYTES: usize = 9 * 1024;

/// Append-only raw byte storage, shared by `Arc`-style cloning between every message
/// whose window references it.
#[derive(Debug)]
pub struct RawAudio {
    bytes: Vec<u8>,
    capacity: usize,
}

impl RawAudio {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { bytes: Vec::with_capacity(capacity), capacity }
    }

    /// Appends `data`, erroring if it would exceed the buffer's fixed capacity.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if self.bytes.len() + data.len() > self.capacity {
            return Err(AudioError::BufferFull {
                used: self.bytes.len(),
                capacity: self.capacity,
            }
            .into());
        }
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Total bytes stored so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Byte slice `[offset, offset + len)`.
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.bytes[offset..offset + len]
    }
}

impl Default for RawAudio {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_BYTES)
    }
}
impl Clearable for RawAudio {
    fn clear(&mut self) {
        self.bytes.clear();
    }
}

/// A pooled handle to decoded PCM/DSD sample bytes, shared between every `MsgAudioPcm`/
/// `MsgAudioDsd`/`MsgPlayable*` that views a window of it.
pub type DecodedAudio = PoolHandle<RawAudio>;
/// A pooled handle to still-encoded bytes, shared between every `MsgAudioEncoded` that
/// views a window of it.
pub type EncodedAudio = PoolHandle<RawAudio>;

/// Pools backing [`DecodedAudio`]/[`EncodedAudio`] allocation.
pub struct AudioBufferPools {
    pub decoded: Pool<RawAudio>,
    pub encoded: Pool<RawAudio>,
}

impl AudioBufferPools {
    pub fn new(decoded_cells: usize, encoded_cells: usize) -> Self {
        Self {
            decoded: Pool::new("decoded_audio", decoded_cells),
            encoded: Pool::new("encoded_audio", encoded_cells),
        }
    }

    pub fn allocate_decoded(&self, data: &[u8]) -> Result<DecodedAudio> {
        let handle = self.decoded.allocate(|_| {});
        handle.with_mut(|raw| raw.append(data))?;
        Ok(handle)
    }

    pub fn allocate_encoded(&self, data: &[u8]) -> Result<EncodedAudio> {
        let handle = self.encoded.allocate(|_| {});
        handle.with_mut(|raw| raw.append(data))?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_slice_round_trips() {
        let pools = AudioBufferPools::new(2, 2);
        let buf = pools.allocate_decoded(&[1, 2, 3, 4]).unwrap();
        assert_eq!(buf.with(|raw| raw.len()), 4);
        assert_eq!(buf.with(|raw| raw.slice(1, 2).to_vec()), vec![2, 3]);
    }

    #[test]
    fn append_past_capacity_errors() {
        let pool: Pool<RawAudio> = Pool::new("small", 1);
        let handle = pool.allocate(|raw| *raw = RawAudio::with_capacity(2));
        assert!(handle.with_mut(|raw| raw.append(&[1, 2, 3])).is_err());
    }

    #[test]
    fn clone_shares_the_same_underlying_cell() {
        let pools = AudioBufferPools::new(2, 2);
        let buf = pools.allocate_decoded(&[9, 9]).unwrap();
        let shared = buf.clone();
        assert!(buf.points_to_same_cell(&shared));
        assert_eq!(buf.ref_count(), 2);
    }
}
