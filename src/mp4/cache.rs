//! `IMsgAudioEncodedCache`-equivalent: the byte source every box processor pulls
//! from (`spec.md` §4.8.1). `Inspect` returns a fixed number of bytes without
//! consuming downstream messages beyond what's needed; `Accumulate` coalesces
//! enough incoming `MsgAudioEncoded` fragments to return a contiguous run;
//! `Discard` skips bytes the demuxer has recognised but does not need to keep.

use crate::error::{Mpeg4Error, Result};

/// Byte source a box processor pulls from. Implemented by the in-band cache (backed by
/// the upstream `MsgAudioEncoded` stream) and by [`super::outofband::OutOfBandCache`]
/// (backed by [`crate::interfaces::ContainerUrlBlockWriter`]).
pub trait Mpeg4Cache {
    /// Returns exactly `n` bytes without advancing the read position permanently
    /// further than necessary to satisfy the request; a second `Inspect(n)` call
    /// before any `Accumulate`/`Discard` returns the same bytes.
    fn inspect(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Consumes and returns exactly `n` bytes, coalescing fragments if they do not
    /// arrive as one contiguous run.
    fn accumulate(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Consumes and discards exactly `n` bytes.
    fn discard(&mut self, n: usize) -> Result<()>;

    /// Bytes available without blocking for more input; `None` if unknown (in-band
    /// streaming sources don't know ahead of time).
    fn bytes_available(&self) -> Option<u64> {
        None
    }
}

/// An in-memory [`Mpeg4Cache`] over a single byte buffer, used for the out-of-band
/// `moov` fetch and for unit tests of box processors.
#[derive(Default)]
pub struct SliceCache {
    bytes: Vec<u8>,
    pos: usize,
}

impl SliceCache {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl Mpeg4Cache for SliceCache {
    fn inspect(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.pos + n > self.bytes.len() {
            return Err(Mpeg4Error::FileInvalid("inspect past end of buffer").into());
        }
        Ok(self.bytes[self.pos..self.pos + n].to_vec())
    }

    fn accumulate(&mut self, n: usize) -> Result<Vec<u8>> {
        let out = self.inspect(n)?;
        self.pos += n;
        Ok(out)
    }

    fn discard(&mut self, n: usize) -> Result<()> {
        if self.pos + n > self.bytes.len() {
            return Err(Mpeg4Error::FileInvalid("discard past end of buffer").into());
        }
        self.pos += n;
        Ok(())
    }

    fn bytes_available(&self) -> Option<u64> {
        Some((self.bytes.len() - self.pos) as u64)
    }
}

/// An in-band [`Mpeg4Cache`] fed by successive `MsgAudioEncoded` fragments as they
/// arrive from upstream (`spec.md` §4.8.1).
#[derive(Default)]
pub struct StreamCache {
    pending: std::collections::VecDeque<u8>,
}

impl StreamCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one more fragment of encoded bytes into the cache, as pulled from a
    /// `MsgAudioEncoded` message by the demuxer's driving loop.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes.iter().copied());
    }

    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }
}

impl Mpeg4Cache for StreamCache {
    fn inspect(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.pending.len() < n {
            return Err(Mpeg4Error::AudioCacheException(format!(
                "need {n} bytes, only {} buffered",
                self.pending.len()
            ))
            .into());
        }
        Ok(self.pending.iter().take(n).copied().collect())
    }

    fn accumulate(&mut self, n: usize) -> Result<Vec<u8>> {
        let out = self.inspect(n)?;
        self.pending.drain(0..n);
        Ok(out)
    }

    fn discard(&mut self, n: usize) -> Result<()> {
        if self.pending.len() < n {
            return Err(Mpeg4Error::AudioCacheException(format!(
                "need to discard {n} bytes, only {} buffered",
                self.pending.len()
            ))
            .into());
        }
        self.pending.drain(0..n);
        Ok(())
    }

    fn bytes_available(&self) -> Option<u64> {
        Some(self.pending.len() as u64)
    }
}

/// A decoded box header: `size32 | 'type'`, with the 64-bit large-size extension
/// (`size == 1` means the real size follows as a big-endian `u64`).
#[derive(Debug, Clone, Copy)]
pub struct BoxHeader {
    pub id: super::fourcc::FourCc,
    /// Payload size in bytes, excluding the header itself.
    pub payload_size: u64,
    /// Total bytes this header occupied on the wire (8 or 16).
    pub header_len: u64,
}

/// Reads one box header off `cache` (`spec.md` §4.8.1 `BoxHeaderReader`).
pub fn read_box_header(cache: &mut dyn Mpeg4Cache) -> Result<BoxHeader> {
    let head = cache.accumulate(8)?;
    let size32 = u32::from_be_bytes(head[0..4].try_into().unwrap());
    let id = super::fourcc::FourCc::from_be_bytes(head[4..8].try_into().unwrap());
    if size32 == 1 {
        let ext = cache.accumulate(8)?;
        let size64 = u64::from_be_bytes(ext[0..8].try_into().unwrap());
        let payload_size = size64
            .checked_sub(16)
            .ok_or(Mpeg4Error::FileInvalid("64-bit box size smaller than its own header"))?;
        Ok(BoxHeader { id, payload_size, header_len: 16 })
    } else if size32 == 0 {
        // Size 0 means "extends to end of file"; callers treat this as "unknown" and
        // fall back to `bytes_available`.
        let remaining = cache.bytes_available().unwrap_or(0);
        Ok(BoxHeader { id, payload_size: remaining, header_len: 8 })
    } else {
        let payload_size = (size32 as u64)
            .checked_sub(8)
            .ok_or(Mpeg4Error::FileInvalid("box size smaller than its own header"))?;
        Ok(BoxHeader { id, payload_size, header_len: 8 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::fourcc::FTYP;

    #[test]
    fn reads_a_32bit_header() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&20u32.to_be_bytes());
        bytes.extend_from_slice(b"ftyp");
        bytes.extend_from_slice(&[0u8; 12]);
        let mut cache = SliceCache::new(bytes);
        let header = read_box_header(&mut cache).unwrap();
        assert_eq!(header.id, FTYP);
        assert_eq!(header.payload_size, 12);
        assert_eq!(header.header_len, 8);
    }

    #[test]
    fn stream_cache_accumulates_across_feeds() {
        let mut cache = StreamCache::new();
        cache.feed(&[1, 2, 3]);
        cache.feed(&[4, 5]);
        assert_eq!(cache.accumulate(4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(cache.buffered_len(), 1);
    }
}
