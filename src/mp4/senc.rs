//! `senc`: per-sample initialization vectors for CENC-protected content
//! (`spec.md` §4.8.3: "`senc` stores one IV per sample").
//!
//! Unlike the other leaf boxes, `senc` cannot be parsed on its own: its `sample_count`
//! field has no declared per-entry size — the IV width comes from the track's `tenc`
//! box, parsed earlier in `stsd`. The demuxer hands that width in via
//! [`Senc::parse`] rather than going through the generic [`super::processor::BoxProcessor`]
//! dispatch that the fixed-layout boxes in `boxes_simple` use.

use crate::error::{Mpeg4Error, Result};
use crate::mp4::cache::Mpeg4Cache;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

const SENC_USE_SUBSAMPLE_ENCRYPTION: u32 = 0x000002;

/// One sample's worth of CENC metadata: its IV, left-padded to 16 bytes if the track
/// uses an 8-byte IV (`spec.md` §4.8.3: "8 is left-padded with zero bytes to 16 on
/// extraction").
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleIv(pub [u8; 16]);

/// Parsed `senc` box: one IV per sample, in sample order.
#[derive(Debug, Clone, Default)]
pub struct Senc {
    pub ivs: Vec<SampleIv>,
}

impl Senc {
    /// Reads `payload_size` bytes of a `senc` box, given the per-sample IV width
    /// declared by `tenc` (8 or 16 bytes, already validated by [`super::boxes_simple::Tenc`]).
    pub fn parse(cache: &mut dyn Mpeg4Cache, payload_size: u64, iv_size: u8) -> Result<Self> {
        let payload = cache.accumulate(payload_size as usize)?;
        let mut r = Cursor::new(&payload);
        let flags = u32::from_be_bytes(payload[0..4].try_into().unwrap()) & 0x00_FF_FF_FF;
        r.set_position(4);
        let sample_count = r.read_u32::<BigEndian>()?;
        let mut ivs = Vec::with_capacity(sample_count as usize);
        for _ in 0..sample_count {
            let mut iv = [0u8; 16];
            match iv_size {
                8 => {
                    let mut narrow = [0u8; 8];
                    r.read_exact(&mut narrow)?;
                    iv[8..].copy_from_slice(&narrow);
                }
                16 => r.read_exact(&mut iv)?,
                _ => return Err(Mpeg4Error::FileInvalid("senc IV size must be 8 or 16 bytes").into()),
            }
            ivs.push(SampleIv(iv));
            if flags & SENC_USE_SUBSAMPLE_ENCRYPTION != 0 {
                // Subsample encryption ranges: not produced by any stream this demuxer
                // targets (whole-sample CENC only), so skip them rather than
                // misinterpret the bytes as the next sample's IV.
                let subsample_count = r.read_u16::<BigEndian>()?;
                for _ in 0..subsample_count {
                    r.read_u16::<BigEndian>()?; // clear bytes
                    r.read_u32::<BigEndian>()?; // protected bytes
                }
            }
        }
        Ok(Self { ivs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::cache::SliceCache;

    #[test]
    fn parses_whole_sample_ivs_at_8_bytes() {
        let mut payload = vec![0u8, 0, 0, 0]; // version/flags, no subsample encryption
        payload.extend_from_slice(&2u32.to_be_bytes()); // sample_count
        payload.extend_from_slice(&[1u8; 8]);
        payload.extend_from_slice(&[2u8; 8]);
        let mut cache = SliceCache::new(payload.clone());
        let senc = Senc::parse(&mut cache, payload.len() as u64, 8).unwrap();
        assert_eq!(senc.ivs.len(), 2);
        assert_eq!(&senc.ivs[0].0[8..], &[1u8; 8]);
        assert_eq!(&senc.ivs[0].0[..8], &[0u8; 8]);
        assert_eq!(&senc.ivs[1].0[8..], &[2u8; 8]);
    }
}
