//! Leaf box processors with a fixed, version-dependent field layout
//! (`spec.md` §4.8.1; grounded on the `mdhd`/`tkhd`/`mehd`/`stts`/`stsc`/`stco`/`co64`/
//! `stsz`/`tfhd`/`trun`/`sidx`/`schm`/`tenc` readers in the source this demuxer is
//! modelled on).

use crate::error::{Mpeg4Error, Result};
use crate::mp4::cache::Mpeg4Cache;
use crate::mp4::fourcc::{self, FourCc};
use crate::mp4::processor::BoxProcessor;
use crate::mp4::tables::{AudioSamplesPerSampleEntry, SampleSizeTable, SamplesPerChunkEntry};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

fn full_box_version(bytes: &[u8]) -> (u8, [u8; 3]) {
    (bytes[0], [bytes[1], bytes[2], bytes[3]])
}

/// `mdhd`: media header. We only need the timescale and duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mdhd {
    pub timescale: u32,
    pub duration: u64,
}

impl BoxProcessor for Mdhd {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::MDHD
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let mut r = Cursor::new(&payload);
        let (version, _flags) = full_box_version(&payload[0..4]);
        r.set_position(4);
        if version == 1 {
            r.read_u64::<BigEndian>()?; // creation_time
            r.read_u64::<BigEndian>()?; // modification_time
            self.timescale = r.read_u32::<BigEndian>()?;
            self.duration = r.read_u64::<BigEndian>()?;
        } else if version == 0 {
            r.read_u32::<BigEndian>()?; // creation_time
            r.read_u32::<BigEndian>()?; // modification_time
            self.timescale = r.read_u32::<BigEndian>()?;
            self.duration = r.read_u32::<BigEndian>()? as u64;
        } else {
            return Err(Mpeg4Error::FileInvalid("mdhd has an unsupported version").into());
        }
        Ok(())
    }
}

/// `tkhd`: track header. Only the optional fallback duration is kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tkhd {
    pub duration: u64,
}

impl BoxProcessor for Tkhd {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::TKHD
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let version_and_flags = u32::from_be_bytes(payload[0..4].try_into().unwrap());
        let version = (version_and_flags >> 24) as u8;
        let flags = version_and_flags & 0x00_FF_FF_FF;
        if flags & 0x000001 == 0 {
            // Track disabled: nothing useful to read.
            return Ok(());
        }
        let mut r = Cursor::new(&payload);
        r.set_position(4);
        if version == 1 {
            r.read_u64::<BigEndian>()?; // creation_time
            r.read_u64::<BigEndian>()?; // modification_time
            r.read_u32::<BigEndian>()?; // track_id
            r.read_u32::<BigEndian>()?; // reserved
            self.duration = r.read_u64::<BigEndian>()?;
        } else {
            r.read_u32::<BigEndian>()?;
            r.read_u32::<BigEndian>()?;
            r.read_u32::<BigEndian>()?;
            r.read_u32::<BigEndian>()?;
            self.duration = r.read_u32::<BigEndian>()? as u64;
        }
        Ok(())
    }
}

/// `mehd`: movie extends header (fragmented-stream overall duration).
#[derive(Debug, Clone, Copy, Default)]
pub struct Mehd {
    pub fragment_duration: u64,
}

impl BoxProcessor for Mehd {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::MEHD
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let version = payload[0];
        let mut r = Cursor::new(&payload);
        r.set_position(4);
        self.fragment_duration = if version == 1 { r.read_u64::<BigEndian>()? } else { r.read_u32::<BigEndian>()? as u64 };
        Ok(())
    }
}

/// `stts`: time-to-sample, builds the `audioSamplesPerSample` run-length table.
#[derive(Debug, Clone, Default)]
pub struct Stts {
    pub entries: Vec<AudioSamplesPerSampleEntry>,
}

impl BoxProcessor for Stts {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::STTS
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let mut r = Cursor::new(&payload);
        r.set_position(4);
        let entry_count = r.read_u32::<BigEndian>()?;
        self.entries.reserve(entry_count as usize);
        for _ in 0..entry_count {
            let sample_count = r.read_u32::<BigEndian>()?;
            let sample_delta = r.read_u32::<BigEndian>()?;
            self.entries.push(AudioSamplesPerSampleEntry { sample_count, audio_samples: sample_delta });
        }
        Ok(())
    }
}

/// `stsc`: sample-to-chunk run-length table.
#[derive(Debug, Clone, Default)]
pub struct Stsc {
    pub entries: Vec<SamplesPerChunkEntry>,
}

impl BoxProcessor for Stsc {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::STSC
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let mut r = Cursor::new(&payload);
        r.set_position(4);
        let entry_count = r.read_u32::<BigEndian>()?;
        self.entries.reserve(entry_count as usize);
        for _ in 0..entry_count {
            let first_chunk = r.read_u32::<BigEndian>()?;
            let samples_per_chunk = r.read_u32::<BigEndian>()?;
            let sample_description_index = r.read_u32::<BigEndian>()?;
            self.entries.push(SamplesPerChunkEntry { first_chunk, samples_per_chunk, sample_description_index });
        }
        Ok(())
    }
}

/// `stco`: 32-bit chunk offsets.
#[derive(Debug, Clone, Default)]
pub struct Stco {
    pub offsets: Vec<u64>,
}

impl BoxProcessor for Stco {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::STCO
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let mut r = Cursor::new(&payload);
        r.set_position(4);
        let entry_count = r.read_u32::<BigEndian>()?;
        self.offsets.reserve(entry_count as usize);
        for _ in 0..entry_count {
            self.offsets.push(r.read_u32::<BigEndian>()? as u64);
        }
        Ok(())
    }
}

/// `co64`: 64-bit chunk offsets, for files larger than 4GiB.
#[derive(Debug, Clone, Default)]
pub struct Co64 {
    pub offsets: Vec<u64>,
}

impl BoxProcessor for Co64 {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::CO64
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let mut r = Cursor::new(&payload);
        r.set_position(4);
        let entry_count = r.read_u32::<BigEndian>()?;
        self.offsets.reserve(entry_count as usize);
        for _ in 0..entry_count {
            self.offsets.push(r.read_u64::<BigEndian>()?);
        }
        Ok(())
    }
}

/// `stsz`: sample sizes, either one default size or a per-sample list.
#[derive(Debug, Clone, Default)]
pub struct Stsz {
    pub table: Option<SampleSizeTable>,
}

impl BoxProcessor for Stsz {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::STSZ
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let mut r = Cursor::new(&payload);
        r.set_position(4);
        let default_sample_size = r.read_u32::<BigEndian>()?;
        let sample_count = r.read_u32::<BigEndian>()?;
        self.table = Some(if default_sample_size != 0 {
            SampleSizeTable::with_default(default_sample_size, sample_count)
        } else {
            let mut table = SampleSizeTable::with_capacity(sample_count);
            for _ in 0..sample_count {
                let size = r.read_u32::<BigEndian>()?;
                table.append(size, sample_count)?;
            }
            table
        });
        Ok(())
    }
}

const TFHD_BASE_DATA_OFFSET: u32 = 0x000001;
const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x000002;
const TFHD_DEFAULT_SAMPLE_DURATION: u32 = 0x000008;
const TFHD_DEFAULT_SAMPLE_SIZE: u32 = 0x000010;
const TFHD_DEFAULT_SAMPLE_FLAGS: u32 = 0x000020;

const TRUN_DATA_OFFSET: u32 = 0x000001;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x000004;
const TRUN_SAMPLE_DURATION: u32 = 0x000100;
const TRUN_SAMPLE_SIZE: u32 = 0x000200;
const TRUN_SAMPLE_FLAGS: u32 = 0x000400;
const TRUN_SAMPLE_COMPOSITION_TIME_OFFSET: u32 = 0x000800;

/// `tfhd`: track fragment header (fragmented-stream per-fragment defaults).
#[derive(Debug, Clone, Copy, Default)]
pub struct Tfhd {
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
}

impl BoxProcessor for Tfhd {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::TFHD
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let flags = u32::from_be_bytes(payload[0..4].try_into().unwrap()) & 0x00_FF_FF_FF;
        let mut r = Cursor::new(&payload);
        r.set_position(4);
        self.track_id = r.read_u32::<BigEndian>()?;
        if flags & TFHD_BASE_DATA_OFFSET != 0 {
            self.base_data_offset = Some(r.read_u64::<BigEndian>()?);
        }
        if flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0 {
            r.read_u32::<BigEndian>()?;
        }
        if flags & TFHD_DEFAULT_SAMPLE_DURATION != 0 {
            self.default_sample_duration = Some(r.read_u32::<BigEndian>()?);
        }
        if flags & TFHD_DEFAULT_SAMPLE_SIZE != 0 {
            self.default_sample_size = Some(r.read_u32::<BigEndian>()?);
        }
        if flags & TFHD_DEFAULT_SAMPLE_FLAGS != 0 {
            r.read_u32::<BigEndian>()?;
        }
        Ok(())
    }
}

/// `trun`: track fragment run — per-sample sizes/durations for one `moof` run.
#[derive(Debug, Clone, Default)]
pub struct Trun {
    pub sample_sizes: Vec<u32>,
    pub sample_durations: Vec<u32>,
}

impl BoxProcessor for Trun {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::TRUN
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let flags = u32::from_be_bytes(payload[0..4].try_into().unwrap()) & 0x00_FF_FF_FF;
        let mut r = Cursor::new(&payload);
        r.set_position(4);
        let sample_count = r.read_u32::<BigEndian>()?;
        if flags & TRUN_DATA_OFFSET != 0 {
            r.read_u32::<BigEndian>()?;
        }
        if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
            r.read_u32::<BigEndian>()?;
        }
        self.sample_sizes.reserve(sample_count as usize);
        self.sample_durations.reserve(sample_count as usize);
        for _ in 0..sample_count {
            let duration = if flags & TRUN_SAMPLE_DURATION != 0 { r.read_u32::<BigEndian>()? } else { 0 };
            let size = if flags & TRUN_SAMPLE_SIZE != 0 { r.read_u32::<BigEndian>()? } else { 0 };
            if flags & TRUN_SAMPLE_FLAGS != 0 {
                r.read_u32::<BigEndian>()?;
            }
            if flags & TRUN_SAMPLE_COMPOSITION_TIME_OFFSET != 0 {
                r.read_u32::<BigEndian>()?;
            }
            self.sample_sizes.push(size);
            self.sample_durations.push(duration);
        }
        Ok(())
    }
}

/// `sidx`: segment index, the seek table source for fragmented streams.
#[derive(Debug, Clone, Default)]
pub struct Sidx {
    pub timescale: u32,
    pub segment_sizes: Vec<u32>,
    pub segment_durations: Vec<u32>,
}

impl BoxProcessor for Sidx {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::SIDX
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let version = payload[0];
        let mut r = Cursor::new(&payload);
        r.set_position(4);
        r.read_u32::<BigEndian>()?; // reference_id
        self.timescale = r.read_u32::<BigEndian>()?;
        if version == 0 {
            r.read_u32::<BigEndian>()?; // earliest_presentation_time
            r.read_u32::<BigEndian>()?; // first_offset
        } else {
            r.read_u64::<BigEndian>()?;
            r.read_u64::<BigEndian>()?;
        }
        r.read_u16::<BigEndian>()?; // reserved
        let reference_count = r.read_u16::<BigEndian>()?;
        self.segment_sizes.reserve(reference_count as usize);
        self.segment_durations.reserve(reference_count as usize);
        for _ in 0..reference_count {
            let reference = r.read_u32::<BigEndian>()?;
            let size = reference & 0x7FFF_FFFF;
            let duration = r.read_u32::<BigEndian>()?;
            r.read_u32::<BigEndian>()?; // sap flags/delta-time
            self.segment_sizes.push(size);
            self.segment_durations.push(duration);
        }
        Ok(())
    }
}

/// `schm`: encryption scheme type, found inside `sinf` for protected `enca` entries.
/// Only `"cenc"` is supported, per `spec.md` §4.8.3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Schm;

impl BoxProcessor for Schm {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::SCHM
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let scheme_type = &payload[4..8];
        if scheme_type != b"cenc" {
            return Err(Mpeg4Error::FileInvalid("protected content uses an encryption scheme other than cenc").into());
        }
        Ok(())
    }
}

/// `tenc`: per-track default encryption parameters (`spec.md` §4.8.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct Tenc {
    pub is_protected: bool,
    pub key_id: [u8; 16],
    pub per_sample_iv_size: u8,
}

impl BoxProcessor for Tenc {
    fn recognise(&self, id: FourCc) -> bool {
        id == fourcc::TENC
    }

    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()> {
        let payload = cache.accumulate(payload_size as usize)?;
        let version = payload[0];
        if version != 0 {
            return Err(Mpeg4Error::FileInvalid("tenc version other than 0 is unsupported").into());
        }
        // bytes[4] reserved, bytes[5] default_IsProtected, bytes[6] default_Per_Sample_IV_Size, [7..23) KID
        self.is_protected = payload[5] != 0;
        self.per_sample_iv_size = payload[6];
        if self.per_sample_iv_size != 8 && self.per_sample_iv_size != 16 {
            return Err(Mpeg4Error::FileInvalid("tenc per-sample IV size must be 8 or 16 bytes").into());
        }
        self.key_id.copy_from_slice(&payload[7..23]);
        if self.is_protected && self.per_sample_iv_size == 0 {
            return Err(Mpeg4Error::FileInvalid("constant-IV encryption schemes are not supported").into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::cache::SliceCache;

    fn full_box(version: u8, fields: &[u8]) -> Vec<u8> {
        let mut v = vec![version, 0, 0, 0];
        v.extend_from_slice(fields);
        v
    }

    #[test]
    fn mdhd_v0_reads_timescale_and_duration() {
        let mut fields = Vec::new();
        fields.extend_from_slice(&0u32.to_be_bytes()); // creation
        fields.extend_from_slice(&0u32.to_be_bytes()); // modification
        fields.extend_from_slice(&44_100u32.to_be_bytes());
        fields.extend_from_slice(&5000u32.to_be_bytes());
        let payload = full_box(0, &fields);
        let mut cache = SliceCache::new(payload.clone());
        let mut mdhd = Mdhd::default();
        mdhd.set(&mut cache, payload.len() as u64).unwrap();
        assert_eq!(mdhd.timescale, 44_100);
        assert_eq!(mdhd.duration, 5000);
    }

    #[test]
    fn stsz_default_size_table_reports_sample_count() {
        let mut fields = Vec::new();
        fields.extend_from_slice(&100u32.to_be_bytes());
        fields.extend_from_slice(&10u32.to_be_bytes());
        let payload = full_box(0, &fields);
        let mut cache = SliceCache::new(payload.clone());
        let mut stsz = Stsz::default();
        stsz.set(&mut cache, payload.len() as u64).unwrap();
        assert_eq!(stsz.table.unwrap().sample_count(), 10);
    }

    #[test]
    fn tenc_rejects_unsupported_iv_size() {
        let mut fields = vec![0u8, 0, 0]; // reserved + is_protected + iv size placeholder
        fields[1] = 1;
        fields[2] = 4; // invalid IV size
        fields.extend_from_slice(&[0u8; 16]);
        let payload = full_box(0, &fields);
        let mut cache = SliceCache::new(payload.clone());
        let mut tenc = Tenc::default();
        assert!(tenc.set(&mut cache, payload.len() as u64).is_err());
    }

    #[test]
    fn schm_rejects_non_cenc_scheme() {
        let mut fields = Vec::new();
        fields.extend_from_slice(b"xenc");
        fields.extend_from_slice(&1u32.to_be_bytes());
        let payload = full_box(0, &fields);
        let mut cache = SliceCache::new(payload.clone());
        let mut schm = Schm;
        assert!(schm.set(&mut cache, payload.len() as u64).is_err());
    }
}
