//! The synthesised metadata prefix the demuxer sends ahead of the first chunk of audio
//! for a stream, and its reader (`spec.md` §4.8.5).
//!
//! Wire format (all fields big-endian):
//!
//! ```text
//! codecName[32] | sampleRate(u32) | timescale(u32) | channels(u32)
//!              | bitDepth(u32) | duration(u64) | streamDescriptorBytes(u32)
//!              | [codec-specific descriptor bytes]
//!              | [serialized sample-size table]
//!              | [serialized seek table]
//! ```
//!
//! For codecs that carry their own stream info (`fLaC`) the descriptor is still
//! written (it *is* the stream info, in that case) but the sample-size table is
//! omitted; for those that need only the sample table (`dOps`) the seek table is
//! omitted. `spec.md` §4.8.5 describes both as prefix trims — modelled here as
//! [`PrefixContents`] flags the writer/reader agree on up front, since nothing in the
//! wire bytes themselves says which tables follow.

use crate::error::{Mpeg4Error, Result};
use crate::mp4::tables::{AudioSamplesPerSampleEntry, SampleSizeTable, SamplesPerChunkEntry, SeekTable};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// The codec-agnostic stream parameters carried ahead of the first audio frame
/// (`spec.md` §4.8.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mpeg4StreamInfo {
    pub codec_name: String,
    pub sample_rate: u32,
    pub timescale: u32,
    pub channels: u32,
    pub bit_depth: u32,
    pub duration: u64,
    pub descriptor: Vec<u8>,
}

/// Which optional tables follow the fixed header, decided by the codec
/// (`spec.md` §4.8.5: "for codecs that carry their own stream info (`fLaC`), the
/// prefix is omitted; for those that need only the sample table (`dOps`), only that
/// table is appended").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixContents {
    pub sample_size_table: bool,
    pub seek_table: bool,
}

impl PrefixContents {
    pub const FULL: Self = Self { sample_size_table: true, seek_table: true };
    pub const SAMPLE_TABLE_ONLY: Self = Self { sample_size_table: true, seek_table: false };
    pub const NEITHER: Self = Self { sample_size_table: false, seek_table: false };
}

fn write_codec_name(w: &mut Vec<u8>, name: &str) -> Result<()> {
    let mut buf = [0u8; 32];
    let bytes = name.as_bytes();
    if bytes.len() > 32 {
        return Err(Mpeg4Error::FileInvalid("codec name longer than 32 bytes").into());
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    w.extend_from_slice(&buf);
    Ok(())
}

/// Serialises `info` (plus, per `contents`, the sample-size and seek tables) into the
/// single contiguous prefix buffer described above. The demuxer is responsible for
/// chunking this into `MsgAudioEncoded` messages no larger than `kMaxEncodedBytes`
/// each (`spec.md` §4.8.5) — see [`crate::mp4::demux::chunk_into_messages`].
pub fn write_prefix(
    info: &Mpeg4StreamInfo,
    sample_size_table: Option<&SampleSizeTable>,
    seek_table: Option<&SeekTable>,
    contents: PrefixContents,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_codec_name(&mut out, &info.codec_name)?;
    out.write_u32::<BigEndian>(info.sample_rate)?;
    out.write_u32::<BigEndian>(info.timescale)?;
    out.write_u32::<BigEndian>(info.channels)?;
    out.write_u32::<BigEndian>(info.bit_depth)?;
    out.write_u64::<BigEndian>(info.duration)?;
    out.write_u32::<BigEndian>(info.descriptor.len() as u32)?;
    out.extend_from_slice(&info.descriptor);

    if contents.sample_size_table {
        let table = sample_size_table.ok_or(Mpeg4Error::FileInvalid("prefix needs a sample-size table but none was given"))?;
        write_sample_size_table(&mut out, table)?;
    }
    if contents.seek_table {
        let table = seek_table.ok_or(Mpeg4Error::FileInvalid("prefix needs a seek table but none was given"))?;
        write_seek_table(&mut out, table)?;
    }
    Ok(out)
}

const SAMPLE_SIZE_TABLE_DEFAULT_TAG: u8 = 0;
const SAMPLE_SIZE_TABLE_PER_SAMPLE_TAG: u8 = 1;

fn write_sample_size_table(out: &mut Vec<u8>, table: &SampleSizeTable) -> Result<()> {
    match table {
        SampleSizeTable::Default { size, count } => {
            out.write_u8(SAMPLE_SIZE_TABLE_DEFAULT_TAG)?;
            out.write_u32::<BigEndian>(*size)?;
            out.write_u32::<BigEndian>(*count)?;
        }
        SampleSizeTable::PerSample(sizes) => {
            out.write_u8(SAMPLE_SIZE_TABLE_PER_SAMPLE_TAG)?;
            out.write_u32::<BigEndian>(sizes.len() as u32)?;
            for size in sizes {
                out.write_u32::<BigEndian>(*size)?;
            }
        }
    }
    Ok(())
}

fn write_seek_table(out: &mut Vec<u8>, table: &SeekTable) -> Result<()> {
    let spc = table.samples_per_chunk_entries();
    out.write_u32::<BigEndian>(spc.len() as u32)?;
    for e in spc {
        out.write_u32::<BigEndian>(e.first_chunk)?;
        out.write_u32::<BigEndian>(e.samples_per_chunk)?;
        out.write_u32::<BigEndian>(e.sample_description_index)?;
    }
    let aps = table.audio_samples_per_sample_entries();
    out.write_u32::<BigEndian>(aps.len() as u32)?;
    for e in aps {
        out.write_u32::<BigEndian>(e.sample_count)?;
        out.write_u32::<BigEndian>(e.audio_samples)?;
    }
    let offsets = table.offset_entries();
    out.write_u32::<BigEndian>(offsets.len() as u32)?;
    for o in offsets {
        out.write_u64::<BigEndian>(*o)?;
    }
    Ok(())
}

/// Reads back a prefix written by [`write_prefix`]. Returns the stream info plus
/// whichever tables `contents` says were appended.
pub fn read_prefix(
    bytes: &[u8],
    contents: PrefixContents,
) -> Result<(Mpeg4StreamInfo, Option<SampleSizeTable>, Option<SeekTable>)> {
    let mut r = Cursor::new(bytes);
    let mut name_buf = [0u8; 32];
    r.read_exact(&mut name_buf)?;
    let nul = name_buf.iter().position(|b| *b == 0).unwrap_or(32);
    let codec_name = String::from_utf8_lossy(&name_buf[..nul]).into_owned();
    let sample_rate = r.read_u32::<BigEndian>()?;
    let timescale = r.read_u32::<BigEndian>()?;
    let channels = r.read_u32::<BigEndian>()?;
    let bit_depth = r.read_u32::<BigEndian>()?;
    let duration = r.read_u64::<BigEndian>()?;
    let descriptor_len = r.read_u32::<BigEndian>()? as usize;
    let mut descriptor = vec![0u8; descriptor_len];
    r.read_exact(&mut descriptor)?;

    let info = Mpeg4StreamInfo { codec_name, sample_rate, timescale, channels, bit_depth, duration, descriptor };

    let sample_size_table = if contents.sample_size_table { Some(read_sample_size_table(&mut r)?) } else { None };
    let seek_table = if contents.seek_table { Some(read_seek_table(&mut r)?) } else { None };
    Ok((info, sample_size_table, seek_table))
}

fn read_sample_size_table(r: &mut Cursor<&[u8]>) -> Result<SampleSizeTable> {
    let tag = r.read_u8()?;
    match tag {
        SAMPLE_SIZE_TABLE_DEFAULT_TAG => {
            let size = r.read_u32::<BigEndian>()?;
            let count = r.read_u32::<BigEndian>()?;
            Ok(SampleSizeTable::with_default(size, count))
        }
        SAMPLE_SIZE_TABLE_PER_SAMPLE_TAG => {
            let count = r.read_u32::<BigEndian>()?;
            let mut table = SampleSizeTable::with_capacity(count);
            for _ in 0..count {
                table.append(r.read_u32::<BigEndian>()?, count)?;
            }
            Ok(table)
        }
        _ => Err(Mpeg4Error::FileInvalid("unknown sample-size table tag in metadata prefix").into()),
    }
}

fn read_seek_table(r: &mut Cursor<&[u8]>) -> Result<SeekTable> {
    let mut table = SeekTable::new();
    let spc_count = r.read_u32::<BigEndian>()?;
    let mut spc = Vec::with_capacity(spc_count as usize);
    for _ in 0..spc_count {
        spc.push(SamplesPerChunkEntry {
            first_chunk: r.read_u32::<BigEndian>()?,
            samples_per_chunk: r.read_u32::<BigEndian>()?,
            sample_description_index: r.read_u32::<BigEndian>()?,
        });
    }
    table.set_samples_per_chunk(spc);

    let aps_count = r.read_u32::<BigEndian>()?;
    let mut aps = Vec::with_capacity(aps_count as usize);
    for _ in 0..aps_count {
        aps.push(AudioSamplesPerSampleEntry { sample_count: r.read_u32::<BigEndian>()?, audio_samples: r.read_u32::<BigEndian>()? });
    }
    table.set_audio_samples_per_sample(aps);

    let offset_count = r.read_u32::<BigEndian>()?;
    let mut offsets = Vec::with_capacity(offset_count as usize);
    for _ in 0..offset_count {
        offsets.push(r.read_u64::<BigEndian>()?);
    }
    table.set_offsets(offsets);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_full_prefix() {
        let info = Mpeg4StreamInfo {
            codec_name: "alac".into(),
            sample_rate: 44_100,
            timescale: 44_100,
            channels: 2,
            bit_depth: 16,
            duration: 123_456,
            descriptor: vec![1, 2, 3, 4, 5],
        };
        let mut sizes = SampleSizeTable::with_capacity(3);
        sizes.append(100, 3).unwrap();
        sizes.append(200, 3).unwrap();
        sizes.append(150, 3).unwrap();

        let mut seek = SeekTable::new();
        seek.set_samples_per_chunk(vec![SamplesPerChunkEntry { first_chunk: 1, samples_per_chunk: 3, sample_description_index: 1 }]);
        seek.set_audio_samples_per_sample(vec![AudioSamplesPerSampleEntry { sample_count: 3, audio_samples: 1024 }]);
        seek.set_offsets(vec![0, 100, 300]);

        let bytes = write_prefix(&info, Some(&sizes), Some(&seek), PrefixContents::FULL).unwrap();
        let (info2, sizes2, seek2) = read_prefix(&bytes, PrefixContents::FULL).unwrap();
        assert_eq!(info, info2);
        assert_eq!(sizes2.unwrap().sample_count(), 3);
        assert_eq!(seek2.unwrap().chunk_count(), 3);
    }

    #[test]
    fn neither_tables_prefix_round_trips_with_only_header() {
        let info = Mpeg4StreamInfo {
            codec_name: "fLaC".into(),
            sample_rate: 48_000,
            timescale: 48_000,
            channels: 2,
            bit_depth: 24,
            duration: 9_999,
            descriptor: vec![9, 9, 9],
        };
        let bytes = write_prefix(&info, None, None, PrefixContents::NEITHER).unwrap();
        let (info2, sizes2, seek2) = read_prefix(&bytes, PrefixContents::NEITHER).unwrap();
        assert_eq!(info, info2);
        assert!(sizes2.is_none());
        assert!(seek2.is_none());
    }
}
