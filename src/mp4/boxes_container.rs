//! Container boxes and the sample-description (`stsd`) entry parser
//! (`spec.md` §4.8.1, §4.8.3).
//!
//! The source looks up a child's processor in a factory keyed by 4-byte id at each
//! recursion level (`BoxSwitcher(parentId)`); this crate resolves the same fixed set of
//! children at compile time instead — each container level names exactly the boxes
//! `spec.md` §4.8 lists for it. `stsd`, `moov`, `trak`, `mdia`, `minf`, `stbl`, `mvex`,
//! `moof`, `traf` and `sinf` all recurse this way; only the genuinely leaf,
//! fixed-layout boxes live in [`super::boxes_simple`].

use crate::error::{Mpeg4Error, Result};
use crate::mp4::boxes_simple::{Co64, Mdhd, Mehd, Schm, Stco, Stsc, Stsz, Stts, Tenc, Tfhd, Tkhd, Trun};
use crate::mp4::cache::{read_box_header, Mpeg4Cache};
use crate::mp4::fourcc::{self, FourCc};
use crate::mp4::processor::BoxProcessor;
use crate::mp4::tables::{SampleSizeTable, SeekTable};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

/// CENC parameters recovered from a protected (`enca`) sample entry's `sinf` child.
#[derive(Debug, Clone, Default)]
pub struct ProtectionInfo {
    pub key_id: [u8; 16],
    pub per_sample_iv_size: u8,
}

/// The codec identity and configuration recovered from one `stsd` sample entry
/// (`spec.md` §4.8.1: the `stsd, … esds, alac, dfLa, dOps, schm, tenc` box set).
#[derive(Debug, Clone, Default)]
pub struct SampleDescription {
    /// The real sample format: the `stsd` entry's own format, unless it is `enca`
    /// (encrypted audio), in which case the original format recorded by `sinf/frma`.
    pub format: FourCc,
    pub channel_count: u16,
    pub sample_size: u16,
    pub sample_rate: u32,
    /// Raw codec-specific descriptor bytes (`esds`/`alac`/`dfLa`/`dOps` payload),
    /// forwarded verbatim in the synthesised metadata prefix (`spec.md` §4.8.5).
    pub descriptor: Vec<u8>,
    pub descriptor_box: FourCc,
    pub protection: Option<ProtectionInfo>,
}

/// Reads the `stsd` box: version/flags, entry count, then one audio sample entry
/// (`spec.md` §4.8.1). Only the first entry is used — every stream this demuxer
/// targets carries exactly one sample description per track.
pub fn parse_stsd(cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<SampleDescription> {
    let header = cache.accumulate(8)?; // version/flags(4) + entry_count(4)
    let entry_count = u32::from_be_bytes(header[4..8].try_into().unwrap());
    if entry_count == 0 {
        return Err(Mpeg4Error::FileInvalid("stsd declares zero sample entries").into());
    }
    let entry_header = read_box_header(cache)?;
    let entry_payload = cache.accumulate(entry_header.payload_size as usize)?;
    let mut r = Cursor::new(&entry_payload);
    r.set_position(6); // reserved
    r.read_u16::<BigEndian>()?; // data_reference_index
    r.set_position(r.position() + 8); // reserved
    let channel_count = r.read_u16::<BigEndian>()?;
    let sample_size = r.read_u16::<BigEndian>()?;
    r.read_u16::<BigEndian>()?; // pre_defined
    r.read_u16::<BigEndian>()?; // reserved
    let sample_rate = r.read_u32::<BigEndian>()? >> 16;

    let mut desc = SampleDescription {
        format: entry_header.id,
        channel_count,
        sample_size,
        sample_rate,
        descriptor: Vec::new(),
        descriptor_box: FourCc(0),
        protection: None,
    };

    let children_size = entry_header.payload_size - r.position();
    let mut consumed = 0u64;
    let mut child_cache = crate::mp4::cache::SliceCache::new(entry_payload[r.position() as usize..].to_vec());
    while consumed < children_size {
        let child = read_box_header(&mut child_cache)?;
        match child.id {
            fourcc::ESDS | fourcc::ALAC | fourcc::DFLA | fourcc::DOPS => {
                desc.descriptor = child_cache.accumulate(child.payload_size as usize)?;
                desc.descriptor_box = child.id;
            }
            fourcc::SINF => {
                desc.protection = Some(parse_sinf(&mut child_cache, child.payload_size)?);
            }
            _ => {
                child_cache.discard(child.payload_size as usize)?;
            }
        }
        consumed += child.header_len + child.payload_size;
    }

    if desc.format == fourcc::ALAC && !desc.descriptor.is_empty() && desc.descriptor.len() >= 24 {
        // ALACSpecificConfig carries its own authoritative bit depth/rate/channels
        // (`spec.md` §4.8.1 groundwork: the sample entry's own fields are frequently 0
        // for `alac`).
        desc.sample_size = desc.descriptor[5] as u16;
        desc.channel_count = desc.descriptor[9] as u16;
        desc.sample_rate = u32::from_be_bytes(desc.descriptor[20..24].try_into().unwrap());
    }

    Ok(desc)
}

/// `sinf`: protection scheme information, a container for `frma`/`schm`/`schi{tenc}`
/// (`spec.md` §4.8.3). `frma`'s original-format field is only informational here — the
/// demuxer already knows the underlying codec from the stream announcement.
fn parse_sinf(cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<ProtectionInfo> {
    let mut consumed = 0u64;
    let mut tenc = Tenc::default();
    let mut saw_cenc = false;
    while consumed < payload_size {
        let child = read_box_header(cache)?;
        match child.id {
            fourcc::FRMA => cache.discard(child.payload_size as usize)?,
            fourcc::SCHM => {
                let mut schm = Schm;
                schm.set(cache, child.payload_size)?;
                saw_cenc = true;
            }
            fourcc::SCHI => {
                // `schi` itself just wraps `tenc`; unwrap one more level.
                let mut inner_consumed = 0u64;
                let inner_size = child.payload_size;
                while inner_consumed < inner_size {
                    let inner = read_box_header(cache)?;
                    if inner.id == fourcc::TENC {
                        tenc.set(cache, inner.payload_size)?;
                    } else {
                        cache.discard(inner.payload_size as usize)?;
                    }
                    inner_consumed += inner.header_len + inner.payload_size;
                }
            }
            _ => cache.discard(child.payload_size as usize)?,
        }
        consumed += child.header_len + child.payload_size;
    }
    if !saw_cenc {
        return Err(Mpeg4Error::FileInvalid("protected sample entry has no schm box").into());
    }
    Ok(ProtectionInfo { key_id: tenc.key_id, per_sample_iv_size: tenc.per_sample_iv_size })
}

/// One track's accumulated, fully-parsed metadata (`spec.md` §3.5, §4.8.2).
#[derive(Debug, Clone, Default)]
pub struct TrackInfo {
    pub track_id: u32,
    pub timescale: u32,
    pub duration: u64,
    pub sample_description: SampleDescription,
    pub sample_size_table: Option<SampleSizeTable>,
    pub seek_table: SeekTable,
}

/// `stbl`: the sample table container (`spec.md` §4.8.2: `stsd, stts, stsc, stco,
/// co64, stsz`).
fn parse_stbl(cache: &mut dyn Mpeg4Cache, payload_size: u64, track: &mut TrackInfo) -> Result<()> {
    let mut consumed = 0u64;
    let mut stts = Stts::default();
    let mut stsc = Stsc::default();
    let mut stco = Stco::default();
    let mut co64 = Co64::default();
    let mut stsz = Stsz::default();
    while consumed < payload_size {
        let header = read_box_header(cache)?;
        match header.id {
            fourcc::STSD => track.sample_description = parse_stsd(cache, header.payload_size)?,
            fourcc::STTS => stts.set(cache, header.payload_size)?,
            fourcc::STSC => stsc.set(cache, header.payload_size)?,
            fourcc::STCO => stco.set(cache, header.payload_size)?,
            fourcc::CO64 => co64.set(cache, header.payload_size)?,
            fourcc::STSZ => stsz.set(cache, header.payload_size)?,
            _ => cache.discard(header.payload_size as usize)?,
        }
        consumed += header.header_len + header.payload_size;
    }
    track.sample_size_table = stsz.table;
    track.seek_table.set_audio_samples_per_sample(stts.entries);
    track.seek_table.set_samples_per_chunk(stsc.entries);
    let offsets = if !co64.offsets.is_empty() { co64.offsets } else { stco.offsets };
    track.seek_table.set_offsets(offsets);
    Ok(())
}

/// `minf`: media information container, holds `stbl` plus boxes this demuxer doesn't
/// need (`smhd`, `dinf`, …).
fn parse_minf(cache: &mut dyn Mpeg4Cache, payload_size: u64, track: &mut TrackInfo) -> Result<()> {
    let mut consumed = 0u64;
    while consumed < payload_size {
        let header = read_box_header(cache)?;
        if header.id == fourcc::STBL {
            parse_stbl(cache, header.payload_size, track)?;
        } else {
            cache.discard(header.payload_size as usize)?;
        }
        consumed += header.header_len + header.payload_size;
    }
    Ok(())
}

/// `mdia`: media container, holds `mdhd` (timescale/duration) and `minf`.
fn parse_mdia(cache: &mut dyn Mpeg4Cache, payload_size: u64, track: &mut TrackInfo) -> Result<()> {
    let mut consumed = 0u64;
    while consumed < payload_size {
        let header = read_box_header(cache)?;
        match header.id {
            fourcc::MDHD => {
                let mut mdhd = Mdhd::default();
                mdhd.set(cache, header.payload_size)?;
                track.timescale = mdhd.timescale;
                track.duration = mdhd.duration;
            }
            fourcc::MINF => parse_minf(cache, header.payload_size, track)?,
            _ => cache.discard(header.payload_size as usize)?,
        }
        consumed += header.header_len + header.payload_size;
    }
    Ok(())
}

/// `trak`: one track, holding `tkhd` and `mdia`.
fn parse_trak(cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<TrackInfo> {
    let mut track = TrackInfo::default();
    let mut consumed = 0u64;
    let mut tkhd = Tkhd::default();
    while consumed < payload_size {
        let header = read_box_header(cache)?;
        match header.id {
            fourcc::TKHD => tkhd.set(cache, header.payload_size)?,
            fourcc::MDIA => parse_mdia(cache, header.payload_size, &mut track)?,
            _ => cache.discard(header.payload_size as usize)?,
        }
        consumed += header.header_len + header.payload_size;
    }
    if track.duration == 0 {
        track.duration = tkhd.duration;
    }
    Ok(track)
}

/// Overall `moov` contents: movie-extends duration (fragmented streams) plus every
/// audio track found. `spec.md` §4.8 only ever deals with a single audio track per
/// stream, so the demuxer picks the first track carrying a recognised sample
/// description.
#[derive(Debug, Clone, Default)]
pub struct MoovInfo {
    pub tracks: Vec<TrackInfo>,
    pub fragmented: bool,
    pub fragment_duration: u64,
}

/// `moov`: the top-level metadata box (`spec.md` §4.8.1, §4.8.4).
pub fn parse_moov(cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<MoovInfo> {
    let mut info = MoovInfo::default();
    let mut consumed = 0u64;
    while consumed < payload_size {
        let header = read_box_header(cache)?;
        match header.id {
            fourcc::TRAK => info.tracks.push(parse_trak(cache, header.payload_size)?),
            fourcc::MVEX => {
                info.fragmented = true;
                let mut mehd_consumed = 0u64;
                while mehd_consumed < header.payload_size {
                    let inner = read_box_header(cache)?;
                    if inner.id == fourcc::MEHD {
                        let mut mehd = Mehd::default();
                        mehd.set(cache, inner.payload_size)?;
                        info.fragment_duration = mehd.fragment_duration;
                    } else {
                        cache.discard(inner.payload_size as usize)?;
                    }
                    mehd_consumed += inner.header_len + inner.payload_size;
                }
            }
            _ => cache.discard(header.payload_size as usize)?,
        }
        consumed += header.header_len + header.payload_size;
    }
    Ok(info)
}

/// One fragment's per-sample layout, recovered from `moof`/`traf`/`tfhd`/`trun`
/// (`spec.md` §4.8.1, §4.8.2).
#[derive(Debug, Clone, Default)]
pub struct FragmentInfo {
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_sizes: Vec<u32>,
    pub default_sample_size: Option<u32>,
}

/// `traf`: one track's fragment run, holding `tfhd`, `trun` and, for protected
/// content, `senc` (`spec.md` §4.8.1, §4.8.3). `iv_size` is the track's CENC
/// per-sample IV width from `tenc`, needed to parse `senc` inline since that box has
/// no self-describing entry size.
pub fn parse_traf(
    cache: &mut dyn Mpeg4Cache,
    payload_size: u64,
    iv_size: Option<u8>,
) -> Result<(FragmentInfo, Option<crate::mp4::senc::Senc>)> {
    let mut consumed = 0u64;
    let mut tfhd = Tfhd::default();
    let mut trun = Trun::default();
    let mut senc = None;
    while consumed < payload_size {
        let header = read_box_header(cache)?;
        match header.id {
            fourcc::TFHD => tfhd.set(cache, header.payload_size)?,
            fourcc::TRUN => trun.set(cache, header.payload_size)?,
            fourcc::SENC => {
                let width = iv_size.ok_or(Mpeg4Error::FileInvalid(
                    "traf carries a senc box but the track has no tenc IV size",
                ))?;
                senc = Some(crate::mp4::senc::Senc::parse(cache, header.payload_size, width)?);
            }
            _ => cache.discard(header.payload_size as usize)?,
        }
        consumed += header.header_len + header.payload_size;
    }
    let sizes = if !trun.sample_sizes.is_empty() && trun.sample_sizes.iter().any(|s| *s > 0) {
        trun.sample_sizes
    } else {
        Vec::new()
    };
    Ok((
        FragmentInfo {
            track_id: tfhd.track_id,
            base_data_offset: tfhd.base_data_offset,
            sample_sizes: sizes,
            default_sample_size: tfhd.default_sample_size,
        },
        senc,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::cache::SliceCache;

    fn audio_sample_entry(format: &[u8; 4], channels: u16, sample_size: u16, rate: u32) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0u8; 6]); // reserved
        body.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
        body.extend_from_slice(&[0u8; 8]); // reserved
        body.extend_from_slice(&channels.to_be_bytes());
        body.extend_from_slice(&sample_size.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes());
        body.extend_from_slice(&((rate as u32) << 16).to_be_bytes());
        let mut entry = Vec::new();
        entry.extend_from_slice(&((8 + body.len()) as u32).to_be_bytes());
        entry.extend_from_slice(format);
        entry.extend_from_slice(&body);
        entry
    }

    #[test]
    fn parse_stsd_reads_the_first_entry_without_children() {
        let entry = audio_sample_entry(b"twos", 2, 16, 44_100);
        let mut payload = vec![0u8, 0, 0, 0];
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&entry);
        let mut cache = SliceCache::new(payload.clone());
        let desc = parse_stsd(&mut cache, payload.len() as u64).unwrap();
        assert_eq!(desc.channel_count, 2);
        assert_eq!(desc.sample_size, 16);
        assert_eq!(desc.sample_rate, 44_100);
    }

    #[test]
    fn parse_stsd_captures_esds_descriptor_bytes() {
        let mut entry_with_esds = audio_sample_entry(b"mp4a", 2, 16, 44_100);
        let esds_payload = [0u8, 0, 0, 0, 0xAA, 0xBB, 0xCC];
        let mut esds_box = Vec::new();
        esds_box.extend_from_slice(&((8 + esds_payload.len()) as u32).to_be_bytes());
        esds_box.extend_from_slice(b"esds");
        esds_box.extend_from_slice(&esds_payload);
        let new_entry_size = entry_with_esds.len() + esds_box.len();
        entry_with_esds[0..4].copy_from_slice(&(new_entry_size as u32).to_be_bytes());
        entry_with_esds.extend_from_slice(&esds_box);

        let mut payload = vec![0u8, 0, 0, 0];
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&entry_with_esds);
        let mut cache = SliceCache::new(payload.clone());
        let desc = parse_stsd(&mut cache, payload.len() as u64).unwrap();
        assert_eq!(desc.descriptor, esds_payload.to_vec());
        assert_eq!(desc.descriptor_box, fourcc::ESDS);
    }
}
