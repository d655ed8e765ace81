//! `SampleSizeTable` and `SeekTable` (`spec.md` §4.8.2).

use crate::error::{Mpeg4Error, Result};

/// Per-sample byte counts, or a single default size shared by every sample
/// (`spec.md` §4.8.2: "a single `defaultSampleSize` when the file lists only one
/// value or `trun` indicates default-sized samples").
#[derive(Debug, Clone)]
pub enum SampleSizeTable {
    Default { size: u32, count: u32 },
    PerSample(Vec<u32>),
}

impl SampleSizeTable {
    pub fn with_default(size: u32, count: u32) -> Self {
        Self::Default { size, count }
    }

    pub fn with_capacity(count: u32) -> Self {
        Self::PerSample(Vec::with_capacity(count as usize))
    }

    /// Appends one more per-sample size. Fails once the table already holds its
    /// declared capacity (`spec.md` §4.8.2).
    pub fn append(&mut self, size: u32, capacity: u32) -> Result<()> {
        match self {
            Self::Default { .. } => Err(Mpeg4Error::FileInvalid("cannot append to a default-size sample table").into()),
            Self::PerSample(sizes) => {
                if sizes.len() as u32 >= capacity {
                    return Err(Mpeg4Error::FileInvalid("sample size table exceeded its declared capacity").into());
                }
                sizes.push(size);
                Ok(())
            }
        }
    }

    pub fn sample_count(&self) -> u32 {
        match self {
            Self::Default { count, .. } => *count,
            Self::PerSample(sizes) => sizes.len() as u32,
        }
    }

    pub fn size_of(&self, sample_index: u32) -> Result<u32> {
        match self {
            Self::Default { size, count } => {
                if sample_index >= *count {
                    return Err(Mpeg4Error::OutOfRange { requested: sample_index as u64, available: *count as u64 }.into());
                }
                Ok(*size)
            }
            Self::PerSample(sizes) => sizes
                .get(sample_index as usize)
                .copied()
                .ok_or_else(|| Mpeg4Error::OutOfRange { requested: sample_index as u64, available: sizes.len() as u64 }.into()),
        }
    }
}

/// One run-length entry of `stsc`: "starting at `first_chunk`, each chunk holds
/// `samples_per_chunk` samples described by `sample_description_index`".
#[derive(Debug, Clone, Copy)]
pub struct SamplesPerChunkEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// One run-length entry of `stts`: "the next `sample_count` samples each span
/// `audio_samples` audio-domain samples".
#[derive(Debug, Clone, Copy)]
pub struct AudioSamplesPerSampleEntry {
    pub sample_count: u32,
    pub audio_samples: u32,
}

/// Seek/position table built from `stsc`+`stco`/`co64`+`stts` (progressive streams) or
/// from `sidx` (fragmented streams), per `spec.md` §4.8.2.
#[derive(Debug, Clone, Default)]
pub struct SeekTable {
    samples_per_chunk: Vec<SamplesPerChunkEntry>,
    audio_samples_per_sample: Vec<AudioSamplesPerSampleEntry>,
    offsets: Vec<u64>,
}

impl SeekTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_samples_per_chunk(&mut self, entries: Vec<SamplesPerChunkEntry>) {
        self.samples_per_chunk = entries;
    }

    pub fn set_audio_samples_per_sample(&mut self, entries: Vec<AudioSamplesPerSampleEntry>) {
        self.audio_samples_per_sample = entries;
    }

    pub fn set_offsets(&mut self, offsets: Vec<u64>) {
        self.offsets = offsets;
    }

    pub fn chunk_count(&self) -> usize {
        self.offsets.len()
    }

    /// Read-only access to the raw run-length tables, for serialising the prefix the
    /// demuxer sends downstream (`spec.md` §4.8.5).
    pub fn samples_per_chunk_entries(&self) -> &[SamplesPerChunkEntry] {
        &self.samples_per_chunk
    }

    pub fn audio_samples_per_sample_entries(&self) -> &[AudioSamplesPerSampleEntry] {
        &self.audio_samples_per_sample
    }

    pub fn offset_entries(&self) -> &[u64] {
        &self.offsets
    }

    /// Step 1 of `spec.md` §4.8.2's seek algorithm: maps an audio-domain sample index
    /// to the codec sample index it falls within, via the `stts` run-length table.
    fn audio_sample_to_codec_sample(&self, audio_sample: u64) -> Result<u32> {
        let mut remaining = audio_sample;
        let mut codec_sample = 0u32;
        for entry in &self.audio_samples_per_sample {
            let span = entry.audio_samples as u64 * entry.sample_count as u64;
            if remaining < span && entry.audio_samples > 0 {
                codec_sample += (remaining / entry.audio_samples as u64) as u32;
                return Ok(codec_sample);
            }
            remaining = remaining.saturating_sub(span);
            codec_sample += entry.sample_count;
        }
        Err(Mpeg4Error::OutOfRange { requested: audio_sample, available: codec_sample as u64 }.into())
    }

    /// Step 2: maps a codec sample index to the chunk that holds it, by walking the
    /// compressed `stsc` run-length representation.
    fn codec_sample_to_chunk(&self, codec_sample: u32) -> Result<u32> {
        let mut remaining = codec_sample;
        for (i, entry) in self.samples_per_chunk.iter().enumerate() {
            let chunks_in_run = match self.samples_per_chunk.get(i + 1) {
                Some(next) => next.first_chunk.saturating_sub(entry.first_chunk),
                None => self.chunk_count() as u32 - entry.first_chunk + 1,
            };
            let samples_in_run = chunks_in_run as u64 * entry.samples_per_chunk as u64;
            if (remaining as u64) < samples_in_run {
                let chunk_in_run = if entry.samples_per_chunk > 0 { remaining / entry.samples_per_chunk } else { 0 };
                return Ok(entry.first_chunk - 1 + chunk_in_run);
            }
            remaining = remaining.saturating_sub(samples_in_run as u32);
        }
        Err(Mpeg4Error::FileInvalid("codec sample does not fall within any stsc run").into())
    }

    /// Runs the full four-step seek algorithm of `spec.md` §4.8.2 and returns the byte
    /// offset of the chunk containing (at or before) `audio_sample`, along with the
    /// exact audio sample that chunk boundary corresponds to (the caller discards any
    /// leading samples between that boundary and the originally requested position).
    pub fn offset(&self, audio_sample: u64) -> Result<(u64, u64)> {
        let codec_sample = self.audio_sample_to_codec_sample(audio_sample)?;
        let chunk_index = self.codec_sample_to_chunk(codec_sample)?;
        let byte_offset = *self
            .offsets
            .get(chunk_index as usize)
            .ok_or(Mpeg4Error::FileInvalid("chunk index has no recorded offset"))?;
        let boundary_audio_sample = self.codec_sample_at_chunk_start(chunk_index)?;
        Ok((byte_offset, boundary_audio_sample))
    }

    fn codec_sample_at_chunk_start(&self, chunk_index: u32) -> Result<u64> {
        let mut codec_sample = 0u64;
        for (i, entry) in self.samples_per_chunk.iter().enumerate() {
            let chunks_in_run = match self.samples_per_chunk.get(i + 1) {
                Some(next) => next.first_chunk.saturating_sub(entry.first_chunk),
                None => self.chunk_count() as u32 - entry.first_chunk + 1,
            };
            if chunk_index < entry.first_chunk - 1 + chunks_in_run {
                let chunks_into_run = chunk_index - (entry.first_chunk - 1);
                codec_sample += chunks_into_run as u64 * entry.samples_per_chunk as u64;
                break;
            }
            codec_sample += chunks_in_run as u64 * entry.samples_per_chunk as u64;
        }
        let mut audio_sample = 0u64;
        let mut remaining_codec = codec_sample;
        for entry in &self.audio_samples_per_sample {
            if remaining_codec < entry.sample_count as u64 {
                audio_sample += remaining_codec * entry.audio_samples as u64;
                return Ok(audio_sample);
            }
            remaining_codec -= entry.sample_count as u64;
            audio_sample += entry.sample_count as u64 * entry.audio_samples as u64;
        }
        Ok(audio_sample)
    }

    /// Builds a `SeekTable` from `sidx` segments for fragmented (`moof`-based) streams,
    /// one entry per segment, indexed by segment rather than by sample
    /// (`spec.md` §4.8.2).
    pub fn from_segments(first_moof_offset: u64, segment_sizes: &[u32], segment_durations: &[u32]) -> Self {
        let mut offsets = Vec::with_capacity(segment_sizes.len());
        let mut running = first_moof_offset;
        for size in segment_sizes {
            offsets.push(running);
            running += *size as u64;
        }
        let audio_samples_per_sample = segment_durations
            .iter()
            .map(|d| AudioSamplesPerSampleEntry { sample_count: 1, audio_samples: *d })
            .collect();
        let samples_per_chunk = (0..offsets.len())
            .map(|i| SamplesPerChunkEntry { first_chunk: i as u32 + 1, samples_per_chunk: 1, sample_description_index: 1 })
            .collect();
        Self { samples_per_chunk, audio_samples_per_sample, offsets }
    }
}
