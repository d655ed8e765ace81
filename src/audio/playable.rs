//! `MsgPlayable`: the post-ramp, ready-for-the-sink form of decoded audio (`spec.md`
//! §3.3, §4.6).
//!
//! A playable message owns the same shared buffer window as the `MsgAudioPcm`/
//! `MsgAudioDsd`/`MsgSilence` it was created from, but carries its ramp "baked in": the
//! final stage calls [`PlayablePcm::read`]/[`PlayableDsd::read`] to push attenuated
//! bytes at a [`PcmProcessor`]/[`DsdProcessor`] without the sink needing to know
//! anything about ramps.

use crate::audio::buffer::DecodedAudio;
use crate::audio::pcm::ATTENUATION_UNITY;
use crate::audio::ramp::{Ramp, RampApplicator};
use crate::interfaces::{DsdProcessor, PcmProcessor};
use crate::msg::pool::Clearable;

/// Six-channel, 32-bit-per-subsample output packs a 4-bit channel id into the low
/// nibble of each subsample's least-significant byte (`spec.md` §4.6 design note on
/// multi-channel padding). Channels beyond this layout don't use the nibble.
const CHANNEL_NIBBLE_LAYOUT: (u32, u32) = (6, 32);

fn attenuate_pcm(data: &[u8], bit_depth: u32, num_channels: u32, ramp: Ramp, attenuation: u16, sample_count: u64) -> Vec<u8> {
    debug_assert!(
        attenuation == ATTENUATION_UNITY || bit_depth == 16,
        "PCM attenuation is only supported for 16-bit depth"
    );
    let bytes_per_subsample = (bit_depth / 8) as usize;
    let mut out = Vec::with_capacity(data.len());
    let mut applicator = RampApplicator::start(ramp, sample_count);
    let frame_bytes = bytes_per_subsample * num_channels as usize;
    let pack_channel_nibble = (num_channels, bit_depth) == CHANNEL_NIBBLE_LAYOUT;

    for frame in data.chunks(frame_bytes) {
        let multiplier = applicator.get_next_sample().unwrap_or(32768);
        for (ch, subsample) in frame.chunks(bytes_per_subsample).enumerate() {
            let value = read_be_signed(subsample);
            let mut scaled = (value * multiplier as i64) >> 15;
            if attenuation != ATTENUATION_UNITY {
                scaled = scaled * attenuation as i64 / ATTENUATION_UNITY as i64;
            }
            let mut bytes = write_be_signed(scaled, bytes_per_subsample);
            if pack_channel_nibble {
                let last = bytes.len() - 1;
                bytes[last] = (bytes[last] & 0xF0) | (ch as u8 & 0x0F);
            }
            out.extend_from_slice(&bytes);
        }
    }
    out
}

fn read_be_signed(bytes: &[u8]) -> i64 {
    let mut value: i64 = 0;
    for &b in bytes {
        value = (value << 8) | b as i64;
    }
    let bits = bytes.len() * 8;
    let sign_bit = 1i64 << (bits - 1);
    if value & sign_bit != 0 {
        value -= 1i64 << bits;
    }
    value
}

fn write_be_signed(value: i64, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    let mut v = value;
    for i in (0..width).rev() {
        out[i] = (v & 0xFF) as u8;
        v >>= 8;
    }
    out
}

/// The playable form of a PCM run.
#[derive(Clone)]
pub struct PlayablePcm {
    pub audio: Option<DecodedAudio>,
    pub byte_offset: usize,
    pub byte_len: usize,
    pub sample_rate: u32,
    pub num_channels: u32,
    pub bit_depth: u32,
    pub ramp: Ramp,
    /// Attenuation divisor applied on top of the ramp (`spec.md` §4.6); see
    /// [`crate::audio::pcm::ATTENUATION_UNITY`].
    pub attenuation: u16,
}

impl Default for PlayablePcm {
    fn default() -> Self {
        Self {
            audio: None,
            byte_offset: 0,
            byte_len: 0,
            sample_rate: 44_100,
            num_channels: 2,
            bit_depth: 16,
            ramp: Ramp::none(),
            attenuation: ATTENUATION_UNITY,
        }
    }
}
impl Clearable for PlayablePcm {
    fn clear(&mut self) {
        self.audio = None;
        *self = Self::default();
    }
}

impl PlayablePcm {
    pub fn read(&self, processor: &mut dyn PcmProcessor) {
        let Some(audio) = &self.audio else { return };
        let bytes_per_sample = (self.bit_depth / 8) as usize * self.num_channels as usize;
        let sample_count = (self.byte_len / bytes_per_sample.max(1)) as u64;
        let attenuated = audio.with(|raw| {
            let slice = raw.slice(self.byte_offset, self.byte_len);
            attenuate_pcm(slice, self.bit_depth, self.num_channels, self.ramp, self.attenuation, sample_count)
        });
        processor.process_fragment(&attenuated, self.bit_depth, self.num_channels);
    }
}

/// The playable form of a DSD run (ramp attenuation is not applied to DSD bitstreams —
/// the source mutes DSD by substituting silence rather than scaling bits).
#[derive(Clone)]
pub struct PlayableDsd {
    pub audio: Option<DecodedAudio>,
    pub byte_offset: usize,
    pub byte_len: usize,
    pub num_channels: u32,
}

impl Default for PlayableDsd {
    fn default() -> Self {
        Self { audio: None, byte_offset: 0, byte_len: 0, num_channels: 2 }
    }
}
impl Clearable for PlayableDsd {
    fn clear(&mut self) {
        self.audio = None;
        *self = Self::default();
    }
}

impl PlayableDsd {
    pub fn read(&self, processor: &mut dyn DsdProcessor) {
        let Some(audio) = &self.audio else { return };
        audio.with(|raw| {
            let slice = raw.slice(self.byte_offset, self.byte_len);
            processor.process_fragment(slice, self.num_channels);
        });
    }
}

/// Silence that has reached the sink stage, expressed as a sample count rather than a
/// jiffy count (the conversion is fixed once a `MsgDecodedStream` has announced rate).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayableSilence {
    pub num_samples: u64,
    pub bit_depth: u32,
    pub num_channels: u32,
}
impl Clearable for PlayableSilence {}
impl PlayableSilence {
    pub fn read(&self, processor: &mut dyn PcmProcessor) {
        processor.process_silence(self.num_samples, self.bit_depth, self.num_channels);
    }
}

/// DSD silence, expressed in whole sample blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayableSilenceDsd {
    pub num_blocks: u64,
    pub sample_block_words: u32,
    pub num_channels: u32,
}
impl Clearable for PlayableSilenceDsd {}
impl PlayableSilenceDsd {
    pub fn read(&self, processor: &mut dyn DsdProcessor) {
        processor.process_silence(self.num_blocks, self.sample_block_words, self.num_channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::AudioBufferPools;
    use crate::audio::ramp::Direction;

    struct Sink {
        bytes: Vec<u8>,
        silence_samples: u64,
    }

    impl PcmProcessor for Sink {
        fn process_fragment(&mut self, attenuated_bytes: &[u8], _bit_depth: u32, _num_channels: u32) {
            self.bytes.extend_from_slice(attenuated_bytes);
        }
        fn process_silence(&mut self, num_samples: u64, _bit_depth: u32, _num_channels: u32) {
            self.silence_samples += num_samples;
        }
    }

    #[test]
    fn full_volume_ramp_is_lossless_round_trip() {
        let pools = AudioBufferPools::new(2, 2);
        // two stereo 16-bit frames: (1000, -1000), (2000, -2000)
        let data: Vec<u8> = vec![0x03, 0xE8, 0xFC, 0x18, 0x07, 0xD0, 0xF8, 0x30];
        let audio = pools.allocate_decoded(&data).unwrap();
        let playable = PlayablePcm {
            audio: Some(audio),
            byte_len: data.len(),
            ramp: Ramp::none(),
            ..Default::default()
        };
        let mut sink = Sink { bytes: vec![], silence_samples: 0 };
        playable.read(&mut sink);
        assert_eq!(sink.bytes, data);
    }

    #[test]
    fn mute_ramp_drives_samples_toward_zero() {
        let pools = AudioBufferPools::new(2, 2);
        let data: Vec<u8> = vec![0x7F, 0xFF, 0x7F, 0xFF]; // one stereo frame, max positive
        let audio = pools.allocate_decoded(&data).unwrap();
        let ramp = Ramp { start: 0, end: 0, direction: Direction::Mute };
        let playable = PlayablePcm { audio: Some(audio), byte_len: data.len(), ramp, ..Default::default() };
        let mut sink = Sink { bytes: vec![], silence_samples: 0 };
        playable.read(&mut sink);
        assert_eq!(sink.bytes, vec![0, 0, 0, 0]);
    }

    #[test]
    fn attenuation_scales_samples_down_by_its_divisor() {
        let pools = AudioBufferPools::new(2, 2);
        let data: Vec<u8> = vec![0x10, 0x00, 0x10, 0x00]; // one stereo frame, 4096
        let audio = pools.allocate_decoded(&data).unwrap();
        let playable = PlayablePcm {
            audio: Some(audio),
            byte_len: data.len(),
            ramp: Ramp::none(),
            attenuation: 128, // half of ATTENUATION_UNITY
            ..Default::default()
        };
        let mut sink = Sink { bytes: vec![], silence_samples: 0 };
        playable.read(&mut sink);
        assert_eq!(sink.bytes, vec![0x08, 0x00, 0x08, 0x00]);
    }

    #[test]
    fn silence_reports_sample_count_not_bytes() {
        let silence = PlayableSilence { num_samples: 512, bit_depth: 16, num_channels: 2 };
        let mut sink = Sink { bytes: vec![], silence_samples: 0 };
        silence.read(&mut sink);
        assert_eq!(sink.silence_samples, 512);
    }
}
