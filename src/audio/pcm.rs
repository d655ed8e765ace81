//! `MsgAudioPcm`: a window of decoded PCM samples plus an attached [`Ramp`] (`spec.md`
//! §3.3–§3.4).

use crate::audio::buffer::{BufferObserver, DecodedAudio};
use crate::audio::ramp::{Direction, Ramp};
use crate::error::{AudioError, Result};
use crate::msg::pool::Clearable;
use crate::time;

/// Attenuation value representing unity gain: no attenuation applied (`spec.md` §4.6).
pub const ATTENUATION_UNITY: u16 = 256;

/// A run of decoded PCM samples: a byte-range view into a shared [`DecodedAudio`]
/// buffer, with channel/rate/bit-depth metadata and an attached ramp.
#[derive(Clone)]
pub struct PcmBody {
    pub audio: Option<DecodedAudio>,
    pub byte_offset: usize,
    pub byte_len: usize,
    pub sample_rate: u32,
    pub num_channels: u32,
    pub bit_depth: u32,
    pub track_offset_jiffies: u64,
    pub ramp: Ramp,
    /// Attenuation divisor applied on top of the ramp (`spec.md` §4.6):
    /// `attenuated = sample * attenuation / ATTENUATION_UNITY`. Non-unity values are
    /// only valid for 16-bit PCM.
    pub attenuation: u16,
    /// Buffer observer attached to this message, if any (`spec.md` §4.5).
    pub observer: Option<BufferObserver>,
}

impl Default for PcmBody {
    fn default() -> Self {
        Self {
            audio: None,
            byte_offset: 0,
            byte_len: 0,
            sample_rate: 44_100,
            num_channels: 2,
            bit_depth: 16,
            track_offset_jiffies: 0,
            ramp: Ramp::none(),
            attenuation: ATTENUATION_UNITY,
            observer: None,
        }
    }
}
impl Clearable for PcmBody {
    fn clear(&mut self) {
        if let Some(observer) = self.observer.take() {
            if let Ok(jiffies) = self.jiffies() {
                observer.report_delta(-(jiffies as i64));
            }
        }
        self.audio = None;
        *self = Self::default();
    }
}

impl PcmBody {
    fn bytes_per_sample(&self) -> usize {
        (self.bit_depth as usize / 8) * self.num_channels as usize
    }

    /// Total samples covered by this message's window.
    pub fn sample_count(&self) -> u64 {
        (self.byte_len / self.bytes_per_sample().max(1)) as u64
    }

    /// Jiffies spanned by this message's window.
    pub fn jiffies(&self) -> Result<u64> {
        Ok(self.sample_count() * time::per_sample(self.sample_rate)?)
    }

    /// Splits this message's window at `at_jiffies` into `(before, after)`, splitting
    /// the shared ramp at the same sample boundary via [`Ramp::split`] (`spec.md` §4.4).
    pub fn split(&self, at_jiffies: u64) -> Result<(Self, Self)> {
        let total_jiffies = self.jiffies()?;
        if at_jiffies == 0 || at_jiffies >= total_jiffies {
            return Err(AudioError::SplitOutOfRange { at: at_jiffies, size: total_jiffies }.into());
        }
        let jps = time::per_sample(self.sample_rate)?;
        let at_sample = at_jiffies / jps;
        let total_samples = self.sample_count();
        let bps = self.bytes_per_sample();
        let split_byte = at_sample as usize * bps;

        let (before_ramp, after_ramp) = if self.ramp.is_none() {
            (self.ramp, self.ramp)
        } else {
            self.ramp.split(at_sample, total_samples)
        };

        let before = Self {
            byte_len: split_byte,
            ramp: before_ramp,
            ..self.clone()
        };
        let after = Self {
            byte_offset: self.byte_offset + split_byte,
            byte_len: self.byte_len - split_byte,
            track_offset_jiffies: self.track_offset_jiffies + at_sample * jps,
            ramp: after_ramp,
            ..self.clone()
        };
        Ok((before, after))
    }

    /// Applies a ramp request onto this message's existing ramp, treating this
    /// message's own span as the fragment (`spec.md` §3.4, §4.5). Returns the split
    /// point, in jiffies from the start of this message, and the ramp the caller must
    /// apply after splitting the buffer there, if the incoming ramp crosses the
    /// existing one inside this message.
    pub fn set_ramp(&mut self, direction: Direction, start: u32, remaining_duration_jiffies: u64) -> Result<Option<(u64, Ramp)>> {
        let fragment_jiffies = self.jiffies()?;
        let (merged, split) = self.ramp.set(direction, start, fragment_jiffies, remaining_duration_jiffies);
        self.ramp = merged;
        Ok(split)
    }

    /// Attaches a buffer observer, reporting `+size` (this message's jiffies)
    /// immediately (`spec.md` §4.5). Replaces any previously attached observer without
    /// reporting on its behalf — callers are expected to detach before re-attaching.
    pub fn attach_observer(&mut self, observer: BufferObserver) -> Result<()> {
        let jiffies = self.jiffies()?;
        observer.report_delta(jiffies as i64);
        self.observer = Some(observer);
        Ok(())
    }

    /// Sets the attenuation divisor applied on top of the ramp (`spec.md` §4.6).
    /// Non-unity attenuation is only meaningful for 16-bit PCM.
    pub fn set_attenuation(&mut self, attenuation: u16) {
        debug_assert!(
            attenuation == ATTENUATION_UNITY || self.bit_depth == 16,
            "PCM attenuation is only supported for 16-bit depth"
        );
        self.attenuation = attenuation;
    }

    /// Mirrors `MsgAudio::Clone()`: a new envelope over the same buffer with the same
    /// ramp, but the buffer observer is not propagated — each clone's owner attaches
    /// its own if it wants attribution (`spec.md` §4.4).
    pub fn clone_envelope(&self) -> Self {
        Self { observer: None, ..self.clone() }
    }

    /// Aggregates a directly-following message into this one, provided both share a
    /// buffer, format, and are contiguous in the track timeline (`spec.md` §4.4).
    pub fn aggregate(&self, next: &Self) -> Result<Self> {
        let same_buffer = match (&self.audio, &next.audio) {
            (Some(a), Some(b)) => a.points_to_same_cell(b),
            _ => false,
        };
        if !same_buffer
            || self.sample_rate != next.sample_rate
            || self.num_channels != next.num_channels
            || self.bit_depth != next.bit_depth
        {
            return Err(AudioError::AggregateMismatch { reason: "format or buffer mismatch" }.into());
        }
        if self.byte_offset + self.byte_len != next.byte_offset {
            return Err(AudioError::AggregateMismatch { reason: "non-contiguous byte ranges" }.into());
        }
        Ok(Self {
            byte_len: self.byte_len + next.byte_len,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::AudioBufferPools;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    struct RecordingObserver(AtomicI64);
    impl crate::audio::buffer::PipelineBufferObserver for RecordingObserver {
        fn report_delta(&self, delta: i64) {
            self.0.fetch_add(delta, Ordering::SeqCst);
        }
    }

    fn body(pools: &AudioBufferPools, samples: u64) -> PcmBody {
        let bytes = (samples as usize) * 4; // stereo 16-bit
        let data = vec![0u8; bytes];
        PcmBody {
            audio: Some(pools.allocate_decoded(&data).unwrap()),
            byte_len: bytes,
            ..Default::default()
        }
    }

    #[test]
    fn split_partitions_bytes_and_jiffies() {
        let pools = AudioBufferPools::new(4, 4);
        let b = body(&pools, 100);
        let total = b.jiffies().unwrap();
        let (before, after) = b.split(total / 2).unwrap();
        assert_eq!(before.byte_len + after.byte_len, b.byte_len);
        assert_eq!(before.jiffies().unwrap() + after.jiffies().unwrap(), total);
    }

    #[test]
    fn split_out_of_range_errors() {
        let pools = AudioBufferPools::new(4, 4);
        let b = body(&pools, 10);
        let total = b.jiffies().unwrap();
        assert!(b.split(total).is_err());
        assert!(b.split(0).is_err());
    }

    #[test]
    fn aggregate_requires_contiguous_shared_buffer() {
        let pools = AudioBufferPools::new(4, 4);
        let b = body(&pools, 100);
        let (before, after) = b.split(b.jiffies().unwrap() / 2).unwrap();
        let merged = before.aggregate(&after).unwrap();
        assert_eq!(merged.byte_len, b.byte_len);
    }

    #[test]
    fn set_ramp_merges_onto_the_messages_own_ramp() {
        let pools = AudioBufferPools::new(4, 4);
        let mut b = body(&pools, 1000);
        let total = b.jiffies().unwrap();
        let split = b.set_ramp(Direction::Down, crate::audio::ramp::RAMP_MAX, total).unwrap();
        assert!(split.is_none());
        assert_eq!(b.ramp.end, crate::audio::ramp::RAMP_MIN);
    }

    #[test]
    fn set_attenuation_stores_the_divisor() {
        let pools = AudioBufferPools::new(4, 4);
        let mut b = body(&pools, 10);
        b.set_attenuation(128);
        assert_eq!(b.attenuation, 128);
    }

    #[test]
    fn attach_observer_reports_size_immediately_and_clear_reports_negative() {
        let pools = AudioBufferPools::new(4, 4);
        let mut b = body(&pools, 100);
        let jiffies = b.jiffies().unwrap() as i64;
        let observer = Arc::new(RecordingObserver(AtomicI64::new(0)));
        b.attach_observer(observer.clone()).unwrap();
        assert_eq!(observer.0.load(Ordering::SeqCst), jiffies);

        b.clear();
        assert_eq!(observer.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn split_re_attributes_the_same_observer_to_both_halves() {
        let pools = AudioBufferPools::new(4, 4);
        let mut b = body(&pools, 100);
        let total = b.jiffies().unwrap() as i64;
        let observer = Arc::new(RecordingObserver(AtomicI64::new(0)));
        b.attach_observer(observer.clone()).unwrap();
        assert_eq!(observer.0.load(Ordering::SeqCst), total);

        let (mut before, mut after) = b.split(total as u64 / 2).unwrap();
        assert!(before.observer.is_some());
        assert!(after.observer.is_some());
        // Destroying both halves must report exactly -total overall, never double- or
        // under-counting relative to the original attach.
        before.clear();
        after.clear();
        assert_eq!(observer.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clone_envelope_does_not_propagate_the_observer() {
        let pools = AudioBufferPools::new(4, 4);
        let mut b = body(&pools, 10);
        let observer = Arc::new(RecordingObserver(AtomicI64::new(0)));
        b.attach_observer(observer).unwrap();
        let cloned = b.clone_envelope();
        assert!(cloned.observer.is_none());
    }
}
