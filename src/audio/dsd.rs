//! `MsgAudioDsd`: a window of decoded DSD bitstream samples (`spec.md` §3.3).
//!
//! DSD samples are packed into fixed-size blocks (`sample_block_words`); splits and
//! aggregation always land on a whole-block boundary so a partial word is never shared
//! across two messages.

use crate::audio::buffer::{BufferObserver, DecodedAudio};
use crate::audio::ramp::Ramp;
use crate::error::{AudioError, Result};
use crate::msg::pool::Clearable;
use crate::time;

#[derive(Clone)]
pub struct DsdBody {
    pub audio: Option<DecodedAudio>,
    pub byte_offset: usize,
    pub byte_len: usize,
    pub sample_rate: u32,
    pub num_channels: u32,
    pub sample_block_words: u32,
    pub track_offset_jiffies: u64,
    pub ramp: Ramp,
    /// Buffer observer attached to this message, if any (`spec.md` §4.5).
    pub observer: Option<BufferObserver>,
}

impl Default for DsdBody {
    fn default() -> Self {
        Self {
            audio: None,
            byte_offset: 0,
            byte_len: 0,
            sample_rate: 2_822_400,
            num_channels: 2,
            sample_block_words: 1,
            track_offset_jiffies: 0,
            ramp: Ramp::none(),
            observer: None,
        }
    }
}
impl Clearable for DsdBody {
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

impl DsdBody {
    /// Attaches a buffer observer, reporting `+size` (this message's jiffies)
    /// immediately (`spec.md` §4.5).
    pub fn attach_observer(&mut self, observer: BufferObserver) -> Result<()> {
        let jiffies = self.jiffies()?;
        observer.report_delta(jiffies as i64);
        self.observer = Some(observer);
        Ok(())
    }

    /// Mirrors `MsgAudio::Clone()`: a new envelope over the same buffer, observer not
    /// propagated (`spec.md` §4.4).
    pub fn clone_envelope(&self) -> Self {
        Self { observer: None, ..self.clone() }
    }

    fn block_bytes(&self) -> usize {
        self.sample_block_words as usize * self.num_channels as usize
    }

    pub fn block_count(&self) -> u64 {
        (self.byte_len / self.block_bytes().max(1)) as u64
    }

    pub fn jiffies(&self) -> Result<u64> {
        let jps = time::per_sample(self.sample_rate)?;
        Ok(self.block_count() * self.sample_block_words as u64 * jps)
    }

    /// Splits at the block boundary nearest `at_jiffies`, rounded down so the split
    /// point always lands on a whole sample block (`spec.md` §3.3 edge case: DSD splits
    /// never divide a packed word).
    pub fn split(&self, at_jiffies: u64) -> Result<(Self, Self)> {
        let total_jiffies = self.jiffies()?;
        if at_jiffies == 0 || at_jiffies >= total_jiffies {
            return Err(AudioError::SplitOutOfRange { at: at_jiffies, size: total_jiffies }.into());
        }
        let jps = time::per_sample(self.sample_rate)?;
        let block_jiffies = self.sample_block_words as u64 * jps;
        let mut rounded = at_jiffies;
        time::round_down_non_zero_sample_block(&mut rounded, block_jiffies);
        let at_block = (rounded / block_jiffies).min(self.block_count().saturating_sub(1)).max(1);
        let split_byte = at_block as usize * self.block_bytes();

        let before = Self { byte_len: split_byte, ..self.clone() };
        let after = Self {
            byte_offset: self.byte_offset + split_byte,
            byte_len: self.byte_len - split_byte,
            track_offset_jiffies: self.track_offset_jiffies + at_block * block_jiffies,
            ..self.clone()
        };
        Ok((before, after))
    }

    pub fn aggregate(&self, next: &Self) -> Result<Self> {
        let same_buffer = match (&self.audio, &next.audio) {
            (Some(a), Some(b)) => a.points_to_same_cell(b),
            _ => false,
        };
        if !same_buffer
            || self.sample_rate != next.sample_rate
            || self.num_channels != next.num_channels
            || self.sample_block_words != next.sample_block_words
        {
            return Err(AudioError::AggregateMismatch { reason: "format or buffer mismatch" }.into());
        }
        if self.byte_offset + self.byte_len != next.byte_offset {
            return Err(AudioError::AggregateMismatch { reason: "non-contiguous byte ranges" }.into());
        }
        Ok(Self { byte_len: self.byte_len + next.byte_len, ..self.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::AudioBufferPools;

    #[test]
    fn split_lands_on_block_boundary() {
        let pools = AudioBufferPools::new(4, 4);
        let block_bytes = 4usize;
        let data = vec![0u8; block_bytes * 10];
        let body = DsdBody {
            audio: Some(pools.allocate_decoded(&data).unwrap()),
            byte_len: data.len(),
            sample_block_words: 2,
            num_channels: 2,
            ..Default::default()
        };
        let total = body.jiffies().unwrap();
        let (before, after) = body.split(total / 2).unwrap();
        assert_eq!(before.byte_len % block_bytes, 0);
        assert_eq!(after.byte_len % block_bytes, 0);
        assert_eq!(before.byte_len + after.byte_len, body.byte_len);
    }

    #[test]
    fn attach_observer_reports_size_and_clear_reports_negative() {
        use std::sync::atomic::{AtomicI64, Ordering};
        use std::sync::Arc;

        struct RecordingObserver(AtomicI64);
        impl crate::audio::buffer::PipelineBufferObserver for RecordingObserver {
            fn report_delta(&self, delta: i64) {
                self.0.fetch_add(delta, Ordering::SeqCst);
            }
        }

        let pools = AudioBufferPools::new(4, 4);
        let data = vec![0u8; 40];
        let mut body = DsdBody {
            audio: Some(pools.allocate_decoded(&data).unwrap()),
            byte_len: data.len(),
            sample_block_words: 2,
            num_channels: 2,
            ..Default::default()
        };
        let jiffies = body.jiffies().unwrap() as i64;
        let observer = Arc::new(RecordingObserver(AtomicI64::new(0)));
        body.attach_observer(observer.clone()).unwrap();
        assert_eq!(observer.0.load(Ordering::SeqCst), jiffies);

        body.clear();
        assert_eq!(observer.0.load(Ordering::SeqCst), 0);
    }
}
