//! `MsgAudioEncoded`: a run of still-encoded bytes (`spec.md` §3.2, §3.3, §4.8).
//!
//! Unlike decoded audio, an encoded-audio message carries no rate/depth/channel
//! metadata of its own — it is opaque bytes the container demuxer and codec interpret.
//! The demuxer's box processors treat a run of `MsgAudioEncoded` messages as a
//! contiguous byte stream via [`crate::mp4::cache`], coalescing several into one when a
//! box needs more bytes than a single message holds.

use crate::audio::buffer::{BufferObserver, EncodedAudio};
use crate::msg::pool::Clearable;

/// A window of encoded bytes shared by reference over an [`EncodedAudio`] cell.
#[derive(Clone, Default)]
pub struct EncodedBody {
    pub audio: Option<EncodedAudio>,
    pub byte_offset: usize,
    pub byte_len: usize,
    /// Buffer observer attached to this message, if any (`spec.md` §4.5). Encoded
    /// audio has no defined jiffy rate, so the reported unit is bytes, mirroring the
    /// reservoir's separate encoded-bytes counter (`spec.md` §4.3).
    pub observer: Option<BufferObserver>,
}
impl Clearable for EncodedBody {
    fn clear(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.report_delta(-(self.byte_len as i64));
        }
        self.audio = None;
        *self = Self::default();
    }
}

impl EncodedBody {
    pub fn len(&self) -> usize {
        self.byte_len
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len == 0
    }

    /// Copies out this message's window as an owned `Vec<u8>`.
    pub fn to_vec(&self) -> Vec<u8> {
        match &self.audio {
            Some(audio) => audio.with(|raw| raw.slice(self.byte_offset, self.byte_len).to_vec()),
            None => Vec::new(),
        }
    }

    /// Attaches a buffer observer, reporting `+size` (this message's byte length)
    /// immediately (`spec.md` §4.5).
    pub fn attach_observer(&mut self, observer: BufferObserver) {
        observer.report_delta(self.byte_len as i64);
        self.observer = Some(observer);
    }

    /// Mirrors `MsgAudio::Clone()`: a new envelope over the same buffer, observer not
    /// propagated (`spec.md` §4.4).
    pub fn clone_envelope(&self) -> Self {
        Self { observer: None, ..self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::AudioBufferPools;

    #[test]
    fn to_vec_reads_the_windowed_bytes() {
        let pools = AudioBufferPools::new(2, 2);
        let audio = pools.allocate_encoded(&[1, 2, 3, 4, 5]).unwrap();
        let body = EncodedBody { audio: Some(audio), byte_offset: 1, byte_len: 3, ..Default::default() };
        assert_eq!(body.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn attach_observer_reports_byte_length_and_clear_reports_negative() {
        use std::sync::atomic::{AtomicI64, Ordering};
        use std::sync::Arc;

        struct RecordingObserver(AtomicI64);
        impl crate::audio::buffer::PipelineBufferObserver for RecordingObserver {
            fn report_delta(&self, delta: i64) {
                self.0.fetch_add(delta, Ordering::SeqCst);
            }
        }

        let pools = AudioBufferPools::new(2, 2);
        let audio = pools.allocate_encoded(&[1, 2, 3, 4, 5]).unwrap();
        let mut body = EncodedBody { audio: Some(audio), byte_offset: 0, byte_len: 5, ..Default::default() };
        let observer = Arc::new(RecordingObserver(AtomicI64::new(0)));
        body.attach_observer(observer.clone());
        assert_eq!(observer.0.load(Ordering::SeqCst), 5);

        body.clear();
        assert_eq!(observer.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clone_envelope_does_not_propagate_the_observer() {
        struct RecordingObserver;
        impl crate::audio::buffer::PipelineBufferObserver for RecordingObserver {
            fn report_delta(&self, _delta: i64) {}
        }

        let pools = AudioBufferPools::new(2, 2);
        let audio = pools.allocate_encoded(&[1, 2, 3]).unwrap();
        let mut body = EncodedBody { audio: Some(audio), byte_offset: 0, byte_len: 3, ..Default::default() };
        body.attach_observer(std::sync::Arc::new(RecordingObserver));
        let cloned = body.clone_envelope();
        assert!(cloned.observer.is_none());
    }
}
