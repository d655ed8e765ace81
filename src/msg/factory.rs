//! `MsgFactory`: one `create_*` per closed-set variant (`spec.md` §4.1).
//!
//! The factory never returns `None`/fails on exhaustion — it blocks the caller, per the
//! back-pressure contract of `spec.md` §4.1/§7. For decoded audio it either wraps fresh
//! bytes into a new [`crate::audio::buffer::DecodedAudio`] cell, or takes over an
//! existing [`crate::audio::buffer::EncodedAudio`] handle without copying — both are
//! `PoolHandle<RawAudio>`, so "taking over" the buffer is exactly the zero-copy
//! hand-off `spec.md` §4.1 describes: the codec layer's output buffer becomes the
//! decoded-audio buffer with no byte copy, regardless of which pool originally minted
//! the cell.

use crate::audio::buffer::{AudioBufferPools, DecodedAudio, EncodedAudio};
use crate::audio::dsd::DsdBody;
use crate::audio::encoded::EncodedBody;
use crate::audio::pcm::PcmBody;
use crate::audio::ramp::Ramp;
use crate::audio::silence::SilenceBody;
use crate::config::PipelineConfig;
use crate::error::{AudioError, Result};
use crate::msg::callback::OneShotCallback;
use crate::msg::pool::Pool;
use crate::msg::types::*;
use crate::msg::Msg;

/// Every pooled allocator the pipeline needs, sized from [`PipelineConfig`].
pub struct MsgFactory {
    pub buffers: AudioBufferPools,
    max_metatext_bytes: usize,

    mode: Pool<ModeBody>,
    track: Pool<TrackBody>,
    drain: Pool<DrainBody>,
    delay: Pool<DelayBody>,
    encoded_stream: Pool<EncodedStreamBody>,
    stream_segment: Pool<StreamSegmentBody>,
    audio_encoded: Pool<EncodedBody>,
    metatext: Pool<MetaTextBody>,
    stream_interrupted: Pool<StreamInterruptedBody>,
    halt: Pool<HaltBody>,
    flush: Pool<FlushBody>,
    wait: Pool<WaitBody>,
    decoded_stream: Pool<DecodedStreamBody>,
    audio_pcm: Pool<PcmBody>,
    audio_dsd: Pool<DsdBody>,
    silence: Pool<SilenceBody>,
    playable_pcm: Pool<crate::audio::playable::PlayablePcm>,
    playable_dsd: Pool<crate::audio::playable::PlayableDsd>,
    playable_silence: Pool<crate::audio::playable::PlayableSilence>,
    playable_silence_dsd: Pool<crate::audio::playable::PlayableSilenceDsd>,
    quit: Pool<QuitBody>,
}

impl MsgFactory {
    pub fn new(config: &PipelineConfig) -> Self {
        let p = &config.pools;
        Self {
            buffers: AudioBufferPools::new(p.decoded_audio, p.encoded_audio),
            max_metatext_bytes: config.max_metatext_bytes,
            mode: Pool::new("mode", p.mode),
            track: Pool::new("track", p.track),
            drain: Pool::new("drain", p.drain),
            delay: Pool::new("delay", p.delay),
            encoded_stream: Pool::new("encoded_stream", p.encoded_stream),
            stream_segment: Pool::new("stream_segment", p.stream_segment),
            audio_encoded: Pool::new("audio_encoded", p.audio_encoded),
            metatext: Pool::new("metatext", p.metatext),
            stream_interrupted: Pool::new("stream_interrupted", p.stream_interrupted),
            halt: Pool::new("halt", p.halt),
            flush: Pool::new("flush", p.flush),
            wait: Pool::new("wait", p.wait),
            decoded_stream: Pool::new("decoded_stream", p.decoded_stream),
            audio_pcm: Pool::new("audio_pcm", p.audio_pcm),
            audio_dsd: Pool::new("audio_dsd", p.audio_dsd),
            silence: Pool::new("silence", p.silence),
            playable_pcm: Pool::new("playable_pcm", p.playable_pcm),
            playable_dsd: Pool::new("playable_dsd", p.playable_dsd),
            playable_silence: Pool::new("playable_silence", p.playable_silence),
            playable_silence_dsd: Pool::new("playable_silence_dsd", p.playable_silence_dsd),
            quit: Pool::new("quit", p.quit),
        }
    }

    pub fn create_mode(&self, mode: String, info: ModeInfo, supports_clock_pull: bool) -> Msg {
        Msg::Mode(self.mode.allocate(|b| {
            b.mode = mode;
            b.info = info;
            b.supports_clock_pull = supports_clock_pull;
        }))
    }

    pub fn create_track(&self, uri: String, meta_data: String, id: u32, start_of_stream: bool) -> Msg {
        Msg::Track(self.track.allocate(|b| {
            b.uri = uri;
            b.meta_data = meta_data;
            b.id = id;
            b.start_of_stream = start_of_stream;
        }))
    }

    /// Creates a `Drain` carrying a one-shot completion callback (`spec.md` §9).
    pub fn create_drain(&self, callback: impl FnOnce() + Send + 'static) -> Msg {
        Msg::Drain(self.drain.allocate(|b| b.callback.set(callback)))
    }

    pub fn create_delay(&self, remaining_jiffies: u64, total_jiffies: u64) -> Msg {
        Msg::Delay(self.delay.allocate(|b| {
            b.remaining_jiffies = remaining_jiffies;
            b.total_jiffies = total_jiffies;
        }))
    }

    pub fn create_encoded_stream(&self, body: EncodedStreamBody) -> Msg {
        Msg::EncodedStream(self.encoded_stream.allocate(|b| *b = body))
    }

    pub fn create_stream_segment(&self, id: String) -> Msg {
        Msg::StreamSegment(self.stream_segment.allocate(|b| b.id = id))
    }

    /// Wraps fresh bytes into a new `EncodedAudio` cell and a windowing message over it.
    pub fn create_audio_encoded(&self, data: &[u8]) -> Result<Msg> {
        let audio = self.buffers.allocate_encoded(data)?;
        Ok(Msg::AudioEncoded(self.audio_encoded.allocate(|b| {
            b.audio = Some(audio);
            b.byte_offset = 0;
            b.byte_len = data.len();
        })))
    }

    /// Windows an already-allocated `EncodedAudio` buffer (used when the demuxer
    /// slices one cache buffer into several downstream messages).
    pub fn create_audio_encoded_window(&self, audio: EncodedAudio, byte_offset: usize, byte_len: usize) -> Msg {
        Msg::AudioEncoded(self.audio_encoded.allocate(|b| {
            b.audio = Some(audio);
            b.byte_offset = byte_offset;
            b.byte_len = byte_len;
        }))
    }

    pub fn create_metatext(&self, text: String) -> Result<Msg> {
        if text.len() > self.max_metatext_bytes {
            return Err(AudioError::BufferFull { used: text.len(), capacity: self.max_metatext_bytes }.into());
        }
        Ok(Msg::Metatext(self.metatext.allocate(|b| b.text = text)))
    }

    pub fn create_stream_interrupted(&self, jiffies: u64) -> Msg {
        Msg::StreamInterrupted(self.stream_interrupted.allocate(|b| b.jiffies = jiffies))
    }

    /// Creates a `Halt`, optionally carrying a completion callback invoked exactly
    /// once when the halt is acknowledged downstream (`spec.md` §4.7, §9).
    pub fn create_halt(&self, id: u32, callback: Option<impl FnOnce() + Send + 'static>) -> Msg {
        Msg::Halt(self.halt.allocate(|b| {
            b.id = id;
            b.callback = OneShotCallback::default();
            if let Some(cb) = callback {
                b.callback.set(cb);
            }
        }))
    }

    pub fn create_flush(&self, id: u32) -> Msg {
        Msg::Flush(self.flush.allocate(|b| b.id = id))
    }

    pub fn create_wait(&self) -> Msg {
        Msg::Wait(self.wait.allocate(|_| {}))
    }

    pub fn create_decoded_stream(&self, body: DecodedStreamBody) -> Msg {
        Msg::DecodedStream(self.decoded_stream.allocate(|b| *b = body))
    }

    /// Wraps fresh PCM bytes into a new `DecodedAudio` cell.
    pub fn create_audio_pcm(
        &self,
        data: &[u8],
        sample_rate: u32,
        num_channels: u32,
        bit_depth: u32,
        track_offset_jiffies: u64,
        ramp: Ramp,
    ) -> Result<Msg> {
        let audio = self.buffers.allocate_decoded(data)?;
        Ok(Msg::AudioPcm(self.audio_pcm.allocate(|b| {
            b.audio = Some(audio);
            b.byte_offset = 0;
            b.byte_len = data.len();
            b.sample_rate = sample_rate;
            b.num_channels = num_channels;
            b.bit_depth = bit_depth;
            b.track_offset_jiffies = track_offset_jiffies;
            b.ramp = ramp;
        })))
    }

    /// Takes over an already-decoded buffer (e.g. handed off zero-copy from the
    /// `AudioEncoded` the codec just decoded in place) as a new `AudioPcm` window.
    pub fn create_audio_pcm_from_buffer(
        &self,
        audio: DecodedAudio,
        byte_offset: usize,
        byte_len: usize,
        sample_rate: u32,
        num_channels: u32,
        bit_depth: u32,
        track_offset_jiffies: u64,
        ramp: Ramp,
    ) -> Msg {
        Msg::AudioPcm(self.audio_pcm.allocate(|b| {
            b.audio = Some(audio);
            b.byte_offset = byte_offset;
            b.byte_len = byte_len;
            b.sample_rate = sample_rate;
            b.num_channels = num_channels;
            b.bit_depth = bit_depth;
            b.track_offset_jiffies = track_offset_jiffies;
            b.ramp = ramp;
        }))
    }

    pub fn create_audio_dsd(
        &self,
        data: &[u8],
        sample_rate: u32,
        num_channels: u32,
        sample_block_words: u32,
        track_offset_jiffies: u64,
    ) -> Result<Msg> {
        let audio = self.buffers.allocate_decoded(data)?;
        Ok(Msg::AudioDsd(self.audio_dsd.allocate(|b| {
            b.audio = Some(audio);
            b.byte_offset = 0;
            b.byte_len = data.len();
            b.sample_rate = sample_rate;
            b.num_channels = num_channels;
            b.sample_block_words = sample_block_words;
            b.track_offset_jiffies = track_offset_jiffies;
        })))
    }

    pub fn create_silence(&self, jiffies: u64, sample_rate: u32, num_channels: u32, bit_depth: u32) -> Msg {
        Msg::Silence(self.silence.allocate(|b| {
            *b = SilenceBody { jiffies, sample_rate, num_channels, bit_depth };
        }))
    }

    pub fn create_playable_pcm(&self, body: crate::audio::playable::PlayablePcm) -> Msg {
        Msg::Playable(crate::msg::Playable::Pcm(self.playable_pcm.allocate(|b| *b = body)))
    }

    pub fn create_playable_dsd(&self, body: crate::audio::playable::PlayableDsd) -> Msg {
        Msg::Playable(crate::msg::Playable::Dsd(self.playable_dsd.allocate(|b| *b = body)))
    }

    pub fn create_playable_silence(&self, body: crate::audio::playable::PlayableSilence) -> Msg {
        Msg::Playable(crate::msg::Playable::Silence(self.playable_silence.allocate(|b| *b = body)))
    }

    pub fn create_playable_silence_dsd(&self, body: crate::audio::playable::PlayableSilenceDsd) -> Msg {
        Msg::Playable(crate::msg::Playable::SilenceDsd(self.playable_silence_dsd.allocate(|b| *b = body)))
    }

    pub fn create_quit(&self) -> Msg {
        Msg::Quit(self.quit.allocate(|_| {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_audio_pcm_round_trips_bytes() {
        let factory = MsgFactory::new(&PipelineConfig::default());
        let data = vec![1u8, 2, 3, 4];
        let msg = factory.create_audio_pcm(&data, 44_100, 1, 32, 0, Ramp::none()).unwrap();
        match msg {
            Msg::AudioPcm(h) => {
                assert_eq!(h.with(|b| b.byte_len), 4);
            }
            _ => panic!("expected AudioPcm"),
        }
    }

    #[test]
    fn create_metatext_rejects_oversized_text() {
        let mut cfg = PipelineConfig::default();
        cfg.max_metatext_bytes = 4;
        let factory = MsgFactory::new(&cfg);
        assert!(factory.create_metatext("way too long".into()).is_err());
        assert!(factory.create_metatext("ok".into()).is_ok());
    }

    #[test]
    fn halt_without_callback_clears_without_panic() {
        let factory = MsgFactory::new(&PipelineConfig::default());
        let msg = factory.create_halt(1, None::<fn()>);
        drop(msg);
    }
}
