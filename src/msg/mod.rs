//! The message substrate (`spec.md` §3.2, §4.1–§4.3): a closed set of typed,
//! reference-counted, pooled messages, the visitor that dispatches them through
//! pipeline stages, and the FIFO/reservoir primitives stages communicate over.

pub mod callback;
pub mod element;
pub mod factory;
pub mod pool;
pub mod queue;
pub mod reservoir;
pub mod types;
pub mod visitor;

use crate::audio::dsd::DsdBody;
use crate::audio::encoded::EncodedBody;
use crate::audio::pcm::PcmBody;
use crate::audio::playable::{PlayableDsd, PlayablePcm, PlayableSilence, PlayableSilenceDsd};
use crate::audio::silence::SilenceBody;
use crate::error::Result;
use crate::msg::pool::PoolHandle;
use crate::msg::types::*;
use crate::msg::visitor::MsgProcessor;

/// The playable-audio sub-variants (`spec.md` §3.2: `Playable (PlayablePcm |
/// PlayableDsd | PlayableSilence | PlayableSilenceDsd)`).
#[derive(Clone)]
pub enum Playable {
    Pcm(PoolHandle<PlayablePcm>),
    Dsd(PoolHandle<PlayableDsd>),
    Silence(PoolHandle<PlayableSilence>),
    SilenceDsd(PoolHandle<PlayableSilenceDsd>),
}

/// The closed set of pipeline messages (`spec.md` §3.2). Each variant wraps a
/// [`PoolHandle`] over its payload type; cloning a `Msg` is `AddRef`, dropping the last
/// clone is `RemoveRef` (`spec.md` §4.1).
#[derive(Clone)]
pub enum Msg {
    Mode(PoolHandle<ModeBody>),
    Track(PoolHandle<TrackBody>),
    Drain(PoolHandle<DrainBody>),
    Delay(PoolHandle<DelayBody>),
    EncodedStream(PoolHandle<EncodedStreamBody>),
    StreamSegment(PoolHandle<StreamSegmentBody>),
    AudioEncoded(PoolHandle<EncodedBody>),
    Metatext(PoolHandle<MetaTextBody>),
    StreamInterrupted(PoolHandle<StreamInterruptedBody>),
    Halt(PoolHandle<HaltBody>),
    Flush(PoolHandle<FlushBody>),
    Wait(PoolHandle<WaitBody>),
    DecodedStream(PoolHandle<DecodedStreamBody>),
    AudioPcm(PoolHandle<PcmBody>),
    AudioDsd(PoolHandle<DsdBody>),
    Silence(PoolHandle<SilenceBody>),
    Playable(Playable),
    Quit(PoolHandle<QuitBody>),
}

/// A bit per closed-set variant, used by [`element::PipelineElement`] to declare which
/// messages a stage supports (`spec.md` §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MsgKind {
    Mode = 1 << 0,
    Track = 1 << 1,
    Drain = 1 << 2,
    Delay = 1 << 3,
    EncodedStream = 1 << 4,
    StreamSegment = 1 << 5,
    AudioEncoded = 1 << 6,
    Metatext = 1 << 7,
    StreamInterrupted = 1 << 8,
    Halt = 1 << 9,
    Flush = 1 << 10,
    Wait = 1 << 11,
    DecodedStream = 1 << 12,
    AudioPcm = 1 << 13,
    AudioDsd = 1 << 14,
    Silence = 1 << 15,
    PlayablePcm = 1 << 16,
    PlayableDsd = 1 << 17,
    PlayableSilence = 1 << 18,
    PlayableSilenceDsd = 1 << 19,
    Quit = 1 << 20,
}

impl Msg {
    /// The [`MsgKind`] bit this message occupies (`spec.md` §4.2).
    pub fn kind(&self) -> MsgKind {
        match self {
            Msg::Mode(_) => MsgKind::Mode,
            Msg::Track(_) => MsgKind::Track,
            Msg::Drain(_) => MsgKind::Drain,
            Msg::Delay(_) => MsgKind::Delay,
            Msg::EncodedStream(_) => MsgKind::EncodedStream,
            Msg::StreamSegment(_) => MsgKind::StreamSegment,
            Msg::AudioEncoded(_) => MsgKind::AudioEncoded,
            Msg::Metatext(_) => MsgKind::Metatext,
            Msg::StreamInterrupted(_) => MsgKind::StreamInterrupted,
            Msg::Halt(_) => MsgKind::Halt,
            Msg::Flush(_) => MsgKind::Flush,
            Msg::Wait(_) => MsgKind::Wait,
            Msg::DecodedStream(_) => MsgKind::DecodedStream,
            Msg::AudioPcm(_) => MsgKind::AudioPcm,
            Msg::AudioDsd(_) => MsgKind::AudioDsd,
            Msg::Silence(_) => MsgKind::Silence,
            Msg::Playable(Playable::Pcm(_)) => MsgKind::PlayablePcm,
            Msg::Playable(Playable::Dsd(_)) => MsgKind::PlayableDsd,
            Msg::Playable(Playable::Silence(_)) => MsgKind::PlayableSilence,
            Msg::Playable(Playable::SilenceDsd(_)) => MsgKind::PlayableSilenceDsd,
            Msg::Quit(_) => MsgKind::Quit,
        }
    }

    /// `true` for the variants that carry a window of time (`spec.md` §3.3: only audio
    /// variants carry jiffies and can split/clone).
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            Msg::AudioPcm(_) | Msg::AudioDsd(_) | Msg::Silence(_) | Msg::Playable(_)
        )
    }

    /// Jiffies spanned by this message, for the audio variants; `Ok(0)` for anything
    /// else (mirrors the reservoir's jiffy-accounting visitor, `spec.md` §4.3).
    pub fn jiffies(&self) -> Result<u64> {
        Ok(match self {
            Msg::AudioPcm(h) => h.with(|b| b.jiffies()).unwrap_or(0),
            Msg::AudioDsd(h) => h.with(|b| b.jiffies()).unwrap_or(0),
            Msg::Silence(h) => h.with(|b| b.jiffies),
            _ => 0,
        })
    }

    /// A stable identity for the underlying pooled cell, used by [`queue::MsgQueue`] to
    /// detect a message enqueued twice (`spec.md` §3.2, §4.1).
    pub fn identity(&self) -> usize {
        match self {
            Msg::Mode(h) => h.identity(),
            Msg::Track(h) => h.identity(),
            Msg::Drain(h) => h.identity(),
            Msg::Delay(h) => h.identity(),
            Msg::EncodedStream(h) => h.identity(),
            Msg::StreamSegment(h) => h.identity(),
            Msg::AudioEncoded(h) => h.identity(),
            Msg::Metatext(h) => h.identity(),
            Msg::StreamInterrupted(h) => h.identity(),
            Msg::Halt(h) => h.identity(),
            Msg::Flush(h) => h.identity(),
            Msg::Wait(h) => h.identity(),
            Msg::DecodedStream(h) => h.identity(),
            Msg::AudioPcm(h) => h.identity(),
            Msg::AudioDsd(h) => h.identity(),
            Msg::Silence(h) => h.identity(),
            Msg::Playable(Playable::Pcm(h)) => h.identity(),
            Msg::Playable(Playable::Dsd(h)) => h.identity(),
            Msg::Playable(Playable::Silence(h)) => h.identity(),
            Msg::Playable(Playable::SilenceDsd(h)) => h.identity(),
            Msg::Quit(h) => h.identity(),
        }
    }

    /// Double dispatch into a stage's [`MsgProcessor`], returning the (possibly
    /// replaced) message.
    pub fn process(self, processor: &mut dyn MsgProcessor) -> Msg {
        match self {
            Msg::Mode(h) => processor.process_mode(h),
            Msg::Track(h) => processor.process_track(h),
            Msg::Drain(h) => processor.process_drain(h),
            Msg::Delay(h) => processor.process_delay(h),
            Msg::EncodedStream(h) => processor.process_encoded_stream(h),
            Msg::StreamSegment(h) => processor.process_stream_segment(h),
            Msg::AudioEncoded(h) => processor.process_audio_encoded(h),
            Msg::Metatext(h) => processor.process_metatext(h),
            Msg::StreamInterrupted(h) => processor.process_stream_interrupted(h),
            Msg::Halt(h) => processor.process_halt(h),
            Msg::Flush(h) => processor.process_flush(h),
            Msg::Wait(h) => processor.process_wait(h),
            Msg::DecodedStream(h) => processor.process_decoded_stream(h),
            Msg::AudioPcm(h) => processor.process_audio_pcm(h),
            Msg::AudioDsd(h) => processor.process_audio_dsd(h),
            Msg::Silence(h) => processor.process_silence(h),
            Msg::Playable(Playable::Pcm(h)) => processor.process_playable_pcm(h),
            Msg::Playable(Playable::Dsd(h)) => processor.process_playable_dsd(h),
            Msg::Playable(Playable::Silence(h)) => processor.process_playable_silence(h),
            Msg::Playable(Playable::SilenceDsd(h)) => processor.process_playable_silence_dsd(h),
            Msg::Quit(h) => processor.process_quit(h),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::pool::Pool;

    #[test]
    fn kind_is_stable_across_clone() {
        let pool: Pool<QuitBody> = Pool::new("quit", 1);
        let msg = Msg::Quit(pool.allocate(|_| {}));
        let cloned = msg.clone();
        assert_eq!(msg.kind() as u32, cloned.kind() as u32);
    }

    #[test]
    fn non_audio_msg_has_zero_jiffies() {
        let pool: Pool<WaitBody> = Pool::new("wait", 1);
        let msg = Msg::Wait(pool.allocate(|_| {}));
        assert_eq!(msg.jiffies().unwrap(), 0);
    }
}
