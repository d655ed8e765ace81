//! Double-dispatch visitor over the closed message set (`spec.md` §4.2).
//!
//! Every pipeline stage implements [`MsgProcessor`] and overrides only the variants it
//! handles. The default method body `unreachable!()`s, mirroring the source's
//! `PipelineElement::ProcessMsg` default that asserts when a message outside a stage's
//! declared mask reaches it (`spec.md` §4.2, §B.6 of `SPEC_FULL.md`).

use crate::audio::dsd::DsdBody;
use crate::audio::encoded::EncodedBody;
use crate::audio::pcm::PcmBody;
use crate::audio::playable::{PlayableDsd, PlayablePcm, PlayableSilence, PlayableSilenceDsd};
use crate::audio::silence::SilenceBody;
use crate::msg::pool::PoolHandle;
use crate::msg::types::*;
use crate::msg::Msg;

macro_rules! default_visit {
    ($name:ident, $ty:ty) => {
        fn $name(&mut self, _msg: PoolHandle<$ty>) -> Msg {
            unreachable!(concat!(stringify!($name), " reached a stage that does not handle it"))
        }
    };
}

/// One `process_*` method per closed-set variant (`spec.md` §3.2). Each returns the
/// (possibly replaced) message, so a stage may transform or substitute it in place.
pub trait MsgProcessor {
    default_visit!(process_mode, ModeBody);
    default_visit!(process_track, TrackBody);
    default_visit!(process_drain, DrainBody);
    default_visit!(process_delay, DelayBody);
    default_visit!(process_encoded_stream, EncodedStreamBody);
    default_visit!(process_stream_segment, StreamSegmentBody);
    default_visit!(process_audio_encoded, EncodedBody);
    default_visit!(process_metatext, MetaTextBody);
    default_visit!(process_stream_interrupted, StreamInterruptedBody);
    default_visit!(process_halt, HaltBody);
    default_visit!(process_flush, FlushBody);
    default_visit!(process_wait, WaitBody);
    default_visit!(process_decoded_stream, DecodedStreamBody);
    default_visit!(process_audio_pcm, PcmBody);
    default_visit!(process_audio_dsd, DsdBody);
    default_visit!(process_silence, SilenceBody);
    default_visit!(process_playable_pcm, PlayablePcm);
    default_visit!(process_playable_dsd, PlayableDsd);
    default_visit!(process_playable_silence, PlayableSilence);
    default_visit!(process_playable_silence_dsd, PlayableSilenceDsd);
    default_visit!(process_quit, QuitBody);
}
