//! Body types for every non-audio message variant in the closed set (`spec.md` §3.2).
//!
//! Each type here is the pooled payload behind a [`crate::msg::Msg`] variant. They hold
//! plain data plus, for `Drain`/`Halt`, a one-shot completion callback.

use super::callback::OneShotCallback;
use super::pool::Clearable;

/// Maximum URI length carried by `Track`/`MsgEncodedStream` (source: 1024 bytes).
pub const MAX_URI_BYTES: usize = 1024;
/// Maximum metadata-text length (source: 4096 bytes).
pub const MAX_METATEXT_BYTES: usize = 4 * 1024;
/// Maximum codec name length.
pub const MAX_CODEC_NAME_BYTES: usize = 32;

/// Clock-latency category a mode announces for its upstream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Latency {
    #[default]
    NotSupported,
    Internal,
    External,
}

/// Capabilities and ramp-duration hints a `Mode` announces (`spec.md` §3.2, source
/// `ModeInfo`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeInfo {
    pub latency_mode: Latency,
    pub supports_pause: bool,
    pub supports_next: bool,
    pub supports_prev: bool,
    pub supports_repeat: bool,
    pub supports_random: bool,
    pub ramp_pause_resume_long: bool,
    pub ramp_skip_long: bool,
}

/// `Mode` message body: announces a new source/session (`spec.md` §5, `MsgMode` marks a
/// session boundary).
#[derive(Debug, Clone, Default)]
pub struct ModeBody {
    pub mode: String,
    pub info: ModeInfo,
    pub supports_clock_pull: bool,
}
impl Clearable for ModeBody {}

/// `Track` message body.
#[derive(Debug, Clone, Default)]
pub struct TrackBody {
    pub uri: String,
    pub meta_data: String,
    pub id: u32,
    pub start_of_stream: bool,
}
impl Clearable for TrackBody {}

/// `Drain` message body: carries a one-shot completion callback invoked when the
/// pipeline has flushed all audio preceding it.
#[derive(Default)]
pub struct DrainBody {
    pub callback: OneShotCallback,
}
impl Clearable for DrainBody {
    fn clear(&mut self) {
        self.callback.assert_resolved_or_absent();
        self.callback = OneShotCallback::default();
    }
}

/// `Delay` message body: announces a fixed pipeline delay in jiffies.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelayBody {
    pub remaining_jiffies: u64,
    pub total_jiffies: u64,
}
impl Clearable for DelayBody {}

/// Fronts × surrounds × subs speaker layout (`spec.md` §3.5, §4.8.5, §B.5 of
/// `SPEC_FULL.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeakerProfile {
    pub num_fronts: u32,
    pub num_surrounds: u32,
    pub num_subs: u32,
}
impl Default for SpeakerProfile {
    fn default() -> Self {
        Self { num_fronts: 2, num_surrounds: 0, num_subs: 0 }
    }
}

/// Desired ramp type requested by a decoded stream (`spec.md` §3.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RampType {
    #[default]
    Sample,
    Volume,
}

/// Pipeline-cache seek capability of an encoded stream (`spec.md` §3.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekCapability {
    #[default]
    None,
    SeekCache,
    SeekSource,
}

/// Whether multiroom participation is permitted for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Multiroom {
    #[default]
    Allowed,
    Forbidden,
}

/// Little/big-endian layout of raw PCM samples arriving from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioDataEndian {
    #[default]
    Invalid,
    Little,
    Big,
}

/// PCM-specific stream parameters carried by `MsgEncodedStream::Format::Pcm`.
#[derive(Debug, Clone, Default)]
pub struct PcmStreamInfo {
    pub bit_depth: u32,
    pub sample_rate: u32,
    pub num_channels: u32,
    pub endian: AudioDataEndian,
    pub profile: SpeakerProfile,
    pub start_sample: u64,
    pub analog_bypass: bool,
    pub codec_name: String,
    pub lossless: bool,
}

/// DSD-specific stream parameters carried by `MsgEncodedStream::Format::Dsd`.
#[derive(Debug, Clone, Default)]
pub struct DsdStreamInfo {
    pub sample_rate: u32,
    pub num_channels: u32,
    pub sample_block_words: u32,
    pub start_sample: u64,
    pub codec_name: String,
}

/// The announced format of an encoded stream.
#[derive(Debug, Clone, Default)]
pub enum StreamFormat {
    #[default]
    Encoded,
    Pcm(PcmStreamInfo),
    Dsd(DsdStreamInfo),
}

/// Opaque handle identifying a registered `IStreamHandler` (the real trait object lives
/// with the upstream source; the message only needs to carry an id it can pass back to
/// the pipeline's handler registry).
pub type StreamHandlerId = u64;

/// `EncodedStream` message body (`spec.md` §3.5).
#[derive(Debug, Clone, Default)]
pub struct EncodedStreamBody {
    pub uri: String,
    pub meta_text: String,
    pub total_bytes: u64,
    pub start_pos: u64,
    pub stream_id: u32,
    pub seek_capability: SeekCapability,
    pub live: bool,
    pub multiroom: Multiroom,
    pub stream_handler: Option<StreamHandlerId>,
    pub format: StreamFormat,
    pub ramp: RampType,
    pub seek_pos_ms: u32,
}
impl Clearable for EncodedStreamBody {}

/// `StreamSegment` message body.
#[derive(Debug, Clone, Default)]
pub struct StreamSegmentBody {
    pub id: String,
}
impl Clearable for StreamSegmentBody {}

/// `Metatext` message body.
#[derive(Debug, Clone, Default)]
pub struct MetaTextBody {
    pub text: String,
}
impl Clearable for MetaTextBody {}

/// `StreamInterrupted` message body.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamInterruptedBody {
    pub jiffies: u64,
}
impl Clearable for StreamInterruptedBody {}

/// Sentinel id meaning "no id assigned".
pub const ID_NONE: u32 = 0;
/// Sentinel id meaning "invalid"; used by `MsgHalt`/`MsgFlush`.
pub const ID_INVALID: u32 = u32::MAX;

/// `Halt` message body: carries a one-shot completion callback invoked exactly once
/// when the halt is acknowledged downstream (`spec.md` §3.2, §9).
#[derive(Default)]
pub struct HaltBody {
    pub id: u32,
    pub callback: OneShotCallback,
}
impl Clearable for HaltBody {
    fn clear(&mut self) {
        self.callback.assert_resolved_or_absent();
        *self = Self::default();
    }
}

/// `Flush` message body: the flush-token protocol's terminator (`spec.md` §5).
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushBody {
    pub id: u32,
}
impl Clearable for FlushBody {}

/// `Wait` message body (carries no data).
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitBody;
impl Clearable for WaitBody {}

/// Decoded audio format announced by `MsgDecodedStream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    #[default]
    Undefined,
    Pcm,
    Dsd,
}

/// `DecodedStream` message body: the codec's announcement of stream parameters
/// (`spec.md` §3.5). Downstream stages reconfigure on receipt of one of these and
/// treat it as a session boundary for any cached per-stream state.
#[derive(Debug, Clone, Default)]
pub struct DecodedStreamBody {
    pub stream_id: u32,
    pub bit_rate: u32,
    pub bit_depth: u32,
    pub sample_rate: u32,
    pub num_channels: u32,
    pub codec_name: String,
    pub track_length_jiffies: u64,
    pub sample_start: u64,
    pub lossless: bool,
    pub seekable: bool,
    pub live: bool,
    pub analog_bypass: bool,
    pub format: AudioFormat,
    pub multiroom: Multiroom,
    pub profile: SpeakerProfile,
    pub stream_handler: Option<StreamHandlerId>,
    pub ramp: RampType,
}
impl Clearable for DecodedStreamBody {}

/// `Quit` message body (carries no data; final message on a stage's queue at shutdown).
#[derive(Debug, Clone, Copy, Default)]
pub struct QuitBody;
impl Clearable for QuitBody {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_profile_default_is_stereo() {
        assert_eq!(SpeakerProfile::default().num_fronts, 2);
    }
}
