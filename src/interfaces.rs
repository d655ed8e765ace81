//! Trait boundaries to collaborators outside this crate's scope (`spec.md` §6).
//!
//! None of these traits have a concrete implementation here — the codec, the UPnP/
//! Songcast sender, the hardware sink, and the DRM key provider all live upstream or
//! downstream of this crate. Modelling them as traits lets the pipeline stages be
//! written and tested against the message substrate alone.

use crate::error::Result;
use crate::msg::types::{DsdStreamInfo, PcmStreamInfo, SeekCapability};

/// Result of asking upstream whether a newly announced stream may start playing
/// (`spec.md` §6 `IStreamHandler::OkToPlay`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OkToPlay {
    Yes,
    No,
    Later,
}

/// A flush-token id issued by a [`StreamHandler::try_seek`]/`try_discard`/`try_stop`
/// call; callers discard messages until they observe a matching `MsgFlush`
/// (`spec.md` §5, the flush-token protocol).
pub type FlushId = u32;

/// Sentinel meaning "no flush id issued" (the request was refused or not applicable).
pub const FLUSH_ID_INVALID: FlushId = u32::MAX;

/// Callback from downstream to the upstream source that owns a stream (`spec.md` §6
/// `IStreamHandler`).
pub trait StreamHandler: Send {
    fn ok_to_play(&mut self, stream_id: u32) -> OkToPlay;
    fn try_seek(&mut self, stream_id: u32, byte_offset: u64) -> FlushId;
    fn try_discard(&mut self, jiffies: u64) -> FlushId;
    fn try_stop(&mut self, stream_id: u32) -> FlushId;
    fn notify_starving(&mut self, mode: &str, stream_id: u32, starving: bool);
}

/// Input to the pipeline from a source (`spec.md` §6 `ISupply`). A source calls these
/// to push messages into the pipeline without constructing `Msg`s directly.
pub trait Supply: Send {
    fn output_track(&mut self, uri: &str, meta_data: &str, id: u32, start_of_stream: bool);
    fn output_drain(&mut self, callback: Box<dyn FnOnce() + Send>);
    fn output_delay(&mut self, jiffies: u64);
    #[allow(clippy::too_many_arguments)]
    fn output_stream(
        &mut self,
        uri: &str,
        total_bytes: u64,
        start_pos: u64,
        seek_capability: SeekCapability,
        live: bool,
        multiroom: bool,
        stream_handler: Option<u64>,
        stream_id: u32,
        seek_pos_ms: u32,
    );
    fn output_pcm_stream(&mut self, info: PcmStreamInfo);
    fn output_dsd_stream(&mut self, info: DsdStreamInfo);
    fn output_segment(&mut self, id: &str);
    fn output_data(&mut self, bytes: &[u8]) -> Result<()>;
    fn output_metadata(&mut self, text: &str) -> Result<()>;
    fn output_halt(&mut self, id: u32);
    fn output_flush(&mut self, id: u32);
    fn output_wait(&mut self);
}

/// Sink capability query (`spec.md` §6 `IPipelineAnimator`).
pub trait PipelineAnimator: Send {
    fn buffer_jiffies(&self) -> u64;
    /// Output delay for a given format, returning `Err` if the sink cannot render it at
    /// all (`FormatUnsupported`/`SampleRateUnsupported`/`BitDepthUnsupported`).
    fn delay_jiffies(&self, is_pcm: bool, sample_rate: u32, bit_depth: u32, num_channels: u32) -> Result<u64>;
    fn dsd_block_size_words(&self) -> u32;
    fn max_bit_depth(&self) -> u32;
    /// Maximum PCM and DSD sample rates the sink can render.
    fn max_sample_rates(&self) -> (u32, u32);
}

/// Whether a stepwise fade has finished (`spec.md` §6 `IVolumeMuterStepped`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    InProgress,
    Complete,
}

/// Stepwise external volume control `MuterVolume` drives in lock-step with audio
/// flowing through it (`spec.md` §4.7, §6).
pub trait VolumeMuterStepped: Send {
    fn begin_mute(&mut self) -> StepResult;
    fn step_mute(&mut self, jiffies: u64) -> StepResult;
    fn begin_unmute(&mut self) -> StepResult;
    fn step_unmute(&mut self, jiffies: u64) -> StepResult;
    /// Sets the hardware straight to muted, bypassing a stepwise fade (used when a
    /// `Mute()` arrives before `Start()`, or while the pipeline is halted).
    fn set_muted(&mut self);
    /// Sets the hardware straight to unmuted (used when `Unmute()` arrives while
    /// halted).
    fn set_unmuted(&mut self);
}

/// Consumer of decoded PCM sample fragments, implemented by the render/output stage
/// (`spec.md` §6 `IPcmProcessor`).
pub trait PcmProcessor: Send {
    fn begin_block(&mut self) {}
    fn process_fragment(&mut self, attenuated_bytes: &[u8], bit_depth: u32, num_channels: u32);
    fn process_silence(&mut self, num_samples: u64, bit_depth: u32, num_channels: u32);
    fn end_block(&mut self) {}
    fn flush(&mut self) {}
}

/// Consumer of decoded DSD sample fragments, implemented by the render/output stage
/// (`spec.md` §6 `IDsdProcessor`).
pub trait DsdProcessor: Send {
    fn begin_block(&mut self) {}
    fn process_fragment(&mut self, data: &[u8], num_channels: u32);
    fn process_silence(&mut self, num_blocks: u64, sample_block_words: u32, num_channels: u32);
    fn end_block(&mut self) {}
    fn flush(&mut self) {}
}

/// CENC (Common Encryption) key/decrypt provider for encrypted MPEG-4 content
/// (`spec.md` §4.8.3, §6 `IMpegDRMProvider`). Absence of a provider on protected
/// content is a `CodecStreamCorrupt` at the call site, not modelled here.
pub trait MpegDrmProvider: Send {
    /// Decrypts one full sample in place, given its 16-byte key id and IV.
    fn decrypt(&mut self, key_id: &[u8; 16], sample: &[u8], iv: &[u8; 16]) -> Result<Vec<u8>>;
}

/// Out-of-band byte-range fetch for a `moov` that trails `mdat` (`spec.md` §4.8.4, §6
/// `IContainerUrlBlockWriter`).
pub trait ContainerUrlBlockWriter: Send {
    fn try_get(&mut self, url: &str, offset: u64, bytes: usize) -> Result<Vec<u8>>;
}
