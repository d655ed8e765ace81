//! Error types for the pipeline core.
//!
//! Expected errors use `Result<T, PipelineError>` with meaningful variants; invariant
//! violations (duplicate enqueue, refcount underflow, a malformed ramp) are programmer
//! errors and are raised with `assert!`/`debug_assert!` rather than returned here.

use thiserror::Error;

/// Top-level error type for the pipeline core.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Errors raised while computing jiffy conversions.
    #[error("time error: {0}")]
    Time(#[from] TimeError),

    /// Errors raised while manipulating decoded-audio messages or ramps.
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    /// Errors raised while demuxing an MPEG-4 container.
    #[error("mpeg4 error: {0}")]
    Mpeg4(#[from] Mpeg4Error),

    /// Errors surfaced by the playback sink / animator.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Configuration could not be loaded or was invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for collaborator errors (e.g. a `IMpegDRMProvider` failure).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Mpeg4(Mpeg4Error::Truncated(err))
    }
}

/// Errors related to the jiffy timebase (`spec.md` §3.1).
#[derive(Debug, Error)]
pub enum TimeError {
    /// The sample rate is not one of the fixed set of supported PCM/DSD rates.
    #[error("sample rate {0} Hz is not supported")]
    SampleRateInvalid(u32),
}

/// Errors related to decoded-audio manipulation and ramps (`spec.md` §3.3–§3.4, §4.4–§4.6).
#[derive(Debug, Error)]
pub enum AudioError {
    /// `Split` was asked to split outside `(0, size)`.
    #[error("split position {at} is outside the valid range (0, {size})")]
    SplitOutOfRange { at: u64, size: u64 },

    /// `Aggregate` was given a message whose format or track offset doesn't line up.
    #[error("cannot aggregate audio messages: {reason}")]
    AggregateMismatch { reason: &'static str },

    /// The backing `DecodedAudio`/`EncodedAudio` buffer has no room for an append.
    #[error("backing buffer is full ({used}/{capacity} bytes)")]
    BufferFull { used: usize, capacity: usize },

    /// A ramp computation failed its own internal validation.
    #[error("ramp validation failed: {0}")]
    RampInvalid(&'static str),
}

/// Errors surfaced by the MPEG-4 demuxer (`spec.md` §4.8, §7).
#[derive(Debug, Error)]
pub enum Mpeg4Error {
    /// Any malformed or out-of-spec box.
    #[error("mp4 container is invalid: {0}")]
    FileInvalid(&'static str),

    /// A seek targeted a position past the end of the declared content.
    #[error("seek target {requested} is out of range (content has {available} samples)")]
    OutOfRange { requested: u64, available: u64 },

    /// A codec-level corruption (e.g. a failed decrypt) was encountered mid-stream.
    #[error("stream is corrupt: {0}")]
    CodecStreamCorrupt(&'static str),

    /// The out-of-band reader could not fulfil a byte-range request.
    #[error("out-of-band fetch failed: {0}")]
    AudioCacheException(String),

    /// A box's payload ran out of bytes mid-field while being parsed.
    #[error("box payload truncated: {0}")]
    Truncated(#[from] std::io::Error),
}

/// Errors surfaced when a stream cannot be rendered by the sink (`spec.md` §6, §7).
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink does not support the declared sample rate.
    #[error("sample rate {0} Hz is not supported by this sink")]
    SampleRateUnsupported(u32),

    /// The sink does not support the declared bit depth.
    #[error("bit depth {0} is not supported by this sink")]
    BitDepthUnsupported(u32),

    /// The sink does not support the declared audio format (PCM vs DSD).
    #[error("audio format is not supported by this sink")]
    FormatUnsupported,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PipelineError>;
