//! Message substrate, decoded-audio/ramp engine, muting stage and MPEG-4 demuxer for a
//! networked-media-player audio pipeline.
//!
//! **Architecture:** a closed set of pooled, reference-counted messages (`msg`) flows
//! through pipeline stages as `DecodedAudio`/`EncodedAudio` buffers (`audio`) carrying
//! sample-accurate volume ramps. A cooperative muting stage (`muter`) and an MPEG-4
//! container demuxer (`mp4`) are the two concrete stages built on that substrate.
//! Collaborators outside this crate's scope (codecs, sinks, DRM, network sources) are
//! modelled as traits in `interfaces`.

pub mod audio;
pub mod config;
pub mod error;
pub mod interfaces;
pub mod mp4;
pub mod msg;
pub mod muter;
pub mod time;

pub use error::{PipelineError, Result};
