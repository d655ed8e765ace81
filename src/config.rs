//! Pipeline configuration: allocator pool sizes and timing constants.
//!
//! Loaded from a TOML file at process start; every field has a default matching the
//! pool sizes the original implementation ships, so a missing file still produces a
//! working, back-pressure-safe configuration.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Preallocated cell counts for each pooled message type (`spec.md` §4.1).
///
/// Exhaustion blocks the allocating thread rather than failing; these counts exist so
/// that steady-state operation never hits that path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSizes {
    pub mode: usize,
    pub track: usize,
    pub drain: usize,
    pub delay: usize,
    pub encoded_stream: usize,
    pub stream_segment: usize,
    pub audio_encoded: usize,
    pub metatext: usize,
    pub stream_interrupted: usize,
    pub halt: usize,
    pub flush: usize,
    pub wait: usize,
    pub decoded_stream: usize,
    pub audio_pcm: usize,
    pub audio_dsd: usize,
    pub silence: usize,
    pub playable_pcm: usize,
    pub playable_dsd: usize,
    pub playable_silence: usize,
    pub playable_silence_dsd: usize,
    pub quit: usize,
    pub decoded_audio: usize,
    pub encoded_audio: usize,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            mode: 2,
            track: 4,
            drain: 2,
            delay: 4,
            encoded_stream: 4,
            stream_segment: 4,
            audio_encoded: 64,
            metatext: 16,
            stream_interrupted: 2,
            halt: 2,
            flush: 4,
            wait: 2,
            decoded_stream: 4,
            audio_pcm: 800,
            audio_dsd: 800,
            silence: 8,
            playable_pcm: 800,
            playable_dsd: 800,
            playable_silence: 8,
            playable_silence_dsd: 8,
            quit: 2,
            decoded_audio: 800,
            encoded_audio: 800,
        }
    }
}

/// Top-level pipeline configuration (`spec.md` §A.3 of `SPEC_FULL.md`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Allocator pool sizes, one per message/buffer variant.
    pub pools: PoolSizes,

    /// Drain interval `MuterVolume` waits after a stepwise fade completes, in
    /// milliseconds, before signalling "muted" (`spec.md` §4.7, default ≈10ms).
    pub jiffies_until_mute_ms: u32,

    /// Maximum unstructured-byte capacity of `EncodedAudio`/`DecodedAudio` (`spec.md`
    /// §3.3, default ≈9 KiB).
    pub max_encoded_bytes: usize,

    /// Maximum byte length of a `MsgMetaText` payload (`spec.md` §6).
    pub max_metatext_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pools: PoolSizes::default(),
            jiffies_until_mute_ms: 10,
            max_encoded_bytes: 9 * 1024,
            max_metatext_bytes: 4096,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file, falling back to defaults for any field the
    /// file omits.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("parsing {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pools_are_nonzero() {
        let cfg = PipelineConfig::default();
        assert!(cfg.pools.audio_pcm > 0);
        assert!(cfg.max_encoded_bytes > 0);
    }

    #[test]
    fn load_missing_file_errors() {
        let result = PipelineConfig::load(std::path::Path::new("/nonexistent/pipeline.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "jiffies_until_mute_ms = 20\n").unwrap();
        let cfg = PipelineConfig::load(&path).unwrap();
        assert_eq!(cfg.jiffies_until_mute_ms, 20);
        assert_eq!(cfg.pools.audio_pcm, PoolSizes::default().audio_pcm);
    }
}
