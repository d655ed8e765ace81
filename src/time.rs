//! The pipeline-wide time base: jiffies (`spec.md` §3.1).
//!
//! A jiffy is `1 / 56,448,000` of a second — the smallest unit such that one sample at
//! any supported PCM or DSD rate is an integer number of jiffies. The supported rate
//! set is closed; anything else is a [`TimeError::SampleRateInvalid`].

use crate::error::{Result, TimeError};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Jiffies per second: `lcm(384000, 352800)`.
pub const PER_SECOND: u64 = 56_448_000;

/// Jiffies per millisecond.
pub const PER_MS: u64 = PER_SECOND / 1000;

/// Songcast ticks/second for the 44.1kHz-family of sample rates.
pub const SONGCAST_TICKS_PER_SEC_44K: u64 = 44_100 * 256;

/// Songcast ticks/second for the 48kHz-family of sample rates.
pub const SONGCAST_TICKS_PER_SEC_48K: u64 = 48_000 * 256;

/// Jiffies-per-sample for the lowest supported PCM rate (7350 Hz); the largest value
/// `per_sample` can return.
pub const MAX_JIFFIES_PER_SAMPLE: u64 = PER_SECOND / 7350;

static PER_SAMPLE_TABLE: Lazy<HashMap<u32, u64>> = Lazy::new(|| {
    const PCM_RATES: &[u32] = &[
        7350, 8000, 11025, 12000, 14700, 16000, 22050, 24000, 29400, 32000, 44100, 48000, 88200,
        96000, 176400, 192000, 352800, 384000,
    ];
    const DSD_RATES: &[u32] = &[2_822_400, 5_644_800, 11_289_600];
    PCM_RATES
        .iter()
        .chain(DSD_RATES.iter())
        .map(|&rate| (rate, PER_SECOND / rate as u64))
        .collect()
});

/// Jiffies occupied by a single sample at `sample_rate`, or [`TimeError::SampleRateInvalid`]
/// if `sample_rate` is outside the fixed supported set.
pub fn per_sample(sample_rate: u32) -> Result<u64> {
    PER_SAMPLE_TABLE
        .get(&sample_rate)
        .copied()
        .ok_or(TimeError::SampleRateInvalid(sample_rate).into())
}

/// `true` iff `sample_rate` is one of the fixed set of supported PCM/DSD rates.
pub fn is_valid_sample_rate(sample_rate: u32) -> bool {
    PER_SAMPLE_TABLE.contains_key(&sample_rate)
}

/// Converts a jiffy count to bytes, rounding `jiffies` down to the nearest whole sample
/// as a side effect (mirrors the source's in/out `aJiffies` reference parameter).
pub fn to_bytes(jiffies: &mut u64, jiffies_per_sample: u64, num_channels: u32, bits_per_subsample: u32) -> u64 {
    to_bytes_sample_block(jiffies, jiffies_per_sample, num_channels, bits_per_subsample, 1)
}

/// As [`to_bytes`], but additionally rounds down to a whole sample-block boundary
/// (used by DSD, where several sample blocks may share one packed word).
pub fn to_bytes_sample_block(
    jiffies: &mut u64,
    jiffies_per_sample: u64,
    num_channels: u32,
    bits_per_subsample: u32,
    samples_per_block: u64,
) -> u64 {
    assert!(samples_per_block != 0);
    let block_jiffies = jiffies_per_sample * samples_per_block;
    *jiffies -= *jiffies % block_jiffies;
    let num_samples = *jiffies / jiffies_per_sample;
    let num_subsamples = num_samples * num_channels as u64;
    (num_subsamples * bits_per_subsample as u64 + 7) / 8
}

/// Rounds `jiffies` down to the nearest sample boundary at `sample_rate`.
pub fn round_down(jiffies: &mut u64, sample_rate: u32) -> Result<()> {
    let jps = per_sample(sample_rate)?;
    *jiffies -= *jiffies % jps;
    Ok(())
}

/// Rounds `jiffies` up to the nearest sample boundary at `sample_rate`.
pub fn round_up(jiffies: &mut u64, sample_rate: u32) -> Result<()> {
    let jps = per_sample(sample_rate)?;
    *jiffies += jps - 1;
    *jiffies -= *jiffies % jps;
    Ok(())
}

/// Rounds `jiffies` down to the nearest non-zero multiple of `sample_block_jiffies`; if
/// rounding down would produce zero, rounds up instead (used so a non-zero request
/// never collapses to an empty sample block).
pub fn round_down_non_zero_sample_block(jiffies: &mut u64, sample_block_jiffies: u64) {
    let mut rounded = *jiffies - (*jiffies % sample_block_jiffies);
    if rounded == 0 {
        rounded = *jiffies + sample_block_jiffies - 1;
        rounded -= rounded % sample_block_jiffies;
    }
    *jiffies = rounded;
}

/// Songcast ticks/second for `sample_rate`'s 44.1k/48k family.
pub fn songcast_ticks_per_second(sample_rate: u32) -> Result<u64> {
    match sample_rate {
        7350 | 11025 | 14700 | 22050 | 29400 | 44100 | 88200 | 176400 | 352800 => {
            Ok(SONGCAST_TICKS_PER_SEC_44K)
        }
        8000 | 12000 | 16000 | 24000 | 32000 | 48000 | 96000 | 192000 | 384000 => {
            Ok(SONGCAST_TICKS_PER_SEC_48K)
        }
        other => Err(TimeError::SampleRateInvalid(other).into()),
    }
}

/// Converts a jiffy count to Songcast ticks at `sample_rate`.
pub fn to_songcast_time(jiffies: u64, sample_rate: u32) -> Result<u64> {
    let ticks_per_sec = songcast_ticks_per_second(sample_rate)?;
    Ok((jiffies * ticks_per_sec) / PER_SECOND)
}

/// Converts a Songcast tick count back to jiffies at `sample_rate`.
pub fn from_songcast_time(songcast_time: u64, sample_rate: u32) -> Result<u64> {
    let ticks_per_sec = songcast_ticks_per_second(sample_rate)?;
    Ok((songcast_time * PER_SECOND) / ticks_per_sec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_sample_known_rates() {
        assert_eq!(per_sample(44100).unwrap(), PER_SECOND / 44100);
        assert_eq!(per_sample(48000).unwrap(), PER_SECOND / 48000);
        assert_eq!(per_sample(11289600).unwrap(), PER_SECOND / 11289600);
    }

    #[test]
    fn per_sample_invalid_rate_errors() {
        assert!(per_sample(44099).is_err());
        assert!(!is_valid_sample_rate(96001));
    }

    #[test]
    fn to_bytes_16bit_stereo() {
        let jps = per_sample(44100).unwrap();
        let mut jiffies = jps * 4; // 4 samples
        let bytes = to_bytes(&mut jiffies, jps, 2, 16);
        assert_eq!(bytes, 4 * 2 * 2);
    }

    #[test]
    fn round_trip_songcast_44k() {
        let jiffies = PER_SECOND; // exactly one second
        let ticks = to_songcast_time(jiffies, 44100).unwrap();
        assert_eq!(ticks, SONGCAST_TICKS_PER_SEC_44K);
        let back = from_songcast_time(ticks, 44100).unwrap();
        assert_eq!(back, jiffies);
    }

    #[test]
    fn round_down_non_zero_sample_block_never_collapses() {
        let mut jiffies = 3u64;
        round_down_non_zero_sample_block(&mut jiffies, 10);
        assert_eq!(jiffies, 10);
    }
}
