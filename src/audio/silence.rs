//! `MsgSilence`: a run of silent samples with no backing buffer (`spec.md` §3.3).
//!
//! Silence is generated on demand rather than stored, so splitting or aggregating it is
//! pure arithmetic on a jiffy count.

use crate::error::{AudioError, Result};
use crate::msg::pool::Clearable;

#[derive(Debug, Clone, Copy)]
pub struct SilenceBody {
    pub jiffies: u64,
    pub sample_rate: u32,
    pub num_channels: u32,
    pub bit_depth: u32,
}

impl Default for SilenceBody {
    fn default() -> Self {
        Self { jiffies: 0, sample_rate: 44_100, num_channels: 2, bit_depth: 16 }
    }
}
impl Clearable for SilenceBody {}

impl SilenceBody {
    pub fn split(&self, at_jiffies: u64) -> Result<(Self, Self)> {
        if at_jiffies == 0 || at_jiffies >= self.jiffies {
            return Err(AudioError::SplitOutOfRange { at: at_jiffies, size: self.jiffies }.into());
        }
        Ok((
            Self { jiffies: at_jiffies, ..*self },
            Self { jiffies: self.jiffies - at_jiffies, ..*self },
        ))
    }

    pub fn aggregate(&self, next: &Self) -> Result<Self> {
        if self.sample_rate != next.sample_rate || self.num_channels != next.num_channels {
            return Err(AudioError::AggregateMismatch { reason: "format mismatch" }.into());
        }
        Ok(Self { jiffies: self.jiffies + next.jiffies, ..*self })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_aggregate_round_trip() {
        let body = SilenceBody { jiffies: 1000, ..Default::default() };
        let (a, b) = body.split(400).unwrap();
        let merged = a.aggregate(&b).unwrap();
        assert_eq!(merged.jiffies, body.jiffies);
    }
}
