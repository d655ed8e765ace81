//! Ramp endpoints, split semantics, and the effect a ramp has once it's actually
//! applied to sample bytes through `PlayablePcm::read`.

use pipeline_core::audio::buffer::AudioBufferPools;
use pipeline_core::audio::pcm::PcmBody;
use pipeline_core::audio::playable::PlayablePcm;
use pipeline_core::audio::ramp::{Direction, Ramp, RampApplicator, RAMP_MAX, RAMP_MIN};
use pipeline_core::interfaces::PcmProcessor;

struct Capture {
    bytes: Vec<u8>,
}
impl PcmProcessor for Capture {
    fn process_fragment(&mut self, attenuated_bytes: &[u8], _bit_depth: u32, _num_channels: u32) {
        self.bytes.extend_from_slice(attenuated_bytes);
    }
    fn process_silence(&mut self, _num_samples: u64, _bit_depth: u32, _num_channels: u32) {}
}

/// A ramp's first and last multipliers land at its declared endpoints (within the
/// precision of the multiplier table) once `RampApplicator` walks it sample-by-sample.
#[test]
fn ramp_endpoints_bound_the_first_and_last_multiplier() {
    let ramp = Ramp { start: RAMP_MAX, end: RAMP_MIN, direction: Direction::Down };
    let mut app = RampApplicator::start(ramp, 256);
    let first = app.get_next_sample().unwrap();
    let mut last = first;
    for _ in 1..256 {
        last = app.get_next_sample().unwrap();
    }
    assert_eq!(first, 32768, "ramp must start at full volume");
    assert!(last < 200, "ramp must end near silence, got {last}");
}

/// Property 6: `Ramp::Set` reaches `RAMP_MIN`/`RAMP_MAX` exactly when a fragment covers
/// the whole remaining duration of the fade.
#[test]
fn ramp_set_property_6_reaches_extremes_exactly() {
    let none = Ramp::none();
    let (down, split) = none.set(Direction::Down, RAMP_MAX, 2000, 2000);
    assert!(split.is_none());
    assert_eq!(down.end, RAMP_MIN);

    let (up, split) = none.set(Direction::Up, RAMP_MIN, 2000, 2000);
    assert!(split.is_none());
    assert_eq!(up.end, RAMP_MAX);
}

/// Property 8: an opposite-direction `Ramp::set` only reports a split point strictly
/// inside the fragment, and the pre/post ramps it describes bound the crossing.
#[test]
fn opposite_direction_set_reports_an_interior_crossing() {
    let up = Ramp { start: RAMP_MIN, end: RAMP_MAX, direction: Direction::Up };
    let (merged, split) = up.set(Direction::Down, RAMP_MAX, 2000, 2000);
    let (at, tail) = split.expect("crossing ramps must split");
    assert!(at > 0 && at < 2000, "split point {at} must be strictly interior");
    assert_eq!(merged.direction, Direction::Up);
    assert_eq!(tail.direction, Direction::Down);
}

/// Property 7 / E2: a down-ramp applied to a constant-amplitude buffer produces a
/// non-increasing sequence of sample magnitudes, starting near full scale and ending at
/// exact silence.
#[test]
fn down_ramp_applied_to_constant_signal_is_monotonically_non_increasing() {
    let pools = AudioBufferPools::new(2, 2);
    // 792 bytes / (2ch * 1 byte/subsample) = 396 mono-frame-pairs of constant 0x7F.
    let data = vec![0x7Fu8; 792];
    let audio = pools.allocate_decoded(&data).unwrap();
    let ramp = Ramp { start: RAMP_MAX, end: RAMP_MIN, direction: Direction::Down };
    let playable = PlayablePcm {
        audio: Some(audio),
        byte_len: data.len(),
        bit_depth: 8,
        num_channels: 2,
        ramp,
        ..Default::default()
    };
    let mut sink = Capture { bytes: vec![] };
    playable.read(&mut sink);

    assert_eq!(sink.bytes.len(), data.len());
    let first = sink.bytes[0];
    assert!(first >= 0x7D, "first sample {first:#x} should be close to the unattenuated 0x7F");
    let last_pair = &sink.bytes[sink.bytes.len() - 2..];
    assert_eq!(last_pair, &[0x00, 0x00], "final frame must reach exact silence");

    let mut prev = u8::MAX;
    for frame in sink.bytes.chunks(2) {
        let sample = frame[0];
        assert!(sample <= prev, "sample magnitude must never increase along a down ramp");
        prev = sample;
    }
}

/// E1: splitting a PCM window conserves both bytes and jiffies across the split, and
/// each half keeps a valid ramp.
#[test]
fn split_conserves_bytes_and_jiffies_and_assigns_consistent_ramps() {
    let pools = AudioBufferPools::new(4, 4);
    let samples = 200u64;
    let data = vec![0u8; (samples * 4) as usize]; // 2ch 16-bit
    let body = PcmBody {
        audio: Some(pools.allocate_decoded(&data).unwrap()),
        byte_len: data.len(),
        ramp: Ramp { start: RAMP_MAX, end: RAMP_MIN, direction: Direction::Down },
        ..Default::default()
    };
    let total_jiffies = body.jiffies().unwrap();
    let (before, after) = body.split(total_jiffies / 2).unwrap();

    assert_eq!(before.byte_len + after.byte_len, body.byte_len, "split must conserve total bytes");
    assert_eq!(
        before.jiffies().unwrap() + after.jiffies().unwrap(),
        total_jiffies,
        "split must conserve total jiffies"
    );
    assert_eq!(before.ramp.start, RAMP_MAX, "the earlier half keeps the original start point");
    assert_eq!(after.ramp.end, RAMP_MIN, "the later half keeps the original end point");
}
