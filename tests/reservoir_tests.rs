//! `MsgReservoir`'s buffered-jiffy invariant and per-variant counters.
//!
//! Mirrors the canonical enqueue sequence: mode announcement, track announcement, a
//! 10ms delay, a decoded-stream format announcement, a span of silence, a span of PCM
//! audio, then a halt. At every point the reservoir's jiffy total must equal the sum of
//! jiffies carried by the audio messages still queued, and per-variant counts must
//! track enqueue/dequeue exactly.

use pipeline_core::audio::ramp::Ramp;
use pipeline_core::config::PipelineConfig;
use pipeline_core::msg::factory::MsgFactory;
use pipeline_core::msg::reservoir::MsgReservoir;
use pipeline_core::msg::Msg;
use pipeline_core::time;

#[test]
fn jiffies_and_counters_match_the_canonical_enqueue_sequence() {
    let factory = MsgFactory::new(&PipelineConfig::default());
    let reservoir: MsgReservoir = MsgReservoir::default();

    let jiffies_per_sample = time::per_sample(44_100).unwrap();
    let silence_jiffies = 50 * jiffies_per_sample;
    let pcm_samples = 100u64;
    let pcm_jiffies = pcm_samples * jiffies_per_sample;
    let pcm_bytes = vec![0u8; (pcm_samples * 2 * 2) as usize]; // 2ch, 16-bit

    reservoir.enqueue(factory.create_mode("Spotify".into(), Default::default(), false));
    reservoir.enqueue(factory.create_track("uri".into(), "meta".into(), 1, true));
    reservoir.enqueue(factory.create_delay(10 * time::PER_MS, 10 * time::PER_MS));
    reservoir.enqueue(factory.create_decoded_stream(Default::default()));
    reservoir.enqueue(factory.create_silence(silence_jiffies, 44_100, 2, 16));
    reservoir.enqueue(factory.create_audio_pcm(&pcm_bytes, 44_100, 2, 16, 0, Ramp::none()).unwrap());
    reservoir.enqueue(factory.create_halt(1, None::<fn()>));

    assert_eq!(reservoir.jiffies(), silence_jiffies + pcm_jiffies, "silence span + pcm span queued");
    assert_eq!(reservoir.delay_count(), 1);
    assert_eq!(reservoir.decoded_stream_count(), 1);
    assert_eq!(reservoir.track_count(), 1);
    assert_eq!(reservoir.len(), 7);

    let mut expected_variants = vec![
        "mode",
        "track",
        "delay",
        "decoded_stream",
        "silence",
        "audio_pcm",
        "halt",
    ]
    .into_iter();

    while let Some(msg) = reservoir.try_dequeue() {
        let label = match &msg {
            Msg::Mode(_) => "mode",
            Msg::Track(_) => "track",
            Msg::Delay(_) => "delay",
            Msg::DecodedStream(_) => "decoded_stream",
            Msg::Silence(_) => "silence",
            Msg::AudioPcm(_) => "audio_pcm",
            Msg::Halt(_) => "halt",
            _ => "unexpected",
        };
        assert_eq!(Some(label), expected_variants.next());
        match label {
            "delay" => assert_eq!(reservoir.delay_count(), 0, "counter must decrement as soon as the matching variant is dequeued"),
            "decoded_stream" => assert_eq!(reservoir.decoded_stream_count(), 0),
            "track" => assert_eq!(reservoir.track_count(), 0),
            _ => {}
        }
    }

    assert_eq!(reservoir.jiffies(), 0);
    assert!(reservoir.is_empty());
}
