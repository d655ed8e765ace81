//! `MsgReservoir`: a [`MsgQueue`] that additionally tracks buffered jiffies and
//! per-variant counts (`spec.md` §4.3).
//!
//! Counters are updated by a pair of internal hooks run on enqueue (`ProcessMsgIn`) and
//! dequeue (`ProcessMsgOut`) so the reservoir always knows how much playable audio and
//! how many of each bookkeeping message it holds. Most counters are lock-free atomics;
//! the encoded-byte counter is guarded by its own mutex because `MsgAudioEncoded`
//! messages chain bytes across multiple nodes and must be read consistently with the
//! queue's contents (`spec.md` §4.3).

use crate::msg::queue::MsgQueue;
use crate::msg::Msg;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

/// Extension point for a reservoir subclass's custom admission/emission logic (delay
/// accumulation, format-change bookkeeping, …), mirroring the source's
/// `ProcessMsgIn`/`ProcessMsgOut` overrides (`spec.md` §4.3).
pub trait ReservoirHooks: Send {
    fn on_enqueue(&mut self, _msg: &Msg) {}
    fn on_dequeue(&mut self, _msg: &Msg) {}
}

/// A [`ReservoirHooks`] that does nothing extra, for reservoirs that only need the base
/// counters.
#[derive(Default)]
pub struct NoopHooks;
impl ReservoirHooks for NoopHooks {}

#[derive(Default)]
struct Counters {
    jiffies: AtomicI64,
    track: AtomicU64,
    delay: AtomicU64,
    encoded_stream: AtomicU64,
    metatext: AtomicU64,
    decoded_stream: AtomicU64,
    encoded_audio: AtomicU64,
    decoded_audio: AtomicU64,
    encoded_bytes: Mutex<u64>,
}

impl Counters {
    fn apply(&self, msg: &Msg, sign: i64) {
        match msg {
            Msg::Track(_) => self.bump(&self.track, sign),
            Msg::Delay(_) => self.bump(&self.delay, sign),
            Msg::EncodedStream(_) => self.bump(&self.encoded_stream, sign),
            Msg::Metatext(_) => self.bump(&self.metatext, sign),
            Msg::DecodedStream(_) => self.bump(&self.decoded_stream, sign),
            Msg::AudioEncoded(h) => {
                self.bump(&self.encoded_audio, sign);
                let len = h.with(|b| b.len()) as i64;
                let mut bytes = self.encoded_bytes.lock().unwrap();
                *bytes = (*bytes as i64 + sign * len).max(0) as u64;
            }
            Msg::AudioPcm(_) | Msg::AudioDsd(_) | Msg::Silence(_) => {
                self.bump(&self.decoded_audio, sign);
            }
            _ => {}
        }
        if msg.is_audio() {
            let jiffies = msg.jiffies().unwrap_or(0) as i64;
            self.jiffies.fetch_add(sign * jiffies, Ordering::AcqRel);
        }
    }

    fn bump(&self, counter: &AtomicU64, sign: i64) {
        if sign > 0 {
            counter.fetch_add(1, Ordering::AcqRel);
        } else {
            counter.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// A `MsgQueue` plus buffered-jiffy and per-variant counters (`spec.md` §4.3).
pub struct MsgReservoir<H: ReservoirHooks = NoopHooks> {
    queue: MsgQueue,
    counters: Counters,
    hooks: Mutex<H>,
}

impl<H: ReservoirHooks + Default> Default for MsgReservoir<H> {
    fn default() -> Self {
        Self::with_hooks(H::default())
    }
}

impl<H: ReservoirHooks> MsgReservoir<H> {
    pub fn with_hooks(hooks: H) -> Self {
        Self { queue: MsgQueue::new(), counters: Counters::default(), hooks: Mutex::new(hooks) }
    }

    pub fn enqueue(&self, msg: Msg) {
        self.hooks.lock().unwrap().on_enqueue(&msg);
        self.counters.apply(&msg, 1);
        self.queue.enqueue(msg);
    }

    pub fn enqueue_at_head(&self, msg: Msg) {
        self.hooks.lock().unwrap().on_enqueue(&msg);
        self.counters.apply(&msg, 1);
        self.queue.enqueue_at_head(msg);
    }

    pub fn dequeue(&self) -> Msg {
        let msg = self.queue.dequeue();
        self.counters.apply(&msg, -1);
        self.hooks.lock().unwrap().on_dequeue(&msg);
        msg
    }

    pub fn try_dequeue(&self) -> Option<Msg> {
        let msg = self.queue.try_dequeue()?;
        self.counters.apply(&msg, -1);
        self.hooks.lock().unwrap().on_dequeue(&msg);
        Some(msg)
    }

    pub fn clear(&self) {
        self.queue.clear();
        // Drain counters to zero by re-reading: simplest correct approach is to reset
        // every counter directly since the queue itself is now empty.
        self.counters.jiffies.store(0, Ordering::Release);
        self.counters.track.store(0, Ordering::Release);
        self.counters.delay.store(0, Ordering::Release);
        self.counters.encoded_stream.store(0, Ordering::Release);
        self.counters.metatext.store(0, Ordering::Release);
        self.counters.decoded_stream.store(0, Ordering::Release);
        self.counters.encoded_audio.store(0, Ordering::Release);
        self.counters.decoded_audio.store(0, Ordering::Release);
        *self.counters.encoded_bytes.lock().unwrap() = 0;
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Jiffies of buffered audio currently queued (`spec.md` §8 property 3).
    pub fn jiffies(&self) -> u64 {
        self.counters.jiffies.load(Ordering::Acquire).max(0) as u64
    }

    pub fn track_count(&self) -> u64 {
        self.counters.track.load(Ordering::Acquire)
    }
    pub fn delay_count(&self) -> u64 {
        self.counters.delay.load(Ordering::Acquire)
    }
    pub fn encoded_stream_count(&self) -> u64 {
        self.counters.encoded_stream.load(Ordering::Acquire)
    }
    pub fn metatext_count(&self) -> u64 {
        self.counters.metatext.load(Ordering::Acquire)
    }
    pub fn decoded_stream_count(&self) -> u64 {
        self.counters.decoded_stream.load(Ordering::Acquire)
    }
    pub fn encoded_audio_count(&self) -> u64 {
        self.counters.encoded_audio.load(Ordering::Acquire)
    }
    pub fn decoded_audio_count(&self) -> u64 {
        self.counters.decoded_audio.load(Ordering::Acquire)
    }
    pub fn encoded_bytes(&self) -> u64 {
        *self.counters.encoded_bytes.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::pool::Pool;
    use crate::msg::types::*;

    #[test]
    fn jiffies_and_counts_track_enqueue_and_dequeue() {
        let mode_pool: Pool<ModeBody> = Pool::new("mode", 2);
        let track_pool: Pool<TrackBody> = Pool::new("track", 2);
        let delay_pool: Pool<DelayBody> = Pool::new("delay", 2);
        let stream_pool: Pool<DecodedStreamBody> = Pool::new("decoded_stream", 2);
        let silence_pool: Pool<SilenceBody> = Pool::new("silence", 2);
        let halt_pool: Pool<HaltBody> = Pool::new("halt", 2);

        let reservoir: MsgReservoir = MsgReservoir::default();
        reservoir.enqueue(Msg::Mode(mode_pool.allocate(|_| {})));
        reservoir.enqueue(Msg::Track(track_pool.allocate(|_| {})));
        reservoir.enqueue(Msg::Delay(delay_pool.allocate(|b| b.total_jiffies = 441)));
        reservoir.enqueue(Msg::DecodedStream(stream_pool.allocate(|_| {})));
        reservoir.enqueue(Msg::Silence(silence_pool.allocate(|b| b.jiffies = 2 * crate::time::PER_MS)));
        reservoir.enqueue(Msg::Halt(halt_pool.allocate(|_| {})));

        assert_eq!(reservoir.jiffies(), 2 * crate::time::PER_MS);
        assert_eq!(reservoir.delay_count(), 1);
        assert_eq!(reservoir.decoded_stream_count(), 1);
        assert_eq!(reservoir.len(), 6);

        for _ in 0..6 {
            reservoir.dequeue();
        }
        assert_eq!(reservoir.jiffies(), 0);
        assert_eq!(reservoir.delay_count(), 0);
        assert_eq!(reservoir.decoded_stream_count(), 0);
        assert!(reservoir.is_empty());
    }
}
