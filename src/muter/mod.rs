//! `MuterVolume`: cooperative volume fades synchronised with asynchronous `Mute()`/
//! `Unmute()` requests and pipeline halts (`spec.md` §4.7).
//!
//! The state machine and the `Mute()` blocking contract are the whole point of this
//! stage: a control thread calls `Mute()` and must not proceed (reconfigure volume,
//! change streams, tear down) until it is certain no further audible audio will reach
//! the sink. That means `Mute()` cannot simply flip a flag — it has to wait for the
//! audio thread pulling messages through this stage to actually drive the stepwise fade
//! to completion and drain `kJiffiesUntilMute` more jiffies after that.

use crate::interfaces::{StepResult, VolumeMuterStepped};
use crate::msg::factory::MsgFactory;
use crate::msg::Msg;
use std::sync::{Arc, Condvar, Mutex};

/// `spec.md` §4.7's five-state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuterState {
    Running,
    MutingRamp,
    MutingWait,
    Muted,
    UnmutingRamp,
}

struct Inner {
    state: MuterState,
    /// `true` once a `Halt` has been acknowledged downstream; while halted, `Mute`/
    /// `Unmute` transition immediately rather than stepping (`spec.md` §4.7).
    halted: bool,
    /// Whether `Mute()` was called before `Start()` injected the driver.
    mute_pending_before_start: bool,
    driver: Option<Box<dyn VolumeMuterStepped>>,
    /// Countdown of `kJiffiesUntilMute` once the stepwise fade reports `Complete`
    /// (`MutingWait`, `spec.md` §4.7).
    drain_remaining_jiffies: u64,
    drain_total_jiffies: u64,
}

/// The muting stage (`spec.md` §4.7). Cheaply `Clone`-able (an `Arc` around shared
/// state) so a control thread and the audio-pulling thread can each hold a handle.
#[derive(Clone)]
pub struct MuterVolume {
    inner: Arc<Mutex<Inner>>,
    waiter: Arc<Condvar>,
}

impl MuterVolume {
    pub fn new(jiffies_until_mute: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: MuterState::Running,
                halted: false,
                mute_pending_before_start: false,
                driver: None,
                drain_remaining_jiffies: 0,
                drain_total_jiffies: jiffies_until_mute,
            })),
            waiter: Arc::new(Condvar::new()),
        }
    }

    pub fn state(&self) -> MuterState {
        self.inner.lock().unwrap().state
    }

    /// One-time injection of the stepwise volume driver (`spec.md` §4.7 `Start`). If
    /// `Mute()` was called before `Start`, the driver is set straight to its muted
    /// hardware state rather than stepping through a fade that has no audio to drive
    /// it.
    pub fn start(&self, mut driver: Box<dyn VolumeMuterStepped>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.mute_pending_before_start {
            driver.set_muted();
            inner.state = MuterState::Muted;
        }
        inner.driver = Some(driver);
    }

    /// Synchronous mute request (`spec.md` §4.7 `Mute`). Blocks until the state reaches
    /// `Muted`, or returns early if a concurrent `Unmute()` cancels the fade — the
    /// caller's post-condition is "muted, or subsequently unmuted before wake"
    /// (`spec.md` §4.7 Cancellation).
    pub fn mute(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            MuterState::Muted => return,
            MuterState::MutingRamp | MuterState::MutingWait => {
                // Re-entrant: already on the way to Muted, just wait for it.
            }
            MuterState::Running | MuterState::UnmutingRamp => {
                if inner.driver.is_none() {
                    inner.mute_pending_before_start = true;
                    return;
                }
                if inner.halted {
                    inner.driver.as_mut().unwrap().set_muted();
                    inner.state = MuterState::Muted;
                    self.waiter.notify_all();
                    return;
                }
                let result = inner.driver.as_mut().unwrap().begin_mute();
                if result == StepResult::Complete {
                    inner.state = MuterState::MutingWait;
                    inner.drain_remaining_jiffies = inner.drain_total_jiffies;
                } else {
                    inner.state = MuterState::MutingRamp;
                }
            }
        }
        while !matches!(inner.state, MuterState::Muted | MuterState::Running | MuterState::UnmutingRamp) {
            inner = self.waiter.wait(inner).unwrap();
        }
    }

    /// Requests an unmute (`spec.md` §4.7 `Unmute`). Non-blocking; cancels any pending
    /// `Mute()` wait.
    pub fn unmute(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            MuterState::Running => {}
            MuterState::UnmutingRamp => {}
            MuterState::MutingRamp | MuterState::MutingWait | MuterState::Muted => {
                if inner.halted || inner.driver.is_none() {
                    if let Some(driver) = inner.driver.as_mut() {
                        driver.set_unmuted();
                    }
                    inner.state = MuterState::Running;
                } else {
                    let result = inner.driver.as_mut().unwrap().begin_unmute();
                    inner.state = if result == StepResult::Complete {
                        MuterState::Running
                    } else {
                        MuterState::UnmutingRamp
                    };
                }
                inner.mute_pending_before_start = false;
                self.waiter.notify_all();
            }
        }
    }

    /// Advances the stepwise fade by `jiffies` of audio that just passed through this
    /// stage (`spec.md` §4.7, per-message behaviour on `Pull`).
    fn step(&self, jiffies: u64) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            MuterState::MutingRamp => {
                let result = inner.driver.as_mut().map(|d| d.step_mute(jiffies)).unwrap_or(StepResult::Complete);
                if result == StepResult::Complete {
                    inner.state = MuterState::MutingWait;
                    inner.drain_remaining_jiffies = inner.drain_total_jiffies;
                }
            }
            MuterState::MutingWait => {
                inner.drain_remaining_jiffies = inner.drain_remaining_jiffies.saturating_sub(jiffies);
                if inner.drain_remaining_jiffies == 0 {
                    inner.state = MuterState::Muted;
                    self.waiter.notify_all();
                }
            }
            MuterState::UnmutingRamp => {
                let result = inner.driver.as_mut().map(|d| d.step_unmute(jiffies)).unwrap_or(StepResult::Complete);
                if result == StepResult::Complete {
                    inner.state = MuterState::Running;
                    self.waiter.notify_all();
                }
            }
            MuterState::Running | MuterState::Muted => {}
        }
    }

    /// Entry into the halted sub-state once a `Halt` this stage emitted has been
    /// acknowledged downstream (`spec.md` §4.7). While halted, `Mute`/`Unmute` move
    /// straight to their target state because there is no audio flowing to drive a
    /// stepwise fade.
    fn on_halt_acknowledged(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.halted = true;
    }

    fn clear_halted(&self) {
        self.inner.lock().unwrap().halted = false;
    }

    /// Processes one message pulled from upstream, returning the message to pass
    /// downstream (`spec.md` §4.7 per-message behaviour). `Halt` is replaced with a
    /// fresh `Halt` carrying a completion callback that flips this stage into its
    /// halted sub-state; every audio/silence message drives [`step`](Self::step).
    pub fn pull(&self, msg: Msg, factory: &MsgFactory) -> Msg {
        match &msg {
            Msg::Halt(h) => {
                let id = h.with(|b| b.id);
                let muter = self.clone();
                factory.create_halt(id, Some(move || muter.on_halt_acknowledged()))
            }
            Msg::Mode(_) | Msg::Track(_) | Msg::DecodedStream(_) => {
                self.clear_halted();
                msg
            }
            _ => {
                if let Ok(jiffies) = msg.jiffies() {
                    if jiffies > 0 {
                        self.step(jiffies);
                    }
                }
                msg
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FakeDriver {
        mute_steps_remaining: u32,
        unmute_steps_remaining: u32,
        muted_calls: Arc<AtomicU32>,
    }

    impl VolumeMuterStepped for FakeDriver {
        fn begin_mute(&mut self) -> StepResult {
            if self.mute_steps_remaining == 0 { StepResult::Complete } else { StepResult::InProgress }
        }
        fn step_mute(&mut self, _jiffies: u64) -> StepResult {
            self.mute_steps_remaining = self.mute_steps_remaining.saturating_sub(1);
            if self.mute_steps_remaining == 0 { StepResult::Complete } else { StepResult::InProgress }
        }
        fn begin_unmute(&mut self) -> StepResult {
            if self.unmute_steps_remaining == 0 { StepResult::Complete } else { StepResult::InProgress }
        }
        fn step_unmute(&mut self, _jiffies: u64) -> StepResult {
            self.unmute_steps_remaining = self.unmute_steps_remaining.saturating_sub(1);
            if self.unmute_steps_remaining == 0 { StepResult::Complete } else { StepResult::InProgress }
        }
        fn set_muted(&mut self) {
            self.muted_calls.fetch_add(1, Ordering::SeqCst);
        }
        fn set_unmuted(&mut self) {}
    }

    #[test]
    fn mute_before_start_goes_straight_to_muted_hardware_state() {
        let muter = MuterVolume::new(1000);
        muter.mute();
        let calls = Arc::new(AtomicU32::new(0));
        muter.start(Box::new(FakeDriver { mute_steps_remaining: 5, unmute_steps_remaining: 5, muted_calls: calls.clone() }));
        assert_eq!(muter.state(), MuterState::Muted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mute_blocks_until_fade_and_drain_complete() {
        let jiffies_until_mute = 1000u64;
        let muter = MuterVolume::new(jiffies_until_mute);
        let calls = Arc::new(AtomicU32::new(0));
        muter.start(Box::new(FakeDriver { mute_steps_remaining: 2, unmute_steps_remaining: 2, muted_calls: calls }));

        let muter2 = muter.clone();
        let handle = std::thread::spawn(move || muter2.mute());
        std::thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished(), "Mute() should still be blocked: no audio has driven the fade yet");

        muter.step(100); // first of two steps the fake driver needs to complete
        muter.step(100); // second step completes the fade -> MutingWait
        assert!(!handle.is_finished());
        muter.step(jiffies_until_mute); // drains past kJiffiesUntilMute -> Muted
        handle.join().unwrap();
        assert_eq!(muter.state(), MuterState::Muted);
    }

    #[test]
    fn unmute_cancels_a_pending_mute_and_wakes_the_waiter() {
        let muter = MuterVolume::new(1000);
        let calls = Arc::new(AtomicU32::new(0));
        muter.start(Box::new(FakeDriver { mute_steps_remaining: 100, unmute_steps_remaining: 1, muted_calls: calls }));

        let muter2 = muter.clone();
        let handle = std::thread::spawn(move || muter2.mute());
        std::thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        muter.unmute();
        handle.join().unwrap();
        assert_ne!(muter.state(), MuterState::Muted);
    }

    #[test]
    fn halted_mute_and_unmute_transition_immediately() {
        let muter = MuterVolume::new(1000);
        let calls = Arc::new(AtomicU32::new(0));
        muter.start(Box::new(FakeDriver { mute_steps_remaining: 100, unmute_steps_remaining: 100, muted_calls: calls.clone() }));
        muter.on_halt_acknowledged();
        muter.mute();
        assert_eq!(muter.state(), MuterState::Muted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        muter.unmute();
        assert_eq!(muter.state(), MuterState::Running);
    }
}
