//! One-shot completion callbacks carried by `MsgDrain`/`MsgHalt`.
//!
//! The source stores a raw `Functor` invoked at most once and asserts if a pooled
//! message carrying an unfired callback is ever cleared and recycled. `OneShotCallback`
//! gives the same contract in safe Rust: a boxed `FnOnce` plus a flag tracking whether
//! it has fired, checked on `clear`.

use std::fmt;

type Thunk = Box<dyn FnOnce() + Send + 'static>;

/// A callback that must be invoked at most once and, if set, must be invoked before the
/// owning message is cleared.
#[derive(Default)]
pub struct OneShotCallback {
    thunk: Option<Thunk>,
    fired: bool,
}

impl OneShotCallback {
    /// Sets the callback to be run on the next (and only) [`fire`](Self::fire).
    pub fn set(&mut self, thunk: impl FnOnce() + Send + 'static) {
        debug_assert!(self.thunk.is_none(), "callback already set");
        self.thunk = Some(Box::new(thunk));
        self.fired = false;
    }

    /// `true` if a callback is set and has not yet fired.
    pub fn is_pending(&self) -> bool {
        self.thunk.is_some() && !self.fired
    }

    /// Runs the callback exactly once. A second call is a no-op.
    pub fn fire(&mut self) {
        if let Some(thunk) = self.thunk.take() {
            thunk();
            self.fired = true;
        }
    }

    /// Asserts no callback is pending — called from `Clearable::clear` so a message
    /// never silently drops an un-run completion callback back into the pool.
    pub fn assert_resolved_or_absent(&self) {
        assert!(!self.is_pending(), "message recycled with a pending callback still unfired");
    }
}

impl fmt::Debug for OneShotCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneShotCallback")
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn fire_runs_thunk_exactly_once() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let mut cb = OneShotCallback::default();
        cb.set(move || ran2.store(true, Ordering::SeqCst));
        assert!(cb.is_pending());
        cb.fire();
        assert!(ran.load(Ordering::SeqCst));
        assert!(!cb.is_pending());
        cb.fire(); // no-op, no panic
    }

    #[test]
    #[should_panic(expected = "pending callback")]
    fn assert_resolved_panics_if_never_fired() {
        let mut cb = OneShotCallback::default();
        cb.set(|| {});
        cb.assert_resolved_or_absent();
    }
}
