//! `PipelineElement`: a stage's statically declared set of handled message kinds
//! (`spec.md` §4.2).
//!
//! A stage constructs one of these with the [`MsgKind`] bits it promises to process.
//! Any message outside that mask reaching the stage's [`crate::msg::visitor::MsgProcessor`]
//! is a programmer error — the default visitor methods already `unreachable!()`, and
//! [`PipelineElement::check`] lets a stage assert *before* dispatch for a clearer panic
//! message, mirroring the source's mask check ahead of `ProcessMsg`.

use crate::msg::{Msg, MsgKind};

/// A bitmask over [`MsgKind`] built from the kinds a stage supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MsgMask(u32);

impl MsgMask {
    pub const fn none() -> Self {
        Self(0)
    }

    pub const fn of(kinds: &[MsgKind]) -> Self {
        let mut mask = 0u32;
        let mut i = 0;
        while i < kinds.len() {
            mask |= kinds[i] as u32;
            i += 1;
        }
        Self(mask)
    }

    pub fn with(mut self, kind: MsgKind) -> Self {
        self.0 |= kind as u32;
        self
    }

    pub fn contains(&self, kind: MsgKind) -> bool {
        self.0 & (kind as u32) != 0
    }
}

/// Declares at construction which [`MsgKind`]s a stage handles (`spec.md` §4.2).
pub struct PipelineElement {
    name: &'static str,
    mask: MsgMask,
}

impl PipelineElement {
    pub fn new(name: &'static str, mask: MsgMask) -> Self {
        Self { name, mask }
    }

    /// Asserts `msg`'s kind is in this stage's declared mask.
    pub fn check(&self, msg: &Msg) {
        assert!(
            self.mask.contains(msg.kind()),
            "{} received unsupported message kind {:?}",
            self.name,
            msg.kind()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::pool::Pool;
    use crate::msg::types::QuitBody;

    #[test]
    fn mask_contains_only_declared_kinds() {
        let mask = MsgMask::of(&[MsgKind::Quit, MsgKind::Wait]);
        assert!(mask.contains(MsgKind::Quit));
        assert!(mask.contains(MsgKind::Wait));
        assert!(!mask.contains(MsgKind::Halt));
    }

    #[test]
    #[should_panic(expected = "unsupported message kind")]
    fn check_panics_on_unsupported_kind() {
        let element = PipelineElement::new("test-stage", MsgMask::of(&[MsgKind::Wait]));
        let pool: Pool<QuitBody> = Pool::new("quit", 1);
        let msg = Msg::Quit(pool.allocate(|_| {}));
        element.check(&msg);
    }
}
