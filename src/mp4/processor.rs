//! `BoxProcessor`: the per-box-type contract the switcher drives (`spec.md` §4.8.1).
//!
//! `process` runs to completion in a single call rather than yielding `None` while
//! waiting on more bytes: this crate's [`super::cache::Mpeg4Cache`] is a blocking
//! abstraction (`accumulate` waits for/errors on missing bytes rather than returning a
//! partial read), so there is no partially-read state for a leaf box to resume from.
//! Container boxes recurse through [`super::switcher::BoxSwitcher`] instead of
//! implementing this trait themselves.

use crate::error::Result;
use crate::mp4::cache::Mpeg4Cache;
use crate::mp4::fourcc::FourCc;
use crate::msg::Msg;

pub trait BoxProcessor: Send {
    /// Whether this processor handles box type `id`.
    fn recognise(&self, id: FourCc) -> bool;

    /// Consumes exactly `payload_size` bytes from `cache` and parses them.
    fn set(&mut self, cache: &mut dyn Mpeg4Cache, payload_size: u64) -> Result<()>;

    /// Pass-through output, if any (`spec.md` §4.8.1: "any message the cache emits
    /// that isn't audio-encoded is returned unchanged").
    fn process(&mut self) -> Result<Option<Msg>> {
        Ok(None)
    }

    fn complete(&self) -> bool {
        true
    }

    fn reset(&mut self) {}
}
