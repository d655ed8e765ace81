//! MPEG-4 (ISO BMFF) container demuxer (`spec.md` §4.8).
//!
//! Box recursion is written as explicit Rust functions per nesting level
//! (`boxes_container`) rather than a runtime, fourcc-keyed processor registry: the set
//! of valid children at each level of an MP4 box tree is fixed, so the recursion is
//! just as fixed. Leaf, fixed-layout boxes implement [`processor::BoxProcessor`]
//! (`boxes_simple`); the demuxer itself lives in `demux`.

pub mod boxes_container;
pub mod boxes_simple;
pub mod cache;
pub mod demux;
pub mod fourcc;
pub mod info;
pub mod outofband;
pub mod processor;
pub mod senc;
pub mod tables;

pub use demux::Mpeg4Container;
pub use fourcc::FourCc;
