//! Timeline engine: manifests, sequential-to-overlapping conversion and per-frame dispatch.

pub mod auto;
pub mod convert;
pub mod dispatch;
pub mod manifest;

pub use convert::{OverlapTimeline, SegmentPair};
pub use dispatch::{FrameState, active_clip};
pub use manifest::{ElementKind, Manifest, TimelineElement};
