//! Fragment programs: source adaptation, metadata and resource discovery.

pub mod metadata;
pub mod resources;
pub mod source;
