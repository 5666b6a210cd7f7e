//! Audio analysis and the per-frame audio texture.

pub mod analysis;
pub mod texture;
