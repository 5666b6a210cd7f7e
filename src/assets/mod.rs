//! Boundary with files on disk: external media tools and image decoding.

pub mod decode;
pub mod media;
