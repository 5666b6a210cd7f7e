use crate::foundation::core::Resolution;
use crate::foundation::error::{OneoffError, OneoffResult};

/// Canonical chroma-key green, used for foreground frames with no clip.
pub const KEY_GREEN: [u8; 3] = [0, 214, 0];

/// A rendered frame as RGB24 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGB bytes, tightly packed, row-major, top row first.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(size: Resolution, data: Vec<u8>) -> OneoffResult<Self> {
        let expected = size.pixel_count() * 3;
        if data.len() != expected {
            return Err(OneoffError::validation(format!(
                "frame data has {} bytes, expected {expected} for {}x{}",
                data.len(),
                size.width,
                size.height
            )));
        }
        Ok(Self {
            width: size.width,
            height: size.height,
            data,
        })
    }

    /// Every pixel set to `rgb`.
    pub fn solid(size: Resolution, rgb: [u8; 3]) -> Self {
        Self {
            width: size.width,
            height: size.height,
            data: rgb.repeat(size.pixel_count()),
        }
    }

    pub fn black(size: Resolution) -> Self {
        Self::solid(size, [0, 0, 0])
    }

    pub fn size(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(3)
    }

    pub fn is_solid(&self, rgb: [u8; 3]) -> bool {
        self.pixels().all(|p| p == rgb)
    }
}
