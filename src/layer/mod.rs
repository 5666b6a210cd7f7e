//! Foreground video layer and the chroma-key compositor that lays it over the shader layer.

pub mod chroma;
pub mod composite;
pub mod foreground;
pub mod video;

pub use composite::key_over;
pub use foreground::ForegroundLayer;
