//! Offscreen wgpu rendering: device context, linked programs, targets and texture uploads.

pub mod context;
pub mod program;
pub mod target;
pub mod texture;

pub use context::GpuContext;
pub use program::{ChannelInput, GpuProgram};
pub use target::{Readback, RenderTarget};
pub use texture::GpuTexture;
