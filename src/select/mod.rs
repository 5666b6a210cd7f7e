//! Shader and transition selection policies.

pub mod shader;
pub mod transition;

pub use shader::ShaderCycler;
pub use transition::TransitionCycler;
