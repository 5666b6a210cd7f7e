//! Frame rendering: shader passes, transitions and readback into RGB24 frames.

pub mod frame;
pub mod shader;
pub mod transition;

pub use frame::{Frame, KEY_GREEN};
pub use shader::{CompiledShader, FrameInputs};
pub use transition::TransitionCompositor;

use crate::foundation::core::Resolution;
use crate::foundation::error::OneoffResult;
use crate::gpu::{GpuContext, Readback, RenderTarget};

/// Output target plus readback staging for one job.
#[derive(Debug)]
pub struct FrameRenderer {
    size: Resolution,
    output: RenderTarget,
    readback: Readback,
}

impl FrameRenderer {
    pub fn new(ctx: &GpuContext, size: Resolution) -> OneoffResult<Self> {
        Ok(Self {
            size,
            output: RenderTarget::new(ctx, size, "oneoff_output"),
            readback: Readback::new(ctx, size)?,
        })
    }

    pub fn size(&self) -> Resolution {
        self.size
    }

    /// Render one shader plainly.
    pub fn render_shader(
        &self,
        ctx: &GpuContext,
        shader: &mut CompiledShader,
        inputs: &FrameInputs<'_>,
    ) -> OneoffResult<Frame> {
        ctx.scoped("render shader frame", |_| {
            shader.render(ctx, inputs, &self.output);
        })?;
        self.read(ctx)
    }

    /// Render `from` and `to` into scratch targets and blend them.
    ///
    /// `to == None` means both sides are the same shader, which renders once so its feedback
    /// buffers advance a single frame. Scratch targets are released when this returns.
    #[allow(clippy::too_many_arguments)]
    pub fn render_transition(
        &self,
        ctx: &GpuContext,
        from: &mut CompiledShader,
        to: Option<&mut CompiledShader>,
        compositor: &mut TransitionCompositor,
        transition: Option<&str>,
        progress: f32,
        inputs: &FrameInputs<'_>,
    ) -> OneoffResult<Frame> {
        let scratch_from = RenderTarget::new(ctx, self.size, "oneoff_transition_from");
        let scratch_to = RenderTarget::new(ctx, self.size, "oneoff_transition_to");
        ctx.scoped("render transition frame", |_| {
            from.render(ctx, inputs, &scratch_from);
            let to_target = match to {
                Some(to) => {
                    to.render(ctx, inputs, &scratch_to);
                    &scratch_to
                }
                None => &scratch_from,
            };
            compositor.composite(
                ctx,
                transition,
                &scratch_from,
                to_target,
                progress,
                &self.output,
            );
        })?;
        self.read(ctx)
    }

    fn read(&self, ctx: &GpuContext) -> OneoffResult<Frame> {
        let data = self.readback.read_rgb24(ctx, &self.output)?;
        Frame::new(self.size, data)
    }
}
