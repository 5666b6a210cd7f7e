use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;

use crate::foundation::core::Resolution;
use crate::foundation::error::{OneoffError, OneoffResult};
use crate::gpu::program::ChannelInput;
use crate::gpu::{GpuContext, GpuProgram, RenderTarget};
use crate::shader::metadata::TransitionRecord;
use crate::shader::source::{ChannelKind, UniformBlock, UniformValue};

/// Cross-fade used when a transition has no compiled program.
pub const CROSSFADE_GLSL: &str = "#version 330
uniform sampler2D from;
uniform sampler2D to;
uniform float progress;
uniform vec2 resolution;
out vec4 fragColor;
void main() {
    vec2 uv = gl_FragCoord.xy / resolution;
    fragColor = mix(texture(from, uv), texture(to, uv), progress);
}
";

/// A compiled transition with its metadata parameters already applied.
#[derive(Debug)]
struct TransitionProgram {
    program: GpuProgram,
    block: UniformBlock,
}

impl TransitionProgram {
    fn new(program: GpuProgram, record: Option<&TransitionRecord>) -> Self {
        let mut block = program.uniform_block();
        if let Some(record) = record {
            for (name, value) in &record.params {
                if !block.set(program.interface(), name, *value) {
                    tracing::debug!(transition = %program.name(), param = %name, "parameter not used by program");
                }
            }
        }
        Self { program, block }
    }
}

/// Blends two rendered shaders with a transition program.
#[derive(Debug)]
pub struct TransitionCompositor {
    programs: BTreeMap<String, TransitionProgram>,
    crossfade: TransitionProgram,
}

impl TransitionCompositor {
    pub fn new(ctx: &GpuContext) -> OneoffResult<Self> {
        let crossfade = GpuProgram::compile(ctx, "crossfade", CROSSFADE_GLSL)?;
        Ok(Self {
            programs: BTreeMap::new(),
            crossfade: TransitionProgram::new(crossfade, None),
        })
    }

    /// Compile and register a transition program under `name`.
    pub fn add(
        &mut self,
        ctx: &GpuContext,
        name: &str,
        source: &str,
        record: Option<&TransitionRecord>,
    ) -> OneoffResult<()> {
        let program = GpuProgram::compile(ctx, name, source)?;
        for required in ["from", "to"] {
            if program.interface().channel(required).is_none() {
                tracing::warn!(transition = %name, channel = required, "transition does not sample this input");
            }
        }
        self.programs
            .insert(name.to_string(), TransitionProgram::new(program, record));
        Ok(())
    }

    /// Read and register a transition file; the file name is its name.
    pub fn add_file(
        &mut self,
        ctx: &GpuContext,
        path: &Path,
        record: Option<&TransitionRecord>,
    ) -> OneoffResult<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| OneoffError::validation(format!("bad transition path '{}'", path.display())))?
            .to_string();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("read transition '{}'", path.display()))?;
        self.add(ctx, &name, &source, record)?;
        Ok(name)
    }

    /// Names of the compiled transitions, sorted.
    pub fn names(&self) -> Vec<String> {
        self.programs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Registered name `name` resolves to: exact, then with `.glsl` stripped or appended.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let stripped = name.strip_suffix(".glsl").unwrap_or(name);
        [name.to_string(), stripped.to_string(), format!("{stripped}.glsl")]
            .into_iter()
            .find_map(|candidate| self.programs.get_key_value(&candidate))
            .map(|(k, _)| k.as_str())
    }

    /// Draw the blend of `from` and `to` at `progress` into `target`.
    ///
    /// Unknown or missing names use the cross-fade.
    pub fn composite(
        &mut self,
        ctx: &GpuContext,
        name: Option<&str>,
        from: &RenderTarget,
        to: &RenderTarget,
        progress: f32,
        target: &RenderTarget,
    ) {
        let key = name.and_then(|n| self.resolve(n)).map(str::to_string);
        if key.is_none()
            && let Some(n) = name
        {
            tracing::debug!(transition = %n, "no compiled transition; using cross-fade");
        }
        let tp = match key.and_then(|k| self.programs.get_mut(&k)) {
            Some(tp) => tp,
            None => &mut self.crossfade,
        };
        blend(ctx, tp, from, to, progress, target.size(), target);
    }
}

fn blend(
    ctx: &GpuContext,
    tp: &mut TransitionProgram,
    from: &RenderTarget,
    to: &RenderTarget,
    progress: f32,
    resolution: Resolution,
    target: &RenderTarget,
) {
    let iface = tp.program.interface();
    tp.block
        .set(iface, "progress", UniformValue::Float(progress.clamp(0.0, 1.0)));
    tp.block
        .set(iface, "resolution", UniformValue::Vec2(resolution.as_f32()));
    let sampler = ctx.clamp_sampler();
    tp.program.draw(
        ctx,
        target,
        &tp.block,
        &[
            ("from", target_input(from, sampler)),
            ("to", target_input(to, sampler)),
        ],
    );
}

fn target_input<'a>(target: &'a RenderTarget, sampler: &'a wgpu::Sampler) -> ChannelInput<'a> {
    ChannelInput {
        view: target.view(),
        sampler,
        kind: ChannelKind::D2,
    }
}
