use std::path::Path;

use anyhow::Context as _;

use crate::assets::decode::{load_cubemap, load_texture_image};
use crate::foundation::core::Resolution;
use crate::foundation::error::{OneoffError, OneoffResult};
use crate::gpu::program::ChannelInput;
use crate::gpu::texture::{GpuTexture, upload_cubemap, upload_image};
use crate::gpu::{GpuContext, GpuProgram, RenderTarget};
use crate::shader::metadata::{FilterMode, ShaderMetadata, WrapMode};
use crate::shader::resources::{
    BufferPass, ResourceDirs, TextureSource, buffer_passes, texture_specs,
};
use crate::shader::source::{ChannelKind, UniformBlock, UniformValue};

/// Channel carrying the audio texture in every pass.
pub const AUDIO_CHANNEL: &str = "iChannel0";

/// Name of sampler channel `i`.
pub fn channel_name(i: usize) -> String {
    format!("iChannel{i}")
}

/// Per-frame values shared by every pass of a frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameInputs<'a> {
    /// Seconds since the start of the render.
    pub time: f32,
    pub resolution: Resolution,
    pub audio: &'a GpuTexture,
}

impl FrameInputs<'_> {
    fn write(&self, program: &GpuProgram, block: &mut UniformBlock) {
        let iface = program.interface();
        block.set(iface, "iTime", UniformValue::Float(self.time));
        block.set(iface, "iResolution", UniformValue::Vec2(self.resolution.as_f32()));
    }

    fn audio_input<'s>(&'s self, ctx: &'s GpuContext) -> ChannelInput<'s> {
        ChannelInput {
            view: self.audio.view(),
            sampler: ctx.clamp_sampler(),
            kind: self.audio.kind(),
        }
    }
}

/// One feedback pass with its ping-pong pair. `previous` holds last frame's output.
#[derive(Debug)]
pub struct BufferState {
    id: char,
    program: GpuProgram,
    block: UniformBlock,
    current: RenderTarget,
    previous: RenderTarget,
}

impl BufferState {
    fn new(ctx: &GpuContext, id: char, program: GpuProgram, size: Resolution) -> Self {
        let current = RenderTarget::new(ctx, size, "oneoff_buffer_current");
        let previous = RenderTarget::new(ctx, size, "oneoff_buffer_previous");
        current.clear(ctx);
        previous.clear(ctx);
        Self {
            id,
            block: program.uniform_block(),
            program,
            current,
            previous,
        }
    }

    pub fn id(&self) -> char {
        self.id
    }

    fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
    }
}

/// An auxiliary texture bound to a named channel.
#[derive(Debug)]
struct BoundTexture {
    channel: String,
    texture: GpuTexture,
    filter: FilterMode,
    wrap: WrapMode,
    mipmap: bool,
}

/// A main program with its feedback buffers and textures. Lives for one job.
#[derive(Debug)]
pub struct CompiledShader {
    name: String,
    main: GpuProgram,
    block: UniformBlock,
    buffers: Vec<BufferState>,
    textures: Vec<BoundTexture>,
}

impl CompiledShader {
    /// Compile a bare program with no buffers or textures.
    pub fn from_source(ctx: &GpuContext, name: &str, source: &str) -> OneoffResult<Self> {
        let main = GpuProgram::compile(ctx, name, source)?;
        Ok(Self {
            name: name.to_string(),
            block: main.uniform_block(),
            main,
            buffers: Vec::new(),
            textures: Vec::new(),
        })
    }

    /// Compile a shader file with the buffers and textures its metadata declares.
    ///
    /// A buffer that fails to compile fails the whole shader. A texture that fails to load
    /// leaves its channel unbound.
    pub fn load(
        ctx: &GpuContext,
        path: &Path,
        meta: Option<&ShaderMetadata>,
        dirs: &ResourceDirs,
        size: Resolution,
    ) -> OneoffResult<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("shader")
            .to_string();
        let source = read_source(path)?;
        let mut shader = Self::from_source(ctx, &name, &source)?;

        for BufferPass { id, path } in buffer_passes(path, meta) {
            let source = read_source(&path)?;
            let program = GpuProgram::compile(ctx, &format!("{name} buffer {id}"), &source)?;
            tracing::info!(shader = %name, buffer = %id, "compiled buffer pass");
            shader.buffers.push(BufferState::new(ctx, id, program, size));
        }

        let buffer_channels: Vec<String> =
            (0..shader.buffers.len()).map(|i| channel_name(i + 1)).collect();
        for spec in texture_specs(meta, dirs) {
            if spec.channel == AUDIO_CHANNEL || buffer_channels.contains(&spec.channel) {
                tracing::warn!(
                    shader = %name,
                    channel = %spec.channel,
                    "channel already used by audio or a buffer; texture skipped"
                );
                continue;
            }
            let loaded = match &spec.source {
                TextureSource::Image {
                    path,
                    filter,
                    wrap,
                    mipmap,
                } => load_texture_image(path, *mipmap)
                    .and_then(|img| upload_image(ctx, &img, &spec.channel))
                    .map(|texture| BoundTexture {
                        channel: spec.channel.clone(),
                        texture,
                        filter: *filter,
                        wrap: *wrap,
                        mipmap: *mipmap,
                    }),
                TextureSource::Cubemap {
                    dir,
                    basename,
                    filter,
                    mipmap,
                } => load_cubemap(dir, basename, *mipmap)
                    .and_then(|cube| upload_cubemap(ctx, &cube, &spec.channel))
                    .map(|texture| BoundTexture {
                        channel: spec.channel.clone(),
                        texture,
                        filter: *filter,
                        wrap: WrapMode::Clamp,
                        mipmap: *mipmap,
                    }),
            };
            match loaded {
                Ok(tex) => {
                    tracing::info!(shader = %name, channel = %tex.channel, "bound texture");
                    shader.textures.push(tex);
                }
                Err(err) => {
                    tracing::warn!(shader = %name, channel = %spec.channel, error = %err, "texture not loaded; channel left unbound");
                }
            }
        }
        Ok(shader)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffers(&self) -> &[BufferState] {
        &self.buffers
    }

    /// Render one frame into `target`: buffer passes A..D, then the main pass, then swap.
    pub fn render(&mut self, ctx: &GpuContext, inputs: &FrameInputs<'_>, target: &RenderTarget) {
        let audio = inputs.audio_input(ctx);
        let clamp = ctx.clamp_sampler();

        for buf in &mut self.buffers {
            inputs.write(&buf.program, &mut buf.block);
            let previous = ChannelInput {
                view: buf.previous.view(),
                sampler: clamp,
                kind: ChannelKind::D2,
            };
            buf.program.draw(
                ctx,
                &buf.current,
                &buf.block,
                &[(AUDIO_CHANNEL, audio), ("iChannel1", previous)],
            );
        }

        let names: Vec<String> = (0..self.buffers.len()).map(|i| channel_name(i + 1)).collect();
        let mut channels: Vec<(&str, ChannelInput<'_>)> =
            Vec::with_capacity(1 + self.buffers.len() + self.textures.len());
        channels.push((AUDIO_CHANNEL, audio));
        for (name, buf) in names.iter().zip(&self.buffers) {
            channels.push((
                name.as_str(),
                ChannelInput {
                    view: buf.current.view(),
                    sampler: clamp,
                    kind: ChannelKind::D2,
                },
            ));
        }
        for tex in &self.textures {
            channels.push((
                tex.channel.as_str(),
                ChannelInput {
                    view: tex.texture.view(),
                    sampler: ctx.sampler(tex.filter, tex.wrap, tex.mipmap),
                    kind: tex.texture.kind(),
                },
            ));
        }
        inputs.write(&self.main, &mut self.block);
        self.main.draw(ctx, target, &self.block, &channels);

        for buf in &mut self.buffers {
            buf.swap();
        }
    }
}

fn read_source(path: &Path) -> OneoffResult<String> {
    if !path.is_file() {
        return Err(OneoffError::missing("shader file", path));
    }
    Ok(std::fs::read_to_string(path)
        .with_context(|| format!("read shader '{}'", path.display()))?)
}
