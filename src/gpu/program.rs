use std::borrow::Cow;

use crate::foundation::error::{OneoffError, OneoffResult};
use crate::gpu::context::{GpuContext, TARGET_FORMAT, VERTEX_ENTRY};
use crate::gpu::target::RenderTarget;
use crate::shader::source::{
    ChannelKind, FRAGMENT_ENTRY, ParsedProgram, ProgramInterface, UNIFORM_BLOCK_BINDING,
    UniformBlock, parse_fragment_program,
};

/// Texture and sampler bound to one named channel for a draw.
#[derive(Clone, Copy, Debug)]
pub struct ChannelInput<'a> {
    pub view: &'a wgpu::TextureView,
    pub sampler: &'a wgpu::Sampler,
    pub kind: ChannelKind,
}

/// A linked fragment program with its bind group layout and uniform buffer.
#[derive(Debug)]
pub struct GpuProgram {
    name: String,
    interface: ProgramInterface,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniforms: Option<wgpu::Buffer>,
}

impl GpuProgram {
    /// Parse, validate and link a fragment program. Failures are `Compile` errors.
    pub fn compile(ctx: &GpuContext, name: &str, source: &str) -> OneoffResult<Self> {
        let parsed = parse_fragment_program(name, source)?;
        Self::link(ctx, parsed)
    }

    pub fn link(ctx: &GpuContext, parsed: ParsedProgram) -> OneoffResult<Self> {
        let ParsedProgram {
            name,
            module,
            interface,
        } = parsed;

        let mut entries = Vec::with_capacity(1 + interface.channels().len() * 2);
        if interface.block_size() > 0 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: UNIFORM_BLOCK_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        for ch in interface.channels() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: ch.texture_binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: view_dimension(ch.kind),
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: ch.sampler_binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }

        let (pipeline, bind_group_layout, uniforms) =
            ctx.scoped(&format!("link program '{name}'"), |device| {
                let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(name.as_str()),
                    source: wgpu::ShaderSource::Naga(Cow::Owned(module)),
                });
                let bind_group_layout =
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("oneoff_program_bgl"),
                        entries: &entries,
                    });
                let pipeline_layout =
                    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("oneoff_program_pl"),
                        bind_group_layouts: &[&bind_group_layout],
                        push_constant_ranges: &[],
                    });
                let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(name.as_str()),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: ctx.vertex_module(),
                        entry_point: Some(VERTEX_ENTRY),
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                        buffers: &[],
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &fragment,
                        entry_point: Some(FRAGMENT_ENTRY),
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: TARGET_FORMAT,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                });
                let uniforms = (interface.block_size() > 0).then(|| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("oneoff_program_uniforms"),
                        size: interface.block_size().next_multiple_of(16),
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    })
                });
                (pipeline, bind_group_layout, uniforms)
            })
            .map_err(|e| OneoffError::compile(&name, e.to_string()))?;

        tracing::debug!(program = %name, channels = interface.channels().len(), "linked program");
        Ok(Self {
            name,
            interface,
            pipeline,
            bind_group_layout,
            uniforms,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    /// Fresh uniform block with the program's declared defaults.
    pub fn uniform_block(&self) -> UniformBlock {
        UniformBlock::new(&self.interface)
    }

    /// Run the program over every pixel of `target`.
    ///
    /// `channels` are matched by name; channels the program declares but nothing feeds, or
    /// fed with the wrong dimensionality, get a black placeholder.
    pub fn draw(
        &self,
        ctx: &GpuContext,
        target: &RenderTarget,
        uniforms: &UniformBlock,
        channels: &[(&str, ChannelInput<'_>)],
    ) {
        if let Some(buffer) = &self.uniforms {
            ctx.queue().write_buffer(buffer, 0, uniforms.as_bytes());
        }

        let fallback_sampler = ctx.clamp_sampler();
        let mut entries = Vec::with_capacity(1 + self.interface.channels().len() * 2);
        if let Some(buffer) = &self.uniforms {
            entries.push(wgpu::BindGroupEntry {
                binding: UNIFORM_BLOCK_BINDING,
                resource: buffer.as_entire_binding(),
            });
        }
        for ch in self.interface.channels() {
            let input = channels
                .iter()
                .find(|(name, _)| *name == ch.name)
                .map(|(_, input)| *input)
                .filter(|input| {
                    let fits = input.kind == ch.kind;
                    if !fits {
                        tracing::debug!(program = %self.name, channel = %ch.name, "channel dimensionality mismatch");
                    }
                    fits
                });
            let (view, sampler) = match input {
                Some(input) => (input.view, input.sampler),
                None => {
                    let view = match ch.kind {
                        ChannelKind::D2 => ctx.placeholder_2d(),
                        ChannelKind::Cube => ctx.placeholder_cube(),
                    };
                    (view, fallback_sampler)
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: ch.texture_binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: ch.sampler_binding,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("oneoff_program_bg"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("oneoff_draw_encoder"),
            });
        {
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("oneoff_draw_rp"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view(),
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rp.set_pipeline(&self.pipeline);
            rp.set_bind_group(0, &bind_group, &[]);
            rp.draw(0..3, 0..1);
        }
        ctx.queue().submit(Some(encoder.finish()));
    }
}

fn view_dimension(kind: ChannelKind) -> wgpu::TextureViewDimension {
    match kind {
        ChannelKind::D2 => wgpu::TextureViewDimension::D2,
        ChannelKind::Cube => wgpu::TextureViewDimension::Cube,
    }
}
