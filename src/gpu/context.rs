use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::foundation::error::{OneoffError, OneoffResult};
use crate::shader::metadata::{FilterMode, WrapMode};

/// Color format of every render target and uploaded image.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Entry point of the full-screen vertex stage.
pub const VERTEX_ENTRY: &str = "vs";

const FULLSCREEN_WGSL: &str = r#"
@vertex
fn vs(@builtin(vertex_index) vi: u32) -> @builtin(position) vec4<f32> {
  var p = array<vec2<f32>, 3>(
    vec2<f32>(-1.0, -1.0),
    vec2<f32>( 3.0, -1.0),
    vec2<f32>(-1.0,  3.0),
  );
  return vec4<f32>(p[vi], 0.0, 1.0);
}
"#;

/// One GPU device for one render job.
///
/// Holds the shared vertex stage, placeholder textures for unbound channels and a small
/// sampler cache. A context is built per job and dropped at the end of it.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    vertex: wgpu::ShaderModule,
    placeholder_2d: wgpu::TextureView,
    placeholder_cube: wgpu::TextureView,
    /// Every filter/wrap/mipmap combination, indexed by `sampler_index`.
    samplers: Vec<wgpu::Sampler>,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter_name)
            .finish_non_exhaustive()
    }
}

impl GpuContext {
    /// Request a high-performance adapter and an offscreen device.
    pub fn new() -> OneoffResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                OneoffError::gpu("no gpu adapter available")
            }
            other => OneoffError::gpu(format!("wgpu request_adapter failed: {other:?}")),
        })?;
        let info = adapter.get_info();

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("oneoff_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| OneoffError::gpu(format!("wgpu request_device failed: {e:?}")))?;

        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("oneoff_fullscreen_vs"),
            source: wgpu::ShaderSource::Wgsl(FULLSCREEN_WGSL.into()),
        });

        let placeholder_2d = placeholder(&device, &queue, 1);
        let placeholder_cube = placeholder(&device, &queue, 6);
        let samplers = SAMPLER_VARIANTS
            .iter()
            .map(|(filter, wrap, mipmap)| create_sampler(&device, *filter, *wrap, *mipmap))
            .collect();

        tracing::info!(adapter = %info.name, backend = ?info.backend, "gpu context ready");
        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
            vertex,
            placeholder_2d: placeholder_2d.create_view(&wgpu::TextureViewDescriptor::default()),
            placeholder_cube: placeholder_cube.create_view(&wgpu::TextureViewDescriptor {
                label: Some("oneoff_placeholder_cube_view"),
                dimension: Some(wgpu::TextureViewDimension::Cube),
                ..Default::default()
            }),
            samplers,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub(crate) fn vertex_module(&self) -> &wgpu::ShaderModule {
        &self.vertex
    }

    /// Opaque black 1x1 texture bound to 2D channels nothing feeds.
    pub fn placeholder_2d(&self) -> &wgpu::TextureView {
        &self.placeholder_2d
    }

    pub fn placeholder_cube(&self) -> &wgpu::TextureView {
        &self.placeholder_cube
    }

    /// Sampler for the given filter, wrap and mip settings.
    pub fn sampler(&self, filter: FilterMode, wrap: WrapMode, mipmap: bool) -> &wgpu::Sampler {
        &self.samplers[sampler_index(filter, wrap, mipmap)]
    }

    /// Linear, clamp-to-edge: audio texture and feedback buffers.
    pub fn clamp_sampler(&self) -> &wgpu::Sampler {
        self.sampler(FilterMode::Linear, WrapMode::Clamp, false)
    }

    /// Run `f` inside a validation error scope and surface anything it raised.
    pub fn scoped<T>(&self, what: &str, f: impl FnOnce(&wgpu::Device) -> T) -> OneoffResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let out = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(OneoffError::gpu(format!("{what}: {err}"))),
            None => Ok(out),
        }
    }
}

const SAMPLER_VARIANTS: [(FilterMode, WrapMode, bool); 8] = [
    (FilterMode::Linear, WrapMode::Repeat, false),
    (FilterMode::Linear, WrapMode::Repeat, true),
    (FilterMode::Linear, WrapMode::Clamp, false),
    (FilterMode::Linear, WrapMode::Clamp, true),
    (FilterMode::Nearest, WrapMode::Repeat, false),
    (FilterMode::Nearest, WrapMode::Repeat, true),
    (FilterMode::Nearest, WrapMode::Clamp, false),
    (FilterMode::Nearest, WrapMode::Clamp, true),
];

fn sampler_index(filter: FilterMode, wrap: WrapMode, mipmap: bool) -> usize {
    let f = match filter {
        FilterMode::Linear => 0,
        FilterMode::Nearest => 4,
    };
    let w = match wrap {
        WrapMode::Repeat => 0,
        WrapMode::Clamp => 2,
    };
    f + w + usize::from(mipmap)
}

fn create_sampler(
    device: &wgpu::Device,
    filter: FilterMode,
    wrap: WrapMode,
    mipmap: bool,
) -> wgpu::Sampler {
    let filter_mode = match filter {
        FilterMode::Linear => wgpu::FilterMode::Linear,
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
    };
    let address = match wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("oneoff_sampler"),
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        mag_filter: filter_mode,
        min_filter: filter_mode,
        mipmap_filter: if mipmap {
            filter_mode
        } else {
            wgpu::FilterMode::Nearest
        },
        lod_max_clamp: if mipmap { 32.0 } else { 0.0 },
        ..Default::default()
    })
}

fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue, layers: u32) -> wgpu::Texture {
    let data = vec![0u8, 0, 0, 255].repeat(layers as usize);
    device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("oneoff_placeholder"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &data,
    )
}
