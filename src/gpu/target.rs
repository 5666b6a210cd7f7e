use crate::foundation::core::Resolution;
use crate::foundation::error::{OneoffError, OneoffResult};
use crate::gpu::context::{GpuContext, TARGET_FORMAT};

/// Offscreen color target at the output resolution. Destroyed on drop.
#[derive(Debug)]
pub struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: Resolution,
}

impl RenderTarget {
    pub fn new(ctx: &GpuContext, size: Resolution, label: &str) -> Self {
        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn size(&self) -> Resolution {
        self.size
    }

    /// Fill with opaque black.
    pub fn clear(&self, ctx: &GpuContext) {
        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("oneoff_clear_encoder"),
            });
        {
            let _rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("oneoff_clear_rp"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.view,
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
        }
        ctx.queue().submit(Some(encoder.finish()));
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

/// Mappable staging buffer sized for one output frame.
#[derive(Debug)]
pub struct Readback {
    buffer: wgpu::Buffer,
    bytes_per_row: u32,
    size: Resolution,
}

impl Readback {
    pub fn new(ctx: &GpuContext, size: Resolution) -> OneoffResult<Self> {
        let unpadded = size
            .width
            .checked_mul(4)
            .ok_or_else(|| OneoffError::gpu("render target width overflow"))?;
        let bytes_per_row = align_to(unpadded, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let buffer_size = u64::from(bytes_per_row)
            .checked_mul(u64::from(size.height))
            .ok_or_else(|| OneoffError::gpu("readback buffer size overflow"))?;
        let buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("oneoff_readback"),
            size: buffer_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(Self {
            buffer,
            bytes_per_row,
            size,
        })
    }

    /// Copy `target` back as upright RGB24.
    ///
    /// Targets hold rows bottom-up (GL convention), so rows are emitted in reverse.
    pub fn read_rgb24(&self, ctx: &GpuContext, target: &RenderTarget) -> OneoffResult<Vec<u8>> {
        if target.size() != self.size {
            return Err(OneoffError::gpu(format!(
                "readback sized {}x{} cannot read a {}x{} target",
                self.size.width,
                self.size.height,
                target.size().width,
                target.size().height
            )));
        }
        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("oneoff_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: target.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.bytes_per_row),
                    rows_per_image: Some(self.size.height),
                },
            },
            wgpu::Extent3d {
                width: self.size.width,
                height: self.size.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue().submit(Some(encoder.finish()));

        let slice = self.buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        ctx.device()
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| OneoffError::gpu(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| OneoffError::gpu("readback channel closed"))?
            .map_err(|e| OneoffError::gpu(format!("readback map failed: {e:?}")))?;

        let mapped = slice.get_mapped_range();
        let width = self.size.width as usize;
        let padded = self.bytes_per_row as usize;
        let mut out = Vec::with_capacity(width * 3 * self.size.height as usize);
        for row in (0..self.size.height as usize).rev() {
            let start = row * padded;
            for px in mapped[start..start + width * 4].chunks_exact(4) {
                out.extend_from_slice(&px[..3]);
            }
        }
        drop(mapped);
        self.buffer.unmap();
        Ok(out)
    }
}

impl Drop for Readback {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}
