use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::assets::decode::{CubemapImage, TextureImage};
use crate::audio::texture::{AUDIO_TEXTURE_HEIGHT, AUDIO_TEXTURE_WIDTH};
use crate::foundation::error::{OneoffError, OneoffResult};
use crate::gpu::context::{GpuContext, TARGET_FORMAT};
use crate::shader::source::ChannelKind;

/// A sampled texture that is destroyed as soon as it is dropped.
#[derive(Debug)]
pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    kind: ChannelKind,
}

impl GpuTexture {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

/// Upload one packed audio frame as an `R8Unorm` 512x256 texture.
pub fn upload_audio(ctx: &GpuContext, packed: &[u8]) -> OneoffResult<GpuTexture> {
    let expected = (AUDIO_TEXTURE_WIDTH * AUDIO_TEXTURE_HEIGHT) as usize;
    if packed.len() != expected {
        return Err(OneoffError::gpu(format!(
            "audio texture has {} bytes, expected {expected}",
            packed.len()
        )));
    }
    let texture = ctx.device().create_texture_with_data(
        ctx.queue(),
        &wgpu::TextureDescriptor {
            label: Some("oneoff_audio_frame"),
            size: wgpu::Extent3d {
                width: AUDIO_TEXTURE_WIDTH,
                height: AUDIO_TEXTURE_HEIGHT,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        packed,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(GpuTexture {
        texture,
        view,
        kind: ChannelKind::D2,
    })
}

/// Reject a texture larger than the device allows before wgpu sees it.
pub fn check_texture_size(limits: &wgpu::Limits, width: u32, height: u32) -> OneoffResult<()> {
    let max = limits.max_texture_dimension_2d;
    if width == 0 || height == 0 || width > max || height > max {
        return Err(OneoffError::resource(format!(
            "texture {width}x{height} exceeds the device limit of {max}"
        )));
    }
    Ok(())
}

/// Upload a decoded image with its mip chain.
///
/// Oversized images and upload validation errors are `ResourceLoad` errors.
pub fn upload_image(ctx: &GpuContext, image: &TextureImage, label: &str) -> OneoffResult<GpuTexture> {
    check_texture_size(&ctx.device().limits(), image.width, image.height)?;
    let upload = ctx.scoped("upload texture", |device| {
        device.create_texture_with_data(
            ctx.queue(),
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: image.width,
                    height: image.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: image.levels.len().max(1) as u32,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            &image.levels.concat(),
        )
    });
    let texture = upload.map_err(|e| OneoffError::resource(format!("{label}: {e}")))?;
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(GpuTexture {
        texture,
        view,
        kind: ChannelKind::D2,
    })
}

/// Upload six cubemap faces as one cube texture.
pub fn upload_cubemap(ctx: &GpuContext, cube: &CubemapImage, label: &str) -> OneoffResult<GpuTexture> {
    check_texture_size(&ctx.device().limits(), cube.size, cube.size)?;
    let upload = ctx.scoped("upload cubemap", |device| {
        device.create_texture_with_data(
            ctx.queue(),
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: cube.size,
                    height: cube.size,
                    depth_or_array_layers: 6,
                },
                mip_level_count: cube.mip_levels.max(1),
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            &cube.layer_major_bytes(),
        )
    });
    let texture = upload.map_err(|e| OneoffError::resource(format!("{label}: {e}")))?;
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(label),
        dimension: Some(wgpu::TextureViewDimension::Cube),
        ..Default::default()
    });
    Ok(GpuTexture {
        texture,
        view,
        kind: ChannelKind::Cube,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_textures_are_resource_errors() {
        let limits = wgpu::Limits::downlevel_defaults();
        let max = limits.max_texture_dimension_2d;
        assert!(check_texture_size(&limits, max, max).is_ok());
        let err = check_texture_size(&limits, max + 1, 16).unwrap_err();
        assert!(matches!(err, OneoffError::ResourceLoad(_)), "{err}");
        assert!(err.is_recoverable());
        assert!(check_texture_size(&limits, 16, max + 1).is_err());
        assert!(check_texture_size(&limits, 0, 16).is_err());
    }
}
