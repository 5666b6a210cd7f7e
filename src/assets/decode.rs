use std::path::{Path, PathBuf};

use image::{RgbaImage, imageops::FilterType};

use crate::foundation::error::{OneoffError, OneoffResult};

/// Cubemap face suffixes in layer order: +X, -X, +Y, -Y, +Z, -Z.
pub const CUBEMAP_FACE_SUFFIXES: [&str; 6] = ["px", "nx", "py", "ny", "pz", "nz"];

const CUBEMAP_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tga"];

/// Decoded RGBA8 image with bottom-up rows, plus an optional mip chain.
#[derive(Clone, Debug)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    /// Level 0 first.
    pub levels: Vec<Vec<u8>>,
}

/// Six square faces of identical size, each with the same number of mip levels.
#[derive(Clone, Debug)]
pub struct CubemapImage {
    pub size: u32,
    pub mip_levels: u32,
    /// Face-major, then level.
    pub faces: Vec<Vec<Vec<u8>>>,
}

impl CubemapImage {
    /// Bytes in face-major, level-minor order.
    pub fn layer_major_bytes(&self) -> Vec<u8> {
        self.faces.iter().flatten().flatten().copied().collect()
    }
}

pub fn load_texture_image(path: &Path, mipmap: bool) -> OneoffResult<TextureImage> {
    let img = open_rgba(path)?;
    Ok(prepare_texture(img, mipmap))
}

/// Flip to bottom-up rows and build the mip chain.
pub fn prepare_texture(mut img: RgbaImage, mipmap: bool) -> TextureImage {
    image::imageops::flip_vertical_in_place(&mut img);
    let (width, height) = img.dimensions();
    let levels = if mipmap {
        mip_chain(img)
    } else {
        vec![img.into_raw()]
    };
    TextureImage {
        width,
        height,
        levels,
    }
}

pub fn load_cubemap(dir: &Path, basename: &str, mipmap: bool) -> OneoffResult<CubemapImage> {
    let mut faces = Vec::with_capacity(6);
    let mut size: Option<u32> = None;
    for suffix in CUBEMAP_FACE_SUFFIXES {
        let path = find_face(dir, basename, suffix).ok_or_else(|| {
            OneoffError::resource(format!(
                "cubemap face not found: {}/{basename}_{suffix}.*",
                dir.display()
            ))
        })?;
        let mut img = open_rgba(&path)?;
        let (w, h) = img.dimensions();
        if w != h {
            return Err(OneoffError::resource(format!(
                "cubemap face must be square: '{}' is {w}x{h}",
                path.display()
            )));
        }
        match size {
            None => size = Some(w),
            Some(s) if s != w => {
                return Err(OneoffError::resource(format!(
                    "cubemap faces must share one size: '{}' is {w}x{w}, expected {s}x{s}",
                    path.display()
                )));
            }
            Some(_) => {}
        }
        image::imageops::flip_vertical_in_place(&mut img);
        faces.push(if mipmap {
            mip_chain(img)
        } else {
            vec![img.into_raw()]
        });
        tracing::debug!(face = %path.display(), "loaded cubemap face");
    }

    let size = size.ok_or_else(|| OneoffError::resource("cubemap has no faces"))?;
    let mip_levels = faces.first().map(|f| f.len() as u32).unwrap_or(1);
    Ok(CubemapImage {
        size,
        mip_levels,
        faces,
    })
}

fn find_face(dir: &Path, basename: &str, suffix: &str) -> Option<PathBuf> {
    CUBEMAP_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{basename}_{suffix}.{ext}")))
        .find(|p| p.exists())
}

fn open_rgba(path: &Path) -> OneoffResult<RgbaImage> {
    if !path.exists() {
        return Err(OneoffError::resource(format!(
            "texture file not found: '{}'",
            path.display()
        )));
    }
    let img = image::open(path).map_err(|e| {
        OneoffError::resource(format!("decode image '{}': {e}", path.display()))
    })?;
    Ok(img.to_rgba8())
}

fn mip_chain(base: RgbaImage) -> Vec<Vec<u8>> {
    let mut levels = Vec::new();
    let mut current = base;
    loop {
        let (w, h) = current.dimensions();
        if w == 1 && h == 1 {
            levels.push(current.into_raw());
            break;
        }
        let next = image::imageops::resize(
            &current,
            (w / 2).max(1),
            (h / 2).max(1),
            FilterType::Triangle,
        );
        levels.push(current.into_raw());
        current = next;
    }
    levels
}

/// Number of mip levels for a `width x height` base level.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}
