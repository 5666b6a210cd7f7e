//! File discovery for shader programs and the resources they declare.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{OneoffError, OneoffResult};
use crate::shader::metadata::{
    BufferField, ChannelTexture, FilterMode, ShaderMetadata, TextureField, WrapMode,
};

/// Feedback passes in execution order.
pub const BUFFER_IDS: [char; 4] = ['A', 'B', 'C', 'D'];

const BUFFER_MARKER: &str = ".buffer.";

/// Channel a bare `texture: "file"` entry binds to.
pub const DEFAULT_TEXTURE_CHANNEL: &str = "iChannel1";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferPass {
    pub id: char,
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureSpec {
    pub channel: String,
    pub source: TextureSource,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TextureSource {
    Image {
        path: PathBuf,
        filter: FilterMode,
        wrap: WrapMode,
        mipmap: bool,
    },
    Cubemap {
        dir: PathBuf,
        basename: String,
        filter: FilterMode,
        mipmap: bool,
    },
}

/// Directories texture metadata is resolved against.
#[derive(Clone, Debug)]
pub struct ResourceDirs {
    pub textures: PathBuf,
    pub cubemaps: PathBuf,
}

/// `true` for `<stem>.buffer.<ID>.glsl` files.
pub fn is_buffer_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(BUFFER_MARKER))
}

fn glsl_files(dir: &Path) -> OneoffResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("read directory '{}'", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("read directory entry in '{}'", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|e| e == "glsl") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Main shader programs in `dir`, sorted by file name, buffer files excluded.
pub fn discover_shaders(dir: &Path) -> OneoffResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(OneoffError::missing("shaders directory", dir));
    }
    let shaders: Vec<PathBuf> = glsl_files(dir)?
        .into_iter()
        .filter(|p| !is_buffer_file(p))
        .collect();
    tracing::info!(dir = %dir.display(), count = shaders.len(), "discovered shaders");
    Ok(shaders)
}

/// Transition programs in `dir`. A missing directory yields none.
pub fn discover_transitions(dir: &Path) -> OneoffResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "transitions folder not found");
        return Ok(Vec::new());
    }
    let files = glsl_files(dir)?;
    if files.is_empty() {
        tracing::warn!(dir = %dir.display(), "no transition programs found");
    }
    Ok(files)
}

/// Find a transition file by name: exact, then with `.glsl` appended or stripped.
pub fn resolve_transition_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let stripped = name.strip_suffix(".glsl").unwrap_or(name);
    [
        name.to_string(),
        format!("{name}.glsl"),
        format!("{stripped}.glsl"),
    ]
    .into_iter()
    .map(|candidate| dir.join(candidate))
    .find(|p| p.is_file())
}

fn buffer_id_of(file_name: &str) -> Option<char> {
    let (_, rest) = file_name.split_once(BUFFER_MARKER)?;
    let id = rest.split('.').next()?;
    let mut chars = id.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Feedback passes for a shader, in `A..D` order.
///
/// Explicit metadata wins: `buffer: false` disables buffers and `buffer: {files}` names them.
/// Otherwise sibling `<stem>.buffer.<ID>.glsl` files are probed.
pub fn buffer_passes(shader_path: &Path, meta: Option<&ShaderMetadata>) -> Vec<BufferPass> {
    let dir = shader_path.parent().unwrap_or(Path::new("."));
    let mut passes = match meta.and_then(|m| m.buffer.as_ref()) {
        Some(BufferField::Flag(false)) => Vec::new(),
        Some(BufferField::Files { files }) => files
            .iter()
            .filter_map(|f| match buffer_id_of(f) {
                Some(id) if BUFFER_IDS.contains(&id) => Some(BufferPass {
                    id,
                    path: dir.join(f),
                }),
                _ => {
                    tracing::warn!(file = %f, "ignoring buffer file without an A-D pass id");
                    None
                }
            })
            .collect(),
        Some(BufferField::Flag(true)) | None => {
            let stem = shader_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            BUFFER_IDS
                .iter()
                .map(|id| BufferPass {
                    id: *id,
                    path: dir.join(format!("{stem}{BUFFER_MARKER}{id}.glsl")),
                })
                .filter(|b| b.path.is_file())
                .collect()
        }
    };
    passes.sort_by_key(|b| b.id);
    passes.dedup_by_key(|b| b.id);
    passes
}

/// Texture bindings declared by shader metadata.
pub fn texture_specs(meta: Option<&ShaderMetadata>, dirs: &ResourceDirs) -> Vec<TextureSpec> {
    let image = |file: &str, filter, wrap, mipmap| TextureSource::Image {
        path: dirs.textures.join(file),
        filter,
        wrap,
        mipmap,
    };
    match meta.and_then(|m| m.texture.as_ref()) {
        None => Vec::new(),
        Some(TextureField::File(file)) => vec![TextureSpec {
            channel: DEFAULT_TEXTURE_CHANNEL.to_string(),
            source: image(file, FilterMode::Linear, WrapMode::Repeat, false),
        }],
        Some(TextureField::Channels(map)) => map
            .iter()
            .filter_map(|(channel, tex)| {
                let source = match tex {
                    ChannelTexture::File(file) => {
                        image(file, FilterMode::Linear, WrapMode::Repeat, false)
                    }
                    ChannelTexture::Advanced(adv) if adv.is_cubemap() => {
                        let Some(basename) = adv.basename.clone() else {
                            tracing::error!(%channel, "cubemap descriptor has no basename");
                            return None;
                        };
                        TextureSource::Cubemap {
                            dir: dirs.cubemaps.clone(),
                            basename,
                            filter: adv.filter,
                            mipmap: adv.mipmap,
                        }
                    }
                    ChannelTexture::Advanced(adv) => {
                        let Some(file) = adv.file.as_deref() else {
                            tracing::warn!(%channel, "texture descriptor has no file");
                            return None;
                        };
                        image(file, adv.filter, adv.wrap, adv.mipmap)
                    }
                };
                Some(TextureSpec {
                    channel: channel.clone(),
                    source,
                })
            })
            .collect(),
    }
}
