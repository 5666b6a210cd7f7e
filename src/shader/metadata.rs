//! Per-shader and per-transition metadata files.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::shader::source::UniformValue;

#[derive(Clone, Debug, Deserialize)]
/// One entry of the shader metadata list.
pub struct ShaderMetadata {
    pub name: String,
    #[serde(default)]
    pub texture: Option<TextureField>,
    #[serde(default)]
    pub buffer: Option<BufferField>,
    #[serde(default)]
    pub audio_reactive: Option<bool>,
    /// Keys the renderer does not interpret (descriptions, authorship, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
/// `texture` accepts one file name (bound to `iChannel1`) or a channel map.
pub enum TextureField {
    File(String),
    Channels(BTreeMap<String, ChannelTexture>),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ChannelTexture {
    File(String),
    Advanced(AdvancedTexture),
}

#[derive(Clone, Debug, Deserialize)]
/// `{file, filter, wrap, mipmap}` or `{type: "cubemap", basename, filter, mipmap}`.
pub struct AdvancedTexture {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub basename: Option<String>,
    #[serde(default)]
    pub filter: FilterMode,
    #[serde(default)]
    pub wrap: WrapMode,
    #[serde(default)]
    pub mipmap: bool,
}

impl AdvancedTexture {
    pub fn is_cubemap(&self) -> bool {
        self.kind.as_deref() == Some("cubemap")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Nearest,
    #[default]
    #[serde(other)]
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapMode {
    Clamp,
    #[default]
    #[serde(other)]
    Repeat,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
/// `buffer: true|false` or `buffer: {"files": [...]}`.
pub enum BufferField {
    Flag(bool),
    Files { files: Vec<String> },
}

/// Shader metadata keyed by `name`.
#[derive(Clone, Debug, Default)]
pub struct ShaderMetadataIndex {
    entries: BTreeMap<String, ShaderMetadata>,
}

impl ShaderMetadataIndex {
    /// Load the metadata list. A missing or malformed file yields an empty index with a warning.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "shader metadata not found");
            return Self::default();
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| Self::from_json(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(index) => {
                tracing::debug!(path = %path.display(), entries = index.entries.len(), "loaded shader metadata");
                index
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to load shader metadata");
                Self::default()
            }
        }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let list: Vec<ShaderMetadata> = serde_json::from_str(text)?;
        Ok(Self {
            entries: list.into_iter().map(|m| (m.name.clone(), m)).collect(),
        })
    }

    /// Entry for a shader file: by file name first, then by stem.
    pub fn for_shader(&self, shader_path: &Path) -> Option<&ShaderMetadata> {
        let by = |s: Option<&std::ffi::OsStr>| {
            s.and_then(|s| s.to_str())
                .and_then(|s| self.entries.get(s))
        };
        by(shader_path.file_name()).or_else(|| by(shader_path.file_stem()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Preference {
    HighlyDesired = 1,
    Mid = 2,
    Low = 3,
}

impl Preference {
    /// Unknown names rank as `Low`.
    pub fn parse(s: &str) -> Self {
        match s {
            "Highly Desired" => Self::HighlyDesired,
            "Mid" => Self::Mid,
            _ => Self::Low,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    FullyWorking = 1,
    MinorAdjustments = 2,
    Broken = 3,
}

impl Status {
    /// Unknown names rank as `Broken`.
    pub fn parse(s: &str) -> Self {
        match s {
            "Fully Working" => Self::FullyWorking,
            "Minor Adjustments" => Self::MinorAdjustments,
            _ => Self::Broken,
        }
    }
}

/// Score at which a transition never enters a candidate pool.
pub const EXCLUDED_SCORE: u8 = 6;

#[derive(Clone, Debug, PartialEq)]
/// Metadata for one transition program.
pub struct TransitionRecord {
    pub name: String,
    pub preference: Preference,
    pub status: Status,
    /// Custom uniforms applied when the program declares them.
    pub params: Vec<(String, UniformValue)>,
}

impl TransitionRecord {
    pub fn new(name: impl Into<String>, preference: Preference, status: Status) -> Self {
        Self {
            name: name.into(),
            preference,
            status,
            params: Vec::new(),
        }
    }

    /// `preference + status`, 2 (best) to 6 (excluded).
    pub fn score(&self) -> u8 {
        self.preference as u8 + self.status as u8
    }

    pub fn is_excluded(&self) -> bool {
        self.score() >= EXCLUDED_SCORE
    }

    fn from_json(name: &str, obj: &serde_json::Map<String, serde_json::Value>) -> Self {
        let text = |key: &str| obj.get(key).and_then(|v| v.as_str());
        let params = obj
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "resolution" | "preference" | "status"))
            .filter_map(|(k, v)| param_value(v).map(|p| (k.clone(), p)))
            .collect();
        Self {
            name: name.to_string(),
            preference: Preference::parse(text("preference").unwrap_or("Low")),
            status: Status::parse(text("status").unwrap_or("Broken")),
            params,
        }
    }
}

fn param_value(v: &serde_json::Value) -> Option<UniformValue> {
    use serde_json::Value;
    let scalar = |v: &Value| match v {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    match v {
        Value::Array(items) => {
            let comps: Vec<f32> = items.iter().map(scalar).collect::<Option<Vec<_>>>()?;
            match comps.as_slice() {
                [] => None,
                [x, y] => Some(UniformValue::Vec2([*x, *y])),
                [x, y, z] => Some(UniformValue::Vec3([*x, *y, *z])),
                [x, y, z, w] => Some(UniformValue::Vec4([*x, *y, *z, *w])),
                [first, ..] => Some(UniformValue::Float(*first)),
            }
        }
        other => scalar(other).map(UniformValue::Float),
    }
}

/// Load transition metadata keyed by transition file name.
///
/// A missing or malformed file yields no records; every transition then scores as excluded.
pub fn load_transition_metadata(path: &Path) -> BTreeMap<String, TransitionRecord> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "transition metadata not found");
        return BTreeMap::new();
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| parse_transition_metadata(&text).map_err(|e| e.to_string()));
    match parsed {
        Ok(records) => records,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to load transition metadata");
            BTreeMap::new()
        }
    }
}

pub fn parse_transition_metadata(
    text: &str,
) -> serde_json::Result<BTreeMap<String, TransitionRecord>> {
    let root: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
    Ok(root
        .iter()
        .filter_map(|(name, v)| {
            let obj = v.as_object()?;
            if obj.contains_key("resolution") {
                tracing::debug!(transition = %name, "ignoring resolution from transition metadata");
            }
            Some((name.clone(), TransitionRecord::from_json(name, obj)))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_follow_preference_plus_status() {
        let best = TransitionRecord::new("a.glsl", Preference::HighlyDesired, Status::FullyWorking);
        assert_eq!(best.score(), 2);
        assert!(!best.is_excluded());
        let worst = TransitionRecord::new("b.glsl", Preference::Low, Status::Broken);
        assert_eq!(worst.score(), 6);
        assert!(worst.is_excluded());
        assert_eq!(Preference::parse("???"), Preference::Low);
        assert_eq!(Status::parse(""), Status::Broken);
    }

    #[test]
    fn transition_params_are_typed_and_filtered() {
        let records = parse_transition_metadata(
            r#"{
                "wipe.glsl": {
                    "preference": "Mid", "status": "Minor Adjustments",
                    "resolution": [1920, 1080],
                    "smoothness": 0.5, "reverse": true,
                    "direction": [1, 0], "tint": [0.1, 0.2, 0.3, 1.0],
                    "many": [3, 4, 5, 6, 7], "label": "ignored", "empty": []
                },
                "bare.glsl": {}
            }"#,
        )
        .unwrap();
        let wipe = &records["wipe.glsl"];
        assert_eq!(wipe.score(), 4);
        let params: BTreeMap<_, _> = wipe.params.iter().cloned().collect();
        assert_eq!(params.len(), 5);
        assert_eq!(params["smoothness"], UniformValue::Float(0.5));
        assert_eq!(params["reverse"], UniformValue::Float(1.0));
        assert_eq!(params["direction"], UniformValue::Vec2([1.0, 0.0]));
        assert_eq!(params["tint"], UniformValue::Vec4([0.1, 0.2, 0.3, 1.0]));
        assert_eq!(params["many"], UniformValue::Float(3.0));
        assert!(!params.contains_key("resolution"));

        let bare = &records["bare.glsl"];
        assert!(bare.is_excluded());
    }

    #[test]
    fn shader_metadata_accepts_every_texture_shape() {
        let index = ShaderMetadataIndex::from_json(
            r#"[
                {"name": "one.glsl", "texture": "noise.png", "audio_reactive": true},
                {"name": "many", "texture": {
                    "iChannel1": "rock.jpg",
                    "iChannel2": {"file": "grid.png", "filter": "nearest", "wrap": "clamp", "mipmap": true},
                    "iChannel3": {"type": "cubemap", "basename": "sky"}
                }, "buffer": {"files": ["many.buffer.A.glsl"]}},
                {"name": "plain", "buffer": false, "author": "x"}
            ]"#,
        )
        .unwrap();
        assert_eq!(index.len(), 3);

        let one = index.for_shader(Path::new("Shaders/one.glsl")).unwrap();
        assert!(matches!(one.texture, Some(TextureField::File(ref f)) if f == "noise.png"));

        let many = index.for_shader(Path::new("Shaders/many.glsl")).unwrap();
        let Some(TextureField::Channels(map)) = &many.texture else {
            panic!("expected channel map");
        };
        let Some(ChannelTexture::Advanced(grid)) = map.get("iChannel2") else {
            panic!("expected advanced descriptor");
        };
        assert_eq!(grid.filter, FilterMode::Nearest);
        assert_eq!(grid.wrap, WrapMode::Clamp);
        assert!(grid.mipmap);
        let Some(ChannelTexture::Advanced(sky)) = map.get("iChannel3") else {
            panic!("expected cubemap descriptor");
        };
        assert!(sky.is_cubemap());
        assert_eq!(sky.wrap, WrapMode::Repeat);
        assert!(matches!(many.buffer, Some(BufferField::Files { .. })));

        let plain = index.for_shader(Path::new("plain.glsl")).unwrap();
        assert!(matches!(plain.buffer, Some(BufferField::Flag(false))));
        assert!(plain.extra.contains_key("author"));
    }

    #[test]
    fn unknown_filter_and_wrap_fall_back_to_defaults() {
        let index = ShaderMetadataIndex::from_json(
            r#"[{"name": "odd.glsl", "texture": {
                "iChannel1": {"file": "a.png", "filter": "mipmap", "wrap": "mirror"},
                "iChannel2": {"file": "b.png"}
            }}]"#,
        )
        .unwrap();
        let odd = index.for_shader(Path::new("odd.glsl")).unwrap();
        let Some(TextureField::Channels(map)) = &odd.texture else {
            panic!("expected channel map");
        };
        for channel in ["iChannel1", "iChannel2"] {
            let Some(ChannelTexture::Advanced(tex)) = map.get(channel) else {
                panic!("expected advanced descriptor on {channel}");
            };
            assert_eq!(tex.filter, FilterMode::Linear);
            assert_eq!(tex.wrap, WrapMode::Repeat);
        }
    }

    #[test]
    fn missing_metadata_files_are_empty() {
        assert!(ShaderMetadataIndex::load(Path::new("nope/metadata.json")).is_empty());
        assert!(load_transition_metadata(Path::new("nope/t.json")).is_empty());
    }
}
