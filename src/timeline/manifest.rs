//! Timeline manifest documents produced by the editor.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::foundation::core::{Fps, Resolution};
use crate::foundation::error::{OneoffError, OneoffResult};

/// Layer carrying chroma-keyed foreground video.
pub const FOREGROUND_LAYER: u32 = 0;
/// Layer carrying shader programs and transitions.
pub const BACKGROUND_LAYER: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    /// Opaque editor version; only its presence is required.
    pub version: serde_json::Value,
    pub audio: AudioRef,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    #[serde(default)]
    pub project_name: Option<String>,
    pub timeline: TimelineSpec,
}

fn default_frame_rate() -> f64 {
    30.0
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioRef {
    pub path: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimelineSpec {
    pub duration: f64,
    #[serde(default)]
    pub elements: Vec<TimelineElement>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Shader,
    Transition,
    Video,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineElement {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default)]
    pub name: String,
    pub layer: u32,
    #[serde(rename = "startTime")]
    pub start: f64,
    #[serde(rename = "endTime")]
    pub end: f64,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub greenscreen: Option<Greenscreen>,
}

impl TimelineElement {
    pub fn new(id: impl Into<String>, kind: ElementKind, start: f64, end: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            layer: match kind {
                ElementKind::Video => FOREGROUND_LAYER,
                _ => BACKGROUND_LAYER,
            },
            start,
            end,
            path: None,
            greenscreen: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// `start <= t < end`.
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }

    /// Greenscreen options with defaults filled in.
    pub fn greenscreen(&self) -> Greenscreen {
        self.greenscreen.clone().unwrap_or_default()
    }
}

/// Editors emit numeric ids for some elements.
fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }
    Ok(match Id::deserialize(d)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Greenscreen {
    pub enabled: bool,
    pub color: [u8; 3],
    /// Euclidean distance in normalized RGB.
    pub threshold: f32,
}

impl Default for Greenscreen {
    fn default() -> Self {
        Self {
            enabled: true,
            color: [0, 214, 0],
            threshold: 0.5,
        }
    }
}

impl Manifest {
    /// Read a manifest and resolve relative paths against its directory.
    pub fn load(path: &Path) -> OneoffResult<Self> {
        if !path.exists() {
            return Err(OneoffError::missing("manifest", path));
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read manifest '{}'", path.display()))?;
        let mut manifest = Self::from_json(&text)?;
        let base = path.parent().unwrap_or(Path::new("."));
        manifest.resolve_paths(base);
        Ok(manifest)
    }

    pub fn from_json(text: &str) -> OneoffResult<Self> {
        let manifest: Self = serde_json::from_str(text)
            .map_err(|e| OneoffError::serde(format!("parse manifest: {e}")))?;
        manifest.resolution.validate()?;
        Fps::from_rate(manifest.frame_rate)?;
        if !(manifest.timeline.duration > 0.0) {
            return Err(OneoffError::validation(format!(
                "timeline duration must be positive, got {}",
                manifest.timeline.duration
            )));
        }
        Ok(manifest)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.audio.path);
        for el in &mut self.timeline.elements {
            if let Some(p) = el.path.as_mut() {
                resolve(p);
            }
        }
    }

    pub fn fps(&self) -> OneoffResult<Fps> {
        Fps::from_rate(self.frame_rate)
    }

    /// Elements on `layer`, sorted by start time.
    pub fn layer(&self, layer: u32) -> Vec<TimelineElement> {
        let mut out: Vec<TimelineElement> = self
            .timeline
            .elements
            .iter()
            .filter(|e| e.layer == layer)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.start.total_cmp(&b.start));
        out
    }

    /// Check that the audio file and every referenced element file exist, and that there is
    /// something to render.
    pub fn validate(&self) -> OneoffResult<()> {
        if !self.audio.path.exists() {
            return Err(OneoffError::missing("audio file", &self.audio.path));
        }
        for el in &self.timeline.elements {
            if let Some(p) = &el.path
                && !p.exists()
            {
                return Err(OneoffError::missing(
                    format!("{:?} file for element '{}'", el.kind, el.name),
                    p,
                ));
            }
        }
        if self.layer(FOREGROUND_LAYER).is_empty() && self.layer(BACKGROUND_LAYER).is_empty() {
            return Err(OneoffError::validation(
                "timeline is empty: add shaders on layer 1 or videos on layer 0",
            ));
        }
        Ok(())
    }

    /// Output stem: the project name, else the manifest file stem, sanitized for file names.
    pub fn output_stem(&self, manifest_path: &Path) -> String {
        let raw = self
            .project_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                manifest_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "timeline_render".to_string());
        sanitize_stem(&raw)
    }
}

/// Replace characters that are awkward in file names.
pub fn sanitize_stem(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}
