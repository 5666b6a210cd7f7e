//! JSON job configuration.
//!
//! Every key is optional; absent keys take the defaults documented on each field.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::core::{Fps, Resolution};
use crate::foundation::error::{OneoffError, OneoffResult};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub duration_override: DurationOverride,
    pub rendering: RenderingConfig,
    pub shader_settings: ShaderSettings,
    pub batch_settings: BatchSettings,
    pub debug: DebugConfig,
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> OneoffResult<Self> {
        if !path.exists() {
            return Err(OneoffError::missing("configuration file", path));
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Config = serde_json::from_str(&text)
            .map_err(|e| OneoffError::serde(format!("parse config '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> OneoffResult<()> {
        self.output.resolution.validate()?;
        self.output.fps()?;
        if self.shader_settings.transitions.duration < 0.0 {
            return Err(OneoffError::validation(
                "transition duration must not be negative",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub shader_file: PathBuf,
    pub audio_file: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            shader_file: PathBuf::from("Shaders/default.glsl"),
            audio_file: PathBuf::from("Input_Audio/input.mp3"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub video_file: PathBuf,
    pub directory: PathBuf,
    pub resolution: Resolution,
    pub frame_rate: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            video_file: PathBuf::from("Output_Video/output.mp4"),
            directory: PathBuf::from("Output_Video"),
            resolution: Resolution::default(),
            frame_rate: 30.0,
        }
    }
}

impl OutputConfig {
    pub fn fps(&self) -> OneoffResult<Fps> {
        Fps::from_rate(self.frame_rate)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationOverride {
    pub enabled: bool,
    /// `"MM:SS"` or plain seconds.
    pub cutoff_time: String,
}

impl Default for DurationOverride {
    fn default() -> Self {
        Self {
            enabled: false,
            cutoff_time: "1:00".to_string(),
        }
    }
}

impl DurationOverride {
    /// The configured cutoff in seconds, `None` when disabled or unparsable.
    pub fn cutoff_secs(&self) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        let parsed = parse_cutoff(&self.cutoff_time);
        if parsed.is_none() {
            tracing::warn!(
                cutoff = %self.cutoff_time,
                "invalid cutoff time, using full audio duration"
            );
        }
        parsed
    }
}

/// Parse `"MM:SS"` (integer parts) or a plain number of seconds.
pub fn parse_cutoff(s: &str) -> Option<f64> {
    let s = s.trim();
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [m, sec] => {
            let m: u64 = m.trim().parse().ok()?;
            let sec: u64 = sec.trim().parse().ok()?;
            Some((m * 60 + sec) as f64)
        }
        [single] => single.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0),
        _ => None,
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderingConfig {
    pub quality: QualityConfig,
    pub audio: AudioCodecConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub crf: u32,
    pub preset: String,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            crf: 18,
            preset: "medium".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioCodecConfig {
    pub codec: String,
    pub bitrate: String,
}

impl Default for AudioCodecConfig {
    fn default() -> Self {
        Self {
            codec: "aac".to_string(),
            bitrate: "192k".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderSettings {
    pub multi_shader: bool,
    pub shaders_dir: PathBuf,
    pub textures_dir: PathBuf,
    pub cubemaps_dir: PathBuf,
    pub metadata_file: PathBuf,
    pub randomization: Randomization,
    pub transitions: TransitionSettings,
}

impl Default for ShaderSettings {
    fn default() -> Self {
        Self {
            multi_shader: false,
            shaders_dir: PathBuf::from("Shaders"),
            textures_dir: PathBuf::from("Textures"),
            cubemaps_dir: PathBuf::from("Cubemaps"),
            metadata_file: PathBuf::from("Shaders/metadata.json"),
            randomization: Randomization::default(),
            transitions: TransitionSettings::default(),
        }
    }
}

/// Weighting scheme for shader cycling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    Weighted,
    PureRandom,
    /// Any unrecognized name; behaves like `pure_random`.
    #[serde(other)]
    Uniform,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Randomization {
    pub algorithm: Algorithm,
    pub distribution_weight: f64,
    pub history_size: usize,
}

impl Default for Randomization {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Weighted,
            distribution_weight: 2.0,
            history_size: 3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionSettings {
    pub enabled: bool,
    pub duration: f64,
    pub folder: PathBuf,
    pub config_file: PathBuf,
    pub randomization: TransitionRandomization,
}

impl Default for TransitionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            duration: 1.6,
            folder: PathBuf::from("Transitions"),
            config_file: PathBuf::from("Transitions/Transitions_Metadata.json"),
            randomization: TransitionRandomization::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionRandomization {
    pub history_size: usize,
}

impl Default for TransitionRandomization {
    fn default() -> Self {
        Self { history_size: 2 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub enabled: bool,
    pub overwrite_existing: bool,
    pub input_dir: PathBuf,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            overwrite_existing: false,
            input_dir: PathBuf::from("Input_Audio"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub verbose_logging: bool,
    pub show_progress: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            verbose_logging: true,
            show_progress: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_documented_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.output.resolution, Resolution { width: 2560, height: 1440 });
        assert_eq!(cfg.output.frame_rate, 30.0);
        assert_eq!(cfg.rendering.quality.crf, 18);
        assert_eq!(cfg.rendering.audio.codec, "aac");
        assert_eq!(cfg.rendering.audio.bitrate, "192k");
        assert_eq!(cfg.shader_settings.randomization.algorithm, Algorithm::Weighted);
        assert_eq!(cfg.shader_settings.randomization.distribution_weight, 2.0);
        assert_eq!(cfg.shader_settings.randomization.history_size, 3);
        assert_eq!(cfg.shader_settings.transitions.duration, 1.6);
        assert_eq!(cfg.shader_settings.transitions.randomization.history_size, 2);
        assert!(!cfg.batch_settings.enabled);
        assert!(!cfg.batch_settings.overwrite_existing);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_sibling_defaults() {
        let cfg: Config = serde_json::from_str(
            r#"{"output": {"resolution": {"width": 640, "height": 360}},
                "shader_settings": {"transitions": {"enabled": true}}}"#,
        )
        .unwrap();
        assert_eq!(cfg.output.resolution.width, 640);
        assert_eq!(cfg.output.directory, PathBuf::from("Output_Video"));
        assert!(cfg.shader_settings.transitions.enabled);
        assert_eq!(
            cfg.shader_settings.transitions.folder,
            PathBuf::from("Transitions")
        );
    }

    #[test]
    fn unknown_algorithm_falls_back_to_uniform() {
        let r: Randomization = serde_json::from_str(r#"{"algorithm": "fancy"}"#).unwrap();
        assert_eq!(r.algorithm, Algorithm::Uniform);
        let r: Randomization = serde_json::from_str(r#"{"algorithm": "pure_random"}"#).unwrap();
        assert_eq!(r.algorithm, Algorithm::PureRandom);
    }

    #[test]
    fn odd_resolution_is_rejected() {
        let cfg: Config =
            serde_json::from_str(r#"{"output": {"resolution": {"width": 641, "height": 360}}}"#)
                .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cutoff_parses_minutes_seconds_and_plain_seconds() {
        assert_eq!(parse_cutoff("1:30"), Some(90.0));
        assert_eq!(parse_cutoff("0:05"), Some(5.0));
        assert_eq!(parse_cutoff("42.5"), Some(42.5));
        assert_eq!(parse_cutoff("1:3x"), None);
        assert_eq!(parse_cutoff("abc"), None);
        assert_eq!(parse_cutoff("1:2:3"), None);
    }

    #[test]
    fn disabled_override_has_no_cutoff() {
        let d = DurationOverride {
            enabled: false,
            cutoff_time: "0:10".into(),
        };
        assert_eq!(d.cutoff_secs(), None);
        let d = DurationOverride {
            enabled: true,
            cutoff_time: "0:10".into(),
        };
        assert_eq!(d.cutoff_secs(), Some(10.0));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, OneoffError::MissingResource { .. }));
    }
}
