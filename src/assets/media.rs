use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::foundation::error::{OneoffError, OneoffResult};

/// Stream and container facts reported by `ffprobe`.
#[derive(Clone, Debug)]
pub struct MediaInfo {
    pub source_path: PathBuf,
    /// Container duration in seconds, when reported.
    pub duration: Option<f64>,
    /// Native sample rate of the first audio stream.
    pub sample_rate: Option<u32>,
    /// Size of the first video stream.
    pub video_size: Option<(u32, u32)>,
}

impl MediaInfo {
    pub fn require_duration(&self) -> OneoffResult<f64> {
        self.duration.filter(|d| *d > 0.0).ok_or_else(|| {
            OneoffError::validation(format!(
                "ffprobe reported no duration for '{}'",
                self.source_path.display()
            ))
        })
    }
}

/// Probe a media file through `ffprobe`.
pub fn probe_media(source_path: &Path) -> OneoffResult<MediaInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        sample_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    if !source_path.exists() {
        return Err(OneoffError::missing("media file", source_path));
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| OneoffError::validation(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(OneoffError::external("ffprobe", out.status, &out.stderr));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| OneoffError::serde(format!("ffprobe json parse failed: {e}")))?;

    let sample_rate = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .and_then(|s| s.sample_rate.as_deref())
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|sr| *sr > 0);
    let video_size = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| Some((s.width?, s.height?)));
    let duration = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite());

    Ok(MediaInfo {
        source_path: source_path.to_path_buf(),
        duration,
        sample_rate,
        video_size,
    })
}

/// Decode the audio track to mono `f32` PCM at `sample_rate`, truncated to `max_secs`.
///
/// `ffmpeg` downmixes by averaging channels.
pub fn decode_audio_mono_f32(
    path: &Path,
    sample_rate: u32,
    max_secs: Option<f64>,
) -> OneoffResult<Vec<f32>> {
    if sample_rate == 0 {
        return Err(OneoffError::audio("sample rate must be non-zero"));
    }
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-i"]).arg(path).arg("-vn");
    if let Some(secs) = max_secs {
        cmd.args(["-t", &format!("{secs:.6}")]);
    }
    cmd.args([
        "-f",
        "f32le",
        "-acodec",
        "pcm_f32le",
        "-ac",
        "1",
        "-ar",
        &sample_rate.to_string(),
        "pipe:1",
    ]);

    let out = cmd.output().map_err(|e| {
        OneoffError::audio(format!("failed to run ffmpeg for audio decode: {e}"))
    })?;
    if !out.status.success() {
        return Err(OneoffError::audio(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let pcm = f32le_to_vec(&out.stdout)?;
    if pcm.is_empty() {
        return Err(OneoffError::audio(format!(
            "no audio samples decoded from '{}'",
            path.display()
        )));
    }
    Ok(pcm)
}

fn f32le_to_vec(bytes: &[u8]) -> OneoffResult<Vec<f32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(OneoffError::audio(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Extract one RGB24 frame of `size` at `source_time_sec`.
pub fn decode_video_frame_rgb24(
    path: &Path,
    size: (u32, u32),
    source_time_sec: f64,
) -> OneoffResult<Vec<u8>> {
    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{source_time_sec:.6}")])
        .arg("-i")
        .arg(path)
        .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            OneoffError::validation(format!("failed to run ffmpeg for frame extraction: {e}"))
        })?;
    if !out.status.success() {
        return Err(OneoffError::external("ffmpeg", out.status, &out.stderr));
    }

    let expected_len = size.0 as usize * size.1 as usize * 3;
    if expected_len == 0 {
        return Err(OneoffError::validation(
            "decoded video frame size is zero (invalid source dimensions)",
        ));
    }
    if out.stdout.len() < expected_len {
        return Err(OneoffError::validation(format!(
            "ffmpeg returned {} bytes for '{}' at {source_time_sec:.3}s, expected {expected_len}",
            out.stdout.len(),
            path.display()
        )));
    }
    let mut frame = out.stdout;
    frame.truncate(expected_len);
    Ok(frame)
}

/// Return `true` when `tool -version` runs successfully from `PATH`.
pub fn is_tool_on_path(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32le_decodes_little_endian_samples() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());
        assert_eq!(f32le_to_vec(&bytes).unwrap(), vec![0.5, -1.0]);
    }

    #[test]
    fn f32le_rejects_partial_samples() {
        assert!(f32le_to_vec(&[0, 0, 0]).is_err());
    }

    #[test]
    fn probe_missing_file_is_missing_resource() {
        let err = probe_media(Path::new("no/such/file.mp3")).unwrap_err();
        assert!(matches!(err, OneoffError::MissingResource { .. }));
    }
}
