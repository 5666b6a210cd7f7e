use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::{RgbImage, imageops};

use crate::assets::media::{decode_video_frame_rgb24, probe_media};
use crate::foundation::core::Resolution;
use crate::foundation::error::{OneoffError, OneoffResult};
use crate::render::Frame;

/// Seconds kept between the last extracted frame and the end of a clip.
pub const END_MARGIN_SECS: f64 = 0.1;

/// Probed facts about one foreground clip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipInfo {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

/// Source time inside a clip for output time `t`, held back from the clip's end.
pub fn source_time(t: f64, clip_start: f64, clip_duration: f64) -> f64 {
    let local = (t - clip_start).max(0.0);
    if clip_duration > 0.0 && local >= clip_duration {
        (clip_duration - END_MARGIN_SECS).max(0.0)
    } else {
        local
    }
}

/// Extracts and scales clip frames through ffmpeg. Probe results are cached per path.
#[derive(Debug, Default)]
pub struct ClipReader {
    probes: HashMap<PathBuf, ClipInfo>,
}

impl ClipReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, path: &Path) -> OneoffResult<ClipInfo> {
        if let Some(info) = self.probes.get(path) {
            return Ok(*info);
        }
        let media = probe_media(path)?;
        let (width, height) = media.video_size.ok_or_else(|| {
            OneoffError::validation(format!("'{}' has no video stream", path.display()))
        })?;
        let info = ClipInfo {
            width,
            height,
            duration: media.duration.unwrap_or(0.0),
        };
        tracing::debug!(clip = %path.display(), width, height, duration = info.duration, "probed clip");
        self.probes.insert(path.to_path_buf(), info);
        Ok(info)
    }

    /// Frame of the clip at `source_secs`, rescaled to exactly `canvas`.
    pub fn frame_at(
        &mut self,
        path: &Path,
        source_secs: f64,
        canvas: Resolution,
    ) -> OneoffResult<Frame> {
        let info = self.info(path)?;
        let rgb = decode_video_frame_rgb24(path, (info.width, info.height), source_secs)?;
        fit_to_canvas(info.width, info.height, rgb, canvas)
    }
}

/// Scale an RGB24 image to `canvas` with Lanczos3.
pub fn fit_to_canvas(
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    canvas: Resolution,
) -> OneoffResult<Frame> {
    if (width, height) == (canvas.width, canvas.height) {
        return Frame::new(canvas, rgb);
    }
    let img = RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
        OneoffError::validation(format!("clip frame buffer does not hold {width}x{height} rgb"))
    })?;
    let scaled = imageops::resize(
        &img,
        canvas.width,
        canvas.height,
        imageops::FilterType::Lanczos3,
    );
    Frame::new(canvas, scaled.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_time_is_clip_relative_and_clamped() {
        assert_eq!(source_time(12.0, 10.0, 5.0), 2.0);
        assert_eq!(source_time(9.0, 10.0, 5.0), 0.0);
        assert!((source_time(15.0, 10.0, 5.0) - 4.9).abs() < 1e-9);
        assert!((source_time(40.0, 10.0, 5.0) - 4.9).abs() < 1e-9);
        assert_eq!(source_time(40.0, 10.0, 0.0), 30.0);
    }

    #[test]
    fn fit_scales_to_exact_canvas() {
        let canvas = Resolution {
            width: 8,
            height: 4,
        };
        let rgb = [90u8, 10, 200].repeat(4 * 2);
        let frame = fit_to_canvas(4, 2, rgb, canvas).unwrap();
        assert_eq!(frame.size(), canvas);
        assert!(frame.is_solid([90, 10, 200]));
    }

    #[test]
    fn fit_rejects_short_buffers() {
        let canvas = Resolution {
            width: 8,
            height: 4,
        };
        assert!(fit_to_canvas(4, 2, vec![0; 5], canvas).is_err());
    }
}
