use crate::foundation::error::{OneoffError, OneoffResult};

/// Absolute 0-based output frame index.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> OneoffResult<Self> {
        if den == 0 {
            return Err(OneoffError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(OneoffError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Build from a decimal rate as found in config files (`30`, `29.97`).
    pub fn from_rate(rate: f64) -> OneoffResult<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(OneoffError::validation(format!(
                "frame rate must be a positive number, got {rate}"
            )));
        }
        if rate.fract() == 0.0 && rate <= f64::from(u32::MAX) {
            return Self::new(rate as u32, 1);
        }
        Self::new((rate * 1000.0).round() as u32, 1000)
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Time of frame `idx` in seconds.
    pub fn frame_time(self, idx: FrameIndex) -> f64 {
        (idx.0 as f64) * f64::from(self.den) / f64::from(self.num)
    }

    /// Number of whole frames in `secs` (floor semantics).
    pub fn frames_in(self, secs: f64) -> u64 {
        (secs * self.as_f64()).floor().max(0.0) as u64
    }

    /// `ffmpeg` rate argument (`30/1`).
    pub fn ffmpeg_arg(self) -> String {
        format!("{}/{}", self.num, self.den)
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 2560,
            height: 1440,
        }
    }
}

impl Resolution {
    /// Reject sizes the yuv420p encoder cannot take.
    pub fn validate(self) -> OneoffResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(OneoffError::validation("resolution must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(OneoffError::validation(format!(
                "resolution {}x{} must be even (required for yuv420p output)",
                self.width, self.height
            )));
        }
        Ok(())
    }

    pub fn as_f32(self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}
