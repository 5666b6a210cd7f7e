use std::f32::consts::PI;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex, num_complex::Complex32};

use crate::assets::media;
use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::{OneoffError, OneoffResult};

/// Transform length of the short-time spectrum.
pub const FFT_SIZE: usize = 1024;
/// Frequency bins kept per frame.
pub const SPECTRUM_BINS: usize = 512;
/// Samples per waveform row.
pub const WAVEFORM_SAMPLES: usize = 256;
/// Weight of the previous frame in the per-bin exponential smoothing.
pub const SMOOTHING: f32 = 0.8;

const BASS_BINS: std::ops::Range<usize> = 0..32;
const TREBLE_BINS: std::ops::Range<usize> = 256..512;
const MIN_WAVEFORM_WINDOW: usize = 256;

/// Per-frame audio signals for one render job.
///
/// Every per-frame sequence has exactly `total_frames` entries.
pub struct AudioAnalysis {
    sample_rate: u32,
    fps: Fps,
    total_frames: usize,
    /// Frame-major, `SPECTRUM_BINS` per frame.
    spectrum: Vec<f32>,
    /// Frame-major, `WAVEFORM_SAMPLES` per frame.
    waveform: Vec<f32>,
    bass: Vec<f32>,
    treble: Vec<f32>,
}

impl AudioAnalysis {
    /// Decode `path` and analyze its first `duration` seconds.
    #[tracing::instrument(skip_all, fields(path = %path.display(), duration = duration, fps = fps.as_f64()))]
    pub fn from_file(path: &Path, duration: f64, fps: Fps) -> OneoffResult<Self> {
        if !path.exists() {
            return Err(OneoffError::missing("audio file", path));
        }
        let info = media::probe_media(path)
            .map_err(|e| OneoffError::audio(format!("probe '{}': {e}", path.display())))?;
        let sample_rate = info.sample_rate.ok_or_else(|| {
            OneoffError::audio(format!("no audio stream in '{}'", path.display()))
        })?;
        let samples = media::decode_audio_mono_f32(path, sample_rate, Some(duration))?;
        Self::from_samples(&samples, sample_rate, duration, fps)
    }

    /// Analyze already-decoded mono samples.
    pub fn from_samples(
        samples: &[f32],
        sample_rate: u32,
        duration: f64,
        fps: Fps,
    ) -> OneoffResult<Self> {
        if sample_rate == 0 {
            return Err(OneoffError::audio("sample rate must be non-zero"));
        }
        if samples.is_empty() {
            return Err(OneoffError::audio("no audio samples to analyze"));
        }
        let total_frames = fps.frames_in(duration) as usize;
        if total_frames == 0 {
            return Err(OneoffError::validation(format!(
                "duration {duration:.3}s at {} fps yields no frames",
                fps.as_f64()
            )));
        }

        let hop = (samples.len() / total_frames).max(1);
        tracing::info!(
            sample_rate,
            total_frames,
            hop,
            nyquist = sample_rate / 2,
            hz_per_bin = sample_rate as f32 / FFT_SIZE as f32,
            "analyzing audio"
        );

        let mut stft = Stft::new();
        let mut frames = stft.magnitudes(samples, hop)?;
        smooth(&mut frames);
        normalize(&mut frames);
        let (mut bass, mut treble) = legacy_bands(&frames);

        let natural = frames.len();
        if natural != total_frames {
            tracing::debug!(natural, total_frames, "resampling spectrum frame count");
            frames = resample_frames(&frames, total_frames);
            bass = resample_linear(&bass, total_frames);
            treble = resample_linear(&treble, total_frames);
        }

        let waveform = waveforms(samples, sample_rate, fps, total_frames);

        Ok(Self {
            sample_rate,
            fps,
            total_frames,
            spectrum: frames.into_iter().flatten().collect(),
            waveform,
            bass,
            treble,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn fps(&self) -> Fps {
        self.fps
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// 512-bin spectrum column; indices past the end read the last frame.
    pub fn spectrum(&self, frame: FrameIndex) -> &[f32] {
        let i = self.clamp(frame);
        &self.spectrum[i * SPECTRUM_BINS..(i + 1) * SPECTRUM_BINS]
    }

    /// 256-sample waveform row in `[0,1]`.
    pub fn waveform(&self, frame: FrameIndex) -> &[f32] {
        let i = self.clamp(frame);
        &self.waveform[i * WAVEFORM_SAMPLES..(i + 1) * WAVEFORM_SAMPLES]
    }

    pub fn bass(&self, frame: FrameIndex) -> f32 {
        self.bass[self.clamp(frame)]
    }

    pub fn treble(&self, frame: FrameIndex) -> f32 {
        self.treble[self.clamp(frame)]
    }

    fn clamp(&self, frame: FrameIndex) -> usize {
        (frame.0 as usize).min(self.total_frames - 1)
    }
}

impl fmt::Debug for AudioAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioAnalysis")
            .field("sample_rate", &self.sample_rate)
            .field("fps", &self.fps)
            .field("total_frames", &self.total_frames)
            .finish()
    }
}

struct Stft {
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl Stft {
    fn new() -> Self {
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(FFT_SIZE);
        Self {
            window: (0..FFT_SIZE).map(hann_periodic).collect(),
            input: plan.make_input_vec(),
            spectrum: plan.make_output_vec(),
            scratch: plan.make_scratch_vec(),
            plan,
        }
    }

    /// Centered, zero-padded frames every `hop` samples; `1 + len / hop` frames.
    fn magnitudes(&mut self, samples: &[f32], hop: usize) -> OneoffResult<Vec<Vec<f32>>> {
        let pad = FFT_SIZE / 2;
        let count = 1 + samples.len() / hop;
        let mut frames = Vec::with_capacity(count);
        for t in 0..count {
            let start = (t * hop) as isize - pad as isize;
            for (k, slot) in self.input.iter_mut().enumerate() {
                let idx = start + k as isize;
                let s = if idx >= 0 && (idx as usize) < samples.len() {
                    samples[idx as usize]
                } else {
                    0.0
                };
                *slot = s * self.window[k];
            }
            self.plan
                .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
                .map_err(|e| OneoffError::audio(format!("fft failed: {e}")))?;
            frames.push(
                self.spectrum[..SPECTRUM_BINS]
                    .iter()
                    .map(|c| c.norm())
                    .collect(),
            );
        }
        Ok(frames)
    }
}

fn hann_periodic(index: usize) -> f32 {
    0.5 - 0.5 * ((2.0 * PI * index as f32) / FFT_SIZE as f32).cos()
}

/// `S[0] = M[0]`, `S[t] = 0.8 S[t-1] + 0.2 M[t]`, per bin.
fn smooth(frames: &mut [Vec<f32>]) {
    for t in 1..frames.len() {
        let (prev, rest) = frames.split_at_mut(t);
        let prev = &prev[t - 1];
        for (cur, &p) in rest[0].iter_mut().zip(prev.iter()) {
            *cur = SMOOTHING * p + (1.0 - SMOOTHING) * *cur;
        }
    }
}

/// Divide by the global maximum; an all-zero matrix is left untouched.
fn normalize(frames: &mut [Vec<f32>]) {
    let max = frames
        .iter()
        .flat_map(|f| f.iter().copied())
        .fold(0.0f32, f32::max);
    if max > 0.0 {
        for v in frames.iter_mut().flat_map(|f| f.iter_mut()) {
            *v /= max;
        }
    }
}

fn legacy_bands(frames: &[Vec<f32>]) -> (Vec<f32>, Vec<f32>) {
    let mean = |f: &[f32]| f.iter().sum::<f32>() / f.len() as f32;
    frames
        .iter()
        .map(|f| (mean(&f[BASS_BINS]), mean(&f[TREBLE_BINS])))
        .unzip()
}

/// Linear interpolation of `src` onto `n` evenly spaced points spanning `0..=len-1`.
pub fn resample_linear(src: &[f32], n: usize) -> Vec<f32> {
    (0..n).map(|i| sample_at(src, position(i, src.len(), n))).collect()
}

fn resample_frames(frames: &[Vec<f32>], n: usize) -> Vec<Vec<f32>> {
    (0..n)
        .map(|i| {
            let pos = position(i, frames.len(), n);
            let i0 = pos.floor() as usize;
            let i1 = (i0 + 1).min(frames.len() - 1);
            let frac = (pos - i0 as f64) as f32;
            frames[i0]
                .iter()
                .zip(frames[i1].iter())
                .map(|(&a, &b)| a + (b - a) * frac)
                .collect()
        })
        .collect()
}

fn position(i: usize, src_len: usize, n: usize) -> f64 {
    if n <= 1 || src_len <= 1 {
        return 0.0;
    }
    i as f64 * (src_len - 1) as f64 / (n - 1) as f64
}

fn sample_at(src: &[f32], pos: f64) -> f32 {
    if src.is_empty() {
        return 0.0;
    }
    let i0 = (pos.floor() as usize).min(src.len() - 1);
    let i1 = (i0 + 1).min(src.len() - 1);
    let frac = (pos - i0 as f64) as f32;
    src[i0] + (src[i1] - src[i0]) * frac
}

fn waveforms(samples: &[f32], sample_rate: u32, fps: Fps, total_frames: usize) -> Vec<f32> {
    let window = ((sample_rate as f64 / 30.0).round() as usize).max(MIN_WAVEFORM_WINDOW);
    let mut out = Vec::with_capacity(total_frames * WAVEFORM_SAMPLES);
    for frame in 0..total_frames {
        let t = fps.frame_time(FrameIndex(frame as u64));
        let center = (t * sample_rate as f64) as usize;
        out.extend(waveform_row(samples, center, window));
    }
    out
}

/// One 256-sample row centered on `center`, remapped from `[-1,1]` to `[0,1]`.
fn waveform_row(samples: &[f32], center: usize, window: usize) -> Vec<f32> {
    let mut start = center.saturating_sub(window / 2);
    let end = (start + window).min(samples.len());
    if end.saturating_sub(start) < window {
        start = end.saturating_sub(window);
    }
    let slice = &samples[start.min(end)..end];

    let raw = if slice.len() >= WAVEFORM_SAMPLES {
        resample_linear(slice, WAVEFORM_SAMPLES)
    } else {
        let mut padded = slice.to_vec();
        padded.resize(WAVEFORM_SAMPLES, 0.0);
        padded
    };
    raw.into_iter()
        .map(|v| ((v + 1.0) * 0.5).clamp(0.0, 1.0))
        .collect()
}
