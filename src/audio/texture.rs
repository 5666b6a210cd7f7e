use crate::audio::analysis::{AudioAnalysis, resample_linear};
use crate::foundation::core::FrameIndex;

pub const AUDIO_TEXTURE_WIDTH: u32 = 512;
pub const AUDIO_TEXTURE_HEIGHT: u32 = 256;

const W: usize = AUDIO_TEXTURE_WIDTH as usize;
const H: usize = AUDIO_TEXTURE_HEIGHT as usize;

/// First row holding waveform data; rows 2..=4 repeat it as a guard band so linear
/// filtering near the spectrum rows never blends the two signals.
const WAVEFORM_FIRST_ROW: usize = 2;

/// Inputs for one frame of the audio texture.
#[derive(Clone, Copy, Debug, Default)]
pub struct AudioFrame<'a> {
    pub spectrum: Option<&'a [f32]>,
    pub waveform: Option<&'a [f32]>,
    pub bass: f32,
    pub treble: f32,
}

impl<'a> AudioFrame<'a> {
    pub fn from_analysis(analysis: &'a AudioAnalysis, frame: FrameIndex) -> Self {
        Self {
            spectrum: Some(analysis.spectrum(frame)),
            waveform: Some(analysis.waveform(frame)),
            bass: analysis.bass(frame),
            treble: analysis.treble(frame),
        }
    }
}

/// Pack one frame into a row-major `512x256` single-channel byte image.
///
/// Rows 0 and 1 carry the spectrum. Without a spectrum, row 0 and 1 fall back to the
/// legacy bands: bass over columns `0..64` and treble over `256..320`. Rows `2..256`
/// carry the waveform, or stay zero when there is none.
pub fn pack_audio_texture(frame: &AudioFrame<'_>) -> Vec<u8> {
    let mut out = vec![0u8; W * H];

    let spectrum_row: Vec<u8> = match frame.spectrum {
        Some(spec) => fit_row(spec).into_iter().map(quantize).collect(),
        None => {
            let mut row = vec![0u8; W];
            row[..64].fill(quantize(frame.bass));
            row[256..320].fill(quantize(frame.treble));
            row
        }
    };
    out[..W].copy_from_slice(&spectrum_row);
    out[W..2 * W].copy_from_slice(&spectrum_row);

    if let Some(wave) = frame.waveform {
        let clamped: Vec<f32> = wave.iter().map(|v| v.clamp(0.0, 1.0)).collect();
        let wave_row: Vec<u8> = fit_row(&clamped).into_iter().map(quantize).collect();
        for row in out[WAVEFORM_FIRST_ROW * W..].chunks_exact_mut(W) {
            row.copy_from_slice(&wave_row);
        }
    }
    out
}

fn fit_row(values: &[f32]) -> Vec<f32> {
    if values.len() == W {
        values.to_vec()
    } else {
        resample_linear(values, W)
    }
}

fn quantize(v: f32) -> u8 {
    let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
    (v * 255.0 + 0.5) as u8
}
