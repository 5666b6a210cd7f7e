use crate::foundation::error::{OneoffError, OneoffResult};
use crate::render::{Frame, KEY_GREEN};

/// Keying distance below which a pixel counts as key color.
pub const KEY_SIMILARITY: f32 = 0.38;

/// Radius of the box blur applied to the key alpha.
pub const ALPHA_BLUR_RADIUS: u32 = 2;

/// Alpha mask of `fg`: 0 where the pixel is within [`KEY_SIMILARITY`] of `key`, 255 elsewhere.
pub fn key_alpha(fg: &Frame, key: [u8; 3], similarity: f32) -> Vec<u8> {
    let scale = 255.0 * 3f32.sqrt();
    fg.pixels()
        .map(|px| {
            let sq: f32 = px
                .iter()
                .zip(key)
                .map(|(&c, k)| {
                    let d = f32::from(c) - f32::from(k);
                    d * d
                })
                .sum();
            if sq.sqrt() / scale <= similarity { 0 } else { 255 }
        })
        .collect()
}

/// Single-pass box blur of an 8-bit plane, edges clamped.
pub fn box_blur_alpha(
    alpha: &[u8],
    width: u32,
    height: u32,
    radius: u32,
) -> OneoffResult<Vec<u8>> {
    let expected = (width as usize) * (height as usize);
    if alpha.len() != expected {
        return Err(OneoffError::validation(format!(
            "box_blur_alpha expects {expected} bytes, got {}",
            alpha.len()
        )));
    }
    if radius == 0 || expected == 0 {
        return Ok(alpha.to_vec());
    }

    let mut tmp = vec![0u8; expected];
    let mut out = vec![0u8; expected];
    horizontal_pass(alpha, &mut tmp, width, height, radius as i32);
    vertical_pass(&tmp, &mut out, width, height, radius as i32);
    Ok(out)
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, radius: i32) {
    let w = width as i32;
    let taps = (2 * radius + 1) as u32;
    for y in 0..height as i32 {
        for x in 0..w {
            let mut acc = 0u32;
            for dx in -radius..=radius {
                let sx = (x + dx).clamp(0, w - 1);
                acc += u32::from(src[(y * w + sx) as usize]);
            }
            dst[(y * w + x) as usize] = div_round(acc, taps);
        }
    }
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, radius: i32) {
    let w = width as i32;
    let h = height as i32;
    let taps = (2 * radius + 1) as u32;
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u32;
            for dy in -radius..=radius {
                let sy = (y + dy).clamp(0, h - 1);
                acc += u32::from(src[(sy * w + x) as usize]);
            }
            dst[(y * w + x) as usize] = div_round(acc, taps);
        }
    }
}

fn div_round(acc: u32, n: u32) -> u8 {
    ((acc + n / 2) / n).min(255) as u8
}

/// Straight-alpha `fg` over `bg` for one pixel.
pub fn over(bg: [u8; 3], fg: [u8; 3], alpha: u8) -> [u8; 3] {
    let a = u16::from(alpha);
    let inv = 255 - a;
    let mut out = [0u8; 3];
    for i in 0..3 {
        out[i] = add_sat_u8(mul_div255(u16::from(fg[i]), a), mul_div255(u16::from(bg[i]), inv));
    }
    out
}

/// Key the canonical green out of `fg`, soften the alpha and composite it over `bg`.
pub fn key_over(fg: &Frame, bg: &Frame) -> OneoffResult<Frame> {
    if fg.size() != bg.size() {
        return Err(OneoffError::validation(format!(
            "foreground {}x{} does not match background {}x{}",
            fg.width, fg.height, bg.width, bg.height
        )));
    }
    let alpha = key_alpha(fg, KEY_GREEN, KEY_SIMILARITY);
    let alpha = box_blur_alpha(&alpha, fg.width, fg.height, ALPHA_BLUR_RADIUS)?;

    let mut data = Vec::with_capacity(bg.data.len());
    for ((f, b), &a) in fg.pixels().zip(bg.pixels()).zip(&alpha) {
        data.extend_from_slice(&over([b[0], b[1], b[2]], [f[0], f[1], f[2]], a));
    }
    Frame::new(bg.size(), data)
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Resolution;

    const SIZE: Resolution = Resolution {
        width: 8,
        height: 6,
    };

    #[test]
    fn key_green_foreground_shows_background() {
        let fg = Frame::solid(SIZE, KEY_GREEN);
        let bg = Frame::solid(SIZE, [10, 20, 30]);
        let out = key_over(&fg, &bg).unwrap();
        assert_eq!(out, bg);
    }

    #[test]
    fn opaque_foreground_covers_background() {
        let fg = Frame::solid(SIZE, [200, 0, 0]);
        let bg = Frame::solid(SIZE, [0, 0, 200]);
        let out = key_over(&fg, &bg).unwrap();
        assert!(out.is_solid([200, 0, 0]));
    }

    #[test]
    fn near_key_colors_are_keyed() {
        let fg = Frame::solid(
            Resolution {
                width: 2,
                height: 1,
            },
            [40, 180, 40],
        );
        assert_eq!(key_alpha(&fg, KEY_GREEN, KEY_SIMILARITY), vec![0, 0]);
        let red = Frame::solid(fg.size(), [255, 0, 0]);
        assert_eq!(key_alpha(&red, KEY_GREEN, KEY_SIMILARITY), vec![255, 255]);
    }

    #[test]
    fn blur_softens_a_hard_edge() {
        let (w, h) = (10u32, 1u32);
        let alpha: Vec<u8> = (0..w).map(|x| if x < 5 { 0 } else { 255 }).collect();
        let out = box_blur_alpha(&alpha, w, h, 2).unwrap();
        assert_eq!(out[0], 0);
        assert_eq!(out[9], 255);
        assert!(out[4] > 0 && out[4] < 255);
        assert!(out[5] > 0 && out[5] < 255);
    }

    #[test]
    fn blur_keeps_constant_planes() {
        let alpha = vec![255u8; 12];
        assert_eq!(box_blur_alpha(&alpha, 4, 3, 2).unwrap(), alpha);
        assert_eq!(box_blur_alpha(&[1, 2, 3], 3, 1, 0).unwrap(), vec![1, 2, 3]);
        assert!(box_blur_alpha(&[0; 5], 2, 2, 2).is_err());
    }

    #[test]
    fn mismatched_layers_are_rejected() {
        let fg = Frame::solid(SIZE, KEY_GREEN);
        let bg = Frame::black(Resolution {
            width: 4,
            height: 4,
        });
        assert!(key_over(&fg, &bg).is_err());
    }
}
