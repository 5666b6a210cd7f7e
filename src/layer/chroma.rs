use crate::render::{Frame, KEY_GREEN};
use crate::timeline::manifest::Greenscreen;

/// Greens seen in rendered greenscreen footage, normalized onto [`KEY_GREEN`].
pub const REFERENCE_GREENS: [[u8; 3]; 4] = [[0, 214, 0], [0, 204, 0], [26, 230, 26], [0, 230, 0]];

/// Euclidean distance between two colors in normalized RGB.
pub fn color_distance(a: [u8; 3], b: [u8; 3]) -> f32 {
    let sq: f32 = a
        .iter()
        .zip(b)
        .map(|(&x, y)| {
            let d = (f32::from(x) - f32::from(y)) / 255.0;
            d * d
        })
        .sum();
    sq.sqrt()
}

/// Reassign every pixel close to a reference green to the canonical key color.
///
/// Returns the number of pixels changed. Does nothing when the options are disabled.
pub fn normalize_greens(frame: &mut Frame, opts: &Greenscreen) -> usize {
    if !opts.enabled {
        return 0;
    }
    let mut references = REFERENCE_GREENS.to_vec();
    if !references.contains(&opts.color) {
        references.push(opts.color);
    }

    let mut changed = 0;
    for px in frame.data.chunks_exact_mut(3) {
        let rgb = [px[0], px[1], px[2]];
        if rgb == KEY_GREEN {
            continue;
        }
        if references
            .iter()
            .any(|r| color_distance(rgb, *r) < opts.threshold)
        {
            px.copy_from_slice(&KEY_GREEN);
            changed += 1;
        }
    }
    changed
}
