// ============================================================================
// ADJUSTMENT OPERATIONS — per-pixel tone and color adjustments
// ============================================================================
//
// Every adjustment is a pure per-pixel map over B, G and R.  Alpha passes
// through untouched.  Rows are processed in parallel via `map_pixels`.
// ============================================================================

use crate::canvas::{CH_B, CH_G, CH_R, Luma, PixelBuffer, round_clamp};
use crate::error::{EngineError, Result, require_positive};
use crate::ops::{apply_luts, map_pixels};

// ============================================================================
// HELPERS
// ============================================================================

/// Build a single-channel LUT from a float transfer function.
fn build_lut<F: Fn(f32) -> f32>(f: F) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = round_clamp(f(i as f32));
    }
    lut
}

/// Fast integer hash.
#[inline]
fn hash_u32(mut x: u32) -> u32 {
    x = x.wrapping_mul(0x9E3779B9);
    x ^= x >> 16;
    x = x.wrapping_mul(0x85EBCA6B);
    x ^= x >> 13;
    x = x.wrapping_mul(0xC2B2AE35);
    x ^= x >> 16;
    x
}

/// Hash to f32 in [0, 1).
#[inline]
fn hash_f32(x: u32, y: u32, seed: u32) -> f32 {
    let h = hash_u32(
        x.wrapping_mul(374761393)
            .wrapping_add(y.wrapping_mul(668265263))
            .wrapping_add(seed),
    );
    (h & 0x00FFFFFF) as f32 / 16777216.0
}

// ============================================================================
// DISPLAY PIPELINE STAGES
// ============================================================================

/// Invert B, G and R.
pub fn negate(src: &PixelBuffer) -> PixelBuffer {
    map_pixels(src, |_, _, px| [255 - px[0], 255 - px[1], 255 - px[2], px[3]])
}

/// Add `delta` to every color channel, clamped to `[0, 255]`.
pub fn brightness(src: &PixelBuffer, delta: i32) -> PixelBuffer {
    if delta == 0 {
        return src.clone();
    }
    let shift = |v: u8| (v as i32 + delta).clamp(0, 255) as u8;
    map_pixels(src, |_, _, px| [shift(px[0]), shift(px[1]), shift(px[2]), px[3]])
}

/// White where the `(R + G + B) / 3` gray is at least `threshold`, black elsewhere.
pub fn binary_threshold(src: &PixelBuffer, threshold: u8) -> PixelBuffer {
    map_pixels(src, |_, _, px| {
        let gray = Luma::Average.value(px[CH_R], px[CH_G], px[CH_B]);
        let v = if gray >= threshold as f32 { 255 } else { 0 };
        [v, v, v, px[3]]
    })
}

/// Target color plus per-channel tolerance for the selection highlight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorSelection {
    /// Target color as `[r, g, b]`.
    pub target: [u8; 3],
    pub tolerance: u8,
}

impl ColorSelection {
    pub fn new(target: [u8; 3], tolerance: u8) -> Self {
        Self { target, tolerance }
    }

    /// True when every color channel is within `tolerance` of the target.
    #[inline]
    pub fn matches(&self, bgra: [u8; 4]) -> bool {
        let tol = self.tolerance;
        bgra[CH_R].abs_diff(self.target[0]) <= tol
            && bgra[CH_G].abs_diff(self.target[1]) <= tol
            && bgra[CH_B].abs_diff(self.target[2]) <= tol
    }
}

/// Keep matching pixels, dim everything else to half-intensity average gray.
pub fn color_selection(src: &PixelBuffer, selection: &ColorSelection) -> PixelBuffer {
    map_pixels(src, |_, _, px| {
        if selection.matches(px) {
            px
        } else {
            let dim = round_clamp(Luma::Average.value(px[CH_R], px[CH_G], px[CH_B]) * 0.5);
            [dim, dim, dim, px[3]]
        }
    })
}

// ============================================================================
// TONE
// ============================================================================

/// Replicate the chosen luma into B, G and R.
pub fn grayscale(src: &PixelBuffer, luma: Luma) -> PixelBuffer {
    map_pixels(src, |_, _, px| {
        let v = luma.of_bgra(&px);
        [v, v, v, px[3]]
    })
}

/// `255 · (v / 255)^(1 / gamma)`.  Gamma must be finite and positive.
pub fn gamma(src: &PixelBuffer, gamma: f32) -> Result<PixelBuffer> {
    let gamma = require_positive("gamma", gamma)?;
    let inv = 1.0 / gamma;
    let lut = build_lut(|v| 255.0 * (v / 255.0).powf(inv));
    Ok(apply_luts(src, &[lut; 3]))
}

/// `v · gain`, clamped.  Gain must be finite and positive.
pub fn gain(src: &PixelBuffer, gain: f32) -> Result<PixelBuffer> {
    let gain = require_positive("gain", gain)?;
    let lut = build_lut(|v| v * gain);
    Ok(apply_luts(src, &[lut; 3]))
}

// ============================================================================
// DISTORTION
// ============================================================================

pub const MAX_DISTORTION_LEVEL: f32 = 100.0;

/// Deterministic per-pixel noise.  Each of B, G, R is shifted by
/// `round((h - 0.5) · 2 · level · 2.55)` for an independent hash `h ∈ [0, 1)`,
/// so the same `(level, seed)` always yields the same image.
pub fn distort(src: &PixelBuffer, level: f32, seed: u32) -> Result<PixelBuffer> {
    if !level.is_finite() || !(0.0..=MAX_DISTORTION_LEVEL).contains(&level) {
        return Err(EngineError::invalid(
            "level",
            format!("must be within 0..=100, got {}", level),
        ));
    }
    let amplitude = 2.0 * level * 2.55;
    Ok(map_pixels(src, |x, y, px| {
        let mut out = px;
        for c in 0..3 {
            let channel_seed = seed.wrapping_add((c as u32 + 1).wrapping_mul(0x27D4EB2F));
            let h = hash_f32(x, y, channel_seed);
            let offset = ((h - 0.5) * amplitude + 0.5).floor();
            out[c] = (px[c] as f32 + offset).clamp(0.0, 255.0) as u8;
        }
        out
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> PixelBuffer {
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 30) as u8, (y * 40) as u8, ((x + y) * 15) as u8, 200]);
            }
        }
        PixelBuffer::from_raw(w, h, data).unwrap()
    }

    #[test]
    fn negate_twice_is_identity_and_keeps_alpha() {
        let img = gradient(5, 4);
        let once = negate(&img);
        assert_eq!(once.pixel(1, 1), [225, 215, 225, 200]);
        assert_eq!(negate(&once), img);
    }

    #[test]
    fn brightness_clamps_both_ways() {
        let img = PixelBuffer::new_filled(1, 1, [10, 128, 250, 9]);
        assert_eq!(brightness(&img, 20).pixel(0, 0), [30, 148, 255, 9]);
        assert_eq!(brightness(&img, -20).pixel(0, 0), [0, 108, 230, 9]);
        assert_eq!(brightness(&img, 0), img);
    }

    #[test]
    fn threshold_uses_channel_average() {
        // (R + G + B) / 3 = (90 + 60 + 30) / 3 = 60
        let img = PixelBuffer::new_filled(1, 1, [30, 60, 90, 77]);
        assert_eq!(binary_threshold(&img, 60).pixel(0, 0), [255, 255, 255, 77]);
        assert_eq!(binary_threshold(&img, 61).pixel(0, 0), [0, 0, 0, 77]);
    }

    #[test]
    fn color_selection_keeps_matches_and_dims_the_rest() {
        let mut data = Vec::new();
        data.extend_from_slice(&[10, 20, 200, 255]); // r=200 g=20 b=10
        data.extend_from_slice(&[100, 100, 100, 128]);
        let img = PixelBuffer::from_raw(2, 1, data).unwrap();
        let sel = ColorSelection::new([195, 25, 15], 5);
        let out = color_selection(&img, &sel);
        assert_eq!(out.pixel(0, 0), img.pixel(0, 0));
        assert_eq!(out.pixel(1, 0), [50, 50, 50, 128]);
    }

    #[test]
    fn selection_tolerance_is_inclusive() {
        let sel = ColorSelection::new([100, 100, 100], 3);
        assert!(sel.matches([103, 97, 100, 0]));
        assert!(!sel.matches([104, 100, 100, 0]));
    }

    #[test]
    fn grayscale_formulas_differ() {
        let img = PixelBuffer::new_filled(1, 1, [0, 0, 255, 255]);
        let avg = grayscale(&img, Luma::Average).pixel(0, 0)[0];
        let itu = grayscale(&img, Luma::Itu601).pixel(0, 0)[0];
        let per = grayscale(&img, Luma::Perceptual).pixel(0, 0)[0];
        assert_eq!(avg, 85);
        assert_eq!(itu, 76);
        assert_eq!(per, 54);
    }

    #[test]
    fn gamma_one_and_gain_one_are_identity() {
        let img = gradient(6, 6);
        assert_eq!(gamma(&img, 1.0).unwrap(), img);
        assert_eq!(gain(&img, 1.0).unwrap(), img);
    }

    #[test]
    fn gamma_brightens_midtones() {
        let img = PixelBuffer::new_filled(1, 1, [64, 128, 0, 255]);
        let out = gamma(&img, 2.0).unwrap().pixel(0, 0);
        assert!(out[0] > 64 && out[1] > 128);
        assert_eq!(out[2], 0);
    }

    #[test]
    fn gain_and_gamma_reject_bad_values() {
        let img = PixelBuffer::new(1, 1);
        assert!(gamma(&img, 0.0).is_err());
        assert!(gamma(&img, f32::NAN).is_err());
        assert!(gain(&img, -2.0).is_err());
        assert!(gain(&img, f32::INFINITY).is_err());
    }

    #[test]
    fn distortion_is_deterministic_and_bounded() {
        let img = gradient(8, 8);
        let a = distort(&img, 40.0, 7).unwrap();
        let b = distort(&img, 40.0, 7).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, distort(&img, 40.0, 8).unwrap());
        let max_shift = (40.0f32 * 2.55).ceil() as i32;
        for (o, s) in a.data().chunks_exact(4).zip(img.data().chunks_exact(4)) {
            for c in 0..3 {
                assert!((o[c] as i32 - s[c] as i32).abs() <= max_shift);
            }
            assert_eq!(o[3], s[3]);
        }
    }

    #[test]
    fn distortion_level_zero_is_identity() {
        let img = gradient(4, 4);
        assert_eq!(distort(&img, 0.0, 99).unwrap(), img);
    }

    #[test]
    fn distortion_rejects_out_of_range_levels() {
        let img = PixelBuffer::new(1, 1);
        assert!(distort(&img, 100.5, 0).is_err());
        assert!(distort(&img, -1.0, 0).is_err());
        assert!(distort(&img, f32::NAN, 0).is_err());
    }
}
