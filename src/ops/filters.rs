// ============================================================================
// IMAGE FILTERS — generic 2D convolution, blur presets, median
// ============================================================================
//
// Every linear filter here is a parameterization of `convolve`: a square
// kernel applied over an edge-replicated padded copy of the source, B, G and
// R handled independently, alpha copied through untouched.

use rayon::prelude::*;

use crate::canvas::{BPP, PixelBuffer, round_clamp};
use crate::error::{EngineError, Result, require_odd, require_positive};
use crate::ops::map_pixels;

// ============================================================================
// KERNEL
// ============================================================================

/// Square convolution kernel plus the multiplier applied after the weighted sum.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    size: u32,
    weights: Vec<f32>,
    multiplier: f32,
}

impl Kernel {
    /// Build a kernel from row-major `weights`.  `size` must be odd.
    pub fn new(size: u32, weights: Vec<f32>, multiplier: f32) -> Result<Self> {
        require_odd("kernel size", size, 1)?;
        let expected = size as usize * size as usize;
        if weights.len() != expected {
            return Err(EngineError::invalid(
                "kernel weights",
                format!("expected {} weights for a {}x{} kernel, got {}", expected, size, size, weights.len()),
            ));
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(EngineError::invalid("kernel weights", "all weights must be finite"));
        }
        if !multiplier.is_finite() {
            return Err(EngineError::invalid("multiplier", format!("must be finite, got {}", multiplier)));
        }
        Ok(Self { size, weights, multiplier })
    }

    /// 1 at the center, 0 elsewhere.
    pub fn identity(size: u32) -> Result<Self> {
        require_odd("kernel size", size, 1)?;
        let n = size as usize;
        let mut weights = vec![0.0; n * n];
        weights[(n / 2) * n + n / 2] = 1.0;
        Self::new(size, weights, 1.0)
    }

    /// All-ones kernel averaged by `1 / size²`.
    pub fn box_blur(size: u32) -> Result<Self> {
        require_odd("blur size", size, 3)?;
        let n = size as usize * size as usize;
        Self::new(size, vec![1.0; n], 1.0 / n as f32)
    }

    /// Analytic Gaussian `exp(-(dx² + dy²) / 2σ²)`, normalized by its own sum.
    pub fn gaussian(size: u32, sigma: f32) -> Result<Self> {
        require_odd("gaussian size", size, 3)?;
        require_positive("sigma", sigma)?;
        let weights = gaussian_weights(size, sigma);
        let sum: f32 = weights.iter().sum();
        Self::new(size, weights, 1.0 / sum)
    }

    pub fn size(&self) -> u32 { self.size }

    pub fn weights(&self) -> &[f32] { &self.weights }

    pub fn multiplier(&self) -> f32 { self.multiplier }

    /// Sum of all weights.
    pub fn sum(&self) -> f32 {
        self.weights.iter().sum()
    }
}

/// Unnormalized Gaussian weights for an odd `size`, row-major.
pub(crate) fn gaussian_weights(size: u32, sigma: f32) -> Vec<f32> {
    let r = (size / 2) as i32;
    let s2 = 2.0 * sigma * sigma;
    let mut weights = Vec::with_capacity(size as usize * size as usize);
    for dy in -r..=r {
        for dx in -r..=r {
            weights.push((-((dx * dx + dy * dy) as f32) / s2).exp());
        }
    }
    weights
}

// ============================================================================
// PRESETS
// ============================================================================

/// Fixed 3×3 kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelPreset {
    /// High-boost sharpen: 9 at center, -1 around.
    HighPass,
    Laplacian,
    Emboss,
    SobelX,
    SobelY,
}

impl KernelPreset {
    pub fn all() -> &'static [KernelPreset] {
        &[
            KernelPreset::HighPass,
            KernelPreset::Laplacian,
            KernelPreset::Emboss,
            KernelPreset::SobelX,
            KernelPreset::SobelY,
        ]
    }

    pub fn weights(self) -> [f32; 9] {
        match self {
            KernelPreset::HighPass => [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0],
            KernelPreset::Laplacian => [0.0, -1.0, 0.0, -1.0, 4.0, -1.0, 0.0, -1.0, 0.0],
            KernelPreset::Emboss => [-2.0, -1.0, 0.0, -1.0, 1.0, 1.0, 0.0, 1.0, 2.0],
            KernelPreset::SobelX => SOBEL_X,
            KernelPreset::SobelY => SOBEL_Y,
        }
    }

    pub fn kernel(self) -> Kernel {
        Kernel { size: 3, weights: self.weights().to_vec(), multiplier: 1.0 }
    }
}

pub(crate) const SOBEL_X: [f32; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];
pub(crate) const SOBEL_Y: [f32; 9] = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];
pub(crate) const PREWITT_X: [f32; 9] = [-1.0, 0.0, 1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 1.0];
pub(crate) const PREWITT_Y: [f32; 9] = [-1.0, -1.0, -1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

// ============================================================================
// CONVOLUTION ENGINE
// ============================================================================

/// Edge-replicated copy of `src` with a `pad`-pixel border on every side.
/// Returns (bytes, padded width, padded height).
pub(crate) fn pad_replicate(src: &PixelBuffer, pad: u32) -> (Vec<u8>, usize, usize) {
    let pw = (src.width() + 2 * pad) as usize;
    let ph = (src.height() + 2 * pad) as usize;
    let mut out = vec![0u8; pw * ph * BPP];
    out.par_chunks_mut(pw * BPP).enumerate().for_each(|(py, row)| {
        let sy = py as i64 - pad as i64;
        for px in 0..pw {
            let sx = px as i64 - pad as i64;
            row[px * BPP..(px + 1) * BPP].copy_from_slice(&src.pixel_clamped(sx, sy));
        }
    });
    (out, pw, ph)
}

/// Unscaled weighted sums per pixel for B, G and R: `Σ k[i,j]·padded[x+i, y+j]`.
/// Result is row-major, three floats per pixel.
pub(crate) fn weighted_sums(src: &PixelBuffer, size: u32, weights: &[f32]) -> Vec<f32> {
    let w = src.width() as usize;
    let h = src.height() as usize;
    let k = size as usize;
    let (padded, pw, _) = pad_replicate(src, size / 2);

    let mut sums = vec![0.0f32; w * h * 3];
    if w == 0 {
        return sums;
    }
    sums.par_chunks_mut(w * 3).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let mut acc = [0.0f32; 3];
            for j in 0..k {
                let prow = (y + j) * pw;
                for i in 0..k {
                    let wgt = weights[j * k + i];
                    if wgt == 0.0 {
                        continue;
                    }
                    let pi = (prow + x + i) * BPP;
                    acc[0] += wgt * padded[pi] as f32;
                    acc[1] += wgt * padded[pi + 1] as f32;
                    acc[2] += wgt * padded[pi + 2] as f32;
                }
            }
            row[x * 3..x * 3 + 3].copy_from_slice(&acc);
        }
    });
    sums
}

/// Apply `kernel` to B, G and R: `round(multiplier · Σ)`, clamped to a byte.
/// Alpha is copied from the source.
pub fn convolve(src: &PixelBuffer, kernel: &Kernel) -> PixelBuffer {
    if src.is_empty() {
        return src.clone();
    }
    let sums = weighted_sums(src, kernel.size, &kernel.weights);
    let m = kernel.multiplier;
    let src_raw = src.data();
    let mut out = vec![0u8; src_raw.len()];
    out.par_chunks_mut(BPP).enumerate().for_each(|(i, px)| {
        px[0] = round_clamp(m * sums[i * 3]);
        px[1] = round_clamp(m * sums[i * 3 + 1]);
        px[2] = round_clamp(m * sums[i * 3 + 2]);
        px[3] = src_raw[i * BPP + 3];
    });
    PixelBuffer::from_parts(src.width(), src.height(), out)
}

// ---------------------------------------------------------------------------
//  Derived linear filters
// ---------------------------------------------------------------------------

pub fn box_blur(src: &PixelBuffer, size: u32) -> Result<PixelBuffer> {
    let kernel = Kernel::box_blur(size)?;
    Ok(convolve(src, &kernel))
}

pub fn gaussian_blur(src: &PixelBuffer, size: u32, sigma: f32) -> Result<PixelBuffer> {
    let kernel = Kernel::gaussian(size, sigma)?;
    Ok(convolve(src, &kernel))
}

pub fn apply_preset(src: &PixelBuffer, preset: KernelPreset) -> PixelBuffer {
    convolve(src, &preset.kernel())
}

// ============================================================================
// MEDIAN (non-linear, bypasses weighted summation)
// ============================================================================

/// Per-channel median over a `size × size` edge-replicated window.
/// Alpha is copied from the source.
pub fn median(src: &PixelBuffer, size: u32) -> Result<PixelBuffer> {
    require_odd("median size", size, 3)?;
    if src.is_empty() {
        return Ok(src.clone());
    }
    let w = src.width() as usize;
    let k = size as usize;
    let (padded, pw, _) = pad_replicate(src, size / 2);
    let src_raw = src.data();
    let stride = w * BPP;
    let mut out = vec![0u8; src_raw.len()];

    out.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let mut channels: [Vec<u8>; 3] = [
            Vec::with_capacity(k * k),
            Vec::with_capacity(k * k),
            Vec::with_capacity(k * k),
        ];
        for x in 0..w {
            for c in &mut channels {
                c.clear();
            }
            for j in 0..k {
                let prow = (y + j) * pw;
                for i in 0..k {
                    let pi = (prow + x + i) * BPP;
                    for (c, values) in channels.iter_mut().enumerate() {
                        values.push(padded[pi + c]);
                    }
                }
            }
            let pi = x * BPP;
            for (c, values) in channels.iter_mut().enumerate() {
                values.sort_unstable();
                row_out[pi + c] = values[values.len() / 2];
            }
            row_out[pi + 3] = src_raw[y * stride + pi + 3];
        }
    });

    Ok(PixelBuffer::from_parts(src.width(), src.height(), out))
}

// ============================================================================
// CHANNEL ISOLATION (filter modes)
// ============================================================================

/// Keep one color channel (`CH_B`, `CH_G` or `CH_R`) and zero the other two.
/// Alpha is kept.
pub fn isolate_channel(src: &PixelBuffer, channel: usize) -> PixelBuffer {
    map_pixels(src, |_, _, px| {
        let mut out = [0, 0, 0, px[3]];
        if channel < 3 {
            out[channel] = px[channel];
        }
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{CH_B, CH_R};

    fn gradient(w: u32, h: u32) -> PixelBuffer {
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 20) as u8, (y * 30) as u8, ((x + y) * 7) as u8, (100 + x) as u8]);
            }
        }
        PixelBuffer::from_raw(w, h, data).unwrap()
    }

    #[test]
    fn identity_kernel_returns_input() {
        let img = gradient(6, 5);
        for size in [1, 3, 5] {
            let out = convolve(&img, &Kernel::identity(size).unwrap());
            assert_eq!(out, img);
        }
    }

    #[test]
    fn kernel_validation() {
        assert!(Kernel::new(2, vec![0.0; 4], 1.0).is_err());
        assert!(Kernel::new(3, vec![0.0; 8], 1.0).is_err());
        assert!(Kernel::new(3, vec![0.0; 9], f32::NAN).is_err());
        assert!(Kernel::new(3, vec![f32::INFINITY; 9], 1.0).is_err());
        assert!(Kernel::box_blur(1).is_err());
        assert!(Kernel::gaussian(5, 0.0).is_err());
        assert!(Kernel::gaussian(4, 1.0).is_err());
    }

    #[test]
    fn gaussian_multiplier_is_inverse_of_sum() {
        let k = Kernel::gaussian(5, 1.4).unwrap();
        assert!((k.sum() * k.multiplier() - 1.0).abs() < 1e-6);
        // Symmetric and peaked at the center.
        let w = k.weights();
        assert_eq!(w[0], w[24]);
        assert!(w[12] > w[11]);
    }

    #[test]
    fn flat_image_survives_blurs() {
        let img = PixelBuffer::new_filled(9, 7, [40, 120, 200, 255]);
        assert_eq!(gaussian_blur(&img, 5, 1.4).unwrap(), img);
        assert_eq!(box_blur(&img, 3).unwrap(), img);
        assert_eq!(median(&img, 5).unwrap(), img);
    }

    #[test]
    fn box_blur_averages_with_edge_replication() {
        // Single bright pixel in the corner of a 3x3 black image.
        let mut data = vec![0u8; 36];
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }
        data[0] = 90;
        let img = PixelBuffer::from_raw(3, 3, data).unwrap();
        let out = box_blur(&img, 3).unwrap();
        // The corner sees itself four times through the replicated border.
        assert_eq!(out.pixel(0, 0)[0], 40);
        assert_eq!(out.pixel(1, 1)[0], 10);
        assert_eq!(out.pixel(2, 2)[0], 0);
        assert_eq!(out.pixel(2, 2)[3], 255);
    }

    #[test]
    fn alpha_is_copied_not_filtered() {
        let img = gradient(5, 5);
        let out = apply_preset(&img, KernelPreset::Laplacian);
        for y in 0..5 {
            for x in 0..5 {
                assert_eq!(out.pixel(x, y)[3], img.pixel(x, y)[3]);
            }
        }
    }

    #[test]
    fn laplacian_of_flat_is_black() {
        let img = PixelBuffer::new_filled(4, 4, [10, 200, 90, 255]);
        let out = apply_preset(&img, KernelPreset::Laplacian);
        assert!(out.data().chunks_exact(4).all(|p| p[..3] == [0, 0, 0]));
    }

    #[test]
    fn median_removes_salt_noise() {
        let mut data = Vec::new();
        for _ in 0..25 {
            data.extend_from_slice(&[50, 50, 50, 255]);
        }
        data[12 * 4] = 255;
        let img = PixelBuffer::from_raw(5, 5, data).unwrap();
        let out = median(&img, 3).unwrap();
        assert_eq!(out.pixel(2, 2), [50, 50, 50, 255]);
    }

    #[test]
    fn median_rejects_even_window() {
        let img = PixelBuffer::new(2, 2);
        assert!(matches!(median(&img, 4), Err(EngineError::InvalidParameter { .. })));
    }

    #[test]
    fn isolate_channel_zeroes_the_others() {
        let img = PixelBuffer::new_filled(2, 2, [10, 20, 30, 40]);
        assert_eq!(isolate_channel(&img, CH_R).pixel(1, 1), [0, 0, 30, 40]);
        assert_eq!(isolate_channel(&img, CH_B).pixel(0, 0), [10, 0, 0, 40]);
    }
}
