// ============================================================================
// EDGE DETECTION — Sobel / Prewitt / Robert Cross + five-stage Canny
// ============================================================================
//
// Sobel and Prewitt reuse the convolution engine's weighted sums (edge
// replicated borders).  Robert Cross reads the 2×2 diagonal directly and
// blacks out the last row and column.  Canny runs on a single ITU-601 luma
// plane and produces a 0/255 mask.

use std::collections::VecDeque;

use rayon::prelude::*;

use crate::canvas::{BPP, Luma, PixelBuffer, round_clamp};
use crate::error::{EngineError, Result, require_odd, require_positive};
use crate::ops::filters::{PREWITT_X, PREWITT_Y, SOBEL_X, SOBEL_Y, gaussian_weights, weighted_sums};

// ============================================================================
// GRADIENT-PAIR DETECTORS
// ============================================================================

/// `sqrt(Gx² + Gy²)` per color channel, clamped, alpha forced opaque.
fn gradient_magnitude(src: &PixelBuffer, kx: &[f32; 9], ky: &[f32; 9]) -> PixelBuffer {
    if src.is_empty() {
        return src.clone();
    }
    let gx = weighted_sums(src, 3, kx);
    let gy = weighted_sums(src, 3, ky);
    let mut out = vec![0u8; src.data().len()];
    out.par_chunks_mut(BPP).enumerate().for_each(|(i, px)| {
        for c in 0..3 {
            let x = gx[i * 3 + c];
            let y = gy[i * 3 + c];
            px[c] = round_clamp((x * x + y * y).sqrt());
        }
        px[3] = 255;
    });
    PixelBuffer::from_parts(src.width(), src.height(), out)
}

pub fn sobel(src: &PixelBuffer) -> PixelBuffer {
    gradient_magnitude(src, &SOBEL_X, &SOBEL_Y)
}

pub fn prewitt(src: &PixelBuffer) -> PixelBuffer {
    gradient_magnitude(src, &PREWITT_X, &PREWITT_Y)
}

/// Robert Cross: 2×2 diagonal differences, no padding.  The last row and
/// column have no full window and are set to opaque black.
pub fn robert(src: &PixelBuffer) -> PixelBuffer {
    let w = src.width();
    let h = src.height();
    crate::ops::render_pixels(w, h, |x, y| {
        if x + 1 >= w || y + 1 >= h {
            return [0, 0, 0, 255];
        }
        let p00 = src.pixel(x, y);
        let p11 = src.pixel(x + 1, y + 1);
        let p10 = src.pixel(x + 1, y);
        let p01 = src.pixel(x, y + 1);
        let mut out = [0, 0, 0, 255];
        for c in 0..3 {
            let gx = p00[c] as f32 - p11[c] as f32;
            let gy = p10[c] as f32 - p01[c] as f32;
            out[c] = round_clamp((gx * gx + gy * gy).sqrt());
        }
        out
    })
}

// ============================================================================
// CANNY
// ============================================================================

/// Caller-tunable Canny parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CannyParams {
    /// Odd Gaussian kernel edge length (≥ 3).
    pub kernel_size: u32,
    pub sigma: f32,
    /// Magnitudes at or above this are weak edges.
    pub low: f32,
    /// Magnitudes at or above this are strong edges.
    pub high: f32,
}

impl Default for CannyParams {
    fn default() -> Self {
        Self { kernel_size: 5, sigma: 1.4, low: 20.0, high: 60.0 }
    }
}

impl CannyParams {
    pub fn validate(&self) -> Result<()> {
        require_odd("canny kernel size", self.kernel_size, 3)?;
        require_positive("canny sigma", self.sigma)?;
        require_positive("canny high threshold", self.high)?;
        if !self.low.is_finite() || self.low < 0.0 {
            return Err(EngineError::invalid(
                "canny low threshold",
                format!("must be a finite value ≥ 0, got {}", self.low),
            ));
        }
        if self.low > self.high {
            return Err(EngineError::invalid(
                "canny low threshold",
                format!("{} exceeds the high threshold {}", self.low, self.high),
            ));
        }
        Ok(())
    }
}

const NONE: u8 = 0;
const WEAK: u8 = 1;
const STRONG: u8 = 2;

/// Full Canny pipeline.  Output is a 0/255 mask replicated to B, G, R with
/// opaque alpha.
pub fn canny(src: &PixelBuffer, params: &CannyParams) -> Result<PixelBuffer> {
    params.validate()?;
    if src.is_empty() {
        return Ok(src.clone());
    }
    let w = src.width() as usize;
    let h = src.height() as usize;

    let gray = gray_plane(src);
    let smoothed = smooth(&gray, w, h, params.kernel_size, params.sigma);
    let (magnitude, direction) = gradients(&smoothed, w, h);
    let thin = non_max_suppression(&magnitude, &direction, w, h);
    let mut classes = double_threshold(&thin, params.low, params.high);
    hysteresis(&mut classes, w, h);

    let mut out = vec![0u8; w * h * BPP];
    out.par_chunks_mut(BPP).zip(classes.par_iter()).for_each(|(px, &class)| {
        let v = if class == STRONG { 255 } else { 0 };
        px.copy_from_slice(&[v, v, v, 255]);
    });
    Ok(PixelBuffer::from_parts(src.width(), src.height(), out))
}

/// Stage 0: ITU-601 luma plane, unrounded.
fn gray_plane(src: &PixelBuffer) -> Vec<f32> {
    src.data()
        .par_chunks_exact(BPP)
        .map(|px| Luma::Itu601.value(px[2], px[1], px[0]))
        .collect()
}

#[inline]
fn at_clamped(plane: &[f32], w: usize, h: usize, x: i64, y: i64) -> f32 {
    let cx = x.clamp(0, w as i64 - 1) as usize;
    let cy = y.clamp(0, h as i64 - 1) as usize;
    plane[cy * w + cx]
}

/// Stage 1: Gaussian smoothing with an inline-normalized kernel.
fn smooth(plane: &[f32], w: usize, h: usize, size: u32, sigma: f32) -> Vec<f32> {
    let mut kernel = gaussian_weights(size, sigma);
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    let k = size as i64;
    let r = k / 2;
    let mut out = vec![0.0f32; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, slot) in row.iter_mut().enumerate() {
            let mut acc = 0.0;
            for j in 0..k {
                for i in 0..k {
                    let sx = x as i64 + i - r;
                    let sy = y as i64 + j - r;
                    acc += kernel[(j * k + i) as usize] * at_clamped(plane, w, h, sx, sy);
                }
            }
            *slot = acc;
        }
    });
    out
}

/// Stage 2: Sobel gradient magnitude and direction (degrees, `atan2(Gy, Gx)`).
fn gradients(plane: &[f32], w: usize, h: usize) -> (Vec<f32>, Vec<f32>) {
    let pairs: Vec<(f32, f32)> = (0..w * h)
        .into_par_iter()
        .map(|i| {
            let x = (i % w) as i64;
            let y = (i / w) as i64;
            let mut gx = 0.0;
            let mut gy = 0.0;
            for j in 0..3i64 {
                for k in 0..3i64 {
                    let v = at_clamped(plane, w, h, x + k - 1, y + j - 1);
                    gx += SOBEL_X[(j * 3 + k) as usize] * v;
                    gy += SOBEL_Y[(j * 3 + k) as usize] * v;
                }
            }
            ((gx * gx + gy * gy).sqrt(), gy.atan2(gx).to_degrees())
        })
        .collect();
    pairs.into_iter().unzip()
}

/// Stage 3: keep a pixel only if it is ≥ both neighbors along its gradient
/// direction (bucketed into 0°, 45°, 90°, 135°).  Border pixels are zeroed.
fn non_max_suppression(magnitude: &[f32], direction: &[f32], w: usize, h: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; w * h];
    if w < 3 || h < 3 {
        return out;
    }
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        if y == 0 || y == h - 1 {
            return;
        }
        for x in 1..w - 1 {
            let i = y * w + x;
            let mut angle = direction[i];
            if angle < 0.0 {
                angle += 180.0;
            }
            let (a, b) = if !(22.5..157.5).contains(&angle) {
                (i - 1, i + 1)
            } else if angle < 67.5 {
                (i - w - 1, i + w + 1)
            } else if angle < 112.5 {
                (i - w, i + w)
            } else {
                (i - w + 1, i + w - 1)
            };
            let m = magnitude[i];
            if m >= magnitude[a] && m >= magnitude[b] {
                row[x] = m;
            }
        }
    });
    out
}

/// Stage 4: classify into strong (2), weak (1) or none (0).
fn double_threshold(magnitude: &[f32], low: f32, high: f32) -> Vec<u8> {
    magnitude
        .par_iter()
        .map(|&m| {
            if m >= high {
                STRONG
            } else if m >= low {
                WEAK
            } else {
                NONE
            }
        })
        .collect()
}

/// Stage 5: promote weak pixels 8-connected to a strong pixel until nothing
/// changes, then drop the remaining weak pixels.
fn hysteresis(classes: &mut [u8], w: usize, h: usize) {
    let mut queue: VecDeque<usize> = classes
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == STRONG)
        .map(|(i, _)| i)
        .collect();

    while let Some(i) = queue.pop_front() {
        let x = (i % w) as i64;
        let y = (i / w) as i64;
        for dy in -1..=1i64 {
            for dx in -1..=1i64 {
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let ni = ny as usize * w + nx as usize;
                if classes[ni] == WEAK {
                    classes[ni] = STRONG;
                    queue.push_back(ni);
                }
            }
        }
    }

    for c in classes.iter_mut() {
        if *c == WEAK {
            *c = NONE;
        }
    }
}
