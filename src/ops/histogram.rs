// ============================================================================
// HISTOGRAM & EQUALIZATION — global, linear stretch, tiled adaptive
// ============================================================================
//
// Every remap here is a per-channel 256-entry LUT over B, G and R; alpha is
// always carried through.  The adaptive variant builds one LUT set per tile
// and blends the four surrounding tiles bilinearly so tile seams never show.

use rayon::prelude::*;
use serde::Serialize;

use crate::canvas::{BPP, CH_B, CH_G, CH_R, Luma, PixelBuffer, round_clamp};
use crate::ops::apply_luts;

// ============================================================================
// HISTOGRAM
// ============================================================================

/// 256-bin counts for R, G, B and perceptual gray.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Histogram {
    #[serde(with = "bins")]
    pub red: [u32; 256],
    #[serde(with = "bins")]
    pub green: [u32; 256],
    #[serde(with = "bins")]
    pub blue: [u32; 256],
    #[serde(with = "bins")]
    pub gray: [u32; 256],
}

/// serde only derives arrays up to 32 elements.
mod bins {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bins: &[u32; 256], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(bins.iter())
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self { red: [0; 256], green: [0; 256], blue: [0; 256], gray: [0; 256] }
    }
}

impl Histogram {
    /// Count every pixel of `src`.
    pub fn build(src: &PixelBuffer) -> Self {
        src.data()
            .par_chunks(BPP * 4096)
            .map(|block| {
                let mut h = Histogram::default();
                for px in block.chunks_exact(BPP) {
                    h.red[px[CH_R] as usize] += 1;
                    h.green[px[CH_G] as usize] += 1;
                    h.blue[px[CH_B] as usize] += 1;
                    h.gray[Luma::Perceptual.of_bgra(px) as usize] += 1;
                }
                h
            })
            .reduce(Histogram::default, |mut a, b| {
                for i in 0..256 {
                    a.red[i] += b.red[i];
                    a.green[i] += b.green[i];
                    a.blue[i] += b.blue[i];
                    a.gray[i] += b.gray[i];
                }
                a
            })
    }

    /// Pixels counted (the same for every channel).
    pub fn total(&self) -> u64 {
        self.red.iter().map(|&c| c as u64).sum()
    }

    /// Bins in canonical channel order (B, G, R).
    fn color_bins(&self) -> [&[u32; 256]; 3] {
        [&self.blue, &self.green, &self.red]
    }
}

// ============================================================================
// GLOBAL EQUALIZATION & LINEAR STRETCH
// ============================================================================

/// CDF-based LUT: `map[i] = round(255 · cdf[i])`.  An empty histogram maps
/// to identity.
fn equalization_lut(bins: &[u32; 256]) -> [u8; 256] {
    let total: u64 = bins.iter().map(|&c| c as u64).sum();
    let mut lut = [0u8; 256];
    if total == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }
    let mut cumulative = 0u64;
    for (i, &count) in bins.iter().enumerate() {
        cumulative += count as u64;
        lut[i] = round_clamp((255.0 * cumulative as f64 / total as f64) as f32);
    }
    lut
}

/// Linear remap of `[min, max]` onto `[0, 255]`; identity when `min == max`.
fn build_stretch_lut(min: u8, max: u8) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if max <= min {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
    } else {
        let range = (max - min) as f32;
        for (i, v) in lut.iter_mut().enumerate() {
            let i = i as u8;
            *v = if i <= min {
                0
            } else if i >= max {
                255
            } else {
                round_clamp((i - min) as f32 / range * 255.0)
            };
        }
    }
    lut
}

/// Per-channel histogram equalization over the whole image.
pub fn equalize_global(src: &PixelBuffer) -> PixelBuffer {
    let hist = Histogram::build(src);
    let [b, g, r] = hist.color_bins();
    apply_luts(src, &[equalization_lut(b), equalization_lut(g), equalization_lut(r)])
}

/// Per-channel min/max stretch to the full byte range.
pub fn stretch_linear(src: &PixelBuffer) -> PixelBuffer {
    let hist = Histogram::build(src);
    let luts = hist.color_bins().map(|bins| {
        let min = bins.iter().position(|&c| c > 0).unwrap_or(0) as u8;
        let max = bins.iter().rposition(|&c| c > 0).unwrap_or(0) as u8;
        build_stretch_lut(min, max)
    });
    apply_luts(src, &luts)
}

// ============================================================================
// ADAPTIVE (TILED) EQUALIZATION
// ============================================================================

pub const MIN_TILE_SIZE: u32 = 16;

/// Tile size actually used: `clamp(requested, 16, max(width, height))`.
pub fn effective_tile_size(requested: u32, width: u32, height: u32) -> u32 {
    let upper = width.max(height).max(MIN_TILE_SIZE);
    requested.clamp(MIN_TILE_SIZE, upper)
}

/// Grid of per-tile, per-channel (B, G, R) equalization LUTs.
#[derive(Clone, Debug)]
pub struct TileMap {
    pub tile_size: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    luts: Vec<[[u8; 256]; 3]>,
}

impl TileMap {
    /// Build one LUT set per tile from that tile's local histogram.
    pub fn build(src: &PixelBuffer, tile_size: u32) -> Self {
        let tile = effective_tile_size(tile_size, src.width(), src.height());
        let tiles_x = src.width().div_ceil(tile).max(1);
        let tiles_y = src.height().div_ceil(tile).max(1);

        let luts = (0..tiles_x * tiles_y)
            .into_par_iter()
            .map(|t| {
                let tx = t % tiles_x;
                let ty = t / tiles_x;
                let x0 = tx * tile;
                let y0 = ty * tile;
                let x1 = (x0 + tile).min(src.width());
                let y1 = (y0 + tile).min(src.height());
                let mut bins = [[0u32; 256]; 3];
                for y in y0..y1 {
                    for x in x0..x1 {
                        let px = src.pixel(x, y);
                        for c in 0..3 {
                            bins[c][px[c] as usize] += 1;
                        }
                    }
                }
                bins.map(|b| equalization_lut(&b))
            })
            .collect();

        Self { tile_size: tile, tiles_x, tiles_y, luts }
    }

    pub fn lut(&self, tx: u32, ty: u32) -> &[[u8; 256]; 3] {
        &self.luts[(ty * self.tiles_x + tx) as usize]
    }

    /// Neighbouring tile indices and the blend weight toward the second one,
    /// measured between tile centers along one axis.
    fn axis(&self, coord: u32, tiles: u32) -> (u32, u32, f32) {
        let g = (coord as f32 + 0.5) / self.tile_size as f32 - 0.5;
        if g <= 0.0 {
            return (0, 0, 0.0);
        }
        let i0 = (g.floor() as u32).min(tiles - 1);
        let i1 = (i0 + 1).min(tiles - 1);
        let t = if i1 == i0 { 0.0 } else { (g - i0 as f32).clamp(0.0, 1.0) };
        (i0, i1, t)
    }

    /// Bilinearly blended equalized value for pixel (x, y), channel `c`.
    pub fn sample(&self, x: u32, y: u32, c: usize, value: u8) -> u8 {
        let (x0, x1, fx) = self.axis(x, self.tiles_x);
        let (y0, y1, fy) = self.axis(y, self.tiles_y);
        let v = value as usize;
        let tl = self.lut(x0, y0)[c][v] as f32;
        let tr = self.lut(x1, y0)[c][v] as f32;
        let bl = self.lut(x0, y1)[c][v] as f32;
        let br = self.lut(x1, y1)[c][v] as f32;
        let top = tl + (tr - tl) * fx;
        let bot = bl + (br - bl) * fx;
        round_clamp(top + (bot - top) * fy)
    }
}

/// Compute the adaptively equalized bytes for `src`.  Reads only; safe to
/// run on a worker thread.
pub fn compute_adaptive_buffer(src: &PixelBuffer, tile_size: u32) -> Vec<u8> {
    if src.is_empty() {
        return Vec::new();
    }
    let map = TileMap::build(src, tile_size);
    let w = src.width() as usize;
    let stride = src.stride() as usize;
    let src_raw = src.data();
    let mut out = vec![0u8; src_raw.len()];
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for x in 0..w {
            let pi = x * BPP;
            for c in 0..3 {
                row_out[pi + c] = map.sample(x as u32, y as u32, c, row_in[pi + c]);
            }
            row_out[pi + 3] = row_in[pi + 3];
        }
    });
    out
}

/// One-shot adaptive equalization.
pub fn equalize_adaptive(src: &PixelBuffer, tile_size: u32) -> PixelBuffer {
    let data = compute_adaptive_buffer(src, tile_size);
    PixelBuffer::from_parts(src.width(), src.height(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ramp(w: u32, h: u32) -> PixelBuffer {
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let v = ((x + y * w) * 255 / (w * h - 1).max(1)) as u8;
                data.extend_from_slice(&[v, v / 2, 255 - v, 200]);
            }
        }
        PixelBuffer::from_raw(w, h, data).unwrap()
    }

    #[test]
    fn gray_bin_uses_perceptual_luma() {
        let img = PixelBuffer::new_filled(2, 1, [0, 0, 255, 255]);
        let h = Histogram::build(&img);
        assert_eq!(h.red[255], 2);
        assert_eq!(h.gray[54], 2);
        assert_eq!(h.blue[0], 2);
    }

    #[test]
    fn equalization_lut_of_single_value_maps_to_white() {
        let mut bins = [0u32; 256];
        bins[40] = 10;
        let lut = equalization_lut(&bins);
        assert_eq!(lut[39], 0);
        assert_eq!(lut[40], 255);
    }

    #[test]
    fn global_equalization_spreads_two_levels() {
        let mut data = Vec::new();
        for i in 0..4 {
            let v = if i < 2 { 100 } else { 110 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
        let img = PixelBuffer::from_raw(4, 1, data).unwrap();
        let out = equalize_global(&img);
        assert_eq!(out.pixel(0, 0), [128, 128, 128, 255]);
        assert_eq!(out.pixel(3, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn stretch_maps_extremes_and_keeps_flat_channels() {
        let mut data = Vec::new();
        for v in [50u8, 100, 150] {
            data.extend_from_slice(&[v, 7, v, 9]);
        }
        let img = PixelBuffer::from_raw(3, 1, data).unwrap();
        let out = stretch_linear(&img);
        assert_eq!(out.pixel(0, 0), [0, 7, 0, 9]);
        assert_eq!(out.pixel(1, 0), [128, 7, 128, 9]);
        assert_eq!(out.pixel(2, 0), [255, 7, 255, 9]);
    }

    #[test]
    fn tile_size_is_clamped() {
        assert_eq!(effective_tile_size(4, 100, 50), 16);
        assert_eq!(effective_tile_size(500, 100, 50), 100);
        assert_eq!(effective_tile_size(32, 100, 50), 32);
        assert_eq!(effective_tile_size(64, 8, 8), 16);
    }

    #[test]
    fn single_tile_adaptive_matches_global() {
        let img = ramp(12, 10);
        assert_eq!(equalize_adaptive(&img, 64), equalize_global(&img));
    }

    #[test]
    fn adaptive_has_no_hard_seam_on_uniform_image() {
        let img = PixelBuffer::new_filled(64, 64, [30, 60, 90, 255]);
        let out = equalize_adaptive(&img, 16);
        // Every tile sees the same single value, so every LUT maps it to 255.
        assert!(out.data().chunks_exact(4).all(|p| p == [255, 255, 255, 255]));
    }

    #[test]
    fn adaptive_preserves_alpha_and_size() {
        let img = ramp(40, 23);
        let out = equalize_adaptive(&img, 16);
        assert_eq!((out.width(), out.height()), (40, 23));
        assert!(out.data().chunks_exact(4).all(|p| p[3] == 200));
    }

    #[test]
    fn blend_weights_follow_tile_centers() {
        let img = ramp(64, 16);
        let map = TileMap::build(&img, 16);
        assert_eq!(map.tiles_x, 4);
        // Tile 0 is centered at x = 8; pixel 7 (center 7.5) is still fully tile 0.
        assert_eq!(map.axis(7, map.tiles_x), (0, 0, 0.0));
        // Pixel 31 sits 7.5px past the center of tile 1 (x = 24).
        let (a, b, t) = map.axis(31, map.tiles_x);
        assert_eq!((a, b), (1, 2));
        assert!((t - 0.46875).abs() < 1e-6);
        // Past the last center only the last tile contributes.
        assert_eq!(map.axis(63, map.tiles_x), (3, 3, 0.0));
    }

    #[test]
    fn adaptive_blending_smooths_tile_seams_on_a_ramp() {
        // 0, 4, 8, ... 252 across four 16px tiles; every row identical.
        let mut data = Vec::new();
        for _ in 0..64 {
            for x in 0..64u32 {
                let v = (x * 4) as u8;
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        let img = PixelBuffer::from_raw(64, 64, data).unwrap();

        // Unblended, the LUTs on either side of the first seam disagree completely.
        let map = TileMap::build(&img, 16);
        assert_eq!(map.lut(0, 0)[0][60], 255);
        assert_eq!(map.lut(1, 0)[0][60], 0);

        let out = equalize_adaptive(&img, 16);
        for y in [0, 17, 30, 63] {
            for seam in [16, 32, 48] {
                for x in seam - 2..seam + 2 {
                    let a = out.pixel(x - 1, y)[0] as i32;
                    let b = out.pixel(x, y)[0] as i32;
                    assert!((a - b).abs() <= 24, "step {} -> {} at x={} y={}", a, b, x, y);
                }
            }
        }
    }

    proptest! {
        #[test]
        fn histogram_counts_every_pixel(w in 1u32..24, h in 1u32..24, seed in any::<u8>()) {
            let data: Vec<u8> = (0..w * h * 4).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect();
            let img = PixelBuffer::from_raw(w, h, data).unwrap();
            let hist = Histogram::build(&img);
            let n = (w * h) as u64;
            for bins in [&hist.red, &hist.green, &hist.blue, &hist.gray] {
                prop_assert_eq!(bins.iter().map(|&c| c as u64).sum::<u64>(), n);
            }
        }
    }
}
