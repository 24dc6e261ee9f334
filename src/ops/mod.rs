// ============================================================================
// OPS — pure pixel transforms: PixelBuffer in, fresh PixelBuffer out
// ============================================================================

pub mod adjustments;
pub mod compositing;
pub mod edges;
pub mod filters;
pub mod histogram;
pub mod stego;
pub mod transform;

use rayon::prelude::*;

use crate::canvas::{BPP, PixelBuffer};

/// Per-pixel transform, parallel by row.
/// `transform` receives (x, y, bgra) and returns the output bgra.
pub(crate) fn map_pixels<F>(src: &PixelBuffer, transform: F) -> PixelBuffer
where
    F: Fn(u32, u32, [u8; 4]) -> [u8; 4] + Sync,
{
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }

    let stride = src.stride() as usize;
    let src_raw = src.data();
    let mut dst_raw = vec![0u8; h * stride];

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for x in 0..w {
            let pi = x * BPP;
            let px = [row_in[pi], row_in[pi + 1], row_in[pi + 2], row_in[pi + 3]];
            row_out[pi..pi + BPP].copy_from_slice(&transform(x as u32, y as u32, px));
        }
    });

    PixelBuffer::from_parts(src.width(), src.height(), dst_raw)
}

/// Build a buffer of the given size by evaluating `processor` at every pixel.
pub(crate) fn render_pixels<F>(width: u32, height: u32, processor: F) -> PixelBuffer
where
    F: Fn(u32, u32) -> [u8; 4] + Sync,
{
    let w = width as usize;
    let stride = w * BPP;
    let mut dst_raw = vec![0u8; height as usize * stride];
    if stride > 0 {
        dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
            for x in 0..w {
                let pi = x * BPP;
                row_out[pi..pi + BPP].copy_from_slice(&processor(x as u32, y as u32));
            }
        });
    }
    PixelBuffer::from_parts(width, height, dst_raw)
}

/// Apply a 256-entry lookup table per color channel.  Alpha is kept.
pub(crate) fn apply_luts(src: &PixelBuffer, luts: &[[u8; 256]; 3]) -> PixelBuffer {
    map_pixels(src, |_, _, px| {
        [
            luts[0][px[0] as usize],
            luts[1][px[1] as usize],
            luts[2][px[2] as usize],
            px[3],
        ]
    })
}
