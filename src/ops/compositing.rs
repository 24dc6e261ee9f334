// ============================================================================
// COMPOSITING — arithmetic and boolean combination of two offset images
// ============================================================================
//
// The overlay B is placed at integer offset (dx, dy) relative to the base A.
//   - Add / Subtract: output covers the union of both footprints.
//   - AND / OR / XOR: output covers A only; outside the overlap is black.
//   - NOT: B is ignored.
// Scalar multiply / divide act on A alone and report when clamping occurred.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::canvas::{PixelBuffer, round_clamp};
use crate::error::{EngineError, Result, require_positive};
use crate::ops::{map_pixels, render_pixels};

/// Binarization cut-off for boolean ops: a channel ≥ this is "on".
pub const BOOLEAN_THRESHOLD: u8 = 128;

const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 255];

/// Largest union canvas add / subtract will allocate (1 GiB of BGRA).
pub const MAX_UNION_PIXELS: u64 = 1 << 28;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Subtract,
}

impl ArithmeticOp {
    pub fn label(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "Add",
            ArithmeticOp::Subtract => "Subtract",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BooleanOp {
    And,
    Or,
    Xor,
    Not,
}

impl BooleanOp {
    pub fn label(self) -> &'static str {
        match self {
            BooleanOp::And => "AND",
            BooleanOp::Or => "OR",
            BooleanOp::Xor => "XOR",
            BooleanOp::Not => "NOT",
        }
    }

    #[inline]
    fn combine(self, a: bool, b: bool) -> bool {
        match self {
            BooleanOp::And => a && b,
            BooleanOp::Or => a || b,
            BooleanOp::Xor => a ^ b,
            BooleanOp::Not => !a,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarOp {
    Multiply,
    Divide,
}

impl ScalarOp {
    pub fn label(self) -> &'static str {
        match self {
            ScalarOp::Multiply => "Multiply",
            ScalarOp::Divide => "Divide",
        }
    }
}

/// Result of a scalar op plus a note when any channel had to be clamped.
#[derive(Clone, Debug)]
pub struct ScalarOutcome {
    pub buffer: PixelBuffer,
    pub note: Option<String>,
}

/// Overlay pixel covering base coordinate (x, y), if any.
#[inline]
fn overlay_at(overlay: &PixelBuffer, offset: (i32, i32), x: i64, y: i64) -> Option<[u8; 4]> {
    let ox = x - offset.0 as i64;
    let oy = y - offset.1 as i64;
    if ox < 0 || oy < 0 || ox >= overlay.width() as i64 || oy >= overlay.height() as i64 {
        None
    } else {
        Some(overlay.pixel(ox as u32, oy as u32))
    }
}

// ============================================================================
// ARITHMETIC
// ============================================================================

/// Pixel-wise add / subtract over the union of both footprints.
///
/// Overlap: per-channel sum or difference clamped to `[0, 255]`, alpha is the
/// max of both.  Single coverage passes the present source through.  Gaps in
/// the union box are opaque black.  An offset that would grow the union past
/// [`MAX_UNION_PIXELS`] is rejected before anything is allocated.
pub fn arithmetic(
    base: &PixelBuffer,
    overlay: &PixelBuffer,
    op: ArithmeticOp,
    offset: (i32, i32),
) -> Result<PixelBuffer> {
    let (dx, dy) = (offset.0 as i64, offset.1 as i64);
    let min_x = 0.min(dx);
    let min_y = 0.min(dy);
    let max_x = (base.width() as i64).max(dx + overlay.width() as i64);
    let max_y = (base.height() as i64).max(dy + overlay.height() as i64);
    let span_w = (max_x - min_x) as u64;
    let span_h = (max_y - min_y) as u64;
    if span_w > u32::MAX as u64 || span_h > u32::MAX as u64 || span_w * span_h > MAX_UNION_PIXELS {
        return Err(EngineError::invalid(
            "offset",
            format!(
                "({}, {}) gives a {}x{} union canvas, limit is {} pixels",
                offset.0, offset.1, span_w, span_h, MAX_UNION_PIXELS
            ),
        ));
    }
    let (out_w, out_h) = (span_w as u32, span_h as u32);

    Ok(render_pixels(out_w, out_h, |x, y| {
        let gx = x as i64 + min_x;
        let gy = y as i64 + min_y;
        let a = if gx >= 0 && gy >= 0 && gx < base.width() as i64 && gy < base.height() as i64 {
            Some(base.pixel(gx as u32, gy as u32))
        } else {
            None
        };
        let b = overlay_at(overlay, offset, gx, gy);
        match (a, b) {
            (Some(a), Some(b)) => {
                let mut out = [0u8; 4];
                for c in 0..3 {
                    let v = match op {
                        ArithmeticOp::Add => a[c] as i32 + b[c] as i32,
                        ArithmeticOp::Subtract => a[c] as i32 - b[c] as i32,
                    };
                    out[c] = v.clamp(0, 255) as u8;
                }
                out[3] = a[3].max(b[3]);
                out
            }
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => OPAQUE_BLACK,
        }
    }))
}

// ============================================================================
// BOOLEAN
// ============================================================================

/// Boolean combination on channels binarized at [`BOOLEAN_THRESHOLD`].
///
/// Output has the base's size, 0/255 per channel, alpha forced opaque.
/// Base pixels not covered by the overlay become black.  `Not` ignores the
/// overlay entirely; every other op requires one.
pub fn boolean(base: &PixelBuffer, overlay: Option<&PixelBuffer>, op: BooleanOp, offset: (i32, i32)) -> Result<PixelBuffer> {
    let on = |v: u8| v >= BOOLEAN_THRESHOLD;
    let bit = |b: bool| if b { 255 } else { 0 };

    if op == BooleanOp::Not {
        return Ok(map_pixels(base, |_, _, a| {
            [bit(!on(a[0])), bit(!on(a[1])), bit(!on(a[2])), 255]
        }));
    }

    let overlay = overlay.ok_or_else(|| {
        EngineError::invalid("overlay", format!("{} needs an overlay image", op.label()))
    })?;
    Ok(map_pixels(base, |x, y, a| match overlay_at(overlay, offset, x as i64, y as i64) {
        Some(b) => {
            let mut out = [0, 0, 0, 255];
            for c in 0..3 {
                out[c] = bit(op.combine(on(a[c]), on(b[c])));
            }
            out
        }
        None => OPAQUE_BLACK,
    }))
}

// ============================================================================
// SCALAR
// ============================================================================

/// Multiply or divide B, G and R by `factor` (finite, > 0).  Alpha is kept.
pub fn scalar(base: &PixelBuffer, op: ScalarOp, factor: f32) -> Result<ScalarOutcome> {
    require_positive("scalar", factor)?;
    let overflow = AtomicUsize::new(0);
    let underflow = AtomicUsize::new(0);

    let buffer = map_pixels(base, |_, _, px| {
        let mut out = px;
        for c in 0..3 {
            let v = match op {
                ScalarOp::Multiply => px[c] as f32 * factor,
                ScalarOp::Divide => px[c] as f32 / factor,
            };
            let rounded = (v + 0.5).floor();
            if rounded > 255.0 {
                overflow.fetch_add(1, Ordering::Relaxed);
            } else if rounded < 0.0 {
                underflow.fetch_add(1, Ordering::Relaxed);
            }
            out[c] = round_clamp(v);
        }
        out
    });

    let over = overflow.into_inner();
    let under = underflow.into_inner();
    let note = if over == 0 && under == 0 {
        None
    } else {
        let mut parts = Vec::new();
        if over > 0 {
            parts.push(format!("{} channel values exceeded 255 and were clamped to 255", over));
        }
        if under > 0 {
            parts.push(format!("{} channel values fell below 0 and were clamped to 0", under));
        }
        Some(format!("{} by {}: {}", op.label(), factor, parts.join("; ")))
    };
    Ok(ScalarOutcome { buffer, note })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_and_black_is_black() {
        let a = PixelBuffer::new_filled(2, 2, [255, 255, 255, 255]);
        let b = PixelBuffer::new_filled(2, 2, [0, 0, 0, 255]);
        let out = boolean(&a, Some(&b), BooleanOp::And, (0, 0)).unwrap();
        assert_eq!(out, PixelBuffer::new_filled(2, 2, [0, 0, 0, 255]));
    }

    #[test]
    fn boolean_ops_are_per_channel_and_opaque() {
        let a = PixelBuffer::new_filled(1, 1, [200, 10, 200, 3]);
        let b = PixelBuffer::new_filled(1, 1, [130, 130, 5, 9]);
        let and = boolean(&a, Some(&b), BooleanOp::And, (0, 0)).unwrap();
        let or = boolean(&a, Some(&b), BooleanOp::Or, (0, 0)).unwrap();
        let xor = boolean(&a, Some(&b), BooleanOp::Xor, (0, 0)).unwrap();
        assert_eq!(and.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(or.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(xor.pixel(0, 0), [0, 255, 255, 255]);
    }

    #[test]
    fn boolean_outside_overlap_is_black() {
        let a = PixelBuffer::new_filled(3, 1, [255, 255, 255, 255]);
        let b = PixelBuffer::new_filled(1, 1, [255, 255, 255, 255]);
        let out = boolean(&a, Some(&b), BooleanOp::Or, (2, 0)).unwrap();
        assert_eq!(out.pixel(0, 0), [0, 0, 0, 255]);
        assert_eq!(out.pixel(2, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn not_ignores_overlay_and_binarizes() {
        let a = PixelBuffer::new_filled(1, 1, [127, 128, 0, 50]);
        let out = boolean(&a, None, BooleanOp::Not, (0, 0)).unwrap();
        assert_eq!(out.pixel(0, 0), [255, 0, 255, 255]);
    }

    #[test]
    fn binary_ops_require_overlay() {
        let a = PixelBuffer::new(1, 1);
        assert!(matches!(
            boolean(&a, None, BooleanOp::Xor, (0, 0)),
            Err(EngineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn add_covers_union_and_passes_single_sources() {
        let a = PixelBuffer::new_filled(2, 1, [100, 100, 100, 100]);
        let b = PixelBuffer::new_filled(2, 1, [200, 10, 0, 250]);
        let out = arithmetic(&a, &b, ArithmeticOp::Add, (1, 0)).unwrap();
        assert_eq!((out.width(), out.height()), (3, 1));
        assert_eq!(out.pixel(0, 0), [100, 100, 100, 100]);
        assert_eq!(out.pixel(1, 0), [255, 110, 100, 250]);
        assert_eq!(out.pixel(2, 0), [200, 10, 0, 250]);
    }

    #[test]
    fn subtract_clamps_and_fills_gaps_opaque() {
        let a = PixelBuffer::new_filled(1, 1, [10, 200, 50, 0]);
        let b = PixelBuffer::new_filled(1, 1, [20, 100, 50, 0]);
        let out = arithmetic(&a, &b, ArithmeticOp::Subtract, (1, 1)).unwrap();
        assert_eq!((out.width(), out.height()), (2, 2));
        assert_eq!(out.pixel(0, 0), [10, 200, 50, 0]);
        assert_eq!(out.pixel(1, 1), [20, 100, 50, 0]);
        assert_eq!(out.pixel(1, 0), [0, 0, 0, 255]);
        let overlap = arithmetic(&a, &b, ArithmeticOp::Subtract, (0, 0)).unwrap();
        assert_eq!(overlap.pixel(0, 0), [0, 100, 0, 0]);
    }

    #[test]
    fn negative_offset_extends_to_the_left() {
        let a = PixelBuffer::new_filled(1, 1, [1, 1, 1, 255]);
        let b = PixelBuffer::new_filled(1, 1, [2, 2, 2, 255]);
        let out = arithmetic(&a, &b, ArithmeticOp::Add, (-1, 0)).unwrap();
        assert_eq!(out.pixel(0, 0), [2, 2, 2, 255]);
        assert_eq!(out.pixel(1, 0), [1, 1, 1, 255]);
    }

    #[test]
    fn huge_offsets_are_rejected_before_allocating() {
        let a = PixelBuffer::new_filled(2, 2, [1, 1, 1, 255]);
        let b = PixelBuffer::new_filled(2, 2, [2, 2, 2, 255]);
        for offset in [(i32::MAX, 0), (0, i32::MIN), (i32::MIN, i32::MAX), (20_000, 20_000)] {
            assert!(matches!(
                arithmetic(&a, &b, ArithmeticOp::Add, offset),
                Err(EngineError::InvalidParameter { name: "offset", .. })
            ));
        }
        let far = arithmetic(&a, &b, ArithmeticOp::Add, (1000, 0)).unwrap();
        assert_eq!((far.width(), far.height()), (1002, 2));
    }

    #[test]
    fn scalar_reports_clamping_only_when_it_happens() {
        let img = PixelBuffer::new_filled(2, 1, [100, 200, 50, 77]);
        let mul = scalar(&img, ScalarOp::Multiply, 2.0).unwrap();
        assert_eq!(mul.buffer.pixel(0, 0), [200, 255, 100, 77]);
        let note = mul.note.unwrap();
        assert!(note.contains("2 channel values exceeded 255"), "{}", note);

        let div = scalar(&img, ScalarOp::Divide, 4.0).unwrap();
        assert_eq!(div.buffer.pixel(1, 0), [25, 50, 13, 77]);
        assert!(div.note.is_none());
    }

    #[test]
    fn scalar_rejects_bad_factors() {
        let img = PixelBuffer::new(1, 1);
        for f in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(scalar(&img, ScalarOp::Divide, f).is_err());
        }
    }
}
