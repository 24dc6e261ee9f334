// ============================================================================
// TRANSFORM OPERATIONS — rotation and flips
// ============================================================================
//
// Right angles are pure index remaps (lossless, W↔H swapped for 90/270).
// Any other angle grows the canvas to the rotated bounding box and
// inverse-maps every destination pixel into the source with bilinear sampling.

use crate::canvas::{PixelBuffer, round_clamp};
use crate::error::{EngineError, Result};
use crate::ops::render_pixels;

/// Angles closer than this to a right angle take the exact remap path.
const ANGLE_EPSILON: f64 = 1e-6;

/// Rotation path chosen for a normalized angle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RotationKind {
    Identity,
    Cw90,
    Half,
    Cw270,
    /// Arbitrary angle in degrees, normalized to `[0, 360)`.
    Arbitrary(f64),
}

impl RotationKind {
    /// Normalize `degrees` into `[0, 360)` and classify it.
    pub fn classify(degrees: f64) -> Result<Self> {
        if !degrees.is_finite() {
            return Err(EngineError::invalid("degrees", format!("must be finite, got {}", degrees)));
        }
        let a = degrees.rem_euclid(360.0);
        let near = |target: f64| (a - target).abs() < ANGLE_EPSILON;
        Ok(if near(0.0) || near(360.0) {
            RotationKind::Identity
        } else if near(90.0) {
            RotationKind::Cw90
        } else if near(180.0) {
            RotationKind::Half
        } else if near(270.0) {
            RotationKind::Cw270
        } else {
            RotationKind::Arbitrary(a)
        })
    }
}

/// Rotate clockwise by `degrees` (screen coordinates, y pointing down).
pub fn rotate(src: &PixelBuffer, degrees: f64) -> Result<PixelBuffer> {
    let kind = RotationKind::classify(degrees)?;
    Ok(match kind {
        RotationKind::Identity => src.clone(),
        RotationKind::Cw90 => rotate_90cw(src),
        RotationKind::Half => rotate_180(src),
        RotationKind::Cw270 => rotate_90ccw(src),
        RotationKind::Arbitrary(a) => rotate_arbitrary(src, a),
    })
}

// ---------------------------------------------------------------------------
//  Exact remaps
// ---------------------------------------------------------------------------

/// 90° clockwise; output is `height × width`.
pub fn rotate_90cw(src: &PixelBuffer) -> PixelBuffer {
    let h = src.height();
    render_pixels(h, src.width(), |x, y| src.pixel(y, h - 1 - x))
}

/// 90° counter-clockwise (270° clockwise); output is `height × width`.
pub fn rotate_90ccw(src: &PixelBuffer) -> PixelBuffer {
    let w = src.width();
    render_pixels(src.height(), w, |x, y| src.pixel(w - 1 - y, x))
}

pub fn rotate_180(src: &PixelBuffer) -> PixelBuffer {
    let (w, h) = (src.width(), src.height());
    render_pixels(w, h, |x, y| src.pixel(w - 1 - x, h - 1 - y))
}

/// Mirror left↔right.
pub fn flip_horizontal(src: &PixelBuffer) -> PixelBuffer {
    let w = src.width();
    render_pixels(w, src.height(), |x, y| src.pixel(w - 1 - x, y))
}

/// Mirror top↔bottom.
pub fn flip_vertical(src: &PixelBuffer) -> PixelBuffer {
    let h = src.height();
    render_pixels(src.width(), h, |x, y| src.pixel(x, h - 1 - y))
}

// ---------------------------------------------------------------------------
//  Arbitrary angle
// ---------------------------------------------------------------------------

/// Size of the axis-aligned box holding a `w × h` rectangle rotated by `degrees`.
pub fn rotated_bounds(w: u32, h: u32, degrees: f64) -> (u32, u32) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let hw = w as f64 / 2.0;
    let hh = h as f64 / 2.0;
    let corners = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)];
    let mut min_x = f64::MAX;
    let mut max_x = f64::MIN;
    let mut min_y = f64::MAX;
    let mut max_y = f64::MIN;
    for (x, y) in corners {
        let rx = x * cos - y * sin;
        let ry = x * sin + y * cos;
        min_x = min_x.min(rx);
        max_x = max_x.max(rx);
        min_y = min_y.min(ry);
        max_y = max_y.max(ry);
    }
    // Shave float noise so an exact fit does not grow by a pixel.
    let bw = ((max_x - min_x) - 1e-6).ceil().max(1.0) as u32;
    let bh = ((max_y - min_y) - 1e-6).ceil().max(1.0) as u32;
    (bw, bh)
}

/// Rotate by an arbitrary angle into a grown, transparent-filled canvas.
/// Destination pixels whose inverse-mapped source point falls outside the
/// source stay transparent.
pub fn rotate_arbitrary(src: &PixelBuffer, degrees: f64) -> PixelBuffer {
    if src.is_empty() {
        return src.clone();
    }
    let (sw, sh) = (src.width(), src.height());
    let (dw, dh) = rotated_bounds(sw, sh, degrees);
    let (sin, cos) = degrees.to_radians().sin_cos();

    let scx = (sw as f64 - 1.0) / 2.0;
    let scy = (sh as f64 - 1.0) / 2.0;
    let dcx = (dw as f64 - 1.0) / 2.0;
    let dcy = (dh as f64 - 1.0) / 2.0;
    let max_x = (sw - 1) as f64;
    let max_y = (sh - 1) as f64;

    render_pixels(dw, dh, |x, y| {
        let rx = x as f64 - dcx;
        let ry = y as f64 - dcy;
        // Rotation by -angle.
        let sx = rx * cos + ry * sin + scx;
        let sy = -rx * sin + ry * cos + scy;
        if sx < 0.0 || sy < 0.0 || sx > max_x || sy > max_y {
            return [0, 0, 0, 0];
        }
        bilinear_sample(src, sx, sy)
    })
}

/// Bilinear interpolation of all four channels at an in-bounds point.
fn bilinear_sample(img: &PixelBuffer, x: f64, y: f64) -> [u8; 4] {
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(img.width() - 1);
    let y1 = (y0 + 1).min(img.height() - 1);
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let tl = img.pixel(x0, y0);
    let tr = img.pixel(x1, y0);
    let bl = img.pixel(x0, y1);
    let br = img.pixel(x1, y1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c] as f32, tr[c] as f32, fx);
        let bot = lerp(bl[c] as f32, br[c] as f32, fx);
        out[c] = round_clamp(lerp(top, bot, fy));
    }
    out
}
