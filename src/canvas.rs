// ============================================================================
// PIXEL BUFFER — canonical BGRA8 raster + format normalizer
// ============================================================================
//
// Every algorithm in the engine reads and writes `PixelBuffer` only.  Any
// incoming bitmap goes through `normalize` (raw bytes in a known format) or
// `normalize_dynamic` (decoded `image::DynamicImage`) first.

use image::{ColorType, DynamicImage, RgbaImage};
use rayon::prelude::*;

use crate::error::{EngineError, Result};

/// Byte offsets of each channel inside one canonical pixel.
pub const CH_B: usize = 0;
pub const CH_G: usize = 1;
pub const CH_R: usize = 2;
pub const CH_A: usize = 3;

/// Bytes per canonical pixel.
pub const BPP: usize = 4;

// ============================================================================
// PIXEL BUFFER
// ============================================================================

/// Canonical raster: 8 bits per channel, interleaved B,G,R,A, no row padding.
///
/// Immutable once built; transforms always allocate a fresh buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    stride: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl PixelBuffer {
    // ---- construction -------------------------------------------------------

    /// Fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self::new_filled(width, height, [0, 0, 0, 0])
    }

    /// Buffer where every pixel is `bgra`.
    pub fn new_filled(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * BPP);
        for _ in 0..count {
            data.extend_from_slice(&bgra);
        }
        Self::from_parts(width, height, data)
    }

    /// Wrap existing BGRA bytes.  Fails when the length does not match.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * BPP;
        if data.len() != expected {
            return Err(EngineError::BufferSize { expected, actual: data.len() });
        }
        Ok(Self::from_parts(width, height, data))
    }

    /// Internal constructor for buffers whose length is correct by construction.
    pub(crate) fn from_parts(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * BPP);
        Self { width, height, stride: width * BPP as u32, data }
    }

    /// Import from an RGBA image (swaps R and B).
    pub fn from_rgba_image(src: &RgbaImage) -> Self {
        let mut data = src.as_raw().clone();
        swap_red_blue(&mut data);
        Self::from_parts(src.width(), src.height(), data)
    }

    // ---- access -------------------------------------------------------------

    pub fn width(&self) -> u32 { self.width }

    pub fn height(&self) -> u32 { self.height }

    /// Bytes per row (always `width * 4`).
    pub fn stride(&self) -> u32 { self.stride }

    pub fn data(&self) -> &[u8] { &self.data }

    pub fn into_raw(self) -> Vec<u8> { self.data }

    pub fn is_empty(&self) -> bool { self.width == 0 || self.height == 0 }

    pub fn pixel_count(&self) -> usize { self.width as usize * self.height as usize }

    /// Byte offset of pixel (x, y).
    #[inline]
    pub fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride as usize + x as usize * BPP
    }

    /// BGRA of pixel (x, y).  Panics when out of bounds, like `RgbaImage::get_pixel`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// BGRA at a coordinate clamped into bounds (edge replication).
    #[inline]
    pub fn pixel_clamped(&self, x: i64, y: i64) -> [u8; 4] {
        let cx = x.clamp(0, self.width as i64 - 1) as u32;
        let cy = y.clamp(0, self.height as i64 - 1) as u32;
        self.pixel(cx, cy)
    }

    /// Export as an RGBA image for encoders.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut data = self.data.clone();
        swap_red_blue(&mut data);
        // Length matches width*height*4 by the PixelBuffer invariant.
        RgbaImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

/// Swap bytes 0 and 2 of every 4-byte pixel (RGBA <-> BGRA), in place.
fn swap_red_blue(data: &mut [u8]) {
    data.par_chunks_mut(BPP * 1024).for_each(|block| {
        for px in block.chunks_exact_mut(BPP) {
            px.swap(0, 2);
        }
    });
}

// ============================================================================
// GRAYSCALE FORMULAS
// ============================================================================

/// The three luma formulas the engine uses.  Each feature sticks to its own
/// formula so its output stays stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Luma {
    /// `(R + G + B) / 3`. Used by binary threshold and color-selection dimming.
    Average,
    /// ITU-R BT.601 `0.299 R + 0.587 G + 0.114 B`. Used by Canny.
    Itu601,
    /// BT.709 perceptual `0.2126 R + 0.7152 G + 0.0722 B`. Used by the extended cache.
    Perceptual,
}

impl Luma {
    /// Luma as an unrounded float.
    #[inline]
    pub fn value(self, r: u8, g: u8, b: u8) -> f32 {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        match self {
            Luma::Average => (r + g + b) / 3.0,
            Luma::Itu601 => 0.299 * r + 0.587 * g + 0.114 * b,
            Luma::Perceptual => 0.2126 * r + 0.7152 * g + 0.0722 * b,
        }
    }

    /// Luma rounded (half-up) and clamped to a byte.
    #[inline]
    pub fn byte(self, r: u8, g: u8, b: u8) -> u8 {
        round_clamp(self.value(r, g, b))
    }

    /// Luma of a canonical BGRA pixel.
    #[inline]
    pub fn of_bgra(self, px: &[u8]) -> u8 {
        self.byte(px[CH_R], px[CH_G], px[CH_B])
    }
}

/// `floor(v + 0.5)` clamped to `[0, 255]`.  NaN maps to 0.
#[inline]
pub fn round_clamp(v: f32) -> u8 {
    let r = (v + 0.5).floor();
    if r.is_nan() {
        0
    } else {
        r.clamp(0.0, 255.0) as u8
    }
}

// ============================================================================
// FORMAT NORMALIZER
// ============================================================================

/// Per-channel layouts accepted by [`normalize`].
/// 16-bit and float samples are little-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Gray8,
    GrayAlpha8,
    Rgb8,
    Rgba8,
    Bgr8,
    Bgra8,
    Gray16,
    GrayAlpha16,
    Rgb16,
    Rgba16,
    Rgb32F,
    Rgba32F,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::GrayAlpha8 | PixelFormat::Gray16 => 2,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 | PixelFormat::GrayAlpha16 => 4,
            PixelFormat::Rgb16 => 6,
            PixelFormat::Rgba16 => 8,
            PixelFormat::Rgb32F => 12,
            PixelFormat::Rgba32F => 16,
        }
    }

    /// Human-readable description returned alongside a loaded image.
    pub fn description(self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "8-bit grayscale",
            PixelFormat::GrayAlpha8 => "8-bit grayscale + alpha",
            PixelFormat::Rgb8 => "24-bit RGB",
            PixelFormat::Rgba8 => "32-bit RGBA",
            PixelFormat::Bgr8 => "24-bit BGR",
            PixelFormat::Bgra8 => "32-bit BGRA",
            PixelFormat::Gray16 => "16-bit grayscale",
            PixelFormat::GrayAlpha16 => "16-bit grayscale + alpha",
            PixelFormat::Rgb16 => "48-bit RGB",
            PixelFormat::Rgba16 => "64-bit RGBA",
            PixelFormat::Rgb32F => "96-bit float RGB",
            PixelFormat::Rgba32F => "128-bit float RGBA",
        }
    }

    /// Map a decoder color type onto a format, if it is one we know.
    pub fn from_color_type(color: ColorType) -> Option<Self> {
        Some(match color {
            ColorType::L8 => PixelFormat::Gray8,
            ColorType::La8 => PixelFormat::GrayAlpha8,
            ColorType::Rgb8 => PixelFormat::Rgb8,
            ColorType::Rgba8 => PixelFormat::Rgba8,
            ColorType::L16 => PixelFormat::Gray16,
            ColorType::La16 => PixelFormat::GrayAlpha16,
            ColorType::Rgb16 => PixelFormat::Rgb16,
            ColorType::Rgba16 => PixelFormat::Rgba16,
            ColorType::Rgb32F => PixelFormat::Rgb32F,
            ColorType::Rgba32F => PixelFormat::Rgba32F,
            _ => return None,
        })
    }
}

/// An uncanonicalized bitmap: tightly packed rows in `format`.
#[derive(Clone, Debug)]
pub struct RawBitmap {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

/// Convert any supported bitmap into the canonical BGRA8 form.
///
/// A `Bgra8` input is moved into the result without copying.
pub fn normalize(raw: RawBitmap) -> Result<PixelBuffer> {
    let bpp = raw.format.bytes_per_pixel();
    let expected = raw.width as usize * raw.height as usize * bpp;
    if raw.data.len() != expected {
        return Err(EngineError::BufferSize { expected, actual: raw.data.len() });
    }
    if raw.format == PixelFormat::Bgra8 {
        return Ok(PixelBuffer::from_parts(raw.width, raw.height, raw.data));
    }

    let w = raw.width as usize;
    let src_stride = w * bpp;
    let dst_stride = w * BPP;
    let mut out = vec![0u8; raw.height as usize * dst_stride];
    if dst_stride > 0 {
        out.par_chunks_mut(dst_stride).enumerate().for_each(|(y, row_out)| {
            let row_in = &raw.data[y * src_stride..(y + 1) * src_stride];
            for x in 0..w {
                let px = decode_pixel(raw.format, &row_in[x * bpp..(x + 1) * bpp]);
                row_out[x * BPP..(x + 1) * BPP].copy_from_slice(&px);
            }
        });
    }
    Ok(PixelBuffer::from_parts(raw.width, raw.height, out))
}

/// Canonicalize a decoded image.  RGBA8 input reuses its allocation.
pub fn normalize_dynamic(img: DynamicImage) -> PixelBuffer {
    let rgba = match img {
        DynamicImage::ImageRgba8(buf) => buf,
        other => other.to_rgba8(),
    };
    let (w, h) = rgba.dimensions();
    let mut data = rgba.into_raw();
    swap_red_blue(&mut data);
    PixelBuffer::from_parts(w, h, data)
}

#[inline]
fn u16_at(bytes: &[u8], i: usize) -> u16 {
    u16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]])
}

#[inline]
fn f32_at(bytes: &[u8], i: usize) -> f32 {
    f32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
}

#[inline]
fn narrow16(v: u16) -> u8 {
    ((v as u32 * 255 + 32767) / 65535) as u8
}

#[inline]
fn narrow_f(v: f32) -> u8 {
    round_clamp(v.clamp(0.0, 1.0) * 255.0)
}

/// Decode one source pixel into BGRA.
fn decode_pixel(format: PixelFormat, p: &[u8]) -> [u8; 4] {
    match format {
        PixelFormat::Gray8 => [p[0], p[0], p[0], 255],
        PixelFormat::GrayAlpha8 => [p[0], p[0], p[0], p[1]],
        PixelFormat::Rgb8 => [p[2], p[1], p[0], 255],
        PixelFormat::Rgba8 => [p[2], p[1], p[0], p[3]],
        PixelFormat::Bgr8 => [p[0], p[1], p[2], 255],
        PixelFormat::Bgra8 => [p[0], p[1], p[2], p[3]],
        PixelFormat::Gray16 => {
            let v = narrow16(u16_at(p, 0));
            [v, v, v, 255]
        }
        PixelFormat::GrayAlpha16 => {
            let v = narrow16(u16_at(p, 0));
            [v, v, v, narrow16(u16_at(p, 1))]
        }
        PixelFormat::Rgb16 => [
            narrow16(u16_at(p, 2)),
            narrow16(u16_at(p, 1)),
            narrow16(u16_at(p, 0)),
            255,
        ],
        PixelFormat::Rgba16 => [
            narrow16(u16_at(p, 2)),
            narrow16(u16_at(p, 1)),
            narrow16(u16_at(p, 0)),
            narrow16(u16_at(p, 3)),
        ],
        PixelFormat::Rgb32F => [
            narrow_f(f32_at(p, 2)),
            narrow_f(f32_at(p, 1)),
            narrow_f(f32_at(p, 0)),
            255,
        ],
        PixelFormat::Rgba32F => [
            narrow_f(f32_at(p, 2)),
            narrow_f(f32_at(p, 1)),
            narrow_f(f32_at(p, 0)),
            narrow_f(f32_at(p, 3)),
        ],
    }
}
