// ============================================================================
// IMAGE I/O — decode into the canonical buffer, encode results, export caches
// ============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{DynamicImage, ImageEncoder, ImageOutputFormat, RgbaImage};

use crate::canvas::{PixelBuffer, PixelFormat, RawBitmap, normalize, normalize_dynamic};
use crate::error::Result;
use crate::workspace::ExtendedPixelCache;

/// Default JPEG quality for [`save_image`].
pub const DEFAULT_QUALITY: u8 = 90;

/// A decoded image ready for the Workspace.
#[derive(Clone, Debug)]
pub struct LoadedImage {
    pub bitmap: PixelBuffer,
    pub width: u32,
    pub height: u32,
    /// Human-readable description of the source pixel format.
    pub pixel_format: String,
    /// The source format when it is one the normalizer names.
    pub source_format: Option<PixelFormat>,
    pub path: PathBuf,
}

/// Decode `path` and normalize it to BGRA8.
pub fn load_image(path: &Path) -> Result<LoadedImage> {
    let img = image::open(path)?;
    let color = img.color();
    let source_format = PixelFormat::from_color_type(color);
    let pixel_format = match source_format {
        Some(f) => f.description().to_string(),
        None => format!("{:?}", color),
    };
    let bitmap = normalize_dynamic(img);
    crate::log_info!(
        "Loaded {} ({}x{}, {})",
        path.display(),
        bitmap.width(),
        bitmap.height(),
        pixel_format
    );
    Ok(LoadedImage {
        width: bitmap.width(),
        height: bitmap.height(),
        bitmap,
        pixel_format,
        source_format,
        path: path.to_path_buf(),
    })
}

/// Accept an already decoded bitmap from the shell along with its source path.
pub fn load_raw(raw: RawBitmap, path: &Path) -> Result<LoadedImage> {
    let format = raw.format;
    let bitmap = normalize(raw)?;
    crate::log_info!(
        "Loaded raw {} ({}x{}, {})",
        path.display(),
        bitmap.width(),
        bitmap.height(),
        format.description()
    );
    Ok(LoadedImage {
        width: bitmap.width(),
        height: bitmap.height(),
        bitmap,
        pixel_format: format.description().to_string(),
        source_format: Some(format),
        path: path.to_path_buf(),
    })
}

// ============================================================================
// ENCODING
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tga,
    Ico,
    Tiff,
}

impl SaveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Ico => "ico",
            SaveFormat::Tiff => "tiff",
        }
    }

    /// Format for a name or extension, `None` if unknown.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_lowercase().as_str() {
            "png" => SaveFormat::Png,
            "jpg" | "jpeg" => SaveFormat::Jpeg,
            "webp" => SaveFormat::Webp,
            "bmp" => SaveFormat::Bmp,
            "tga" => SaveFormat::Tga,
            "ico" => SaveFormat::Ico,
            "tif" | "tiff" => SaveFormat::Tiff,
            _ => return None,
        })
    }

    /// Infer from a path's extension, defaulting to PNG.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_name)
            .unwrap_or(SaveFormat::Png)
    }
}

/// Encode `buffer` to `path`, picking the format from the extension.
pub fn save_image(buffer: &PixelBuffer, path: &Path) -> Result<()> {
    encode_and_write(&buffer.to_rgba_image(), path, SaveFormat::from_path(path), DEFAULT_QUALITY)
}

/// Encode and write an RGBA image.
pub fn encode_and_write(image: &RgbaImage, path: &Path, format: SaveFormat, quality: u8) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut writer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Jpeg => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tga => {
            TgaEncoder::new(&mut writer).encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Webp => {
            DynamicImage::ImageRgba8(image.clone()).save_with_format(path, image::ImageFormat::WebP)?;
        }
        SaveFormat::Ico => {
            // ICO entries are limited to 256×256
            let dyn_img = if image.width() > 256 || image.height() > 256 {
                let scale = 256.0 / image.width().max(image.height()) as f32;
                let new_w = ((image.width() as f32 * scale) as u32).max(1);
                let new_h = ((image.height() as f32 * scale) as u32).max(1);
                DynamicImage::ImageRgba8(image::imageops::resize(
                    image,
                    new_w,
                    new_h,
                    image::imageops::FilterType::Lanczos3,
                ))
            } else {
                DynamicImage::ImageRgba8(image.clone())
            };
            dyn_img.write_to(&mut writer, ImageOutputFormat::Ico)?;
        }
        SaveFormat::Tiff => {
            DynamicImage::ImageRgba8(image.clone()).write_to(&mut writer, ImageOutputFormat::Tiff)?;
        }
    }

    crate::log_info!("Saved {} ({}x{}, {:?})", path.display(), image.width(), image.height(), format);
    Ok(())
}

// ============================================================================
// PIXEL EXPORT
// ============================================================================

/// Write the extended cache as nested arrays `[x][y][R, G, B, Gray, A]`.
pub fn export_pixel_cache(cache: &ExtendedPixelCache, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, cache)?;
    std::io::Write::flush(&mut writer)?;
    crate::log_info!("Exported {}x{} pixel cache to {}", cache.width(), cache.height(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rasterfe-io-{}-{}", std::process::id(), name))
    }

    #[test]
    fn format_from_path() {
        assert_eq!(SaveFormat::from_path(Path::new("a/b.JPEG")), SaveFormat::Jpeg);
        assert_eq!(SaveFormat::from_path(Path::new("x.tif")), SaveFormat::Tiff);
        assert_eq!(SaveFormat::from_path(Path::new("noext")), SaveFormat::Png);
        assert_eq!(SaveFormat::from_name("gif"), None);
    }

    #[test]
    fn png_round_trip_is_lossless() {
        let mut data = Vec::new();
        for i in 0..12u32 {
            data.extend_from_slice(&[(i * 20) as u8, (i * 3) as u8, 255 - i as u8, 128 + i as u8]);
        }
        let buf = PixelBuffer::from_raw(4, 3, data).unwrap();
        let path = temp_path("round.png");
        save_image(&buf, &path).unwrap();
        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded.bitmap, buf);
        assert_eq!((loaded.width, loaded.height), (4, 3));
        assert_eq!(loaded.source_format, Some(PixelFormat::Rgba8));
        assert_eq!(loaded.pixel_format, "32-bit RGBA");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_image(&temp_path("nope.png")).is_err());
    }

    #[test]
    fn raw_load_describes_source_format() {
        let raw = RawBitmap { width: 2, height: 1, format: PixelFormat::Gray8, data: vec![10, 200] };
        let loaded = load_raw(raw, Path::new("scan.pgm")).unwrap();
        assert_eq!(loaded.bitmap.pixel(1, 0), [200, 200, 200, 255]);
        assert_eq!(loaded.pixel_format, "8-bit grayscale");
        assert_eq!(loaded.path, PathBuf::from("scan.pgm"));
    }

    #[test]
    fn pixel_export_is_x_major_nested_json() {
        let mut data = Vec::new();
        data.extend_from_slice(&[1, 2, 3, 4]); // (0,0)
        data.extend_from_slice(&[5, 6, 7, 8]); // (1,0)
        let buf = PixelBuffer::from_raw(2, 1, data).unwrap();
        let cache = ExtendedPixelCache::build(&buf);
        let path = temp_path("pixels.json");
        export_pixel_cache(&cache, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let columns = value.as_array().unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[1][0][0], 7); // R of (1,0)
        assert_eq!(columns[1][0][4], 8); // A of (1,0)
        assert_eq!(columns[0].as_array().unwrap().len(), 1);
        let _ = std::fs::remove_file(&path);
    }
}
