// ============================================================================
// ENGINE SETTINGS — persisted defaults for the batch processor
// ============================================================================
//
// Stored as a plain `key=value` file.  Unknown keys are ignored and a value
// that fails to parse falls back to that key's default.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::logger;
use crate::ops::edges::CannyParams;

const SETTINGS_FILE: &str = "settings.cfg";

/// Default parameters for operations whose CLI spec omits them.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub box_blur_size: u32,
    pub gaussian_size: u32,
    pub gaussian_sigma: f32,
    pub median_size: u32,
    pub canny_kernel_size: u32,
    pub canny_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub adaptive_tile_size: u32,
    pub binary_threshold: u8,
    pub selection_tolerance: u8,
    /// Seed for the distortion noise.
    pub distortion_seed: u32,
    pub log_to_file: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let canny = CannyParams::default();
        Self {
            box_blur_size: 3,
            gaussian_size: 5,
            gaussian_sigma: 1.4,
            median_size: 3,
            canny_kernel_size: canny.kernel_size,
            canny_sigma: canny.sigma,
            canny_low: canny.low,
            canny_high: canny.high,
            adaptive_tile_size: 64,
            binary_threshold: 128,
            selection_tolerance: 32,
            distortion_seed: 0x5EED,
            log_to_file: true,
        }
    }
}

impl EngineSettings {
    /// `<data_dir>/RasterFE/settings.cfg`
    pub fn settings_path() -> PathBuf {
        logger::data_dir().join(logger::APP_DIR).join(SETTINGS_FILE)
    }

    pub fn canny_params(&self) -> CannyParams {
        CannyParams {
            kernel_size: self.canny_kernel_size,
            sigma: self.canny_sigma,
            low: self.canny_low,
            high: self.canny_high,
        }
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "box_blur_size={}\n\
             gaussian_size={}\n\
             gaussian_sigma={}\n\
             median_size={}\n\
             canny_kernel_size={}\n\
             canny_sigma={}\n\
             canny_low={}\n\
             canny_high={}\n\
             adaptive_tile_size={}\n\
             binary_threshold={}\n\
             selection_tolerance={}\n\
             distortion_seed={}\n\
             log_to_file={}\n",
            self.box_blur_size,
            self.gaussian_size,
            self.gaussian_sigma,
            self.median_size,
            self.canny_kernel_size,
            self.canny_sigma,
            self.canny_low,
            self.canny_high,
            self.adaptive_tile_size,
            self.binary_threshold,
            self.selection_tolerance,
            self.distortion_seed,
            self.log_to_file,
        )
    }

    /// Parse `key=value` lines on top of the defaults.
    pub fn from_config_str(content: &str) -> Self {
        let d = Self::default();
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "box_blur_size" => s.box_blur_size = val.parse().unwrap_or(d.box_blur_size),
                "gaussian_size" => s.gaussian_size = val.parse().unwrap_or(d.gaussian_size),
                "gaussian_sigma" => s.gaussian_sigma = val.parse().unwrap_or(d.gaussian_sigma),
                "median_size" => s.median_size = val.parse().unwrap_or(d.median_size),
                "canny_kernel_size" => s.canny_kernel_size = val.parse().unwrap_or(d.canny_kernel_size),
                "canny_sigma" => s.canny_sigma = val.parse().unwrap_or(d.canny_sigma),
                "canny_low" => s.canny_low = val.parse().unwrap_or(d.canny_low),
                "canny_high" => s.canny_high = val.parse().unwrap_or(d.canny_high),
                "adaptive_tile_size" => s.adaptive_tile_size = val.parse().unwrap_or(d.adaptive_tile_size),
                "binary_threshold" => s.binary_threshold = val.parse().unwrap_or(d.binary_threshold),
                "selection_tolerance" => s.selection_tolerance = val.parse().unwrap_or(d.selection_tolerance),
                "distortion_seed" => s.distortion_seed = parse_seed(val).unwrap_or(d.distortion_seed),
                "log_to_file" => s.log_to_file = val == "true",
                _ => {}
            }
        }
        s
    }

    /// Save to the default settings path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    /// Load from the default path (defaults if missing or unreadable).
    pub fn load() -> Self {
        Self::load_from(&Self::settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }
}

/// Decimal or `0x`-prefixed hex.
fn parse_seed(val: &str) -> Option<u32> {
    match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_string_round_trips() {
        let mut s = EngineSettings::default();
        s.gaussian_sigma = 2.5;
        s.binary_threshold = 90;
        s.log_to_file = false;
        assert_eq!(EngineSettings::from_config_str(&s.to_config_string()), s);
    }

    #[test]
    fn bad_values_fall_back_per_key() {
        let s = EngineSettings::from_config_str(
            "median_size=seven\nbinary_threshold=300\nadaptive_tile_size=32\nmystery=1\nno equals sign\n",
        );
        assert_eq!(s.median_size, 3);
        assert_eq!(s.binary_threshold, 128);
        assert_eq!(s.adaptive_tile_size, 32);
    }

    #[test]
    fn seed_accepts_hex() {
        let s = EngineSettings::from_config_str("distortion_seed=0xBEEF\n");
        assert_eq!(s.distortion_seed, 0xBEEF);
        assert_eq!(parse_seed("42"), Some(42));
    }

    #[test]
    fn save_and_load_through_a_file() {
        let path = std::env::temp_dir().join(format!("rasterfe-settings-{}.cfg", std::process::id()));
        let mut s = EngineSettings::default();
        s.canny_high = 90.0;
        s.save_to(&path).unwrap();
        assert_eq!(EngineSettings::load_from(&path), s);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("rasterfe-definitely-missing.cfg");
        assert_eq!(EngineSettings::load_from(&path), EngineSettings::default());
    }

    #[test]
    fn default_canny_params_match() {
        assert_eq!(EngineSettings::default().canny_params(), CannyParams::default());
    }
}
