// ============================================================================
// RasterFE CLI — headless batch processing via command-line arguments
// ============================================================================
//
// Usage examples:
//   rasterfe --input photo.png --op gaussian:5:1.4 --op canny --output edges.png
//   rasterfe -i *.jpg --op equalize --op rotate:90 --output-dir processed/ --format png
//   rasterfe -i base.png --overlay mask.png --offset 10,-4 --op and -o masked.png
//   rasterfe -i photo.png --embed "hello" -o carrier.png
//   rasterfe -i carrier.png --extract
//
// Operations run in command-line order against one Workspace per file.
// Display toggles (negate, brightness, threshold, select, channel) are
// collected and rendered once at the end in the fixed pipeline order.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Instant;

use clap::Parser;

use crate::canvas::{Luma, PixelBuffer};
use crate::error::{EngineError, Result};
use crate::history::OperationFamily;
use crate::io::{SaveFormat, encode_and_write, export_pixel_cache, load_image};
use crate::ops::adjustments::{self, ColorSelection};
use crate::ops::compositing::{ArithmeticOp, BooleanOp, ScalarOp};
use crate::ops::edges::{self, CannyParams};
use crate::ops::filters::{self, KernelPreset};
use crate::ops::histogram;
use crate::ops::stego;
use crate::ops::transform;
use crate::settings::EngineSettings;
use crate::workspace::{FilterMode, Workspace};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// RasterFE headless image processor.
#[derive(Parser, Debug)]
#[command(
    name = "rasterfe",
    about = "RasterFE headless batch image processor",
    long_about = "Apply filters, edge detectors, equalization, rotation, composition and\n\
                  LSB steganography to image files without opening the GUI.\n\n\
                  Example:\n  \
                  rasterfe --input photo.png --op gaussian:5:1.4 --op canny --output edges.png\n  \
                  rasterfe -i *.jpg --op equalize --output-dir out/ --format png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Operation to apply; repeat for a chain (e.g. --op blur:3 --op sobel).
    #[arg(long = "op", value_name = "OP")]
    pub ops: Vec<OpSpec>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp, tga, ico, tiff.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Overlay image for add / subtract / and / or / xor.
    #[arg(long, value_name = "FILE")]
    pub overlay: Option<PathBuf>,

    /// Overlay offset relative to the input, as DX,DY.
    #[arg(long, default_value = "0,0", value_name = "DX,DY", allow_hyphen_values = true)]
    pub offset: Offset,

    /// Hide this text in the processed image before saving.
    #[arg(long, value_name = "TEXT")]
    pub embed: Option<String>,

    /// Print the message hidden in each input.
    #[arg(long)]
    pub extract: bool,

    /// Write the final pixel cache as JSON `[x][y][R,G,B,Gray,A]`.
    #[arg(long, value_name = "FILE")]
    pub export_pixels: Option<PathBuf>,

    /// Print the final image's histogram as JSON.
    #[arg(long)]
    pub stats: bool,

    /// Settings file to use instead of the default one.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Print per-file timing and operation notes.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Settings from `--settings`, else the default settings file.
    pub fn load_settings(&self) -> EngineSettings {
        match &self.settings {
            Some(path) => EngineSettings::load_from(path),
            None => EngineSettings::load(),
        }
    }

    fn has_outputs(&self) -> bool {
        !self.ops.is_empty()
            || self.embed.is_some()
            || self.output.is_some()
            || self.output_dir.is_some()
            || self.export_pixels.is_some()
            || self.stats
    }
}

/// Overlay offset `DX,DY`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

impl FromStr for Offset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (dx, dy) = s
            .split_once(',')
            .ok_or_else(|| format!("offset '{}' must be DX,DY", s))?;
        let parse = |v: &str| v.trim().parse::<i32>().map_err(|e| format!("offset '{}': {}", s, e));
        Ok(Offset { dx: parse(dx)?, dy: parse(dy)? })
    }
}

// ============================================================================
// Operation specs
// ============================================================================

/// One `--op` value.  Omitted parameters fall back to [`EngineSettings`].
#[derive(Clone, Debug, PartialEq)]
pub enum OpSpec {
    BoxBlur(Option<u32>),
    Gaussian { size: Option<u32>, sigma: Option<f32> },
    Median(Option<u32>),
    Preset(KernelPreset),
    Sobel,
    Prewitt,
    Robert,
    Canny(Option<CannyParams>),
    Equalize,
    Stretch,
    Adaptive(Option<u32>),
    Rotate(f64),
    FlipH,
    FlipV,
    Grayscale,
    Gamma(f32),
    Gain(f32),
    Distort(f32),
    Arithmetic(ArithmeticOp),
    Scalar(ScalarOp, f32),
    Boolean(BooleanOp),
    Negate,
    Brightness(i32),
    Threshold(Option<u8>),
    Select { target: [u8; 3], tolerance: Option<u8> },
    Channel(FilterMode),
}

fn arg<T: FromStr>(op: &str, name: &str, v: &str) -> std::result::Result<T, String>
where
    T::Err: fmt::Display,
{
    v.trim()
        .parse()
        .map_err(|e| format!("{}: bad {} '{}': {}", op, name, v, e))
}

fn opt_arg<T: FromStr>(op: &str, name: &str, v: Option<&&str>) -> std::result::Result<Option<T>, String>
where
    T::Err: fmt::Display,
{
    v.map(|v| arg(op, name, v)).transpose()
}

fn req_arg<T: FromStr>(op: &str, name: &str, v: Option<&&str>) -> std::result::Result<T, String>
where
    T::Err: fmt::Display,
{
    match v {
        Some(v) => arg(op, name, v),
        None => Err(format!("{} needs a {} (e.g. {}:VALUE)", op, name, op)),
    }
}

impl FromStr for OpSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let name = parts[0].trim().to_lowercase();
        let p1 = parts.get(1);
        let p2 = parts.get(2);
        let op = name.as_str();

        let spec = match op {
            "blur" => OpSpec::BoxBlur(opt_arg(op, "size", p1)?),
            "gaussian" => OpSpec::Gaussian { size: opt_arg(op, "size", p1)?, sigma: opt_arg(op, "sigma", p2)? },
            "median" => OpSpec::Median(opt_arg(op, "size", p1)?),
            "sharpen" | "highpass" => OpSpec::Preset(KernelPreset::HighPass),
            "laplacian" => OpSpec::Preset(KernelPreset::Laplacian),
            "emboss" => OpSpec::Preset(KernelPreset::Emboss),
            "sobel" => OpSpec::Sobel,
            "prewitt" => OpSpec::Prewitt,
            "robert" => OpSpec::Robert,
            "canny" => {
                if parts.len() == 1 {
                    OpSpec::Canny(None)
                } else if parts.len() == 5 {
                    OpSpec::Canny(Some(CannyParams {
                        kernel_size: arg(op, "kernel size", parts[1])?,
                        sigma: arg(op, "sigma", parts[2])?,
                        low: arg(op, "low threshold", parts[3])?,
                        high: arg(op, "high threshold", parts[4])?,
                    }))
                } else {
                    return Err("canny takes no parameters or K:SIGMA:LOW:HIGH".to_string());
                }
            }
            "equalize" => OpSpec::Equalize,
            "stretch" => OpSpec::Stretch,
            "adaptive" => OpSpec::Adaptive(opt_arg(op, "tile size", p1)?),
            "rotate" => OpSpec::Rotate(req_arg(op, "angle", p1)?),
            "flip-h" => OpSpec::FlipH,
            "flip-v" => OpSpec::FlipV,
            "grayscale" => OpSpec::Grayscale,
            "gamma" => OpSpec::Gamma(req_arg(op, "gamma", p1)?),
            "gain" => OpSpec::Gain(req_arg(op, "gain", p1)?),
            "distort" => OpSpec::Distort(req_arg(op, "level", p1)?),
            "add" => OpSpec::Arithmetic(ArithmeticOp::Add),
            "subtract" => OpSpec::Arithmetic(ArithmeticOp::Subtract),
            "multiply" => OpSpec::Scalar(ScalarOp::Multiply, req_arg(op, "factor", p1)?),
            "divide" => OpSpec::Scalar(ScalarOp::Divide, req_arg(op, "factor", p1)?),
            "and" => OpSpec::Boolean(BooleanOp::And),
            "or" => OpSpec::Boolean(BooleanOp::Or),
            "xor" => OpSpec::Boolean(BooleanOp::Xor),
            "not" => OpSpec::Boolean(BooleanOp::Not),
            "negate" => OpSpec::Negate,
            "brightness" => OpSpec::Brightness(req_arg(op, "delta", p1)?),
            "threshold" => OpSpec::Threshold(opt_arg(op, "threshold", p1)?),
            "select" => {
                let rgb = p1.ok_or("select needs a color (e.g. select:255,0,0:32)")?;
                let channels: Vec<&str> = rgb.split(',').collect();
                if channels.len() != 3 {
                    return Err(format!("select: color '{}' must be R,G,B", rgb));
                }
                OpSpec::Select {
                    target: [
                        arg(op, "red", channels[0])?,
                        arg(op, "green", channels[1])?,
                        arg(op, "blue", channels[2])?,
                    ],
                    tolerance: opt_arg(op, "tolerance", p2)?,
                }
            }
            "channel" => {
                let mode = match p1.map(|m| m.trim().to_lowercase()).as_deref() {
                    Some("original") => FilterMode::Original,
                    Some("red") => FilterMode::Red,
                    Some("green") => FilterMode::Green,
                    Some("blue") => FilterMode::Blue,
                    Some("gray") | Some("grayscale") => FilterMode::Grayscale,
                    _ => return Err("channel takes one of original, red, green, blue, gray".to_string()),
                };
                OpSpec::Channel(mode)
            }
            _ => return Err(format!("unknown operation '{}'", parts[0])),
        };
        Ok(spec)
    }
}

impl OpSpec {
    /// Run this op against `ws`.  Returns a note worth printing, if any.
    fn execute(
        &self,
        ws: &mut Workspace,
        settings: &EngineSettings,
        overlay: Option<&PixelBuffer>,
        offset: Offset,
    ) -> Result<Option<String>> {
        let offset = (offset.dx, offset.dy);
        let need_overlay = |name: &str| {
            overlay.ok_or_else(|| EngineError::invalid("overlay", format!("{} needs --overlay", name)))
        };

        match self {
            OpSpec::BoxBlur(size) => {
                let size = size.unwrap_or(settings.box_blur_size);
                ws.apply(|b| filters::box_blur(b, size))?;
            }
            OpSpec::Gaussian { size, sigma } => {
                let size = size.unwrap_or(settings.gaussian_size);
                let sigma = sigma.unwrap_or(settings.gaussian_sigma);
                ws.apply(|b| filters::gaussian_blur(b, size, sigma))?;
            }
            OpSpec::Median(size) => {
                let size = size.unwrap_or(settings.median_size);
                ws.apply(|b| filters::median(b, size))?;
            }
            OpSpec::Preset(preset) => ws.apply(|b| Ok(filters::apply_preset(b, *preset)))?,
            OpSpec::Sobel => ws.apply(|b| Ok(edges::sobel(b)))?,
            OpSpec::Prewitt => ws.apply(|b| Ok(edges::prewitt(b)))?,
            OpSpec::Robert => ws.apply(|b| Ok(edges::robert(b)))?,
            OpSpec::Canny(params) => {
                let params = params.unwrap_or_else(|| settings.canny_params());
                ws.apply(|b| edges::canny(b, &params))?;
            }
            OpSpec::Equalize => ws.apply(|b| Ok(histogram::equalize_global(b)))?,
            OpSpec::Stretch => ws.apply(|b| Ok(histogram::stretch_linear(b)))?,
            OpSpec::Adaptive(tile) => {
                let job = ws.prepare_adaptive_equalization(tile.unwrap_or(settings.adaptive_tile_size))?;
                let tile_size = job.tile_size();
                ws.apply_equalization(job.compute())?;
                return Ok(Some(format!("adaptive equalization with {}px tiles", tile_size)));
            }
            OpSpec::Rotate(degrees) => {
                ws.apply_rotation(*degrees)?;
                ws.commit(OperationFamily::Rotation);
            }
            OpSpec::FlipH => ws.apply(|b| Ok(transform::flip_horizontal(b)))?,
            OpSpec::FlipV => ws.apply(|b| Ok(transform::flip_vertical(b)))?,
            OpSpec::Grayscale => ws.apply(|b| Ok(adjustments::grayscale(b, Luma::Perceptual)))?,
            OpSpec::Gamma(g) => ws.apply(|b| adjustments::gamma(b, *g))?,
            OpSpec::Gain(g) => ws.apply(|b| adjustments::gain(b, *g))?,
            OpSpec::Distort(level) => {
                ws.apply_distortion(*level, settings.distortion_seed)?;
                ws.commit(OperationFamily::Distortion);
            }
            OpSpec::Arithmetic(op) => {
                ws.apply_arithmetic(need_overlay(op.label())?, *op, offset)?;
                ws.commit(OperationFamily::Arithmetic);
            }
            OpSpec::Scalar(op, factor) => {
                let note = ws.apply_scalar(*op, *factor)?;
                ws.commit(OperationFamily::Arithmetic);
                return Ok(note);
            }
            OpSpec::Boolean(op) => {
                let overlay = if *op == BooleanOp::Not { None } else { Some(need_overlay(op.label())?) };
                ws.apply_boolean(overlay, *op, offset)?;
                ws.commit(OperationFamily::Boolean);
            }
            OpSpec::Negate => ws.set_negation(!ws.toggles().negation),
            OpSpec::Brightness(delta) => {
                ws.adjust_brightness(*delta);
            }
            OpSpec::Threshold(t) => ws.set_binary_threshold(Some(t.unwrap_or(settings.binary_threshold))),
            OpSpec::Select { target, tolerance } => {
                let tolerance = tolerance.unwrap_or(settings.selection_tolerance);
                ws.set_color_selection(Some(ColorSelection::new(*target, tolerance)));
            }
            OpSpec::Channel(mode) => ws.set_filter_mode(*mode),
        }
        Ok(None)
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs, settings: &EngineSettings) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let save_format = parse_format(args.format.as_deref(), args.output.as_deref());

    let overlay = match &args.overlay {
        Some(path) => match load_image(path) {
            Ok(loaded) => Some(loaded.bitmap),
            Err(e) => {
                eprintln!("error: could not load overlay '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        match run_one(input_path, &args, settings, overlay.as_ref(), save_format, multi) {
            Ok(Some(output_path)) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Ok(None) => {}
            Err(e) => {
                crate::log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

/// Process one file.  Returns the written image path, if one was written.
fn run_one(
    input: &Path,
    args: &CliArgs,
    settings: &EngineSettings,
    overlay: Option<&PixelBuffer>,
    format: SaveFormat,
    multi: bool,
) -> Result<Option<PathBuf>> {
    // -- Step 1: Load ----------------------------------------------------
    let loaded = load_image(input)?;
    if args.verbose {
        println!("  {}x{} {}", loaded.width, loaded.height, loaded.pixel_format);
    }

    if args.extract {
        match stego::extract(&loaded.bitmap) {
            Ok(message) => println!("{}", message),
            Err(EngineError::NoMessageFound) => println!("  (no hidden message)"),
            Err(e) => return Err(e),
        }
        if !args.has_outputs() {
            return Ok(None);
        }
    }

    let mut ws = Workspace::new();
    ws.load(loaded.bitmap);

    // -- Step 2: Operations ----------------------------------------------
    for op in &args.ops {
        if let Some(note) = op.execute(&mut ws, settings, overlay, args.offset)?
            && args.verbose
        {
            println!("  {}", note);
        }
    }

    // -- Step 3: Render the display pipeline and optional payload --------
    let mut result = ws.processed_bitmap()?;
    if let Some(message) = &args.embed {
        result = stego::embed(&result, message)?;
    }

    // -- Step 4: Reports -------------------------------------------------
    if args.export_pixels.is_some() || args.stats {
        ws.replace_base(result.clone());
    }
    if let Some(path) = &args.export_pixels {
        let path = export_path(path, input, multi);
        export_pixel_cache(ws.extended_cache()?, &path)?;
    }
    if args.stats {
        println!("{}", serde_json::to_string(ws.histogram()?)?);
    }

    // -- Step 5: Save ----------------------------------------------------
    let needs_image = !args.ops.is_empty() || args.embed.is_some() || args.output.is_some() || args.output_dir.is_some();
    if !needs_image {
        return Ok(None);
    }
    let output_path = build_output_path(input, args.output.as_deref(), args.output_dir.as_deref(), format)
        .ok_or_else(|| EngineError::invalid("output", format!("cannot derive an output path for '{}'", input.display())))?;
    encode_and_write(&result.to_rgba_image(), &output_path, format, args.quality)?;
    Ok(Some(output_path))
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// `--format` wins, then the `--output` extension, then PNG.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> SaveFormat {
    if let Some(f) = format_arg {
        return SaveFormat::from_name(f).unwrap_or(SaveFormat::Png);
    }
    match output {
        Some(out) => SaveFormat::from_path(out),
        None => SaveFormat::Png,
    }
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_out` to stem if it would collide with the input path)
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

/// For batch runs `--export-pixels` names a directory holding `<stem>.pixels.json`.
fn export_path(arg: &Path, input: &Path, multi: bool) -> PathBuf {
    if !multi {
        return arg.to_path_buf();
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    arg.join(format!("{}.pixels.json", stem))
}
