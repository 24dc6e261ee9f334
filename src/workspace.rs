// ============================================================================
// WORKSPACE — base image, derived caches and the display pipeline
// ============================================================================
//
// The Workspace is the single owner of the working image.  Every derived view
// (filter cache, extended pixel cache, histogram) is invalidated through
// `replace_base`, the only place the base image changes.
//
// Display pipeline, always in this order:
//   filter mode → negation → brightness delta → binary threshold → color selection
//
// Single writer: callers serialize access.  Only adaptive equalization is
// split so its heavy half can run on another thread.
// ============================================================================

use std::borrow::Cow;
use std::collections::HashMap;

use rayon::prelude::*;
use serde::ser::{Serialize, Serializer};

use crate::canvas::{CH_A, CH_B, CH_G, CH_R, Luma, PixelBuffer};
use crate::error::{EngineError, Result};
use crate::history::{OperationFamily, SnapshotManager};
use crate::ops::adjustments::{self, ColorSelection};
use crate::ops::compositing::{self, ArithmeticOp, BooleanOp, ScalarOp};
use crate::ops::filters;
use crate::ops::histogram::{self, Histogram};
use crate::ops::transform;

/// Largest magnitude the buffered brightness delta can reach.
pub const MAX_BRIGHTNESS_DELTA: i32 = 255;

// ============================================================================
// FILTER MODES
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterMode {
    #[default]
    Original,
    Red,
    Green,
    Blue,
    Grayscale,
}

impl FilterMode {
    pub fn all() -> &'static [FilterMode] {
        &[
            FilterMode::Original,
            FilterMode::Red,
            FilterMode::Green,
            FilterMode::Blue,
            FilterMode::Grayscale,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            FilterMode::Original => "Original",
            FilterMode::Red => "Red",
            FilterMode::Green => "Green",
            FilterMode::Blue => "Blue",
            FilterMode::Grayscale => "Grayscale",
        }
    }

    /// Render this mode from the base image.
    pub fn render(self, base: &PixelBuffer) -> PixelBuffer {
        match self {
            FilterMode::Original => base.clone(),
            FilterMode::Red => filters::isolate_channel(base, CH_R),
            FilterMode::Green => filters::isolate_channel(base, CH_G),
            FilterMode::Blue => filters::isolate_channel(base, CH_B),
            FilterMode::Grayscale => adjustments::grayscale(base, Luma::Perceptual),
        }
    }
}

/// Rendered filter-mode bitmaps for the current base image.
#[derive(Clone, Debug, Default)]
pub struct FilterCache {
    entries: HashMap<FilterMode, PixelBuffer>,
}

impl FilterCache {
    pub fn get_or_render(&mut self, mode: FilterMode, base: &PixelBuffer) -> &PixelBuffer {
        self.entries.entry(mode).or_insert_with(|| mode.render(base))
    }

    pub fn contains(&self, mode: FilterMode) -> bool {
        self.entries.contains_key(&mode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// EXTENDED PIXEL CACHE
// ============================================================================

/// Index of each plane inside an [`ExtendedPixelCache`] entry.
pub const EXT_R: usize = 0;
pub const EXT_G: usize = 1;
pub const EXT_B: usize = 2;
pub const EXT_GRAY: usize = 3;
pub const EXT_A: usize = 4;

/// `[x][y]` → `[R, G, B, Gray, A]` with perceptual gray.
/// Stored column-major so one column is one contiguous run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedPixelCache {
    width: u32,
    height: u32,
    entries: Vec<[u8; 5]>,
}

impl ExtendedPixelCache {
    pub fn build(src: &PixelBuffer) -> Self {
        let (w, h) = (src.width(), src.height());
        let mut entries = vec![[0u8; 5]; w as usize * h as usize];
        if h > 0 {
            entries.par_chunks_mut(h as usize).enumerate().for_each(|(x, column)| {
                for (y, entry) in column.iter_mut().enumerate() {
                    let px = src.pixel(x as u32, y as u32);
                    *entry = [px[CH_R], px[CH_G], px[CH_B], Luma::Perceptual.of_bgra(&px), px[CH_A]];
                }
            });
        }
        Self { width: w, height: h, entries }
    }

    pub fn width(&self) -> u32 { self.width }

    pub fn height(&self) -> u32 { self.height }

    pub fn get(&self, x: u32, y: u32) -> Option<[u8; 5]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.entries.get(x as usize * self.height as usize + y as usize).copied()
    }

    /// Entries of column `x`, top to bottom.
    pub fn column(&self, x: u32) -> &[[u8; 5]] {
        let h = self.height as usize;
        let start = x as usize * h;
        self.entries.get(start..start + h).unwrap_or(&[])
    }

    pub fn columns(&self) -> impl Iterator<Item = &[[u8; 5]]> {
        (0..self.width).map(move |x| self.column(x))
    }

    pub fn to_nested(&self) -> Vec<Vec<[u8; 5]>> {
        self.columns().map(|c| c.to_vec()).collect()
    }
}

/// Serializes as nested arrays `[x][y][R, G, B, Gray, A]`.
impl Serialize for ExtendedPixelCache {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.columns())
    }
}

// ============================================================================
// DISPLAY TOGGLES
// ============================================================================

/// Transient per-feature display state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplayToggles {
    pub negation: bool,
    pub brightness_delta: i32,
    pub binary_threshold: Option<u8>,
    pub color_selection: Option<ColorSelection>,
}

impl DisplayToggles {
    /// Run the fixed-order pipeline over an already filtered bitmap.
    pub fn apply<'a>(&self, filtered: &'a PixelBuffer) -> Cow<'a, PixelBuffer> {
        let mut cur = Cow::Borrowed(filtered);
        if self.negation {
            cur = Cow::Owned(adjustments::negate(&cur));
        }
        if self.brightness_delta != 0 {
            cur = Cow::Owned(adjustments::brightness(&cur, self.brightness_delta));
        }
        if let Some(t) = self.binary_threshold {
            cur = Cow::Owned(adjustments::binary_threshold(&cur, t));
        }
        if let Some(sel) = &self.color_selection {
            cur = Cow::Owned(adjustments::color_selection(&cur, sel));
        }
        cur
    }
}

// ============================================================================
// TWO-PHASE ADAPTIVE EQUALIZATION
// ============================================================================

/// Everything the compute phase needs, detached from the Workspace.
#[derive(Clone, Debug)]
pub struct EqualizationJob {
    generation: u64,
    tile_size: u32,
    source: PixelBuffer,
}

impl EqualizationJob {
    /// Heavy half.  Touches no Workspace state, so it may run anywhere.
    pub fn compute(self) -> PendingEqualization {
        let data = histogram::compute_adaptive_buffer(&self.source, self.tile_size);
        PendingEqualization {
            generation: self.generation,
            width: self.source.width(),
            height: self.source.height(),
            tile_size: self.tile_size,
            data,
        }
    }

    pub fn tile_size(&self) -> u32 { self.tile_size }
}

/// A computed equalization waiting to be applied.
#[derive(Clone, Debug)]
pub struct PendingEqualization {
    generation: u64,
    width: u32,
    height: u32,
    tile_size: u32,
    data: Vec<u8>,
}

impl PendingEqualization {
    pub fn generation(&self) -> u64 { self.generation }

    pub fn tile_size(&self) -> u32 { self.tile_size }

    pub fn dimensions(&self) -> (u32, u32) { (self.width, self.height) }
}

// ============================================================================
// WORKSPACE
// ============================================================================

#[derive(Debug, Default)]
pub struct Workspace {
    base: Option<PixelBuffer>,
    /// Bumped on every base replacement.
    generation: u64,
    filter_mode: FilterMode,
    filter_cache: FilterCache,
    extended: Option<ExtendedPixelCache>,
    /// `None` means stale.
    histogram: Option<Histogram>,
    toggles: DisplayToggles,
    snapshots: SnapshotManager,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Lifecycle --------------------------------------------------------

    /// Reset and take `image` as the new base.
    pub fn load(&mut self, image: PixelBuffer) {
        self.reset();
        crate::log_info!("Workspace loaded {}x{} image", image.width(), image.height());
        self.replace_base(image);
    }

    /// Drop the image, every cache, snapshot and toggle.
    pub fn reset(&mut self) {
        self.base = None;
        self.generation += 1;
        self.filter_mode = FilterMode::Original;
        self.filter_cache.clear();
        self.extended = None;
        self.histogram = None;
        self.toggles = DisplayToggles::default();
        self.snapshots.clear_all();
    }

    pub fn is_loaded(&self) -> bool {
        self.base.is_some()
    }

    pub fn base(&self) -> Option<&PixelBuffer> {
        self.base.as_ref()
    }

    fn require_base(&self) -> Result<&PixelBuffer> {
        self.base.as_ref().ok_or(EngineError::NoImageLoaded)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Install a new base image and invalidate every derived view.
    /// Snapshots are kept.
    pub fn replace_base(&mut self, image: PixelBuffer) {
        self.generation += 1;
        self.extended = Some(ExtendedPixelCache::build(&image));
        self.filter_cache.clear();
        self.histogram = None;
        self.base = Some(image);
    }

    /// Run a non-family transform against the base.  On error nothing changes.
    pub fn apply<F>(&mut self, op: F) -> Result<()>
    where
        F: FnOnce(&PixelBuffer) -> Result<PixelBuffer>,
    {
        let result = op(self.require_base()?)?;
        self.replace_base(result);
        Ok(())
    }

    // --- Filter modes and display toggles ---------------------------------

    pub fn filter_mode(&self) -> FilterMode {
        self.filter_mode
    }

    pub fn set_filter_mode(&mut self, mode: FilterMode) {
        self.filter_mode = mode;
    }

    pub fn filter_cache(&self) -> &FilterCache {
        &self.filter_cache
    }

    /// Active filter mode rendered from the base, memoized per mode.
    pub fn filtered_bitmap(&mut self) -> Result<&PixelBuffer> {
        let base = self.base.as_ref().ok_or(EngineError::NoImageLoaded)?;
        if self.filter_mode == FilterMode::Original {
            return Ok(base);
        }
        Ok(self.filter_cache.get_or_render(self.filter_mode, base))
    }

    pub fn toggles(&self) -> &DisplayToggles {
        &self.toggles
    }

    pub fn set_negation(&mut self, active: bool) {
        self.toggles.negation = active;
    }

    /// Add to the buffered brightness delta, clamped to ±255.
    /// Returns the new cumulative delta.
    pub fn adjust_brightness(&mut self, delta: i32) -> i32 {
        let next = self.toggles.brightness_delta.saturating_add(delta);
        self.toggles.brightness_delta = next.clamp(-MAX_BRIGHTNESS_DELTA, MAX_BRIGHTNESS_DELTA);
        self.toggles.brightness_delta
    }

    pub fn clear_brightness(&mut self) {
        self.toggles.brightness_delta = 0;
    }

    pub fn set_binary_threshold(&mut self, threshold: Option<u8>) {
        self.toggles.binary_threshold = threshold;
    }

    pub fn set_color_selection(&mut self, selection: Option<ColorSelection>) {
        self.toggles.color_selection = selection;
    }

    /// The image to display: filtered base run through every active toggle.
    pub fn processed_bitmap(&mut self) -> Result<PixelBuffer> {
        let toggles = self.toggles;
        let filtered = self.filtered_bitmap()?;
        Ok(toggles.apply(filtered).into_owned())
    }

    // --- Derived views ----------------------------------------------------

    /// Histogram of the base, rebuilt on first access after a base change.
    pub fn histogram(&mut self) -> Result<&Histogram> {
        let base = self.base.as_ref().ok_or(EngineError::NoImageLoaded)?;
        Ok(self.histogram.get_or_insert_with(|| Histogram::build(base)))
    }

    pub fn is_histogram_stale(&self) -> bool {
        self.histogram.is_none()
    }

    pub fn extended_cache(&self) -> Result<&ExtendedPixelCache> {
        self.extended.as_ref().ok_or(EngineError::NoImageLoaded)
    }

    // --- Operation families -----------------------------------------------

    /// Run `op` against the family baseline (or the base when none is held),
    /// then capture the baseline and install the result.  A failing `op`
    /// leaves the Workspace untouched.
    fn apply_family<F>(&mut self, family: OperationFamily, label: &str, op: F) -> Result<()>
    where
        F: FnOnce(&PixelBuffer) -> Result<PixelBuffer>,
    {
        let base = self.base.as_ref().ok_or(EngineError::NoImageLoaded)?;
        let source = self.snapshots.baseline(family).unwrap_or(base);
        let result = op(source)?;
        self.snapshots.capture_if_absent(family, base, label);
        self.replace_base(result);
        Ok(())
    }

    pub fn apply_arithmetic(&mut self, overlay: &PixelBuffer, op: ArithmeticOp, offset: (i32, i32)) -> Result<()> {
        self.apply_family(OperationFamily::Arithmetic, op.label(), |src| {
            compositing::arithmetic(src, overlay, op, offset)
        })
    }

    /// Scalar multiply / divide in the arithmetic family.  Returns the
    /// clamping note, if any.
    pub fn apply_scalar(&mut self, op: ScalarOp, factor: f32) -> Result<Option<String>> {
        let mut note = None;
        self.apply_family(OperationFamily::Arithmetic, op.label(), |src| {
            let outcome = compositing::scalar(src, op, factor)?;
            note = outcome.note;
            Ok(outcome.buffer)
        })?;
        Ok(note)
    }

    pub fn apply_boolean(&mut self, overlay: Option<&PixelBuffer>, op: BooleanOp, offset: (i32, i32)) -> Result<()> {
        self.apply_family(OperationFamily::Boolean, op.label(), |src| {
            compositing::boolean(src, overlay, op, offset)
        })
    }

    pub fn apply_rotation(&mut self, degrees: f64) -> Result<()> {
        self.apply_family(OperationFamily::Rotation, "Rotate", |src| transform::rotate(src, degrees))
    }

    pub fn apply_distortion(&mut self, level: f32, seed: u32) -> Result<()> {
        self.apply_family(OperationFamily::Distortion, "Distort", |src| {
            adjustments::distort(src, level, seed)
        })
    }

    /// Put the family baseline back as the base and empty the slot.
    pub fn restore(&mut self, family: OperationFamily) -> Result<()> {
        let snapshot = self.snapshots.take(family)?;
        self.replace_base(snapshot.baseline);
        Ok(())
    }

    /// Keep the current result and drop the family baseline.
    pub fn commit(&mut self, family: OperationFamily) {
        self.snapshots.clear(family);
    }

    pub fn has_snapshot(&self, family: OperationFamily) -> bool {
        self.snapshots.contains(family)
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    // --- Adaptive equalization --------------------------------------------

    /// Detach what the compute phase needs.  The job is `Send`.
    pub fn prepare_adaptive_equalization(&self, tile_size: u32) -> Result<EqualizationJob> {
        let base = self.require_base()?;
        let tile_size = histogram::effective_tile_size(tile_size, base.width(), base.height());
        Ok(EqualizationJob { generation: self.generation, tile_size, source: base.clone() })
    }

    /// Prepare and compute in one call on the current thread.
    pub fn compute_adaptive_equalization(&self, tile_size: u32) -> Result<PendingEqualization> {
        let job = self.prepare_adaptive_equalization(tile_size)?;
        crate::log_info!("Adaptive equalization computing with {}px tiles", job.tile_size());
        Ok(job.compute())
    }

    /// Install a computed equalization.  Fails with `StaleComputation` if the
    /// base changed since the job was prepared.
    pub fn apply_equalization(&mut self, pending: PendingEqualization) -> Result<()> {
        self.require_base()?;
        if pending.generation != self.generation {
            crate::log_warn!(
                "Discarding adaptive equalization from generation {} (current {})",
                pending.generation,
                self.generation
            );
            return Err(EngineError::StaleComputation);
        }
        let image = PixelBuffer::from_raw(pending.width, pending.height, pending.data)?;
        crate::log_info!("Adaptive equalization applied ({}px tiles)", pending.tile_size);
        self.replace_base(image);
        Ok(())
    }
}
