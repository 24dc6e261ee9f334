//! RasterFE — the non-destructive pixel engine behind a bitmap editor.
//!
//! Every transform takes a canonical BGRA8 [`PixelBuffer`] and returns a new
//! one.  The [`Workspace`] owns the working image, keeps the derived caches
//! coherent, and gives each toggleable operation family a single-slot
//! snapshot so re-applying never compounds.

#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod canvas;
pub mod cli;
pub mod error;
pub mod history;
pub mod io;
pub mod ops;
pub mod settings;
pub mod workspace;

pub use canvas::{Luma, PixelBuffer, PixelFormat, RawBitmap, normalize};
pub use error::{EngineError, Result};
pub use history::{OperationFamily, Snapshot, SnapshotManager};
pub use io::{LoadedImage, load_image, save_image};
pub use settings::EngineSettings;
pub use workspace::{ExtendedPixelCache, FilterMode, PendingEqualization, Workspace};
