//! mosaic-engine: Pure tile stitching and seam-blending engine (sans-IO).
//!
//! Assembles a grid of stage-scan tiles into one mosaic through:
//! denoise -> illumination flattening -> exposure equalization ->
//! serpentine placement with optional seam blending.
//!
//! This crate has **no I/O dependencies** -- tiles arrive as decoded
//! in-memory images tagged with their grid position, and the mosaic is
//! returned as an image. Reading tile files and writing results is the
//! caller's job.

pub mod blend;
pub mod compositor;
pub mod config;
pub mod denoise;
pub mod diagnostics;
pub mod exposure;
pub mod geometry;
pub mod grayscale;
pub mod illumination;
pub mod plane;
pub mod preprocess;
pub mod preview;
pub mod pyramid;
pub mod tile;
pub mod traversal;
pub mod types;

pub use blend::{BlendMode, Blender, Edge, SeamBlender};
pub use compositor::{Mosaic, NoopObserver, PlacementEvent, PlacementObserver};
pub use config::{Crop, CropPolicy, Overlap, RecoveryPolicy, StitchConfig};
pub use denoise::DenoiseFilter;
pub use exposure::{ExposureMode, ExposureStrategy, ReferencePolicy};
pub use geometry::{GridLayout, resolve_layout};
pub use illumination::{ClaheParams, IlluminationMode, IlluminationStrategy};
pub use tile::{Tile, TileSet};
pub use types::{GrayImage, GridPos, PixelFormat, Rect, RgbImage, StitchError, TileImage};

/// Stitch a tile grid into a single mosaic.
///
/// # Pipeline steps
///
/// 1. Validate the configuration
/// 2. Resolve crop, overlap and canvas geometry from the grid
/// 3. Denoise and flatten illumination per tile (parallel)
/// 4. Equalize exposure against each tile's reference
/// 5. Place tiles in serpentine order, blending seams against the canvas
///
/// `observer` is told about every placement and may stop the run early.
///
/// # Errors
///
/// Returns [`StitchError::InvalidConfig`] or [`StitchError::InvalidGeometry`]
/// for unusable settings, any preprocessing error under
/// [`RecoveryPolicy::Abort`], [`StitchError::DimensionMismatch`] from a
/// seam blend, and [`StitchError::Aborted`] if the observer breaks.
///
/// [`diagnostics::stitch_with_diagnostics`] runs the same steps and also
/// reports per-stage timing.
pub fn stitch<O>(
    tiles: &TileSet,
    config: &StitchConfig,
    observer: &mut O,
) -> Result<Mosaic, StitchError>
where
    O: PlacementObserver + ?Sized,
{
    diagnostics::stitch_with_diagnostics(tiles, config, observer, &diagnostics::Untimed)
        .map(|(mosaic, _)| mosaic)
}
