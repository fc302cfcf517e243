//! Stitch diagnostics: timing and counts for each stage of a run.
//!
//! [`stitch_with_diagnostics`] runs the same steps as
//! [`stitch`](crate::stitch) and records how long preprocessing and
//! composition took, which strategies ran, and how many blends were
//! performed or skipped.
//!
//! Timestamps come from a caller-supplied [`Clock`] so the engine never
//! reads the system time itself. Durations are serialized as fractional
//! seconds (`f64`) for JSON compatibility.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::blend::BlendMode;
use crate::compositor::{BlendCounts, Mosaic, PlacementObserver, composite};
use crate::config::StitchConfig;
use crate::denoise::DenoiseFilter;
use crate::exposure::{ExposureMode, ReferencePolicy};
use crate::geometry::resolve_layout;
use crate::illumination::IlluminationMode;
use crate::preprocess::prepare;
use crate::tile::TileSet;
use crate::types::StitchError;

/// Source of timestamps for diagnostics.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time passed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom("duration seconds must be finite and non-negative"))
    }
}

/// Diagnostics collected from a single stitch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchDiagnostics {
    /// Denoise, illumination flattening and exposure equalization.
    pub preprocess: StageDiagnostics,
    /// Placement and seam blending.
    pub composite: StageDiagnostics,
    /// Wall-clock duration of the whole run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Grid and canvas geometry.
    pub summary: StitchSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Per-tile correction.
    Preprocess {
        /// Tiles processed.
        tiles: usize,
        /// Smoothing filter.
        denoise: DenoiseFilter,
        /// Illumination strategy.
        illumination: IlluminationMode,
        /// Exposure strategy.
        exposure: ExposureMode,
        /// Exposure reference policy.
        reference: ReferencePolicy,
        /// Steps that failed and passed their tile through unmodified.
        fallbacks: usize,
    },
    /// Canvas composition.
    Composite {
        /// Seam blending algorithm.
        blend_mode: BlendMode,
        /// Tiles placed.
        placed: usize,
        /// Blends by edge, plus skipped blends.
        blends: BlendCounts,
    },
}

/// Geometry of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchSummary {
    /// Tiles supplied.
    pub tiles: usize,
    /// Grid rows.
    pub rows: u32,
    /// Grid columns.
    pub cols: u32,
    /// Grid cells with no tile.
    pub missing: usize,
    /// Cropped tile width.
    pub tile_width: u32,
    /// Cropped tile height.
    pub tile_height: u32,
    /// Canvas width.
    pub canvas_width: u32,
    /// Canvas height.
    pub canvas_height: u32,
}

impl StitchDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Stitch Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Grid: {}x{} ({} tiles, {} missing)",
            self.summary.rows, self.summary.cols, self.summary.tiles, self.summary.missing,
        ));
        lines.push(format!(
            "Tile: {}x{}  ->  Canvas: {}x{}",
            self.summary.tile_width,
            self.summary.tile_height,
            self.summary.canvas_width,
            self.summary.canvas_height,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in [("Preprocess", &self.preprocess), ("Composite", &self.composite)] {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Preprocess {
            tiles,
            denoise,
            illumination,
            exposure,
            reference,
            fallbacks,
        } => format!(
            "{tiles} tiles denoise={denoise} illumination={illumination} exposure={exposure}/{reference} fallbacks={fallbacks}",
        ),
        StageMetrics::Composite {
            blend_mode,
            placed,
            blends,
        } => format!(
            "{blend_mode} placed={placed} blends L={} R={} T={} B={} skipped={}",
            blends.left, blends.right, blends.top, blends.bottom, blends.skipped,
        ),
    }
}

/// A clock that never advances, for runs nobody times.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Untimed;

impl Clock for Untimed {
    type Instant = ();

    fn now(&self) {}

    fn elapsed(&self, _since: &()) -> Duration {
        Duration::ZERO
    }
}

/// [`stitch`](crate::stitch) with per-stage timing.
///
/// # Pipeline steps
///
/// 1. Validate the configuration
/// 2. Resolve crop, overlap and canvas geometry from the grid
/// 3. Denoise and flatten illumination per tile (parallel)
/// 4. Equalize exposure against each tile's reference
/// 5. Place tiles in serpentine order, blending seams against the canvas
///
/// # Errors
///
/// Same as [`stitch`](crate::stitch).
pub fn stitch_with_diagnostics<O, C>(
    tiles: &TileSet,
    config: &StitchConfig,
    observer: &mut O,
    clock: &C,
) -> Result<(Mosaic, StitchDiagnostics), StitchError>
where
    O: PlacementObserver + ?Sized,
    C: Clock,
{
    let start = clock.now();

    // 1. Configuration.
    config.validate()?;

    // 2. Geometry.
    let (raw_width, raw_height) = tiles.raw_size();
    let layout = resolve_layout(raw_width, raw_height, tiles.rows(), tiles.cols(), config)?;
    tracing::info!(
        "stitching {} tiles on a {}x{} grid into a {}x{} canvas",
        tiles.len(),
        layout.rows,
        layout.cols,
        layout.canvas_width,
        layout.canvas_height
    );

    // 3-4. Per-tile correction.
    let t = clock.now();
    let prepared = prepare(tiles, config)?;
    let preprocess = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Preprocess {
            tiles: prepared.tiles.len(),
            denoise: config.denoise,
            illumination: config.illumination,
            exposure: config.exposure,
            reference: config.reference,
            fallbacks: prepared.fallbacks,
        },
    };

    // 5. Placement.
    let t = clock.now();
    let blender = config.blend_mode.blender(config.pyramid_levels);
    let (canvas, stats) = composite(
        &prepared.tiles,
        &layout,
        blender,
        config.preview_scale,
        observer,
    )?;
    tracing::info!(
        "placed {} tiles with {} seam blends ({} skipped)",
        stats.placed,
        stats.blends.performed(),
        stats.blends.skipped
    );
    let composite = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Composite {
            blend_mode: config.blend_mode,
            placed: stats.placed,
            blends: stats.blends,
        },
    };

    let missing = tiles.missing();
    let summary = StitchSummary {
        tiles: tiles.len(),
        rows: layout.rows,
        cols: layout.cols,
        missing: missing.len(),
        tile_width: layout.tile_width,
        tile_height: layout.tile_height,
        canvas_width: layout.canvas_width,
        canvas_height: layout.canvas_height,
    };
    let diagnostics = StitchDiagnostics {
        preprocess,
        composite,
        total_duration: clock.elapsed(&start),
        summary,
    };
    let mosaic = Mosaic {
        canvas,
        layout,
        missing,
    };
    Ok((mosaic, diagnostics))
}
