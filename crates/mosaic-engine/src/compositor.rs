//! Sequential placement of tiles onto the shared canvas.
//!
//! The compositor is the only writer of the canvas for the duration of a
//! run. Tiles are visited in the serpentine order of
//! [`plan_placements`]; for each one the compositor
//!
//! 1. crops the raw tile to the layout's crop rectangle,
//! 2. blends each planned edge against canvas content already written
//!    by the neighbour on that side,
//! 3. copies the whole tile onto its destination rectangle, and
//! 4. notifies the observer with the (optionally downscaled) canvas.
//!
//! Cells with no tile stay background (zero). Blends against such a
//! missing neighbour are skipped and counted.

use std::collections::HashMap;
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::blend::{Blender, Edge, SeamBlender};
use crate::geometry::GridLayout;
use crate::preview;
use crate::tile::Tile;
use crate::traversal::{neighbour, plan_placements};
use crate::types::{GridPos, PixelFormat, Rect, StitchError, TileImage};

/// A finished stitch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mosaic {
    /// The composited image.
    pub canvas: TileImage,
    /// Geometry the canvas was built with.
    pub layout: GridLayout,
    /// Grid cells that had no tile, in row-major order.
    pub missing: Vec<GridPos>,
}

/// The mosaic under construction.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: TileImage,
}

impl Canvas {
    /// A zero-filled canvas sized for `layout`.
    #[must_use]
    pub fn new(format: PixelFormat, layout: &GridLayout) -> Self {
        Self {
            image: TileImage::blank(format, layout.canvas_width, layout.canvas_height),
        }
    }

    /// Current pixels.
    #[must_use]
    pub const fn image(&self) -> &TileImage {
        &self.image
    }

    /// Consume the canvas and return its pixels.
    #[must_use]
    pub fn into_image(self) -> TileImage {
        self.image
    }

    /// Copy of the pixels under `rect`.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::OutOfBounds`] if `rect` leaves the canvas.
    pub fn region(&self, rect: Rect) -> Result<TileImage, StitchError> {
        self.image.crop(rect)
    }

    /// Overwrite the pixels under `dest` with `tile`.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::OutOfBounds`] if the tile would leave the
    /// canvas and [`StitchError::InvalidPixelFormat`] on a format mismatch.
    pub fn place(&mut self, tile: &TileImage, dest: Rect) -> Result<(), StitchError> {
        self.image.paste(tile, dest.x, dest.y)
    }
}

/// Progress notification sent after every placement.
#[derive(Debug, Clone, Copy)]
pub struct PlacementEvent<'a> {
    /// Cell that was just placed.
    pub pos: GridPos,
    /// Tiles placed so far, including this one.
    pub placed: usize,
    /// Tiles that will be placed in this run.
    pub total: usize,
    /// Canvas state, downscaled when a preview scale is configured.
    pub canvas: &'a TileImage,
}

/// Receives progress after each placement.
///
/// Returning [`ControlFlow::Break`] abandons the run; the stitch then
/// fails with [`StitchError::Aborted`] and the partial canvas is dropped.
pub trait PlacementObserver {
    /// Called synchronously after a tile has been copied onto the canvas.
    fn on_placed(&mut self, event: &PlacementEvent<'_>) -> ControlFlow<()>;
}

impl<F> PlacementObserver for F
where
    F: FnMut(&PlacementEvent<'_>) -> ControlFlow<()>,
{
    fn on_placed(&mut self, event: &PlacementEvent<'_>) -> ControlFlow<()> {
        self(event)
    }
}

/// An observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PlacementObserver for NoopObserver {
    fn on_placed(&mut self, _event: &PlacementEvent<'_>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Seam blends performed during composition, by edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlendCounts {
    /// Blends along a tile's left edge.
    pub left: usize,
    /// Blends along a tile's right edge.
    pub right: usize,
    /// Blends along a tile's top edge.
    pub top: usize,
    /// Blends along a tile's bottom edge.
    pub bottom: usize,
    /// Planned blends skipped because the neighbour was missing.
    pub skipped: usize,
}

impl BlendCounts {
    fn record(&mut self, edge: Edge) {
        match edge {
            Edge::Left => self.left += 1,
            Edge::Right => self.right += 1,
            Edge::Top => self.top += 1,
            Edge::Bottom => self.bottom += 1,
        }
    }

    /// Blends actually performed.
    #[must_use]
    pub const fn performed(&self) -> usize {
        self.left + self.right + self.top + self.bottom
    }
}

/// Counts collected by [`composite`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositeStats {
    /// Tiles copied onto the canvas.
    pub placed: usize,
    /// Seam blends by edge.
    pub blends: BlendCounts,
}

/// Place `tiles` onto a fresh canvas in serpentine order.
///
/// `tiles` are raw (uncropped) and must all share one pixel format. With
/// `blender` set to `None` tiles are placed edge to edge.
///
/// # Errors
///
/// Returns [`StitchError::EmptyInput`] for no tiles,
/// [`StitchError::UnsupportedTilePosition`] for a tile outside the
/// layout's grid, any error raised by a blend (notably
/// [`StitchError::DimensionMismatch`]), which aborts the whole run, and
/// [`StitchError::Aborted`] if the observer breaks.
pub fn composite<O>(
    tiles: &[Tile],
    layout: &GridLayout,
    blender: Option<Blender>,
    preview_scale: u32,
    observer: &mut O,
) -> Result<(TileImage, CompositeStats), StitchError>
where
    O: PlacementObserver + ?Sized,
{
    let format = tiles.first().ok_or(StitchError::EmptyInput)?.image().format();
    if let Some(stray) = tiles
        .iter()
        .find(|t| t.pos().row >= layout.rows || t.pos().col >= layout.cols)
    {
        return Err(StitchError::UnsupportedTilePosition {
            pos: stray.pos(),
            rows: layout.rows,
            cols: layout.cols,
        });
    }
    let by_pos: HashMap<GridPos, &Tile> = tiles.iter().map(|t| (t.pos(), t)).collect();
    let mut canvas = Canvas::new(format, layout);
    let mut stats = CompositeStats::default();
    let crop = layout.crop_rect();

    for step in plan_placements(layout)? {
        let Some(tile) = by_pos.get(&step.pos) else {
            continue;
        };
        let mut image = tile.image().crop(crop)?;

        if let Some(blender) = blender {
            for &edge in step.edges {
                let Some(strip) = seam_rect(step.dest, edge, layout) else {
                    continue;
                };
                let present = neighbour(step.pos, edge).is_some_and(|n| by_pos.contains_key(&n));
                if !present {
                    tracing::warn!("tile {} has no {} neighbour; skipping blend", step.pos, edge);
                    stats.blends.skipped += 1;
                    continue;
                }
                let prior = canvas.region(strip)?;
                image = blender.blend(&image, &prior, edge)?;
                stats.blends.record(edge);
            }
        }

        canvas.place(&image, step.dest)?;
        stats.placed += 1;
        tracing::debug!(
            "placed {} ({}) at ({}, {}) blending {:?}",
            step.pos,
            tile.source_id(),
            step.dest.x,
            step.dest.y,
            step.edges
        );

        let preview = preview::downscale(canvas.image(), preview_scale);
        let event = PlacementEvent {
            pos: step.pos,
            placed: stats.placed,
            total: tiles.len(),
            canvas: &preview,
        };
        if observer.on_placed(&event).is_break() {
            tracing::info!("stitch aborted after {} placements", stats.placed);
            return Err(StitchError::Aborted {
                placed: stats.placed,
            });
        }
    }

    Ok((canvas.into_image(), stats))
}

/// Canvas rectangle under the `edge` strip of a tile placed at `dest`,
/// or `None` when tiles do not overlap on that axis.
fn seam_rect(dest: Rect, edge: Edge, layout: &GridLayout) -> Option<Rect> {
    let (ox, oy) = (layout.overlap_x, layout.overlap_y);
    let rect = match edge {
        Edge::Left => Rect::new(dest.x, dest.y, ox, dest.height),
        Edge::Right => Rect::new(dest.x + dest.width - ox, dest.y, ox, dest.height),
        Edge::Top => Rect::new(dest.x, dest.y, dest.width, oy),
        Edge::Bottom => Rect::new(dest.x, dest.y + dest.height - oy, dest.width, oy),
    };
    (rect.width > 0 && rect.height > 0).then_some(rect)
}
