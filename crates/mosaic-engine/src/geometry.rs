//! Grid geometry: crop, overlap, tile and canvas sizes.
//!
//! Without blending, tiles are cropped by the configured margins and
//! placed edge to edge:
//!
//! ```text
//! tile_width   = raw_width - 2 * crop_x
//! canvas_width = tile_width * cols
//! ```
//!
//! With blending, adjacent tiles share `overlap_x` columns, so each tile
//! after the first advances by `tile_width - overlap_x`:
//!
//! ```text
//! canvas_width = tile_width * cols - overlap_x * (cols - 1)
//! ```
//!
//! The crop used when blending depends on [`CropPolicy`].

use serde::{Deserialize, Serialize};

use crate::config::{CropPolicy, StitchConfig};
use crate::types::{GridPos, Rect, StitchError};

/// Resolved placement geometry for one stitch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    /// Pixels stripped from the left and right of each raw tile.
    pub crop_x: u32,
    /// Pixels stripped from the top and bottom of each raw tile.
    pub crop_y: u32,
    /// Columns shared by horizontally adjacent tiles.
    pub overlap_x: u32,
    /// Rows shared by vertically adjacent tiles.
    pub overlap_y: u32,
    /// Cropped tile width.
    pub tile_width: u32,
    /// Cropped tile height.
    pub tile_height: u32,
    /// Canvas width.
    pub canvas_width: u32,
    /// Canvas height.
    pub canvas_height: u32,
    /// Grid rows.
    pub rows: u32,
    /// Grid columns.
    pub cols: u32,
}

impl GridLayout {
    /// The region of a raw tile that survives cropping.
    #[must_use]
    pub const fn crop_rect(&self) -> Rect {
        Rect::new(self.crop_x, self.crop_y, self.tile_width, self.tile_height)
    }

    /// Where the cropped tile at `pos` lands on the canvas.
    #[must_use]
    pub const fn destination(&self, pos: GridPos) -> Rect {
        Rect::new(
            pos.col * (self.tile_width - self.overlap_x),
            pos.row * (self.tile_height - self.overlap_y),
            self.tile_width,
            self.tile_height,
        )
    }

    /// Returns `true` if adjacent tiles share pixels on either axis.
    #[must_use]
    pub const fn has_overlap(&self) -> bool {
        self.overlap_x > 0 || self.overlap_y > 0
    }
}

/// Compute the [`GridLayout`] for a `rows`×`cols` grid of
/// `raw_width`×`raw_height` tiles.
///
/// # Errors
///
/// Returns [`StitchError::InvalidGeometry`] if the cropped tile would be
/// empty, or if the overlap would consume a whole tile.
pub fn resolve_layout(
    raw_width: u32,
    raw_height: u32,
    rows: u32,
    cols: u32,
    config: &StitchConfig,
) -> Result<GridLayout, StitchError> {
    let ((crop_x, overlap_x), (crop_y, overlap_y)) = if config.blending_enabled() {
        match config.crop_policy {
            CropPolicy::TransitionDerived => (
                (config.overlap.x / 2, config.overlap.x),
                (config.overlap.y / 2, config.overlap.y),
            ),
            CropPolicy::Combined => (
                combined_axis(config.crop.x, config.overlap.x),
                combined_axis(config.crop.y, config.overlap.y),
            ),
        }
    } else {
        ((config.crop.x, 0), (config.crop.y, 0))
    };

    let tile_width = i64::from(raw_width) - 2 * i64::from(crop_x);
    let tile_height = i64::from(raw_height) - 2 * i64::from(crop_y);
    let invalid = StitchError::InvalidGeometry {
        tile_width,
        tile_height,
        overlap_x,
        overlap_y,
    };
    if tile_width <= 0
        || tile_height <= 0
        || i64::from(overlap_x) >= tile_width
        || i64::from(overlap_y) >= tile_height
    {
        return Err(invalid);
    }
    let (Ok(tile_width), Ok(tile_height)) = (u32::try_from(tile_width), u32::try_from(tile_height))
    else {
        return Err(invalid);
    };

    let canvas_width = canvas_extent(tile_width, overlap_x, cols).ok_or_else(|| invalid.clone())?;
    let canvas_height = canvas_extent(tile_height, overlap_y, rows).ok_or(invalid)?;

    Ok(GridLayout {
        crop_x,
        crop_y,
        overlap_x,
        overlap_y,
        tile_width,
        tile_height,
        canvas_width,
        canvas_height,
        rows,
        cols,
    })
}

/// `(crop, overlap)` for one axis under [`CropPolicy::Combined`].
const fn combined_axis(crop: u32, transition: u32) -> (u32, u32) {
    if transition == 0 {
        return (crop, 0);
    }
    let half = transition / 2;
    (crop + half, 2 * (transition - half))
}

/// `tile * count - overlap * (count - 1)`, or `None` on overflow.
fn canvas_extent(tile: u32, overlap: u32, count: u32) -> Option<u32> {
    if count == 0 {
        return Some(0);
    }
    tile.checked_mul(count)?
        .checked_sub(overlap.checked_mul(count - 1)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::blend::BlendMode;
    use crate::config::{Crop, Overlap};

    fn unblended(crop: u32) -> StitchConfig {
        StitchConfig {
            crop: Crop::uniform(crop),
            ..StitchConfig::default()
        }
    }

    fn blended(transition: u32) -> StitchConfig {
        StitchConfig {
            blend_mode: BlendMode::Linear,
            overlap: Overlap::uniform(transition),
            ..StitchConfig::default()
        }
    }

    #[test]
    fn unblended_tiles_abut() {
        let layout = resolve_layout(100, 100, 3, 3, &unblended(10)).unwrap();
        assert_eq!(layout.tile_width, 80);
        assert_eq!(layout.tile_height, 80);
        assert_eq!(layout.overlap_x, 0);
        assert_eq!(layout.canvas_width, 240);
        assert_eq!(layout.canvas_height, 240);
    }

    #[test]
    fn unblended_canvas_is_exact_multiple() {
        for (w, h, cx, cy, rows, cols) in [
            (64, 48, 0, 0, 1, 1),
            (64, 48, 5, 3, 2, 7),
            (1000, 750, 112, 112, 4, 5),
            (31, 17, 15, 8, 3, 2),
        ] {
            let config = StitchConfig {
                crop: Crop { x: cx, y: cy },
                ..StitchConfig::default()
            };
            let layout = resolve_layout(w, h, rows, cols, &config).unwrap();
            assert_eq!(layout.canvas_width, layout.tile_width * cols);
            assert_eq!(layout.canvas_height, layout.tile_height * rows);
            assert_eq!(layout.tile_width, w - 2 * cx);
            assert_eq!(layout.tile_height, h - 2 * cy);
        }
    }

    #[test]
    fn blended_canvas_subtracts_shared_pixels() {
        let layout = resolve_layout(100, 100, 3, 3, &blended(20)).unwrap();
        assert_eq!(layout.crop_x, 10);
        assert_eq!(layout.tile_width, 80);
        assert_eq!(layout.overlap_x, 20);
        assert_eq!(layout.canvas_width, 80 * 3 - 20 * 2);
        assert_eq!(layout.canvas_height, 200);
    }

    #[test]
    fn blended_ignores_crop_margins() {
        let config = StitchConfig {
            crop: Crop::uniform(30),
            ..blended(20)
        };
        let layout = resolve_layout(100, 100, 2, 2, &config).unwrap();
        assert_eq!(layout.crop_x, 10);
        assert_eq!(layout.tile_width, 80);
    }

    #[test]
    fn combined_policy_adds_half_transition_to_crop() {
        let config = StitchConfig {
            crop: Crop::uniform(5),
            crop_policy: CropPolicy::Combined,
            overlap: Overlap { x: 11, y: 0 },
            ..blended(0)
        };
        let layout = resolve_layout(100, 60, 2, 3, &config).unwrap();
        assert_eq!(layout.crop_x, 5 + 5);
        assert_eq!(layout.overlap_x, 12);
        assert_eq!(layout.tile_width, 80);
        assert_eq!(layout.crop_y, 5);
        assert_eq!(layout.overlap_y, 0);
        assert_eq!(layout.canvas_width, 80 * 3 - 12 * 2);
        assert_eq!(layout.canvas_height, 50 * 2);
    }

    #[test]
    fn over_aggressive_crop_fails() {
        let err = resolve_layout(20, 100, 1, 1, &unblended(10)).unwrap_err();
        assert!(matches!(
            err,
            StitchError::InvalidGeometry { tile_width: 0, .. }
        ));
        let err = resolve_layout(20, 100, 1, 1, &unblended(15)).unwrap_err();
        assert!(matches!(
            err,
            StitchError::InvalidGeometry { tile_width: -10, .. }
        ));
    }

    #[test]
    fn overlap_covering_whole_tile_fails() {
        let result = resolve_layout(60, 60, 2, 2, &blended(30));
        assert!(matches!(result, Err(StitchError::InvalidGeometry { .. })));
    }

    #[test]
    fn destination_advances_by_stride() {
        let layout = resolve_layout(100, 100, 3, 3, &blended(20)).unwrap();
        let rect = layout.destination(GridPos::new(2, 1));
        assert_eq!(rect, Rect::new(60, 120, 80, 80));
        let last = layout.destination(GridPos::new(2, 2));
        assert_eq!(last.x + last.width, layout.canvas_width);
        assert_eq!(last.y + last.height, layout.canvas_height);
    }

    #[test]
    fn crop_rect_is_centered() {
        let layout = resolve_layout(100, 90, 1, 1, &unblended(7)).unwrap();
        assert_eq!(layout.crop_rect(), Rect::new(7, 7, 86, 76));
    }
}
