//! Shared types for the mosaic stitching engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blend::Edge;

/// Re-export `GrayImage` so downstream crates can build tiles without
/// depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` for 3-channel color tiles.
pub use image::RgbImage;

/// Pixel layout of a tile or canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Single-channel 8-bit intensity.
    Gray8,
    /// Three-channel 8-bit color.
    Rgb8,
}

impl PixelFormat {
    /// Number of interleaved channels per pixel.
    #[must_use]
    pub const fn channel_count(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb8 => 3,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gray8 => f.write_str("Gray8"),
            Self::Rgb8 => f.write_str("Rgb8"),
        }
    }
}

/// A 2-D pixel buffer: either single-channel intensity or 3-channel color.
///
/// Tiles, intermediate regions, and the canvas all use this type so that
/// every stage can accept either format and hand the same format back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileImage {
    /// Single-channel 8-bit intensity image.
    Gray(GrayImage),
    /// Three-channel 8-bit color image.
    Rgb(RgbImage),
}

impl TileImage {
    /// Create a zero-filled image of the given format and size.
    #[must_use]
    pub fn blank(format: PixelFormat, width: u32, height: u32) -> Self {
        match format {
            PixelFormat::Gray8 => Self::Gray(GrayImage::new(width, height)),
            PixelFormat::Rgb8 => Self::Rgb(RgbImage::new(width, height)),
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        match self {
            Self::Gray(img) => img.width(),
            Self::Rgb(img) => img.width(),
        }
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        match self {
            Self::Gray(img) => img.height(),
            Self::Rgb(img) => img.height(),
        }
    }

    /// `(width, height)` in pixels.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// The pixel layout of this image.
    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        match self {
            Self::Gray(_) => PixelFormat::Gray8,
            Self::Rgb(_) => PixelFormat::Rgb8,
        }
    }

    /// Number of interleaved channels per pixel.
    #[must_use]
    pub const fn channel_count(&self) -> usize {
        self.format().channel_count()
    }

    /// Row-major interleaved subpixels.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Self::Gray(img) => img.as_raw().as_slice(),
            Self::Rgb(img) => img.as_raw().as_slice(),
        }
    }

    /// Mutable row-major interleaved subpixels.
    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Gray(img) => &mut **img,
            Self::Rgb(img) => &mut **img,
        }
    }

    /// Copy out the sub-image covered by `rect`.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::OutOfBounds`] if `rect` does not lie
    /// entirely within the image.
    pub fn crop(&self, rect: Rect) -> Result<Self, StitchError> {
        self.check_bounds(rect)?;
        Ok(match self {
            Self::Gray(img) => Self::Gray(
                image::imageops::crop_imm(img, rect.x, rect.y, rect.width, rect.height).to_image(),
            ),
            Self::Rgb(img) => Self::Rgb(
                image::imageops::crop_imm(img, rect.x, rect.y, rect.width, rect.height).to_image(),
            ),
        })
    }

    /// Overwrite the pixels under `source` with `source`, whose top-left
    /// corner lands at `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::InvalidPixelFormat`] if the formats differ,
    /// or [`StitchError::OutOfBounds`] if `source` would not fit.
    pub fn paste(&mut self, source: &Self, x: u32, y: u32) -> Result<(), StitchError> {
        self.check_bounds(Rect::new(x, y, source.width(), source.height()))?;
        match (self, source) {
            (Self::Gray(dst), Self::Gray(src)) => {
                image::imageops::replace(dst, src, i64::from(x), i64::from(y));
                Ok(())
            }
            (Self::Rgb(dst), Self::Rgb(src)) => {
                image::imageops::replace(dst, src, i64::from(x), i64::from(y));
                Ok(())
            }
            (dst, src) => Err(StitchError::InvalidPixelFormat {
                expected: dst.format(),
                found: src.format(),
            }),
        }
    }

    fn check_bounds(&self, rect: Rect) -> Result<(), StitchError> {
        if rect.fits_within(self.width(), self.height()) {
            Ok(())
        } else {
            Err(StitchError::OutOfBounds {
                rect,
                width: self.width(),
                height: self.height(),
            })
        }
    }
}

/// A tile's position in the grid, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    /// Row index, 0 at the top.
    pub row: u32,
    /// Column index, 0 at the left.
    pub col: u32,
}

impl GridPos {
    /// Create a new grid position.
    #[must_use]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// An axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns `true` if the rectangle lies inside a `width`×`height` image.
    #[must_use]
    pub fn fits_within(self, width: u32, height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }
}

/// Errors that can occur while stitching.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum StitchError {
    /// Crop or overlap settings leave no usable tile area.
    #[error(
        "invalid grid geometry: tile area {tile_width}x{tile_height} with overlap {overlap_x}x{overlap_y}"
    )]
    InvalidGeometry {
        /// Resolved tile width (may be negative).
        tile_width: i64,
        /// Resolved tile height (may be negative).
        tile_height: i64,
        /// Resolved horizontal overlap.
        overlap_x: u32,
        /// Resolved vertical overlap.
        overlap_y: u32,
    },

    /// A crop or paste rectangle reaches past the image it addresses.
    #[error("region {rect:?} exceeds a {width}x{height} image")]
    OutOfBounds {
        /// The requested rectangle.
        rect: Rect,
        /// Width of the addressed image.
        width: u32,
        /// Height of the addressed image.
        height: u32,
    },

    /// The two regions of a seam blend disagree along the seam.
    #[error("{edge} seam regions differ: tile spans {expected} px, canvas region spans {found} px")]
    DimensionMismatch {
        /// Which edge of the new tile was being blended.
        edge: Edge,
        /// Extent of the tile along the seam.
        expected: u32,
        /// Extent of the canvas region along the seam.
        found: u32,
    },

    /// A routine was given an image with the wrong channel layout.
    #[error("invalid pixel format: expected {expected}, found {found}")]
    InvalidPixelFormat {
        /// The layout the routine requires.
        expected: PixelFormat,
        /// The layout it was given.
        found: PixelFormat,
    },

    /// A grid position outside the serpentine rule table was encountered.
    #[error("unsupported tile position {pos} in a {rows}x{cols} grid")]
    UnsupportedTilePosition {
        /// The offending position.
        pos: GridPos,
        /// Grid rows.
        rows: u32,
        /// Grid columns.
        cols: u32,
    },

    /// No tiles were supplied.
    #[error("no tiles to stitch")]
    EmptyInput,

    /// A source coordinate was 0 (source numbering is 1-based).
    #[error("tile coordinate ({row}, {col}) is not 1-based")]
    InvalidTileCoordinate {
        /// 1-based row as supplied.
        row: u32,
        /// 1-based column as supplied.
        col: u32,
    },

    /// Two tiles claim the same grid cell.
    #[error("duplicate tile at {pos}: {source_id}")]
    DuplicateTile {
        /// The contested position.
        pos: GridPos,
        /// Identifier of the second tile.
        source_id: String,
    },

    /// A tile's raw size differs from the first tile's.
    #[error("tile {source_id} is {found:?}, expected {expected:?}")]
    TileSizeMismatch {
        /// Identifier of the offending tile.
        source_id: String,
        /// Raw `(width, height)` of the first tile.
        expected: (u32, u32),
        /// Raw `(width, height)` of this tile.
        found: (u32, u32),
    },

    /// Engine configuration is invalid.
    #[error("invalid stitch configuration: {0}")]
    InvalidConfig(String),

    /// The caller stopped the run between placements.
    #[error("stitch aborted after {placed} placements")]
    Aborted {
        /// Tiles placed before the abort.
        placed: usize,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn blank_is_zero_filled() {
        let img = TileImage::blank(PixelFormat::Rgb8, 4, 3);
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.as_raw().len(), 4 * 3 * 3);
        assert!(img.as_raw().iter().all(|&v| v == 0));
    }

    #[test]
    fn crop_copies_region() {
        let img = TileImage::Gray(GrayImage::from_fn(6, 4, |x, y| {
            image::Luma([u8::try_from(x + 10 * y).unwrap()])
        }));
        let cropped = img.crop(Rect::new(2, 1, 3, 2)).unwrap();
        let TileImage::Gray(gray) = cropped else {
            unreachable!()
        };
        assert_eq!(gray.dimensions(), (3, 2));
        assert_eq!(gray.get_pixel(0, 0).0[0], 12);
        assert_eq!(gray.get_pixel(2, 1).0[0], 24);
    }

    #[test]
    fn crop_out_of_bounds_is_rejected() {
        let img = TileImage::blank(PixelFormat::Gray8, 5, 5);
        let result = img.crop(Rect::new(3, 0, 3, 5));
        assert_eq!(
            result.unwrap_err(),
            StitchError::OutOfBounds {
                rect: Rect::new(3, 0, 3, 5),
                width: 5,
                height: 5,
            }
        );
    }

    #[test]
    fn paste_overwrites_destination() {
        let mut canvas = TileImage::blank(PixelFormat::Gray8, 5, 5);
        let patch = TileImage::Gray(GrayImage::from_pixel(2, 2, image::Luma([9])));
        canvas.paste(&patch, 3, 3).unwrap();
        let TileImage::Gray(gray) = canvas else {
            unreachable!()
        };
        assert_eq!(gray.get_pixel(3, 3).0[0], 9);
        assert_eq!(gray.get_pixel(4, 4).0[0], 9);
        assert_eq!(gray.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn paste_rejects_format_mismatch() {
        let mut canvas = TileImage::blank(PixelFormat::Gray8, 5, 5);
        let patch = TileImage::blank(PixelFormat::Rgb8, 2, 2);
        let result = canvas.paste(&patch, 0, 0);
        assert!(matches!(
            result,
            Err(StitchError::InvalidPixelFormat {
                expected: PixelFormat::Gray8,
                found: PixelFormat::Rgb8,
            })
        ));
    }

    #[test]
    fn paste_rejects_overflow() {
        let mut canvas = TileImage::blank(PixelFormat::Gray8, 5, 5);
        let patch = TileImage::blank(PixelFormat::Gray8, 3, 3);
        let err = canvas.paste(&patch, 3, 0).unwrap_err();
        assert!(matches!(
            err,
            StitchError::OutOfBounds {
                rect: Rect { x: 3, width: 3, .. },
                width: 5,
                ..
            }
        ));
        assert_eq!(err.to_string(), "region Rect { x: 3, y: 0, width: 3, height: 3 } exceeds a 5x5 image");
    }

    #[test]
    fn error_serializes_to_json() {
        let err = StitchError::UnsupportedTilePosition {
            pos: GridPos::new(4, 7),
            rows: 2,
            cols: 3,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: StitchError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
        assert_eq!(back.to_string(), "unsupported tile position (4, 7) in a 2x3 grid");
    }
}
