//! Seam blending between a new tile and content already on the canvas.
//!
//! # Strategy pattern
//!
//! [`BlendMode`] is the run-wide selector stored in the configuration.
//! It resolves once into a [`Blender`], which implements [`SeamBlender`]
//! and is handed to the compositor. New blend algorithms slot in as extra
//! `Blender` variants without touching the compositor.
//!
//! # Edge convention
//!
//! Every blend takes the whole cropped tile plus the `prior` canvas strip
//! that the tile's `edge` overlaps. The strip's thickness is the overlap
//! `N`; along the seam it must span the full tile. The result is a copy
//! of the tile whose overlap strip has been blended; the interior is
//! untouched.

pub mod linear;
pub mod multiband;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{StitchError, TileImage};

/// Which side of the new tile a seam lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    /// Seam along the tile's left columns.
    Left,
    /// Seam along the tile's right columns.
    Right,
    /// Seam along the tile's top rows.
    Top,
    /// Seam along the tile's bottom rows.
    Bottom,
}

impl Edge {
    /// Returns `true` for [`Left`](Self::Left) and [`Right`](Self::Right),
    /// whose strips are columns.
    #[must_use]
    pub const fn is_vertical_seam(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
            Self::Top => f.write_str("top"),
            Self::Bottom => f.write_str("bottom"),
        }
    }
}

/// Seam blending algorithm selected for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Tiles are cropped and placed edge to edge.
    #[default]
    None,
    /// Linear alpha ramp across the overlap.
    Linear,
    /// Laplacian-pyramid multi-band blending.
    MultiBand,
}

impl BlendMode {
    /// The blender for this mode, or `None` when blending is disabled.
    #[must_use]
    pub const fn blender(self, pyramid_levels: usize) -> Option<Blender> {
        match self {
            Self::None => None,
            Self::Linear => Some(Blender::Linear),
            Self::MultiBand => Some(Blender::MultiBand {
                levels: pyramid_levels,
            }),
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Linear => f.write_str("Linear"),
            Self::MultiBand => f.write_str("MultiBand"),
        }
    }
}

/// Trait for seam blending strategies.
pub trait SeamBlender {
    /// Blend `tile`'s `edge` strip against `prior`, the canvas content
    /// under that strip, and return the updated tile.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::DimensionMismatch`] if `prior` does not
    /// span the tile along the seam or is thicker than the tile, and
    /// [`StitchError::InvalidPixelFormat`] if the two formats differ.
    fn blend(
        &self,
        tile: &TileImage,
        prior: &TileImage,
        edge: Edge,
    ) -> Result<TileImage, StitchError>;
}

/// A resolved blending strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blender {
    /// See [`linear::blend`].
    Linear,
    /// See [`multiband::blend`].
    MultiBand {
        /// Pyramid levels below full resolution.
        levels: usize,
    },
}

impl SeamBlender for Blender {
    fn blend(
        &self,
        tile: &TileImage,
        prior: &TileImage,
        edge: Edge,
    ) -> Result<TileImage, StitchError> {
        match *self {
            Self::Linear => linear::blend(tile, prior, edge),
            Self::MultiBand { levels } => multiband::blend(tile, prior, edge, levels),
        }
    }
}

/// Overlap strip geometry shared by every blender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Strip {
    /// Thickness of the strip across the seam (`N`).
    pub thickness: u32,
    /// Left column of the strip inside the tile.
    pub x: u32,
    /// Top row of the strip inside the tile.
    pub y: u32,
}

/// Check that `prior` fits the `edge` strip of `tile` and locate it.
pub(crate) fn locate_strip(
    tile: &TileImage,
    prior: &TileImage,
    edge: Edge,
) -> Result<Strip, StitchError> {
    if tile.format() != prior.format() {
        return Err(StitchError::InvalidPixelFormat {
            expected: tile.format(),
            found: prior.format(),
        });
    }
    let (tw, th) = tile.dimensions();
    let (pw, ph) = prior.dimensions();

    // Along the seam the extents must agree; across it the strip must
    // fit inside the tile.
    let (along_tile, along_prior, across_tile, across_prior) = if edge.is_vertical_seam() {
        (th, ph, tw, pw)
    } else {
        (tw, pw, th, ph)
    };
    if along_tile != along_prior {
        return Err(StitchError::DimensionMismatch {
            edge,
            expected: along_tile,
            found: along_prior,
        });
    }
    if across_prior > across_tile {
        return Err(StitchError::DimensionMismatch {
            edge,
            expected: across_tile,
            found: across_prior,
        });
    }

    let (x, y) = match edge {
        Edge::Left | Edge::Top => (0, 0),
        Edge::Right => (tw - pw, 0),
        Edge::Bottom => (0, th - ph),
    };
    Ok(Strip {
        thickness: across_prior,
        x,
        y,
    })
}
