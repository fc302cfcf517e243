//! Tiles and the validated tile set handed over by a tile source.
//!
//! A tile source yields `(row, col, pixels)` with 1-based coordinates in
//! any order. [`Tile::from_source`] normalizes those to 0-based
//! [`GridPos`]itions, and [`TileSet::new`] checks that the tiles form a
//! consistent grid: same raw size, same pixel format, one tile per cell.

use std::collections::HashSet;

use crate::types::{GridPos, PixelFormat, StitchError, TileImage};

/// One source image occupying one grid cell.
///
/// Tiles are immutable: every transform produces a new tile via
/// [`with_image`](Self::with_image).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pos: GridPos,
    source_id: String,
    image: TileImage,
}

impl Tile {
    /// Create a tile from 1-based source coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::InvalidTileCoordinate`] if `row` or `col`
    /// is 0.
    pub fn from_source(
        row: u32,
        col: u32,
        source_id: impl Into<String>,
        image: TileImage,
    ) -> Result<Self, StitchError> {
        if row == 0 || col == 0 {
            return Err(StitchError::InvalidTileCoordinate { row, col });
        }
        Ok(Self {
            pos: GridPos::new(row - 1, col - 1),
            source_id: source_id.into(),
            image,
        })
    }

    /// Create a tile at an already 0-based grid position.
    #[must_use]
    pub fn at(pos: GridPos, source_id: impl Into<String>, image: TileImage) -> Self {
        Self {
            pos,
            source_id: source_id.into(),
            image,
        }
    }

    /// 0-based grid position.
    #[must_use]
    pub const fn pos(&self) -> GridPos {
        self.pos
    }

    /// Source identifier (file path, index, ...).
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// The tile's pixels.
    #[must_use]
    pub const fn image(&self) -> &TileImage {
        &self.image
    }

    /// Consume the tile and return its pixels.
    #[must_use]
    pub fn into_image(self) -> TileImage {
        self.image
    }

    /// A new tile at the same position and source carrying `image`.
    #[must_use]
    pub fn with_image(&self, image: TileImage) -> Self {
        Self {
            pos: self.pos,
            source_id: self.source_id.clone(),
            image,
        }
    }
}

/// A validated collection of tiles forming one rectangular grid.
#[derive(Debug, Clone)]
pub struct TileSet {
    tiles: Vec<Tile>,
    rows: u32,
    cols: u32,
    raw_width: u32,
    raw_height: u32,
    format: PixelFormat,
}

impl TileSet {
    /// Validate `tiles` and derive the grid extents.
    ///
    /// The raw size and pixel format of the first tile are the reference
    /// for every other tile. `rows`/`cols` are the largest row/col seen.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::EmptyInput`] for an empty list,
    /// [`StitchError::DuplicateTile`] if two tiles share a cell,
    /// [`StitchError::TileSizeMismatch`] if raw sizes differ, and
    /// [`StitchError::InvalidPixelFormat`] if pixel formats differ.
    pub fn new(tiles: Vec<Tile>) -> Result<Self, StitchError> {
        let first = tiles.first().ok_or(StitchError::EmptyInput)?;
        let (raw_width, raw_height) = first.image.dimensions();
        let format = first.image.format();

        let mut seen = HashSet::with_capacity(tiles.len());
        let mut rows = 0;
        let mut cols = 0;
        for tile in &tiles {
            if !seen.insert(tile.pos) {
                return Err(StitchError::DuplicateTile {
                    pos: tile.pos,
                    source_id: tile.source_id.clone(),
                });
            }
            if tile.image.dimensions() != (raw_width, raw_height) {
                return Err(StitchError::TileSizeMismatch {
                    source_id: tile.source_id.clone(),
                    expected: (raw_width, raw_height),
                    found: tile.image.dimensions(),
                });
            }
            if tile.image.format() != format {
                return Err(StitchError::InvalidPixelFormat {
                    expected: format,
                    found: tile.image.format(),
                });
            }
            rows = rows.max(tile.pos.row + 1);
            cols = cols.max(tile.pos.col + 1);
        }

        Ok(Self {
            tiles,
            rows,
            cols,
            raw_width,
            raw_height,
            format,
        })
    }

    /// Number of grid rows.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of grid columns.
    #[must_use]
    pub const fn cols(&self) -> u32 {
        self.cols
    }

    /// Raw `(width, height)` shared by every tile.
    #[must_use]
    pub const fn raw_size(&self) -> (u32, u32) {
        (self.raw_width, self.raw_height)
    }

    /// Pixel format shared by every tile.
    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// The tiles, in the order they were supplied.
    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Consume the set and return its tiles.
    #[must_use]
    pub fn into_tiles(self) -> Vec<Tile> {
        self.tiles
    }

    /// Number of tiles present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Always `false`: construction rejects empty input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Grid cells with no tile, in row-major order.
    #[must_use]
    pub fn missing(&self) -> Vec<GridPos> {
        let present: HashSet<GridPos> = self.tiles.iter().map(Tile::pos).collect();
        (0..self.rows)
            .flat_map(|row| (0..self.cols).map(move |col| GridPos::new(row, col)))
            .filter(|pos| !present.contains(pos))
            .collect()
    }
}
