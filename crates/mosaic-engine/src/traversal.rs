//! Serpentine traversal and per-tile blend-edge selection.
//!
//! A stage scan acquires `(0, 0)` first and reverses direction on every
//! row:
//!
//! ```text
//! row 0:  (0,0) → (0,1) → (0,2)
//! row 1:  (1,2) ← (1,1) ← (1,0)      visited right to left
//! row 2:  (2,0) → (2,1) → (2,2)
//! ```
//!
//! Each tile blends only against neighbours placed before it:
//!
//! | position                                   | edges          |
//! |--------------------------------------------|----------------|
//! | `(0, 0)`                                   | none           |
//! | first of its row, below row 0              | `Top`          |
//! | other tiles on row 0                       | `Left`         |
//! | other tiles on even rows                   | `Left`, `Top`  |
//! | other tiles on odd rows                    | `Right`, `Top` |
//!
//! On row 0 the first tile of an odd row would be `(0, cols - 1)`, which
//! cannot occur; `(0, 0)` is the only row-0 first tile.

use crate::blend::Edge;
use crate::geometry::GridLayout;
use crate::types::{GridPos, Rect, StitchError};

const NONE: &[Edge] = &[];
const TOP: &[Edge] = &[Edge::Top];
const LEFT: &[Edge] = &[Edge::Left];
const LEFT_TOP: &[Edge] = &[Edge::Left, Edge::Top];
const RIGHT_TOP: &[Edge] = &[Edge::Right, Edge::Top];

/// One step of the placement plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPlan {
    /// Grid cell being placed.
    pub pos: GridPos,
    /// Destination on the canvas.
    pub dest: Rect,
    /// Edges to blend, in application order.
    pub edges: &'static [Edge],
}

/// Grid cells of a `rows`×`cols` grid in serpentine order.
pub fn serpentine_order(rows: u32, cols: u32) -> impl Iterator<Item = GridPos> {
    (0..rows).flat_map(move |row| {
        (0..cols).map(move |i| {
            let col = if row % 2 == 0 { i } else { cols - 1 - i };
            GridPos::new(row, col)
        })
    })
}

/// Blend edges for the tile at `pos`, in application order.
///
/// # Errors
///
/// Returns [`StitchError::UnsupportedTilePosition`] if `pos` lies outside
/// the grid.
pub fn blend_edges(pos: GridPos, rows: u32, cols: u32) -> Result<&'static [Edge], StitchError> {
    if pos.row >= rows || pos.col >= cols {
        return Err(StitchError::UnsupportedTilePosition { pos, rows, cols });
    }
    let even = pos.row % 2 == 0;
    let first_of_row = if even {
        pos.col == 0
    } else {
        pos.col == cols - 1
    };
    Ok(match (pos.row, first_of_row, even) {
        (0, true, _) => NONE,
        (0, false, true) => LEFT,
        (_, true, _) => TOP,
        (_, false, true) => LEFT_TOP,
        (_, false, false) => RIGHT_TOP,
    })
}

/// The full placement plan for `layout`, in serpentine order.
///
/// Every grid cell appears once; the compositor skips cells that have no
/// tile.
///
/// # Errors
///
/// Returns [`StitchError::UnsupportedTilePosition`] if the layout's grid
/// is malformed.
pub fn plan_placements(layout: &GridLayout) -> Result<Vec<PlacementPlan>, StitchError> {
    serpentine_order(layout.rows, layout.cols)
        .map(|pos| {
            Ok(PlacementPlan {
                pos,
                dest: layout.destination(pos),
                edges: blend_edges(pos, layout.rows, layout.cols)?,
            })
        })
        .collect()
}

/// The neighbour an `edge` blend reads from.
#[must_use]
pub const fn neighbour(pos: GridPos, edge: Edge) -> Option<GridPos> {
    match edge {
        Edge::Left if pos.col > 0 => Some(GridPos::new(pos.row, pos.col - 1)),
        Edge::Right => Some(GridPos::new(pos.row, pos.col + 1)),
        Edge::Top if pos.row > 0 => Some(GridPos::new(pos.row - 1, pos.col)),
        Edge::Bottom => Some(GridPos::new(pos.row + 1, pos.col)),
        Edge::Left | Edge::Top => None,
    }
}
