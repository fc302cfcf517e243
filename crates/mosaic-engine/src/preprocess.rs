//! Per-tile radiometric correction ahead of compositing.
//!
//! Tiles are first put into serpentine traversal order. Denoising and
//! illumination flattening depend on nothing but the tile itself and run
//! in parallel.
//!
//! Exposure equalization depends on the reference policy. Against the
//! anchor every reference is known up front and tiles run in parallel.
//! Against the previous tile each tile is matched to its predecessor's
//! *corrected* output, so the scan is sequential and the correction
//! carries along the whole traversal.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::config::{RecoveryPolicy, StitchConfig};
use crate::denoise::denoise;
use crate::exposure::{ExposureStrategy, ReferencePolicy};
use crate::illumination::IlluminationStrategy;
use crate::tile::{Tile, TileSet};
use crate::traversal::serpentine_order;
use crate::types::{GridPos, StitchError, TileImage};

/// Preprocessed tiles plus how many steps fell back to pass-through.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Corrected tiles in traversal order.
    pub tiles: Vec<Tile>,
    /// Steps that failed and were skipped under
    /// [`RecoveryPolicy::PassThrough`].
    pub fallbacks: usize,
}

/// Denoise, flatten, and equalize every tile.
///
/// The result is in serpentine traversal order.
///
/// # Errors
///
/// Under [`RecoveryPolicy::Abort`], returns the first per-tile error
/// (typically [`StitchError::InvalidPixelFormat`] from a strategy that
/// needs grayscale input).
pub fn preprocess(tiles: &TileSet, config: &StitchConfig) -> Result<Vec<Tile>, StitchError> {
    prepare(tiles, config).map(|prepared| prepared.tiles)
}

/// [`preprocess`] with fallback accounting.
///
/// # Errors
///
/// See [`preprocess`].
pub fn prepare(tiles: &TileSet, config: &StitchConfig) -> Result<Prepared, StitchError> {
    let ordered = traversal_ordered(tiles);
    let policy = config.on_preprocess_error;

    // 1. Per-tile smoothing and illumination flattening.
    let flattened: Vec<(Tile, usize)> = ordered
        .par_iter()
        .map(|tile| {
            let (smoothed, a) = recover(
                denoise(tile.image(), config.denoise),
                tile,
                tile.image(),
                "denoise",
                policy,
            )?;
            let (flat, b) = recover(
                config.illumination.flatten(&smoothed),
                tile,
                &smoothed,
                "illumination",
                policy,
            )?;
            Ok((tile.with_image(flat), a + b))
        })
        .collect::<Result<_, StitchError>>()?;

    // 2. Exposure.
    let equalized = match config.reference {
        ReferencePolicy::Anchor => equalize_against_anchor(&flattened, config)?,
        ReferencePolicy::Previous => equalize_chained(&flattened, config)?,
    };

    let fallbacks = flattened.iter().map(|(_, n)| n).sum::<usize>()
        + equalized.iter().map(|(_, n)| n).sum::<usize>();
    if fallbacks > 0 {
        tracing::warn!("{} preprocessing steps passed tiles through unmodified", fallbacks);
    }
    Ok(Prepared {
        tiles: equalized.into_iter().map(|(tile, _)| tile).collect(),
        fallbacks,
    })
}

/// Equalize every tile against the first one, in parallel.
fn equalize_against_anchor(
    flattened: &[(Tile, usize)],
    config: &StitchConfig,
) -> Result<Vec<(Tile, usize)>, StitchError> {
    let anchor = flattened.first().map(|(tile, _)| tile.image());
    flattened
        .par_iter()
        .enumerate()
        .map(|(i, (tile, _))| {
            let reference = if i == 0 { None } else { anchor };
            equalize_one(tile, reference, config)
        })
        .collect()
}

/// Equalize each tile against its predecessor's corrected output.
fn equalize_chained(
    flattened: &[(Tile, usize)],
    config: &StitchConfig,
) -> Result<Vec<(Tile, usize)>, StitchError> {
    let mut out: Vec<(Tile, usize)> = Vec::with_capacity(flattened.len());
    for (tile, _) in flattened {
        let reference = out.last().map(|(prev, _)| prev.image());
        let corrected = equalize_one(tile, reference, config)?;
        out.push(corrected);
    }
    Ok(out)
}

fn equalize_one(
    tile: &Tile,
    reference: Option<&TileImage>,
    config: &StitchConfig,
) -> Result<(Tile, usize), StitchError> {
    let (image, n) = recover(
        config.exposure.equalize(tile.image(), reference),
        tile,
        tile.image(),
        "exposure",
        config.on_preprocess_error,
    )?;
    Ok((tile.with_image(image), n))
}

/// References to the tiles of `set`, in serpentine traversal order.
fn traversal_ordered(set: &TileSet) -> Vec<&Tile> {
    let rank: HashMap<GridPos, usize> = serpentine_order(set.rows(), set.cols())
        .enumerate()
        .map(|(i, pos)| (pos, i))
        .collect();
    let mut ordered: Vec<&Tile> = set.tiles().iter().collect();
    ordered.sort_by_key(|tile| rank.get(&tile.pos()).copied().unwrap_or(usize::MAX));
    ordered
}

/// Apply the recovery policy to one step's result. The second element
/// counts fallbacks taken.
fn recover(
    result: Result<TileImage, StitchError>,
    tile: &Tile,
    input: &TileImage,
    step: &str,
    policy: RecoveryPolicy,
) -> Result<(TileImage, usize), StitchError> {
    match (result, policy) {
        (Ok(image), _) => Ok((image, 0)),
        (Err(e), RecoveryPolicy::Abort) => Err(e),
        (Err(e), RecoveryPolicy::PassThrough) => {
            tracing::warn!(
                "{} failed for tile {} ({}): {}; passing it through",
                step,
                tile.pos(),
                tile.source_id(),
                e
            );
            Ok((input.clone(), 1))
        }
    }
}
