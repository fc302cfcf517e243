//! Linear alpha-ramp seam blending.
//!
//! For an overlap of `N` pixels, the pixel at offset `i` across the strip
//! gets the new tile's value with weight `w` and the canvas value with
//! weight `1 - w`:
//!
//! | edge     | offset `i` counts from | `w`         |
//! |----------|------------------------|-------------|
//! | `Left`   | left column of strip   | `i / N`     |
//! | `Right`  | left column of strip   | `1 - i / N` |
//! | `Top`    | top row of strip       | `i / N`     |
//! | `Bottom` | top row of strip       | `1 - i / N` |
//!
//! So the strip side touching the previously placed neighbour starts out
//! as pure canvas content and ramps toward the new tile.

use super::{Edge, locate_strip};
use crate::plane::saturate_u8;
use crate::types::{StitchError, TileImage};

/// Blend `tile`'s `edge` strip against `prior` with a linear ramp.
///
/// # Errors
///
/// See [`SeamBlender::blend`](super::SeamBlender::blend).
pub fn blend(tile: &TileImage, prior: &TileImage, edge: Edge) -> Result<TileImage, StitchError> {
    let strip = locate_strip(tile, prior, edge)?;
    let mut out = tile.clone();
    if strip.thickness == 0 {
        return Ok(out);
    }

    let channels = tile.channel_count();
    let tile_width = tile.width() as usize;
    let (prior_width, prior_height) = (prior.width() as usize, prior.height() as usize);
    let n = f64::from(strip.thickness);
    let src = prior.as_raw();
    let dst = out.as_raw_mut();

    for y in 0..prior_height {
        for x in 0..prior_width {
            let i = if edge.is_vertical_seam() { x } else { y };
            let w = tile_weight(edge, i, n);
            let t = ((y + strip.y as usize) * tile_width + x + strip.x as usize) * channels;
            let p = (y * prior_width + x) * channels;
            for c in 0..channels {
                let mixed = f64::from(dst[t + c]).mul_add(w, f64::from(src[p + c]) * (1.0 - w));
                #[allow(clippy::cast_possible_truncation)]
                let mixed = mixed as f32;
                dst[t + c] = saturate_u8(mixed);
            }
        }
    }
    Ok(out)
}

/// New-tile weight at offset `i` of an `n`-pixel strip.
#[allow(clippy::cast_precision_loss)]
fn tile_weight(edge: Edge, i: usize, n: f64) -> f64 {
    let ramp = i as f64 / n;
    match edge {
        Edge::Left | Edge::Top => ramp,
        Edge::Right | Edge::Bottom => 1.0 - ramp,
    }
}
