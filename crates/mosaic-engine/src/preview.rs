//! Reduced-size canvas copies for progress observers.
//!
//! Observers usually render the canvas on screen after every placement.
//! A large mosaic can be shrunk by an integer factor first; a factor of
//! `1` hands out the live canvas without copying.

use std::borrow::Cow;

use image::imageops::{self, FilterType};

use crate::types::TileImage;

/// Resampling filter used for previews.
pub const PREVIEW_FILTER: FilterType = FilterType::Triangle;

/// Shrink `canvas` to `1 / scale` of its size on each axis (each side at
/// least one pixel).
///
/// Returns the canvas itself, borrowed, when `scale <= 1`.
#[must_use]
pub fn downscale(canvas: &TileImage, scale: u32) -> Cow<'_, TileImage> {
    if scale <= 1 {
        return Cow::Borrowed(canvas);
    }
    let (w, h) = preview_size(canvas.width(), canvas.height(), scale);
    Cow::Owned(match canvas {
        TileImage::Gray(img) => TileImage::Gray(imageops::resize(img, w, h, PREVIEW_FILTER)),
        TileImage::Rgb(img) => TileImage::Rgb(imageops::resize(img, w, h, PREVIEW_FILTER)),
    })
}

/// `(width / scale, height / scale)`, each clamped to at least one.
#[must_use]
pub const fn preview_size(width: u32, height: u32, scale: u32) -> (u32, u32) {
    if scale == 0 {
        return (width, height);
    }
    let w = width / scale;
    let h = height / scale;
    (if w == 0 { 1 } else { w }, if h == 0 { 1 } else { h })
}
