//! Optional smoothing of raw tiles before any other preprocessing.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`] and
//! [`imageproc::filter::box_filter`], both of which only accept
//! `GrayImage`; color tiles are filtered one channel at a time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grayscale::map_channels;
use crate::types::{StitchError, TileImage};

/// Pre-filter applied to each raw tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DenoiseFilter {
    /// Leave the tile untouched.
    #[default]
    None,
    /// 5×5 Gaussian.
    Gaussian,
    /// 5×5 mean.
    Box,
}

impl DenoiseFilter {
    /// Side length of the filter window.
    pub const KERNEL_SIZE: u32 = 5;

    /// Gaussian sigma for a `KERNEL_SIZE` window:
    /// `0.3 * ((k - 1) / 2 - 1) + 0.8`.
    pub const GAUSSIAN_SIGMA: f32 = 1.1;
}

impl fmt::Display for DenoiseFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Box => f.write_str("Box"),
        }
    }
}

/// Apply `filter` to every channel of `image`.
///
/// # Errors
///
/// Only fails if channel reassembly fails, which indicates a bug in the
/// channel helpers.
pub fn denoise(image: &TileImage, filter: DenoiseFilter) -> Result<TileImage, StitchError> {
    let radius = DenoiseFilter::KERNEL_SIZE / 2;
    match filter {
        DenoiseFilter::None => Ok(image.clone()),
        DenoiseFilter::Gaussian => map_channels(image, |c| {
            Ok(imageproc::filter::gaussian_blur_f32(
                c,
                DenoiseFilter::GAUSSIAN_SIGMA,
            ))
        }),
        DenoiseFilter::Box => map_channels(image, |c| {
            Ok(imageproc::filter::box_filter(c, radius, radius))
        }),
    }
}
