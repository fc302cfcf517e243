//! Exposure equalization against a reference tile.
//!
//! Auto-exposure drifts between acquisitions, which shows up as
//! brightness steps at seams. Each strategy measures a grayscale
//! reduction of the tile and of its reference, derives a 256-entry
//! correction table, and applies it to every channel of the tile.
//!
//! With no reference (the first tile of a run) every strategy returns
//! the tile unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grayscale::{apply_lut, mean, median, to_gray};
use crate::plane::saturate_u8;
use crate::types::{StitchError, TileImage};

/// Selects the exposure equalization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExposureMode {
    /// Leave tiles untouched.
    #[default]
    None,
    /// Scale by `mean(reference) / mean(tile)`.
    Mean,
    /// Scale by `median(reference) / (median(tile) + ε)`.
    Median,
    /// Map the tile's CDF onto the reference's.
    Histogram,
    /// Apply the gamma that moves the tile's normalized mean onto the
    /// reference's.
    Gamma,
}

impl fmt::Display for ExposureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Mean => f.write_str("Mean"),
            Self::Median => f.write_str("Median"),
            Self::Histogram => f.write_str("Histogram"),
            Self::Gamma => f.write_str("Gamma"),
        }
    }
}

/// Which tile each tile is equalized against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferencePolicy {
    /// The tile placed immediately before, in traversal order.
    #[default]
    Previous,
    /// The first tile of the run.
    Anchor,
}

impl fmt::Display for ReferencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Previous => f.write_str("Previous"),
            Self::Anchor => f.write_str("Anchor"),
        }
    }
}

/// Trait for exposure equalization strategies.
pub trait ExposureStrategy {
    /// Return a copy of `tile` whose intensity distribution matches
    /// `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::InvalidPixelFormat`] if `tile` and
    /// `reference` have different channel layouts.
    fn equalize(
        &self,
        tile: &TileImage,
        reference: Option<&TileImage>,
    ) -> Result<TileImage, StitchError>;
}

impl ExposureStrategy for ExposureMode {
    fn equalize(
        &self,
        tile: &TileImage,
        reference: Option<&TileImage>,
    ) -> Result<TileImage, StitchError> {
        let Some(reference) = reference else {
            return Ok(tile.clone());
        };
        if tile.format() != reference.format() {
            return Err(StitchError::InvalidPixelFormat {
                expected: reference.format(),
                found: tile.format(),
            });
        }
        let lut = match *self {
            Self::None => return Ok(tile.clone()),
            Self::Mean => mean_ratio_lut(tile, reference),
            Self::Median => median_ratio_lut(tile, reference),
            Self::Histogram => Some(histogram_lut(tile, reference)),
            Self::Gamma => gamma_lut(tile, reference),
        };
        Ok(lut.map_or_else(|| tile.clone(), |lut| apply_lut(tile, &lut)))
    }
}

/// Guard against division by zero on all-black tiles.
pub const MEDIAN_EPSILON: f64 = 1e-6;

/// Guard for the logarithms of the gamma strategy.
pub const GAMMA_EPSILON: f64 = 1e-6;

fn scale_lut(alpha: f64) -> [u8; 256] {
    std::array::from_fn(|v| {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let scaled = (v as f64 * alpha) as f32;
        saturate_u8(scaled)
    })
}

/// `None` when the tile is black, leaving it unchanged.
fn mean_ratio_lut(tile: &TileImage, reference: &TileImage) -> Option<[u8; 256]> {
    let tile_mean = mean(&to_gray(tile));
    if tile_mean <= 0.0 {
        return None;
    }
    Some(scale_lut(mean(&to_gray(reference)) / tile_mean))
}

fn median_ratio_lut(tile: &TileImage, reference: &TileImage) -> Option<[u8; 256]> {
    let alpha = median(&to_gray(reference)) / (median(&to_gray(tile)) + MEDIAN_EPSILON);
    Some(scale_lut(alpha))
}

/// For each tile intensity `i`, the smallest reference intensity `j`
/// with `CDF_ref(j) >= CDF_tile(i)`.
///
/// The CDFs are compared as cross-multiplied integer counts so that
/// identical histograms map exactly onto themselves.
fn histogram_lut(tile: &TileImage, reference: &TileImage) -> [u8; 256] {
    let cum_tile = cumulative(&to_gray(tile));
    let cum_ref = cumulative(&to_gray(reference));
    let (n_tile, n_ref) = (cum_tile[255], cum_ref[255]);
    if n_tile == 0 || n_ref == 0 {
        return std::array::from_fn(|i| u8::try_from(i).unwrap_or(u8::MAX));
    }

    let mut lut = [0u8; 256];
    let mut j = 0;
    for (slot, &ct) in lut.iter_mut().zip(cum_tile.iter()) {
        let target = u128::from(ct) * u128::from(n_ref);
        while j < 255 && u128::from(cum_ref[j]) * u128::from(n_tile) < target {
            j += 1;
        }
        *slot = u8::try_from(j).unwrap_or(u8::MAX);
    }
    lut
}

fn cumulative(gray: &image::GrayImage) -> [u64; 256] {
    let hist = imageproc::stats::histogram(gray);
    let mut cum = [0u64; 256];
    let mut total = 0;
    for (slot, &count) in cum.iter_mut().zip(hist.channels[0].iter()) {
        total += u64::from(count);
        *slot = total;
    }
    cum
}

/// `None` when the tile's mean is so close to white that no gamma can
/// move it.
fn gamma_lut(tile: &TileImage, reference: &TileImage) -> Option<[u8; 256]> {
    let m_tile = mean(&to_gray(tile)) / 255.0;
    let m_ref = mean(&to_gray(reference)) / 255.0;
    let denominator = (m_tile + GAMMA_EPSILON).ln();
    if denominator.abs() < 1e-3 {
        return None;
    }
    let gamma = (m_ref + GAMMA_EPSILON).ln() / denominator;
    if !gamma.is_finite() {
        return None;
    }
    Some(std::array::from_fn(|v| {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let corrected = (255.0 * (v as f64 / 255.0).powf(gamma)) as f32;
        saturate_u8(corrected)
    }))
}
