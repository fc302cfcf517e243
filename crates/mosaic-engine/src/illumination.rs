//! Per-tile illumination flattening.
//!
//! Removes smooth shading (vignetting, uneven backlight) within a single
//! tile. Each strategy is independent of every other tile.
//!
//! # Strategy pattern
//!
//! [`IlluminationMode`] is both the configuration selector and the
//! [`IlluminationStrategy`] implementation, so a run's choice is fixed
//! once and every strategy can be exercised directly in tests.
//!
//! Only [`IlluminationMode::LowFrequency`] accepts color tiles; the
//! others require single-channel input.

use std::fmt;

use image::GrayImage;
use imageproc::morphology::{Mask, grayscale_open};
use serde::{Deserialize, Serialize};

use crate::grayscale::{map_channels, require_gray};
use crate::plane::{self, saturate_u8};
use crate::types::{StitchError, TileImage};

/// Parameters for contrast-limited adaptive histogram equalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaheParams {
    /// Cells per axis.
    pub grid: u32,
    /// Histogram clip limit as a multiple of the mean bin count.
    pub clip_limit: f32,
}

impl ClaheParams {
    /// Default cells per axis.
    pub const DEFAULT_GRID: u32 = 8;

    /// Default clip limit.
    pub const DEFAULT_CLIP_LIMIT: f32 = 2.0;
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self {
            grid: Self::DEFAULT_GRID,
            clip_limit: Self::DEFAULT_CLIP_LIMIT,
        }
    }
}

/// Selects the illumination flattening strategy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum IlluminationMode {
    /// Leave tiles untouched.
    #[default]
    None,
    /// Divide by a unit-mean 51×51 Gaussian estimate of the shading.
    /// Works per channel on color tiles.
    LowFrequency,
    /// Divide by a width-scaled Gaussian estimate, then stretch to the
    /// full range.
    LowFrequencyNormalized,
    /// Morphological top-hat, stretched to the full range.
    TopHat,
    /// Contrast-limited adaptive histogram equalization.
    Clahe(ClaheParams),
}

impl fmt::Display for IlluminationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::LowFrequency => f.write_str("LowFrequency"),
            Self::LowFrequencyNormalized => f.write_str("LowFrequencyNormalized"),
            Self::TopHat => f.write_str("TopHat"),
            Self::Clahe(p) => write!(f, "Clahe(grid {}, clip {})", p.grid, p.clip_limit),
        }
    }
}

/// Trait for illumination flattening strategies.
pub trait IlluminationStrategy {
    /// Return a flattened copy of `image`.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::InvalidPixelFormat`] if the strategy needs
    /// single-channel input and `image` is color.
    fn flatten(&self, image: &TileImage) -> Result<TileImage, StitchError>;
}

impl IlluminationStrategy for IlluminationMode {
    fn flatten(&self, image: &TileImage) -> Result<TileImage, StitchError> {
        match *self {
            Self::None => Ok(image.clone()),
            Self::LowFrequency => map_channels(image, |c| Ok(low_frequency(c))),
            Self::LowFrequencyNormalized => {
                require_gray(image).map(|g| TileImage::Gray(low_frequency_normalized(g)))
            }
            Self::TopHat => require_gray(image).map(|g| TileImage::Gray(top_hat(g))),
            Self::Clahe(params) => require_gray(image).map(|g| TileImage::Gray(clahe(g, params))),
        }
    }
}

/// Gaussian window for [`IlluminationMode::LowFrequency`].
pub const LOW_FREQUENCY_KERNEL: u32 = 51;

/// Smallest window for the width-scaled strategies.
pub const MIN_ADAPTIVE_KERNEL: u32 = 31;

/// Window for the width-scaled strategies: a tenth of the width, forced
/// odd, at least [`MIN_ADAPTIVE_KERNEL`].
#[must_use]
pub fn adaptive_kernel_size(width: u32) -> u32 {
    ((width / 10) | 1).max(MIN_ADAPTIVE_KERNEL)
}

/// `image * mean(field) / field`, where `field` is a wide Gaussian blur.
///
/// Pixels whose shading estimate is zero become zero; a channel with no
/// light at all is returned unchanged.
fn low_frequency(channel: &GrayImage) -> GrayImage {
    let original = plane::from_gray(channel, 1.0);
    let field = plane::gaussian_blur(&original, LOW_FREQUENCY_KERNEL);
    let mean = plane::mean(&field);
    if mean <= 0.0 {
        return channel.clone();
    }
    plane::to_gray(&plane::zip_map(&original, &field, |v, f| {
        if f > 0.0 { v * mean / f } else { 0.0 }
    }))
}

fn low_frequency_normalized(gray: &GrayImage) -> GrayImage {
    const EPS: f32 = 1e-3;
    let original = plane::from_gray(gray, 1.0);
    let field = plane::gaussian_blur(&original, adaptive_kernel_size(gray.width()));
    let ratio = plane::zip_map(&original, &field, |v, f| v / f.max(EPS));
    plane::to_gray(&plane::normalize_min_max(&ratio, 0.0, 255.0))
}

fn top_hat(gray: &GrayImage) -> GrayImage {
    let radius = u8::try_from(adaptive_kernel_size(gray.width()) / 2).unwrap_or(u8::MAX);
    let opened = grayscale_open(gray, &Mask::disk(radius));
    let residue = plane::zip_map(
        &plane::from_gray(gray, 1.0),
        &plane::from_gray(&opened, 1.0),
        |v, o| v - o,
    );
    plane::to_gray(&plane::normalize_min_max(&residue, 0.0, 255.0))
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a `grid`×`grid` lattice of cells (fewer when
/// the image is smaller than the grid). Each cell's histogram is clipped
/// at `clip_limit` times the mean bin count, the excess is spread evenly
/// over all bins, and the clipped CDF becomes that cell's lookup table.
/// Every pixel interpolates bilinearly between the tables of the four
/// nearest cell centres.
#[must_use]
pub fn clahe(gray: &GrayImage, params: ClaheParams) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let cells_x = params.grid.clamp(1, w);
    let cells_y = params.grid.clamp(1, h);

    let bounds = |i: u32, cells: u32, len: u32| -> (u32, u32) {
        let start = u64::from(i) * u64::from(len) / u64::from(cells);
        let end = u64::from(i + 1) * u64::from(len) / u64::from(cells);
        (
            u32::try_from(start).unwrap_or(len),
            u32::try_from(end).unwrap_or(len),
        )
    };

    let luts: Vec<[u8; 256]> = (0..cells_y)
        .flat_map(|cy| (0..cells_x).map(move |cx| (cx, cy)))
        .map(|(cx, cy)| {
            let (x0, x1) = bounds(cx, cells_x, w);
            let (y0, y1) = bounds(cy, cells_y, h);
            let mut hist = [0u64; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[usize::from(gray.get_pixel(x, y).0[0])] += 1;
                }
            }
            clipped_lut(&mut hist, params.clip_limit)
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let (cell_w, cell_h) = (w as f32 / cells_x as f32, h as f32 / cells_y as f32);
    let lut = |cx: usize, cy: usize| &luts[cy * cells_x as usize + cx];

    GrayImage::from_fn(w, h, |x, y| {
        #[allow(clippy::cast_precision_loss)]
        let (x0, x1, ax) = neighbours(x as f32, cell_w, cells_x as usize);
        #[allow(clippy::cast_precision_loss)]
        let (y0, y1, ay) = neighbours(y as f32, cell_h, cells_y as usize);
        let v = usize::from(gray.get_pixel(x, y).0[0]);
        let top = f32::from(lut(x0, y0)[v]) * (1.0 - ax) + f32::from(lut(x1, y0)[v]) * ax;
        let bottom = f32::from(lut(x0, y1)[v]) * (1.0 - ax) + f32::from(lut(x1, y1)[v]) * ax;
        plane::luma(saturate_u8(top * (1.0 - ay) + bottom * ay))
    })
}

/// Clip `hist`, redistribute the excess, and turn it into a lookup table.
fn clipped_lut(hist: &mut [u64; 256], clip_limit: f32) -> [u8; 256] {
    let area: u64 = hist.iter().sum();
    let mut lut = [0u8; 256];
    if area == 0 {
        return lut;
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let limit = ((clip_limit * area as f32 / 256.0) as u64).max(1);
    let mut excess = 0;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let share = excess / 256;
    for bin in hist.iter_mut() {
        *bin += share;
    }
    // Spread what is left at even intervals rather than piling it low.
    let remainder = usize::try_from(excess % 256).unwrap_or(0);
    if remainder > 0 {
        for bin in hist.iter_mut().step_by(256 / remainder).take(remainder) {
            *bin += 1;
        }
    }

    let mut cumulative = 0;
    for (slot, &count) in lut.iter_mut().zip(hist.iter()) {
        cumulative += count;
        *slot = u8::try_from((cumulative * 255 + area / 2) / area).unwrap_or(u8::MAX);
    }
    lut
}

/// The two cell indices bracketing `pos` and the weight of the second.
fn neighbours(pos: f32, cell: f32, cells: usize) -> (usize, usize, f32) {
    let f = (pos + 0.5) / cell - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let i0 = (f.floor() as usize).min(cells - 1);
    let i1 = (i0 + 1).min(cells - 1);
    #[allow(clippy::cast_precision_loss)]
    let a = if i1 == i0 { 0.0 } else { f - i0 as f32 };
    (i0, i1, a)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{Luma, Rgb};

    use super::*;
    use crate::types::RgbImage;

    fn range(gray: &GrayImage) -> u8 {
        let min = gray.as_raw().iter().min().copied().unwrap();
        let max = gray.as_raw().iter().max().copied().unwrap();
        max - min
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn vignetted(size: u32) -> GrayImage {
        let c = f64::from(size) / 2.0;
        GrayImage::from_fn(size, size, |x, y| {
            let r2 = (f64::from(x) - c).powi(2) + (f64::from(y) - c).powi(2);
            Luma([(160.0 - 60.0 * r2 / (2.0 * c * c)) as u8])
        })
    }

    #[test]
    fn kernel_size_scales_with_width() {
        assert_eq!(adaptive_kernel_size(100), 31);
        assert_eq!(adaptive_kernel_size(640), 65);
        assert_eq!(adaptive_kernel_size(1000), 101);
    }

    #[test]
    fn none_is_identity() {
        let img = TileImage::Gray(vignetted(16));
        assert_eq!(IlluminationMode::None.flatten(&img).unwrap(), img);
    }

    #[test]
    fn low_frequency_flattens_vignetting() {
        let input = vignetted(64);
        let TileImage::Gray(out) = IlluminationMode::LowFrequency
            .flatten(&TileImage::Gray(input.clone()))
            .unwrap()
        else {
            unreachable!()
        };
        assert!(range(&out) < range(&input) / 2, "{} vs {}", range(&out), range(&input));
    }

    #[test]
    fn low_frequency_accepts_color() {
        let img = TileImage::Rgb(RgbImage::from_pixel(20, 20, Rgb([50, 100, 150])));
        let out = IlluminationMode::LowFrequency.flatten(&img).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn dark_channel_is_untouched() {
        let img = TileImage::Gray(GrayImage::new(12, 12));
        assert_eq!(IlluminationMode::LowFrequency.flatten(&img).unwrap(), img);
    }

    #[test]
    fn gray_only_modes_reject_color() {
        let img = TileImage::Rgb(RgbImage::new(8, 8));
        for mode in [
            IlluminationMode::LowFrequencyNormalized,
            IlluminationMode::TopHat,
            IlluminationMode::Clahe(ClaheParams::default()),
        ] {
            assert!(
                matches!(
                    mode.flatten(&img),
                    Err(StitchError::InvalidPixelFormat { .. })
                ),
                "{mode}"
            );
        }
    }

    #[test]
    fn normalized_stretches_to_full_range() {
        let out = low_frequency_normalized(&vignetted(64));
        assert_eq!(out.as_raw().iter().min(), Some(&0));
        assert_eq!(out.as_raw().iter().max(), Some(&255));
    }

    #[test]
    fn constant_tile_normalizes_to_zero() {
        let flat = GrayImage::from_pixel(40, 40, Luma([90]));
        assert!(low_frequency_normalized(&flat).iter().all(|&v| v == 0));
        assert!(top_hat(&flat).iter().all(|&v| v == 0));
    }

    #[test]
    fn top_hat_keeps_small_bright_features() {
        let mut img = GrayImage::from_fn(64, 64, |x, _| Luma([u8::try_from(x).unwrap()]));
        for y in 30..33 {
            for x in 30..33 {
                img.put_pixel(x, y, Luma([250]));
            }
        }
        let out = top_hat(&img);
        assert!(out.get_pixel(31, 31).0[0] > 240);
        assert!(out.get_pixel(5, 5).0[0] < 40);
    }

    #[test]
    fn clahe_keeps_constant_tile_constant() {
        let flat = GrayImage::from_pixel(32, 32, Luma([120]));
        let out = clahe(&flat, ClaheParams::default());
        assert_eq!(out.dimensions(), (32, 32));
        assert_eq!(range(&out), 0);
    }

    #[test]
    fn clahe_boosts_low_contrast() {
        let img = GrayImage::from_fn(64, 64, |x, y| {
            Luma([100 + u8::try_from((x + y) % 11).unwrap()])
        });
        let out = clahe(&img, ClaheParams::default());
        assert!(range(&out) > range(&img));
    }

    #[test]
    fn clahe_handles_tiles_smaller_than_grid() {
        let img = GrayImage::from_fn(3, 5, |x, y| Luma([u8::try_from(x * 40 + y).unwrap()]));
        let out = clahe(&img, ClaheParams { grid: 8, clip_limit: 4.0 });
        assert_eq!(out.dimensions(), (3, 5));
    }

    #[test]
    fn clip_redistributes_every_pixel() {
        let mut hist = [0u64; 256];
        hist[10] = 1000;
        let lut = clipped_lut(&mut hist, 2.0);
        assert_eq!(hist.iter().sum::<u64>(), 1000);
        assert_eq!(lut[255], 255);
        assert!(lut[9] < lut[10]);
    }
}
