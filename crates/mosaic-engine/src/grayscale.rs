//! Grayscale reduction and per-channel helpers.
//!
//! Exposure statistics are always computed on a single intensity channel.
//! Color tiles are reduced with the `image` crate's fixed luminance
//! transform; the resulting correction is then applied to every channel
//! of the original tile.

use image::{GrayImage, Luma, Rgb};

use crate::types::{PixelFormat, RgbImage, StitchError, TileImage};

/// Reduce a tile to a single intensity channel.
///
/// Grayscale tiles are cloned unchanged.
#[must_use = "returns the grayscale image"]
pub fn to_gray(image: &TileImage) -> GrayImage {
    match image {
        TileImage::Gray(gray) => gray.clone(),
        TileImage::Rgb(rgb) => image::imageops::grayscale(rgb),
    }
}

/// Borrow the single channel of a grayscale tile.
///
/// # Errors
///
/// Returns [`StitchError::InvalidPixelFormat`] for color tiles.
pub fn require_gray(image: &TileImage) -> Result<&GrayImage, StitchError> {
    match image {
        TileImage::Gray(gray) => Ok(gray),
        TileImage::Rgb(_) => Err(StitchError::InvalidPixelFormat {
            expected: PixelFormat::Gray8,
            found: PixelFormat::Rgb8,
        }),
    }
}

/// Map every subpixel of every channel through a 256-entry table.
#[must_use = "returns the remapped image"]
pub fn apply_lut(image: &TileImage, lut: &[u8; 256]) -> TileImage {
    let mut out = image.clone();
    for v in out.as_raw_mut() {
        *v = lut[usize::from(*v)];
    }
    out
}

/// Split a tile into one grayscale image per channel.
#[must_use]
pub fn split_channels(image: &TileImage) -> Vec<GrayImage> {
    match image {
        TileImage::Gray(gray) => vec![gray.clone()],
        TileImage::Rgb(rgb) => {
            let (w, h) = rgb.dimensions();
            (0..3)
                .map(|c| GrayImage::from_fn(w, h, |x, y| Luma([rgb.get_pixel(x, y).0[c]])))
                .collect()
        }
    }
}

/// Reassemble channels produced by [`split_channels`] (or a per-channel
/// transform of them) into a tile of `format`.
///
/// # Errors
///
/// Returns [`StitchError::InvalidPixelFormat`] if the number of channels
/// does not match `format`.
pub fn merge_channels(
    format: PixelFormat,
    channels: &[GrayImage],
) -> Result<TileImage, StitchError> {
    match (format, channels) {
        (PixelFormat::Gray8, [gray]) => Ok(TileImage::Gray(gray.clone())),
        (PixelFormat::Rgb8, [r, g, b]) => {
            let (w, h) = r.dimensions();
            Ok(TileImage::Rgb(RgbImage::from_fn(w, h, |x, y| {
                Rgb([
                    r.get_pixel(x, y).0[0],
                    g.get_pixel(x, y).0[0],
                    b.get_pixel(x, y).0[0],
                ])
            })))
        }
        _ => Err(StitchError::InvalidPixelFormat {
            expected: format,
            found: if channels.len() == 1 {
                PixelFormat::Gray8
            } else {
                PixelFormat::Rgb8
            },
        }),
    }
}

/// Apply a single-channel transform to every channel independently.
///
/// # Errors
///
/// Propagates any error returned by `f`.
pub fn map_channels<F>(image: &TileImage, f: F) -> Result<TileImage, StitchError>
where
    F: Fn(&GrayImage) -> Result<GrayImage, StitchError>,
{
    match image {
        TileImage::Gray(gray) => Ok(TileImage::Gray(f(gray)?)),
        TileImage::Rgb(_) => {
            let channels = split_channels(image)
                .iter()
                .map(&f)
                .collect::<Result<Vec<_>, _>>()?;
            merge_channels(PixelFormat::Rgb8, &channels)
        }
    }
}

/// Mean intensity of a grayscale image, `0.0` when empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(gray: &GrayImage) -> f64 {
    let n = gray.as_raw().len();
    if n == 0 {
        return 0.0;
    }
    let sum: u64 = gray.as_raw().iter().map(|&v| u64::from(v)).sum();
    sum as f64 / n as f64
}

/// Median intensity of a grayscale image, `0.0` when empty.
///
/// For an even number of pixels the two middle values are averaged.
#[must_use]
pub fn median(gray: &GrayImage) -> f64 {
    let n = gray.as_raw().len() as u64;
    if n == 0 {
        return 0.0;
    }
    let hist = imageproc::stats::histogram(gray);
    let counts = &hist.channels[0];

    let nth = |rank: u64| -> f64 {
        let mut seen = 0u64;
        for (value, &count) in counts.iter().enumerate() {
            seen += u64::from(count);
            if seen > rank {
                return f64::from(u8::try_from(value).unwrap_or(u8::MAX));
            }
        }
        255.0
    };

    if n % 2 == 1 {
        nth(n / 2)
    } else {
        f64::midpoint(nth(n / 2 - 1), nth(n / 2))
    }
}
