//! Single-channel `f32` image planes.
//!
//! All multi-resolution and illumination arithmetic happens on planes so
//! intermediate values never clip or overflow. A plane is an ordinary
//! `imageproc` image with `f32` luma, so the crate's filters run on it
//! directly; borders are padded by continuity as `imageproc` does.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::gaussian_blur_f32;
use imageproc::map::{map_pixels, map_pixels2};

/// A single-channel `f32` image.
pub type Plane = Image<Luma<f32>>;

/// A `width`×`height` plane filled with `value`.
#[must_use]
pub fn filled(width: u32, height: u32, value: f32) -> Plane {
    Plane::from_pixel(width, height, Luma([value]))
}

/// Convert an 8-bit grayscale image, multiplying each value by `scale`.
#[must_use]
pub fn from_gray(gray: &GrayImage, scale: f32) -> Plane {
    map_pixels(gray, |p| Luma([f32::from(p[0]) * scale]))
}

/// Convert back to 8 bits, rounding to nearest and saturating.
#[must_use]
pub fn to_gray(plane: &Plane) -> GrayImage {
    map_pixels(plane, |p| Luma([saturate_u8(p[0])]))
}

/// Apply `f` to every value.
#[must_use]
pub fn map_values(plane: &Plane, f: impl Fn(f32) -> f32) -> Plane {
    map_pixels(plane, |p| Luma([f(p[0])]))
}

/// Combine two equally sized planes value by value.
#[must_use]
pub fn zip_map(a: &Plane, b: &Plane, f: impl Fn(f32, f32) -> f32) -> Plane {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    map_pixels2(a, b, |p, q| Luma([f(p[0], q[0])]))
}

/// Mean value, `0.0` for an empty plane.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(plane: &Plane) -> f32 {
    let n = plane.as_raw().len();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = plane.iter().map(|&v| f64::from(v)).sum();
    #[allow(clippy::cast_possible_truncation)]
    let mean = (sum / n as f64) as f32;
    mean
}

/// `(min, max)` over all values, `None` for an empty plane.
#[must_use]
pub fn min_max(plane: &Plane) -> Option<(f32, f32)> {
    let first = *plane.as_raw().first()?;
    Some(
        plane
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

/// Linearly rescale values so the minimum maps to `lo` and the maximum
/// to `hi`.
///
/// A constant plane has no range to stretch and yields all zeros.
#[must_use]
pub fn normalize_min_max(plane: &Plane, lo: f32, hi: f32) -> Plane {
    match min_max(plane) {
        Some((min, max)) if max > min => {
            let scale = (hi - lo) / (max - min);
            map_values(plane, |v| (v - min).mul_add(scale, lo))
        }
        _ => filled(plane.width(), plane.height(), 0.0),
    }
}

/// Gaussian sigma for a `ksize`-wide window:
/// `0.3 * ((ksize - 1) / 2 - 1) + 0.8`. Even sizes count as the next odd
/// size.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn kernel_sigma(ksize: u32) -> f32 {
    let ksize = ksize.max(1) | 1;
    0.3f32.mul_add((ksize as f32 - 1.0).mul_add(0.5, -1.0), 0.8)
}

/// Gaussian blur sized by a `ksize`×`ksize` window.
#[must_use]
pub fn gaussian_blur(plane: &Plane, ksize: u32) -> Plane {
    gaussian_blur_f32(plane, kernel_sigma(ksize))
}

/// Round to nearest and clamp into `0..=255`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn saturate_u8(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.round().clamp(0.0, 255.0) as u8
}

/// Wrap a `GrayImage` pixel value.
#[must_use]
pub const fn luma(v: u8) -> Luma<u8> {
    Luma([v])
}
