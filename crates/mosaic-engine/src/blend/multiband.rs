//! Multi-band (Laplacian pyramid) seam blending.
//!
//! Both overlap images are decomposed into band-pass levels; each level
//! is mixed with a Gaussian-smoothed copy of a geometric ramp mask, and
//! the blended pyramid is collapsed back into one image. Low frequencies
//! mix over a wide area and fine texture over a narrow one, which hides
//! the seam without the ghosting a single linear ramp leaves on detail.
//!
//! The mask has value `m` where the new tile wins and `1 - m` where the
//! canvas wins, ramping away from the previously placed neighbour:
//!
//! | edge     | mask                          |
//! |----------|-------------------------------|
//! | `Left`   | 0 → 255, left to right        |
//! | `Right`  | 255 → 0, left to right        |
//! | `Top`    | 0 → 255, top to bottom        |
//! | `Bottom` | 255 → 0, top to bottom        |
//!
//! All pyramid arithmetic is `f32`; the result is rounded back to 8 bits
//! once.

use image::GrayImage;

use super::{Edge, locate_strip};
use crate::grayscale::{merge_channels, split_channels};
use crate::plane::{self, Plane, luma};
use crate::pyramid::Pyramid;
use crate::types::{Rect, StitchError, TileImage};

/// Blend `tile`'s `edge` strip against `prior` using `levels` pyramid
/// levels below full resolution.
///
/// # Errors
///
/// See [`SeamBlender::blend`](super::SeamBlender::blend).
pub fn blend(
    tile: &TileImage,
    prior: &TileImage,
    edge: Edge,
    levels: usize,
) -> Result<TileImage, StitchError> {
    let strip = locate_strip(tile, prior, edge)?;
    if strip.thickness == 0 {
        return Ok(tile.clone());
    }
    let (w, h) = prior.dimensions();
    let region = tile.crop(Rect::new(strip.x, strip.y, w, h))?;

    let mask = match edge {
        Edge::Left => horizontal_mask(w, h, true),
        Edge::Right => horizontal_mask(w, h, false),
        Edge::Top => vertical_mask(w, h, true),
        Edge::Bottom => vertical_mask(w, h, false),
    };
    let mask = plane::from_gray(&mask, 1.0 / 255.0);

    let blended: Vec<GrayImage> = split_channels(&region)
        .iter()
        .zip(split_channels(prior).iter())
        .map(|(a, b)| {
            plane::to_gray(&multiband_blend(
                plane::from_gray(a, 1.0),
                plane::from_gray(b, 1.0),
                &mask,
                levels,
            ))
        })
        .collect();

    let mut out = tile.clone();
    out.paste(&merge_channels(tile.format(), &blended)?, strip.x, strip.y)?;
    Ok(out)
}

/// Blend two equally sized planes: `a` where `mask` is 1, `b` where it
/// is 0, band by band.
#[must_use]
pub fn multiband_blend(a: Plane, b: Plane, mask: &Plane, levels: usize) -> Plane {
    let lap_a = Pyramid::laplacian(&Pyramid::gaussian(a, levels));
    let lap_b = Pyramid::laplacian(&Pyramid::gaussian(b, levels));
    let weights = Pyramid::gaussian(mask.clone(), levels);
    let blended = Pyramid::blend(&lap_a, &lap_b, &weights);
    // A pyramid always holds at least its base level.
    blended
        .collapse()
        .unwrap_or_else(|| plane::filled(mask.width(), mask.height(), 0.0))
}

/// A `width`×`height` mask ramping across columns, identical on every
/// row. `forward` ramps 0 → 255 left to right; otherwise 255 → 0.
#[must_use]
pub fn horizontal_mask(width: u32, height: u32, forward: bool) -> GrayImage {
    GrayImage::from_fn(width, height, |x, _| luma(ramp(x, width, forward)))
}

/// A `width`×`height` mask ramping across rows, identical in every
/// column. `forward` ramps 0 → 255 top to bottom; otherwise 255 → 0.
#[must_use]
pub fn vertical_mask(width: u32, height: u32, forward: bool) -> GrayImage {
    GrayImage::from_fn(width, height, |_, y| luma(ramp(y, height, forward)))
}

/// `255 * i / (len - 1)`, mirrored when not `forward`. A single-pixel
/// ramp holds its starting value.
fn ramp(i: u32, len: u32, forward: bool) -> u8 {
    if len <= 1 {
        return if forward { 0 } else { u8::MAX };
    }
    let k = if forward { i } else { len - 1 - i };
    let v = u64::from(k) * 255 / u64::from(len - 1);
    u8::try_from(v).unwrap_or(u8::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{Luma, Rgb};

    use super::*;
    use crate::types::RgbImage;

    fn textured(w: u32, h: u32) -> TileImage {
        TileImage::Gray(GrayImage::from_fn(w, h, |x, y| {
            Luma([u8::try_from((x * 37 + y * 91) % 256).unwrap()])
        }))
    }

    #[test]
    fn horizontal_mask_ramps_across_columns() {
        let mask = horizontal_mask(5, 2, true);
        for y in 0..2 {
            let row: Vec<u8> = (0..5).map(|x| mask.get_pixel(x, y).0[0]).collect();
            assert_eq!(row, vec![0, 63, 127, 191, 255]);
        }
        let reversed = horizontal_mask(5, 1, false);
        let row: Vec<u8> = (0..5).map(|x| reversed.get_pixel(x, 0).0[0]).collect();
        assert_eq!(row, vec![255, 191, 127, 63, 0]);
    }

    #[test]
    fn vertical_mask_ramps_across_rows() {
        let mask = vertical_mask(3, 3, true);
        for x in 0..3 {
            assert_eq!(mask.get_pixel(x, 0).0[0], 0);
            assert_eq!(mask.get_pixel(x, 1).0[0], 127);
            assert_eq!(mask.get_pixel(x, 2).0[0], 255);
        }
    }

    #[test]
    fn single_pixel_mask_holds_start_value() {
        assert_eq!(horizontal_mask(1, 4, true).get_pixel(0, 3).0[0], 0);
        assert_eq!(vertical_mask(4, 1, false).get_pixel(2, 0).0[0], 255);
    }

    #[test]
    fn identical_inputs_are_reproduced() {
        let tile = textured(24, 17);
        for levels in [1, 3, 5, 8] {
            for (edge, rect) in [
                (Edge::Left, Rect::new(0, 0, 9, 17)),
                (Edge::Right, Rect::new(15, 0, 9, 17)),
                (Edge::Top, Rect::new(0, 0, 24, 6)),
                (Edge::Bottom, Rect::new(0, 11, 24, 6)),
            ] {
                let prior = tile.crop(rect).unwrap();
                let out = blend(&tile, &prior, edge, levels).unwrap();
                assert_eq!(out, tile, "{edge} with {levels} levels");
            }
        }
    }

    #[test]
    fn identity_holds_for_any_mask() {
        let a = Plane::from_fn(13, 7, |x, y| {
            #[allow(clippy::cast_precision_loss)]
            let v = ((x * 17 + y * 5) % 200) as f32;
            Luma([v])
        });
        let mask = Plane::from_fn(13, 7, |x, y| Luma([if (x + y) % 3 == 0 { 1.0 } else { 0.2 }]));
        let out = multiband_blend(a.clone(), a.clone(), &mask, 4);
        for (p, q) in a.iter().zip(out.iter()) {
            assert!((p - q).abs() < 1e-3);
        }
    }

    #[test]
    fn left_seam_moves_from_canvas_to_tile() {
        let tile = TileImage::Gray(GrayImage::from_pixel(24, 4, Luma([200])));
        let prior = TileImage::Gray(GrayImage::new(16, 4));
        let out = blend(&tile, &prior, Edge::Left, 2).unwrap();
        let raw = out.as_raw();
        assert!(raw[0] < 100, "seam start {}", raw[0]);
        assert!(raw[15] > 100, "seam end {}", raw[15]);
        assert!(raw[0] < raw[8] && raw[8] < raw[15]);
        assert!(raw[16..24].iter().all(|&v| v == 200));
    }

    #[test]
    fn right_seam_favours_tile_on_inner_side() {
        let tile = TileImage::Gray(GrayImage::from_pixel(24, 4, Luma([200])));
        let prior = TileImage::Gray(GrayImage::new(16, 4));
        let out = blend(&tile, &prior, Edge::Right, 2).unwrap();
        let raw = out.as_raw();
        assert!(raw[8] > 100);
        assert!(raw[23] < 100);
        assert!(raw[..8].iter().all(|&v| v == 200));
    }

    #[test]
    fn color_channels_blend_independently() {
        let tile = TileImage::Rgb(RgbImage::from_pixel(12, 6, Rgb([240, 120, 0])));
        let prior = TileImage::Rgb(RgbImage::from_pixel(12, 4, Rgb([240, 0, 60])));
        let out = blend(&tile, &prior, Edge::Top, 2).unwrap();
        let TileImage::Rgb(rgb) = out else {
            unreachable!()
        };
        // Red agrees on both sides and must stay put.
        assert!(rgb.pixels().all(|p| p.0[0] == 240));
        assert!(rgb.get_pixel(5, 0).0[1] < rgb.get_pixel(5, 3).0[1]);
        assert!(rgb.get_pixel(5, 0).0[2] > rgb.get_pixel(5, 3).0[2]);
        assert_eq!(rgb.get_pixel(5, 5).0, [240, 120, 0]);
    }
}
