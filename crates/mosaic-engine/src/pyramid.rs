//! Gaussian and Laplacian image pyramids.
//!
//! Level 0 is full resolution. Each further level is a 5-tap binomial
//! low-pass (`[1 4 6 4 1] / 16` on both axes) followed by dropping every
//! odd row and column, so a `w`×`h` level becomes `ceil(w/2)`×`ceil(h/2)`.
//! Sizes never reach zero: a one-pixel axis stays one pixel.
//!
//! Upsampling places source samples on even positions and filters with
//! the same kernel, normalized by how much of the kernel landed on a
//! sample. It always produces an explicitly requested size so odd-sized
//! levels reconstruct exactly.
//!
//! Pyramids are built per blend call and dropped afterward.

use image::Luma;
use imageproc::filter::separable_filter_equal;

use crate::plane::{self, Plane};

const BINOMIAL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Low-pass filter and decimate by two on both axes.
#[must_use]
pub fn pyr_down(src: &Plane) -> Plane {
    let smooth = separable_filter_equal(src, &BINOMIAL);
    Plane::from_fn(src.width().div_ceil(2), src.height().div_ceil(2), |x, y| {
        *smooth.get_pixel(2 * x, 2 * y)
    })
}

/// Upsample by two to exactly `width`×`height`.
///
/// `width` must be `2 * src.width()` or `2 * src.width() - 1` (likewise
/// for height) for the result to be meaningful.
#[must_use]
pub fn pyr_up(src: &Plane, width: u32, height: u32) -> Plane {
    let (sw, sh) = src.dimensions();
    let on_sample = |x: u32, y: u32| x % 2 == 0 && y % 2 == 0 && x / 2 < sw && y / 2 < sh;
    let stuffed = Plane::from_fn(width, height, |x, y| {
        if on_sample(x, y) {
            *src.get_pixel(x / 2, y / 2)
        } else {
            Luma([0.0])
        }
    });
    let support = Plane::from_fn(width, height, |x, y| {
        Luma([if on_sample(x, y) { 1.0 } else { 0.0 }])
    });
    let acc = separable_filter_equal(&stuffed, &BINOMIAL);
    let weight = separable_filter_equal(&support, &BINOMIAL);
    plane::zip_map(&acc, &weight, |a, w| if w > 0.0 { a / w } else { 0.0 })
}

/// An ordered sequence of planes, finest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Pyramid {
    levels: Vec<Plane>,
}

impl Pyramid {
    /// Gaussian pyramid with `levels` reductions below `base`
    /// (`levels + 1` planes in total).
    #[must_use]
    pub fn gaussian(base: Plane, levels: usize) -> Self {
        let mut planes = Vec::with_capacity(levels + 1);
        planes.push(base);
        for i in 0..levels {
            let next = pyr_down(&planes[i]);
            planes.push(next);
        }
        Self { levels: planes }
    }

    /// Laplacian pyramid derived from a Gaussian one.
    ///
    /// Level `k < L` is `G[k] - up(G[k+1])`; level `L` is `G[L]` itself.
    #[must_use]
    pub fn laplacian(gaussian: &Self) -> Self {
        let n = gaussian.levels.len();
        let mut planes = Vec::with_capacity(n);
        for pair in gaussian.levels.windows(2) {
            let (fine, coarse) = (&pair[0], &pair[1]);
            let up = pyr_up(coarse, fine.width(), fine.height());
            planes.push(plane::zip_map(fine, &up, |a, b| a - b));
        }
        if let Some(coarsest) = gaussian.levels.last() {
            planes.push(coarsest.clone());
        }
        Self { levels: planes }
    }

    /// Per-level `a * m + b * (1 - m)` with `m` taken from `mask`.
    ///
    /// All three pyramids must have matching level sizes.
    #[must_use]
    pub fn blend(a: &Self, b: &Self, mask: &Self) -> Self {
        let levels = a
            .levels
            .iter()
            .zip(&b.levels)
            .zip(&mask.levels)
            .map(|((la, lb), lm)| {
                Plane::from_fn(la.width(), la.height(), |x, y| {
                    let m = lm.get_pixel(x, y)[0];
                    let vb = lb.get_pixel(x, y)[0] * (1.0 - m);
                    Luma([la.get_pixel(x, y)[0].mul_add(m, vb)])
                })
            })
            .collect();
        Self { levels }
    }

    /// Reconstruct a full-resolution plane from a Laplacian pyramid:
    /// start at the coarsest level and repeatedly upsample and add the
    /// next finer level.
    #[must_use]
    pub fn collapse(&self) -> Option<Plane> {
        let (coarsest, finer) = self.levels.split_last()?;
        let mut acc = coarsest.clone();
        for level in finer.iter().rev() {
            let up = pyr_up(&acc, level.width(), level.height());
            acc = plane::zip_map(&up, level, |a, b| a + b);
        }
        Some(acc)
    }

    /// Number of planes (`levels + 1`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Always `false` for pyramids built by this module.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Plane at level `i`, 0 being the finest.
    #[must_use]
    pub fn level(&self, i: usize) -> Option<&Plane> {
        self.levels.get(i)
    }
}
