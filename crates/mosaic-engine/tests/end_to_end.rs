//! Integration tests: stitch synthetic tile grids through the full engine.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::ops::ControlFlow;

use image::{Luma, Rgb};
use mosaic_engine::{
    BlendMode, Crop, Edge, ExposureMode, GrayImage, GridPos, IlluminationMode, NoopObserver,
    Overlap, PixelFormat, PlacementEvent, RecoveryPolicy, ReferencePolicy, RgbImage, SeamBlender,
    StitchConfig, StitchError, Tile, TileImage, TileSet, stitch,
};

/// A tile whose pixels encode their grid cell and position, so any
/// misplaced or modified pixel is detectable.
fn textured(row: u32, col: u32, size: u32) -> Tile {
    let image = GrayImage::from_fn(size, size, |x, y| {
        Luma([u8::try_from((row * 97 + col * 53 + x * 3 + y * 7) % 251).unwrap()])
    });
    Tile::at(
        GridPos::new(row, col),
        format!("r{row}c{col}"),
        TileImage::Gray(image),
    )
}

fn flat(row: u32, col: u32, size: u32, v: u8) -> Tile {
    Tile::at(
        GridPos::new(row, col),
        format!("r{row}c{col}"),
        TileImage::Gray(GrayImage::from_pixel(size, size, Luma([v]))),
    )
}

fn grid(rows: u32, cols: u32, make: impl Fn(u32, u32) -> Tile) -> TileSet {
    let tiles = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .map(|(r, c)| make(r, c))
        .collect();
    TileSet::new(tiles).expect("grid should be valid")
}

fn row_of(image: &TileImage, y: u32) -> Vec<u8> {
    let w = image.width() as usize;
    let start = y as usize * w;
    image.as_raw()[start..start + w].to_vec()
}

fn column_of(image: &TileImage, x: u32) -> Vec<u8> {
    let w = image.width() as usize;
    image
        .as_raw()
        .iter()
        .skip(x as usize)
        .step_by(w)
        .copied()
        .collect()
}

#[test]
fn cropped_tiles_abut_without_blending() {
    let set = grid(3, 3, |r, c| textured(r, c, 100));
    let config = StitchConfig {
        crop: Crop::uniform(10),
        ..StitchConfig::default()
    };
    let mosaic = stitch(&set, &config, &mut NoopObserver).expect("stitch should succeed");
    eprintln!("canvas {:?}", mosaic.canvas.dimensions());
    assert_eq!(mosaic.canvas.dimensions(), (240, 240));

    // Each cell holds its tile's cropped interior, untouched.
    for tile in set.tiles() {
        let pos = tile.pos();
        let TileImage::Gray(raw) = tile.image() else {
            unreachable!()
        };
        let TileImage::Gray(canvas) = &mosaic.canvas else {
            unreachable!()
        };
        for y in 0..80 {
            for x in 0..80 {
                assert_eq!(
                    canvas.get_pixel(pos.col * 80 + x, pos.row * 80 + y),
                    raw.get_pixel(x + 10, y + 10),
                    "{pos} at ({x}, {y})"
                );
            }
        }
    }
}

#[test]
fn linear_overlap_shrinks_canvas_and_ramps_seams() {
    let config = StitchConfig {
        blend_mode: BlendMode::Linear,
        overlap: Overlap::uniform(20),
        ..StitchConfig::default()
    };

    let set = grid(3, 3, |r, c| textured(r, c, 100));
    let mosaic = stitch(&set, &config, &mut NoopObserver).expect("stitch should succeed");
    assert_eq!(mosaic.canvas.dimensions(), (200, 200));
    assert_eq!(mosaic.layout.tile_width, 80);

    let set = grid(1, 2, |_, c| flat(0, c, 100, if c == 0 { 50 } else { 200 }));
    let mosaic = stitch(&set, &config, &mut NoopObserver).expect("stitch should succeed");
    assert_eq!(mosaic.canvas.dimensions(), (140, 80));
    let row = row_of(&mosaic.canvas, 40);
    assert!(row[..60].iter().all(|&v| v == 50));
    assert!(row[80..].iter().all(|&v| v == 200));
    assert!(
        row.windows(2).all(|w| w[0] <= w[1]),
        "seam is not monotonic: {:?}",
        &row[55..85]
    );
    // First strip column is pure left tile.
    assert_eq!(row[60], 50);
}

#[test]
fn multiband_seam_stays_between_neighbours() {
    let config = StitchConfig {
        blend_mode: BlendMode::MultiBand,
        overlap: Overlap::uniform(16),
        pyramid_levels: 4,
        ..StitchConfig::default()
    };
    let set = grid(2, 2, |r, c| flat(r, c, 64, if (r + c) % 2 == 0 { 40 } else { 220 }));
    let mosaic = stitch(&set, &config, &mut NoopObserver).expect("stitch should succeed");
    assert_eq!(mosaic.canvas.dimensions(), (80, 80));
    assert!(mosaic.canvas.as_raw().iter().all(|&v| (39..=221).contains(&v)));

    // Away from every seam, tiles keep their own value.
    let top = row_of(&mosaic.canvas, 10);
    assert_eq!(top[5], 40);
    assert_eq!(top[75], 220);
}

#[test]
fn missing_tiles_leave_background_and_are_reported() {
    let config = StitchConfig {
        blend_mode: BlendMode::Linear,
        overlap: Overlap::uniform(10),
        ..StitchConfig::default()
    };
    let tiles = vec![flat(0, 0, 50, 100), flat(1, 0, 50, 100), flat(1, 1, 50, 100)];
    let set = TileSet::new(tiles).unwrap();
    let mosaic = stitch(&set, &config, &mut NoopObserver).expect("stitch should succeed");

    assert_eq!(mosaic.missing, vec![GridPos::new(0, 1)]);
    assert_eq!(mosaic.canvas.dimensions(), (70, 70));
    // Top-right corner belongs to the missing cell only.
    assert_eq!(row_of(&mosaic.canvas, 5)[65], 0);
    assert_eq!(row_of(&mosaic.canvas, 5)[5], 100);
}

#[test]
fn observer_can_abort() {
    let set = grid(2, 2, |r, c| flat(r, c, 20, 1));
    let mut seen = Vec::new();
    let mut observer = |e: &PlacementEvent<'_>| {
        seen.push(e.pos);
        if e.placed == 3 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    };
    let err = stitch(&set, &StitchConfig::default(), &mut observer).unwrap_err();
    assert_eq!(err, StitchError::Aborted { placed: 3 });
    assert_eq!(
        seen,
        vec![GridPos::new(0, 0), GridPos::new(0, 1), GridPos::new(1, 1)]
    );
}

#[test]
fn anchored_exposure_flattens_drift() {
    let set = grid(2, 3, |r, c| {
        let v = u8::try_from(60 + 20 * (r * 3 + c)).unwrap();
        flat(r, c, 30, v)
    });
    let config = StitchConfig {
        exposure: ExposureMode::Mean,
        reference: ReferencePolicy::Anchor,
        ..StitchConfig::default()
    };
    let mosaic = stitch(&set, &config, &mut NoopObserver).expect("stitch should succeed");
    assert!(mosaic.canvas.as_raw().iter().all(|&v| v == 60));
}

#[test]
fn color_tiles_blend_per_channel() {
    let make = |c: u32, px: [u8; 3]| {
        Tile::at(
            GridPos::new(0, c),
            format!("c{c}"),
            TileImage::Rgb(RgbImage::from_pixel(40, 40, Rgb(px))),
        )
    };
    let set = TileSet::new(vec![make(0, [200, 0, 100]), make(1, [0, 200, 100])]).unwrap();
    let config = StitchConfig {
        blend_mode: BlendMode::Linear,
        overlap: Overlap::uniform(10),
        ..StitchConfig::default()
    };
    let mosaic = stitch(&set, &config, &mut NoopObserver).expect("stitch should succeed");
    let TileImage::Rgb(canvas) = &mosaic.canvas else {
        unreachable!()
    };
    assert_eq!(canvas.dimensions(), (50, 30));
    assert_eq!(canvas.get_pixel(0, 0), &Rgb([200, 0, 100]));
    assert_eq!(canvas.get_pixel(49, 0), &Rgb([0, 200, 100]));
    let mid = canvas.get_pixel(25, 15);
    assert!(mid[0] > 0 && mid[0] < 200 && mid[1] > 0 && mid[1] < 200);
    assert_eq!(mid[2], 100);
}

#[test]
fn odd_row_blends_right_then_top() {
    // Traversal: (0,0), (0,1), (1,1), (1,0). The last tile blends its
    // right strip into (1,1) and its top strip into (0,0).
    let config = StitchConfig {
        blend_mode: BlendMode::Linear,
        overlap: Overlap::uniform(10),
        ..StitchConfig::default()
    };
    let set = grid(2, 2, |r, c| flat(r, c, 50, if (r, c) == (1, 0) { 50 } else { 200 }));
    let mosaic = stitch(&set, &config, &mut NoopObserver).expect("stitch should succeed");
    assert_eq!(mosaic.canvas.dimensions(), (70, 70));

    // Right strip spans x 30..40: pure new tile at its inner side, mostly
    // canvas next to the neighbour, weight `1 - i/10` in between.
    let row = row_of(&mosaic.canvas, 60);
    eprintln!("row 60 seam: {:?}", &row[28..42]);
    assert!(row[..=30].iter().all(|&v| v == 50));
    assert_eq!(row[35], 125);
    assert_eq!(row[39], 185);
    assert!(row[40..].iter().all(|&v| v == 200));
    assert!(row.windows(2).all(|w| w[0] <= w[1]));

    // Top strip spans y 30..40 with weight `i/10`.
    let column = column_of(&mosaic.canvas, 5);
    assert!(column[..=30].iter().all(|&v| v == 200));
    assert_eq!(column[35], 125);
    assert_eq!(column[39], 65);
    assert!(column[40..].iter().all(|&v| v == 50));
}

#[test]
fn previous_reference_removes_every_step() {
    let set = TileSet::new(vec![flat(0, 0, 10, 100), flat(0, 1, 10, 50), flat(0, 2, 10, 25)])
        .unwrap();
    let config = StitchConfig {
        exposure: ExposureMode::Mean,
        reference: ReferencePolicy::Previous,
        ..StitchConfig::default()
    };
    let mosaic = stitch(&set, &config, &mut NoopObserver).expect("stitch should succeed");
    let row = row_of(&mosaic.canvas, 5);
    assert_eq!(row[5], row[15]);
    assert_eq!(row[15], row[25]);
    assert!(row.iter().all(|&v| v == 100), "{row:?}");
}

#[test]
fn every_exposure_strategy_levels_a_drifting_row() {
    for mode in [ExposureMode::Median, ExposureMode::Histogram, ExposureMode::Gamma] {
        let set = TileSet::new(vec![flat(0, 0, 10, 100), flat(0, 1, 10, 50), flat(0, 2, 10, 25)])
            .unwrap();
        let config = StitchConfig {
            exposure: mode,
            ..StitchConfig::default()
        };
        let mosaic = stitch(&set, &config, &mut NoopObserver).expect("stitch should succeed");
        let row = row_of(&mosaic.canvas, 5);
        eprintln!("{mode}: {:?}", [row[5], row[15], row[25]]);
        assert!(row.iter().all(|v| v.abs_diff(100) <= 1), "{mode}: {row:?}");
    }
}

#[test]
fn pass_through_recovers_from_gray_only_strategy() {
    let make = |c: u32, px: [u8; 3]| {
        Tile::at(
            GridPos::new(0, c),
            format!("c{c}"),
            TileImage::Rgb(RgbImage::from_pixel(20, 20, Rgb(px))),
        )
    };
    let set = TileSet::new(vec![make(0, [10, 20, 30]), make(1, [40, 50, 60])]).unwrap();
    let mut config = StitchConfig {
        illumination: IlluminationMode::TopHat,
        ..StitchConfig::default()
    };

    let err = stitch(&set, &config, &mut NoopObserver).unwrap_err();
    assert_eq!(
        err,
        StitchError::InvalidPixelFormat {
            expected: PixelFormat::Gray8,
            found: PixelFormat::Rgb8,
        }
    );

    config.on_preprocess_error = RecoveryPolicy::PassThrough;
    let mosaic = stitch(&set, &config, &mut NoopObserver).expect("stitch should succeed");
    let TileImage::Rgb(canvas) = &mosaic.canvas else {
        unreachable!()
    };
    assert_eq!(canvas.dimensions(), (40, 20));
    assert_eq!(canvas.get_pixel(19, 10), &Rgb([10, 20, 30]));
    assert_eq!(canvas.get_pixel(20, 10), &Rgb([40, 50, 60]));
}

#[test]
fn mismatched_seam_strip_is_reported() {
    let tile = TileImage::Gray(GrayImage::from_pixel(40, 30, Luma([7])));
    let short = TileImage::Gray(GrayImage::from_pixel(10, 20, Luma([9])));
    for mode in [BlendMode::Linear, BlendMode::MultiBand] {
        let blender = mode.blender(StitchConfig::DEFAULT_PYRAMID_LEVELS).unwrap();
        let err = blender.blend(&tile, &short, Edge::Left).unwrap_err();
        assert_eq!(
            err,
            StitchError::DimensionMismatch {
                edge: Edge::Left,
                expected: 30,
                found: 20,
            },
            "{mode}"
        );
    }
}
