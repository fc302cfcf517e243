//! mosaic-bench: CLI tool for stitching parameter experimentation and diagnostics.
//!
//! Stitches a synthetic, vignetted and exposure-drifted tile grid with
//! configurable parameters, printing per-stage diagnostics. Useful for:
//!
//! - Comparing seam blenders (`linear` vs `multiband`)
//! - Tuning overlap, crop and pyramid depth
//! - Checking how exposure and illumination strategies flatten drift
//! - Measuring preprocessing vs composition time
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin mosaic-bench -- [OPTIONS]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::ops::ControlFlow;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use mosaic_engine::diagnostics::{Clock, StitchDiagnostics};
use mosaic_engine::{
    BlendMode, ClaheParams, Crop, CropPolicy, DenoiseFilter, ExposureMode, GridPos,
    IlluminationMode, NoopObserver, Overlap, PlacementEvent, PlacementObserver, RecoveryPolicy,
    ReferencePolicy, StitchConfig, Tile, TileImage, TileSet,
};

/// Stitching parameter experimentation and diagnostics for mosaic.
///
/// Stitches a tile grid with configurable parameters and prints detailed
/// per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "mosaic-bench", version)]
struct Cli {
    /// Generate RGB tiles instead of grayscale.
    #[arg(long)]
    color: bool,

    /// Grid rows.
    #[arg(long, default_value_t = 3, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    rows: u32,

    /// Grid columns.
    #[arg(long, default_value_t = 4, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    cols: u32,

    /// Raw tile edge length in pixels.
    #[arg(long, default_value_t = 256, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(8..))]
    tile_size: u32,

    /// Crop margin per side in pixels (both axes).
    #[arg(long, default_value_t = 0)]
    crop: u32,

    /// Transition region in pixels (both axes).
    #[arg(long, default_value_t = StitchConfig::DEFAULT_TRANSITION_REGION)]
    overlap: u32,

    /// How crop and overlap combine when blending.
    #[arg(long, value_enum, default_value_t = Policy::Transition)]
    crop_policy: Policy,

    /// Seam blending algorithm.
    #[arg(long, value_enum, default_value_t = Blend::None)]
    blend: Blend,

    /// Pyramid levels for multi-band blending.
    #[arg(long, default_value_t = StitchConfig::DEFAULT_PYRAMID_LEVELS, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    levels: usize,

    /// Exposure equalization strategy.
    #[arg(long, value_enum, default_value_t = Exposure::None)]
    exposure: Exposure,

    /// Equalize against the first tile instead of the previous one.
    #[arg(long)]
    anchor: bool,

    /// Illumination flattening strategy.
    #[arg(long, value_enum, default_value_t = Illumination::None)]
    illumination: Illumination,

    /// CLAHE cells per axis.
    #[arg(long, default_value_t = ClaheParams::DEFAULT_GRID, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    clahe_grid: u32,

    /// CLAHE clip limit.
    #[arg(long, default_value_t = ClaheParams::DEFAULT_CLIP_LIMIT)]
    clahe_clip: f32,

    /// Smoothing filter applied before everything else.
    #[arg(long, value_enum, default_value_t = Denoise::None)]
    denoise: Denoise,

    /// Keep going when a preprocessing step fails, using the tile as is.
    #[arg(long)]
    pass_through: bool,

    /// Integer downscale of the canvas handed to the progress observer.
    #[arg(long, default_value_t = StitchConfig::DEFAULT_PREVIEW_SCALE, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    preview_scale: u32,

    /// Print a line to stderr after every tile placement.
    #[arg(long)]
    progress: bool,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full stitch config as a JSON string.
    ///
    /// When provided, all other stitch parameter flags are ignored.
    /// The JSON must be a valid `StitchConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Crop policy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Crop half the transition region per side.
    Transition,
    /// Crop margin and transition region add up.
    Combined,
}

/// Seam blender selection.
#[derive(Clone, Copy, ValueEnum)]
enum Blend {
    /// Abut cropped tiles.
    None,
    /// Linear ramp across the overlap.
    Linear,
    /// Laplacian pyramid blend.
    Multiband,
}

/// Exposure strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Exposure {
    /// No equalization.
    None,
    /// Mean ratio.
    Mean,
    /// Median ratio.
    Median,
    /// Histogram matching.
    Histogram,
    /// Gamma correction.
    Gamma,
}

/// Illumination strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Illumination {
    /// No flattening.
    None,
    /// Divide by a blurred shading estimate.
    LowFrequency,
    /// Divide by an adaptive shading estimate, then stretch.
    LowFrequencyNormalized,
    /// Morphological top-hat background removal.
    TopHat,
    /// Contrast-limited adaptive histogram equalization.
    Clahe,
}

/// Denoise filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Denoise {
    /// No smoothing.
    None,
    /// 5x5 Gaussian.
    Gaussian,
    /// 5x5 box.
    Box,
}

/// Build a [`StitchConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<StitchConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(StitchConfig {
        crop: Crop::uniform(cli.crop),
        overlap: Overlap::uniform(cli.overlap),
        crop_policy: match cli.crop_policy {
            Policy::Transition => CropPolicy::TransitionDerived,
            Policy::Combined => CropPolicy::Combined,
        },
        blend_mode: match cli.blend {
            Blend::None => BlendMode::None,
            Blend::Linear => BlendMode::Linear,
            Blend::Multiband => BlendMode::MultiBand,
        },
        pyramid_levels: cli.levels,
        exposure: match cli.exposure {
            Exposure::None => ExposureMode::None,
            Exposure::Mean => ExposureMode::Mean,
            Exposure::Median => ExposureMode::Median,
            Exposure::Histogram => ExposureMode::Histogram,
            Exposure::Gamma => ExposureMode::Gamma,
        },
        reference: if cli.anchor {
            ReferencePolicy::Anchor
        } else {
            ReferencePolicy::Previous
        },
        illumination: match cli.illumination {
            Illumination::None => IlluminationMode::None,
            Illumination::LowFrequency => IlluminationMode::LowFrequency,
            Illumination::LowFrequencyNormalized => IlluminationMode::LowFrequencyNormalized,
            Illumination::TopHat => IlluminationMode::TopHat,
            Illumination::Clahe => IlluminationMode::Clahe(ClaheParams {
                grid: cli.clahe_grid,
                clip_limit: cli.clahe_clip,
            }),
        },
        denoise: match cli.denoise {
            Denoise::None => DenoiseFilter::None,
            Denoise::Gaussian => DenoiseFilter::Gaussian,
            Denoise::Box => DenoiseFilter::Box,
        },
        preview_scale: cli.preview_scale,
        on_preprocess_error: if cli.pass_through {
            RecoveryPolicy::PassThrough
        } else {
            RecoveryPolicy::Abort
        },
        ..StitchConfig::default()
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let tiles = match synthetic_tiles(&cli, &config) {
        Ok(tiles) => tiles,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Tiles: {} on a {}x{} grid, {}x{} px each",
        tiles.len(),
        tiles.rows(),
        tiles.cols(),
        tiles.raw_size().0,
        tiles.raw_size().1,
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let mut progress = |e: &PlacementEvent<'_>| {
            eprintln!(
                "placed {} ({}/{}), preview {}x{}",
                e.pos,
                e.placed,
                e.total,
                e.canvas.width(),
                e.canvas.height(),
            );
            ControlFlow::Continue(())
        };
        let observer: &mut dyn PlacementObserver = if cli.progress {
            &mut progress
        } else {
            &mut NoopObserver
        };

        match mosaic_engine::diagnostics::stitch_with_diagnostics(
            &tiles, &config, observer, &StdClock,
        ) {
            Ok((_, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Stitch error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// A `rows`x`cols` grid cut from one smooth synthetic specimen, each tile
/// darkened toward its corners and given its own exposure gain.
///
/// Tiles are cut at the positions the configured layout will place them,
/// so correctly blended seams are invisible.
fn synthetic_tiles(cli: &Cli, config: &StitchConfig) -> Result<TileSet, String> {
    let size = cli.tile_size;
    let layout = mosaic_engine::resolve_layout(size, size, cli.rows, cli.cols, config)
        .map_err(|e| e.to_string())?;
    let step_x = layout.tile_width - layout.overlap_x;
    let step_y = layout.tile_height - layout.overlap_y;
    let half = f64::from(size) / 2.0;

    let tiles = (0..cli.rows)
        .flat_map(|row| (0..cli.cols).map(move |col| GridPos::new(row, col)))
        .map(|pos| {
            let gain = 1.0 + 0.06 * (f64::from((pos.row * cli.cols + pos.col) % 5) - 2.0);
            let origin_x = f64::from(pos.col * step_x) - f64::from(layout.crop_x);
            let origin_y = f64::from(pos.row * step_y) - f64::from(layout.crop_y);
            let render = |x: u32, y: u32| {
                let (sx, sy) = (origin_x + f64::from(x), origin_y + f64::from(y));
                let scene = 40.0f64.mul_add(
                    (sx / 23.0).sin() * (sy / 17.0).cos(),
                    20.0f64.mul_add(((sx + sy) / 41.0).sin(), 128.0),
                );
                let r2 = ((f64::from(x) - half).powi(2) + (f64::from(y) - half).powi(2))
                    / (2.0 * half * half);
                let vignette = 0.35f64.mul_add(-r2, 1.0);
                let noise = f64::from(hash_noise(pos, x, y)) - 2.0;
                scene * vignette * gain + noise
            };
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let to_u8 = |v: f64| v.round().clamp(0.0, 255.0) as u8;
            let image = if cli.color {
                TileImage::Rgb(image::RgbImage::from_fn(size, size, |x, y| {
                    let v = render(x, y);
                    image::Rgb([to_u8(v * 1.05), to_u8(v), to_u8(v * 0.9)])
                }))
            } else {
                TileImage::Gray(image::GrayImage::from_fn(size, size, |x, y| {
                    image::Luma([to_u8(render(x, y))])
                }))
            };
            Tile::at(pos, format!("synthetic {pos}"), image)
        })
        .collect();
    TileSet::new(tiles).map_err(|e| e.to_string())
}

/// Deterministic per-pixel noise in `0..=4`.
fn hash_noise(pos: GridPos, x: u32, y: u32) -> u8 {
    let mut h = (u64::from(pos.row) << 48) ^ (u64::from(pos.col) << 32) ^ (u64::from(y) << 16);
    h ^= u64::from(x);
    h = h.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    h ^= h >> 29;
    u8::try_from(h % 5).unwrap_or(0)
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&StitchDiagnostics) -> Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[StitchDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Preprocess", |d| d.preprocess.duration),
        ("Composite", |d| d.composite.duration),
    ];

    for (name, extractor) in stage_extractors {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn flags_build_config() {
        let cli = Cli::parse_from([
            "mosaic-bench",
            "--blend",
            "multiband",
            "--levels",
            "3",
            "--illumination",
            "clahe",
            "--anchor",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.blend_mode, BlendMode::MultiBand);
        assert_eq!(config.pyramid_levels, 3);
        assert_eq!(config.reference, ReferencePolicy::Anchor);
        assert!(matches!(config.illumination, IlluminationMode::Clahe(_)));
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::parse_from([
            "mosaic-bench",
            "--blend",
            "linear",
            "--config-json",
            r#"{"blend_mode": "MultiBand", "pyramid_levels": 2}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.blend_mode, BlendMode::MultiBand);
        assert_eq!(config.pyramid_levels, 2);
    }

    #[test]
    fn synthetic_grid_stitches() {
        let cli = Cli::parse_from([
            "mosaic-bench",
            "--rows",
            "2",
            "--cols",
            "2",
            "--tile-size",
            "64",
            "--blend",
            "linear",
        ]);
        let config = config_from_cli(&cli).unwrap();
        let tiles = synthetic_tiles(&cli, &config).unwrap();
        assert_eq!(tiles.len(), 4);
        let (mosaic, _) = mosaic_engine::diagnostics::stitch_with_diagnostics(
            &tiles,
            &config,
            &mut NoopObserver,
            &StdClock,
        )
        .unwrap();
        assert_eq!(mosaic.canvas.dimensions(), (98, 98));
    }
}
