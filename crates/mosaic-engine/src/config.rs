//! Engine configuration, supplied once per stitch run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blend::BlendMode;
use crate::denoise::DenoiseFilter;
use crate::exposure::{ExposureMode, ReferencePolicy};
use crate::illumination::IlluminationMode;
use crate::types::StitchError;

/// Border pixels stripped from each side of a raw tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Crop {
    /// Pixels removed from the left and from the right edge.
    pub x: u32,
    /// Pixels removed from the top and from the bottom edge.
    pub y: u32,
}

impl Crop {
    /// The same margin on both axes.
    #[must_use]
    pub const fn uniform(margin: u32) -> Self {
        Self {
            x: margin,
            y: margin,
        }
    }
}

/// Transition region shared by adjacent tiles when blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Overlap {
    /// Pixels shared between horizontally adjacent tiles.
    pub x: u32,
    /// Pixels shared between vertically adjacent tiles.
    pub y: u32,
}

impl Overlap {
    /// A single transition region used for both axes.
    #[must_use]
    pub const fn uniform(transition_region: u32) -> Self {
        Self {
            x: transition_region,
            y: transition_region,
        }
    }
}

/// How crop and overlap combine when blending is enabled.
///
/// Both policies use [`Crop`] verbatim when blending is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CropPolicy {
    /// Crop is `overlap / 2` per side; the crop margins are ignored.
    #[default]
    TransitionDerived,
    /// Crop is `crop + transition / 2`; the overlap becomes
    /// `2 * (transition - transition / 2)`.
    Combined,
}

impl fmt::Display for CropPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransitionDerived => f.write_str("TransitionDerived"),
            Self::Combined => f.write_str("Combined"),
        }
    }
}

/// What to do when a per-tile preprocessing step rejects its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecoveryPolicy {
    /// Propagate the error and abort the run.
    #[default]
    Abort,
    /// Log a warning and use the tile unmodified.
    PassThrough,
}

/// Configuration for one stitch run.
///
/// Strategy selectors are enums so the run's behaviour is fixed up front
/// and each strategy can be exercised on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Crop margins used when blending is disabled (and by
    /// [`CropPolicy::Combined`] when it is enabled).
    pub crop: Crop,

    /// Transition region between adjacent tiles. Only used when
    /// `blend_mode` is not [`BlendMode::None`].
    pub overlap: Overlap,

    /// Which crop/overlap formula applies when blending.
    pub crop_policy: CropPolicy,

    /// Seam blending algorithm.
    pub blend_mode: BlendMode,

    /// Number of pyramid levels below full resolution for
    /// [`BlendMode::MultiBand`]. Must be at least 1.
    pub pyramid_levels: usize,

    /// Exposure equalization strategy.
    pub exposure: ExposureMode,

    /// Which tile the exposure equalizer matches against.
    pub reference: ReferencePolicy,

    /// Illumination flattening strategy.
    pub illumination: IlluminationMode,

    /// Smoothing applied to each raw tile before any other step.
    pub denoise: DenoiseFilter,

    /// Integer downscale factor for the canvas handed to progress
    /// observers. `1` passes the live canvas.
    pub preview_scale: u32,

    /// Recovery policy for preprocessing failures.
    pub on_preprocess_error: RecoveryPolicy,
}

impl StitchConfig {
    /// Default number of pyramid levels for multi-band blending.
    pub const DEFAULT_PYRAMID_LEVELS: usize = 5;

    /// Default transition region in pixels.
    pub const DEFAULT_TRANSITION_REGION: u32 = 10;

    /// Default preview downscale factor.
    pub const DEFAULT_PREVIEW_SCALE: u32 = 1;

    /// Returns `true` if seams are blended.
    #[must_use]
    pub fn blending_enabled(&self) -> bool {
        self.blend_mode != BlendMode::None
    }

    /// Check value ranges that the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::InvalidConfig`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), StitchError> {
        if self.pyramid_levels == 0 {
            return Err(StitchError::InvalidConfig(
                "pyramid_levels must be at least 1".to_string(),
            ));
        }
        if self.preview_scale == 0 {
            return Err(StitchError::InvalidConfig(
                "preview_scale must be at least 1".to_string(),
            ));
        }
        if let IlluminationMode::Clahe(params) = self.illumination {
            if params.grid == 0 {
                return Err(StitchError::InvalidConfig(
                    "clahe grid must be at least 1".to_string(),
                ));
            }
            if !(params.clip_limit.is_finite() && params.clip_limit > 0.0) {
                return Err(StitchError::InvalidConfig(format!(
                    "clahe clip_limit must be positive, got {}",
                    params.clip_limit
                )));
            }
        }
        Ok(())
    }
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            crop: Crop::default(),
            overlap: Overlap::uniform(Self::DEFAULT_TRANSITION_REGION),
            crop_policy: CropPolicy::default(),
            blend_mode: BlendMode::default(),
            pyramid_levels: Self::DEFAULT_PYRAMID_LEVELS,
            exposure: ExposureMode::default(),
            reference: ReferencePolicy::default(),
            illumination: IlluminationMode::default(),
            denoise: DenoiseFilter::default(),
            preview_scale: Self::DEFAULT_PREVIEW_SCALE,
            on_preprocess_error: RecoveryPolicy::default(),
        }
    }
}
