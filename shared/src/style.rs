use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Overlay visualisation selected by the first segment of a tile request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisualizationStyle {
    Slope,
    DownhillDifficulty,
    Aspect,
    SunExposure,
    AvalancheSlopeClasses,
}

/// How much neighbouring elevation data a style needs around its tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaddingKind {
    /// Centre tile plus a 3 px border sampled from the 8 neighbours.
    Minimal,
    /// Full 3x3 grid of whole tiles.
    Extended,
}

/// Border width (in DEM pixels) of a minimally padded buffer.
pub const MINIMAL_BORDER: usize = 3;

impl VisualizationStyle {
    pub const ALL: [VisualizationStyle; 5] = [
        VisualizationStyle::Slope,
        VisualizationStyle::DownhillDifficulty,
        VisualizationStyle::Aspect,
        VisualizationStyle::SunExposure,
        VisualizationStyle::AvalancheSlopeClasses,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slope => "slope",
            Self::DownhillDifficulty => "downhill-difficulty",
            Self::Aspect => "aspect",
            Self::SunExposure => "sun-exposure",
            Self::AvalancheSlopeClasses => "avalanche-slope-classes",
        }
    }

    /// Integer selector passed to the GPU as a uniform.
    pub fn code(self) -> u32 {
        match self {
            Self::Slope => 0,
            Self::DownhillDifficulty => 1,
            Self::Aspect => 2,
            Self::SunExposure => 3,
            Self::AvalancheSlopeClasses => 4,
        }
    }

    pub fn padding_kind(self) -> PaddingKind {
        match self {
            Self::SunExposure => PaddingKind::Extended,
            _ => PaddingKind::Minimal,
        }
    }

    /// Categorical styles keep their colours unmodified by hillshading.
    pub fn uses_hillshade(self) -> bool {
        !matches!(self, Self::AvalancheSlopeClasses)
    }

    /// Whether rendering also needs the zoom-8 context buffer for long-range shadows.
    pub fn casts_shadows(self) -> bool {
        matches!(self, Self::SunExposure)
    }
}

impl fmt::Display for VisualizationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown visualization style `{0}`")]
pub struct UnknownStyle(pub String);

impl FromStr for VisualizationStyle {
    type Err = UnknownStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| UnknownStyle(s.to_owned()))
    }
}

impl PaddingKind {
    /// Side length of the padded buffer for a DEM tile of `tile_size` pixels.
    pub fn padded_size(self, tile_size: usize) -> usize {
        match self {
            Self::Minimal => tile_size + 2 * MINIMAL_BORDER,
            Self::Extended => 3 * tile_size,
        }
    }

    /// Offset (in padded pixels) of the centre tile's top-left corner.
    pub fn border(self, tile_size: usize) -> usize {
        match self {
            Self::Minimal => MINIMAL_BORDER,
            Self::Extended => tile_size,
        }
    }

    /// Side length of the rendered output given the padded buffer size.
    pub fn output_size(self, padded_size: usize) -> usize {
        match self {
            Self::Minimal => padded_size.saturating_sub(2 * MINIMAL_BORDER),
            Self::Extended => padded_size / 3,
        }
    }
}
