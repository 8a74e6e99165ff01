//! Regional ski-run difficulty conventions and the slope grading tables
//! that map physical steepness to a run difficulty.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunDifficulty {
    Novice,
    Easy,
    Intermediate,
    Advanced,
    Expert,
}

/// Regional system used to grade run difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyConvention {
    Europe,
    Japan,
    NorthAmerica,
}

/// One grading stop: gradients up to and including `max_gradient` get `difficulty`.
///
/// Gradient is rise over run (`tan(slope angle)`). `f32::INFINITY` marks an
/// open-ended top bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeStop {
    pub max_gradient: f32,
    pub difficulty: RunDifficulty,
}

const fn stop(max_gradient: f32, difficulty: RunDifficulty) -> SlopeStop {
    SlopeStop {
        max_gradient,
        difficulty,
    }
}

const EUROPE_DOWNHILL: &[SlopeStop] = &[
    stop(0.25, RunDifficulty::Easy),
    stop(0.40, RunDifficulty::Intermediate),
    stop(0.70, RunDifficulty::Advanced),
    stop(f32::INFINITY, RunDifficulty::Expert),
];

// Japanese resorts rarely grade anything steeper than 45 degrees, so the table stays closed.
const JAPAN_DOWNHILL: &[SlopeStop] = &[
    stop(0.20, RunDifficulty::Easy),
    stop(0.35, RunDifficulty::Intermediate),
    stop(0.60, RunDifficulty::Advanced),
    stop(1.00, RunDifficulty::Expert),
];

const NORTH_AMERICA_DOWNHILL: &[SlopeStop] = &[
    stop(0.15, RunDifficulty::Novice),
    stop(0.25, RunDifficulty::Easy),
    stop(0.40, RunDifficulty::Intermediate),
    stop(0.60, RunDifficulty::Advanced),
    stop(f32::INFINITY, RunDifficulty::Expert),
];

impl DifficultyConvention {
    pub const ALL: [DifficultyConvention; 3] = [
        DifficultyConvention::Europe,
        DifficultyConvention::Japan,
        DifficultyConvention::NorthAmerica,
    ];

    /// Integer code used in GPU uniforms.
    pub fn code(self) -> u32 {
        match self {
            Self::Europe => 0,
            Self::Japan => 1,
            Self::NorthAmerica => 2,
        }
    }

    /// Run difficulty colour as used on piste maps of this region.
    pub fn color(self, difficulty: RunDifficulty) -> [u8; 3] {
        use RunDifficulty::*;

        const GREEN: [u8; 3] = [0x4c, 0xaf, 0x50];
        const BLUE: [u8; 3] = [0x1e, 0x6f, 0xd9];
        const RED: [u8; 3] = [0xe5, 0x39, 0x35];
        const BLACK: [u8; 3] = [0x21, 0x21, 0x21];
        const ORANGE: [u8; 3] = [0xff, 0x98, 0x00];

        match (self, difficulty) {
            (Self::Europe, Novice) => GREEN,
            (Self::Europe, Easy) => BLUE,
            (Self::Europe, Intermediate) => RED,
            (Self::Europe, Advanced) => BLACK,
            (Self::Japan, Novice | Easy) => GREEN,
            (Self::Japan, Intermediate) => RED,
            (Self::Japan, Advanced) => BLACK,
            (Self::NorthAmerica, Novice | Easy) => GREEN,
            (Self::NorthAmerica, Intermediate) => BLUE,
            (Self::NorthAmerica, Advanced) => BLACK,
            (_, Expert) => ORANGE,
        }
    }
}

/// Pick the difficulty convention for a geographic point.
pub fn convention_for_point(lat: f64, lon: f64) -> DifficultyConvention {
    if (15.0..=75.0).contains(&lat) && (-170.0..=-50.0).contains(&lon) {
        return DifficultyConvention::NorthAmerica;
    }
    if (24.0..=46.0).contains(&lat) && (122.0..=146.0).contains(&lon) {
        return DifficultyConvention::Japan;
    }
    DifficultyConvention::Europe
}

/// Ordered slope grading stops per convention.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingTables {
    pub europe: Vec<SlopeStop>,
    pub japan: Vec<SlopeStop>,
    pub north_america: Vec<SlopeStop>,
}

impl GradingTables {
    /// Downhill run grading, the only run use graded by slope.
    pub fn downhill() -> Self {
        Self {
            europe: EUROPE_DOWNHILL.to_vec(),
            japan: JAPAN_DOWNHILL.to_vec(),
            north_america: NORTH_AMERICA_DOWNHILL.to_vec(),
        }
    }

    pub fn stops(&self, convention: DifficultyConvention) -> &[SlopeStop] {
        match convention {
            DifficultyConvention::Europe => &self.europe,
            DifficultyConvention::Japan => &self.japan,
            DifficultyConvention::NorthAmerica => &self.north_america,
        }
    }

    /// Difficulty for a gradient, or `None` if it is steeper than a closed table allows.
    pub fn classify(&self, convention: DifficultyConvention, gradient: f32) -> Option<RunDifficulty> {
        let stops = self.stops(convention);
        let (last, finite) = stops.split_last()?;
        for stop in finite {
            if gradient <= stop.max_gradient {
                return Some(stop.difficulty);
            }
        }
        if last.max_gradient.is_infinite() || gradient <= last.max_gradient {
            Some(last.difficulty)
        } else {
            None
        }
    }
}
