//! Solar geometry for the daily exposure integration.

use std::f32::consts::PI;

use chrono::{Datelike, Utc};

/// Half-hour samples across one solar day.
pub const SAMPLES_PER_DAY: usize = 48;

/// Duration each sample stands for, in hours.
pub const SAMPLE_HOURS: f32 = 0.5;

/// Solar position in radians. Azimuth is measured clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunPosition {
    pub altitude: f32,
    pub azimuth: f32,
}

impl SunPosition {
    pub fn is_above_horizon(&self) -> bool {
        self.altitude > 0.0
    }

    /// Unit vector toward the sun in (east, north, up).
    pub fn direction(&self) -> [f32; 3] {
        let (sin_alt, cos_alt) = self.altitude.sin_cos();
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        [cos_alt * sin_az, cos_alt * cos_az, sin_alt]
    }

    /// Horizontal step toward the sun in tile-local axes (x east, y south).
    pub fn local_step(&self) -> (f32, f32) {
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        (sin_az, -cos_az)
    }
}

/// Solar declination in radians (Spencer 1971).
pub fn declination(day_of_year: u16) -> f32 {
    let gamma = 2.0 * PI * (f32::from(day_of_year) - 1.0) / 365.0;
    0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin() - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin()
}

/// Sun position at local solar time `hour` for a latitude in degrees.
pub fn sun_position(lat_deg: f32, declination: f32, hour: f32) -> SunPosition {
    let lat = lat_deg.to_radians();
    let omega = (hour - 12.0) * 15f32.to_radians();
    let sin_alt = lat.sin() * declination.sin() + lat.cos() * declination.cos() * omega.cos();
    let altitude = sin_alt.clamp(-1.0, 1.0).asin();

    let denom = lat.cos() * altitude.cos();
    let cos_az = if denom.abs() < 1e-6 {
        // Sun at the zenith or observer at a pole.
        if lat >= 0.0 { -1.0 } else { 1.0 }
    } else {
        ((declination.sin() - lat.sin() * sin_alt) / denom).clamp(-1.0, 1.0)
    };
    let azimuth = if omega > 0.0 {
        2.0 * PI - cos_az.acos()
    } else {
        cos_az.acos()
    };

    SunPosition { altitude, azimuth }
}

/// Local solar time (hours) of sample `index`, taken at the middle of its half hour.
pub fn sample_hour(index: usize) -> f32 {
    index as f32 * SAMPLE_HOURS + SAMPLE_HOURS / 2.0
}

/// The day's sun positions at every sample, including those below the horizon.
pub fn daily_positions(lat_deg: f32, day_of_year: u16) -> [SunPosition; SAMPLES_PER_DAY] {
    let decl = declination(day_of_year);
    std::array::from_fn(|i| sun_position(lat_deg, decl, sample_hour(i)))
}

/// Current UTC day of year (1..=366).
pub fn today_day_of_year() -> u16 {
    Utc::now().ordinal() as u16
}
