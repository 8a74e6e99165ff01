//! Per-pixel terrain classification on the CPU.
//!
//! These functions mirror the WGSL fragment programs step for step: the GPU
//! renderer emits the same constants, kernels and colour rules. They back the
//! unit tests of the shading rules and the CPU fallback renderer.

use crate::colors::{ColorStop, Rgba, TRANSPARENT, lerp_rgb, opaque, sample_ramp, shade};
use crate::difficulty::{DifficultyConvention, GradingTables};
use crate::elevation::is_no_data;
use crate::padding::PaddedElevationBuffer;
use crate::style::VisualizationStyle;
use crate::sun::{SAMPLE_HOURS, SunPosition, daily_positions};
use crate::tile::{CoarseMapping, local_to_padded, output_to_padded, padded_to_local, pixel_size_m};

/// Zoom from which the smoothed 5x5 gradient kernel replaces the 3x3 Sobel kernel.
pub const SMOOTH_KERNEL_MIN_ZOOM: u8 = 13;

/// Slopes flatter than this have no meaningful aspect.
pub const MIN_ASPECT_SLOPE_DEG: f32 = 5.0;

pub const HILLSHADE_AZIMUTH_DEG: f32 = 315.0;
pub const HILLSHADE_ALTITUDE_DEG: f32 = 45.0;
/// Brightness of a face turned fully away from the hillshade light.
pub const HILLSHADE_AMBIENT: f32 = 0.55;

/// First ray-march step toward the sun.
pub const SHADOW_STEP_M: f32 = 50.0;
/// Each step is this much longer than the previous one.
pub const SHADOW_STEP_GROWTH: f32 = 1.05;
pub const SHADOW_MAX_DISTANCE_M: f32 = 50_000.0;
/// Terrain must rise this far above the ray to cast a shadow.
pub const SHADOW_TOLERANCE_M: f32 = 1.0;

/// Empirical maximum of the daily weighted exposure sum.
pub const EXPOSURE_NORMALIZER: f32 = 6.0;

pub const SLOPE_RAMP: [ColorStop; 5] = [
    ColorStop::new(0.0, [0x4c, 0xaf, 0x50]),
    ColorStop::new(20.0, [0xff, 0xeb, 0x3b]),
    ColorStop::new(30.0, [0xff, 0x98, 0x00]),
    ColorStop::new(45.0, [0xe5, 0x39, 0x35]),
    ColorStop::new(60.0, [0x7f, 0x00, 0x00]),
];

pub const SUN_EXPOSURE_RAMP: [ColorStop; 6] = [
    ColorStop::new(0.0, [0x2c, 0x3e, 0x9c]),
    ColorStop::new(0.2, [0x21, 0x91, 0x8c]),
    ColorStop::new(0.4, [0x4c, 0xaf, 0x50]),
    ColorStop::new(0.6, [0xff, 0xeb, 0x3b]),
    ColorStop::new(0.8, [0xff, 0x98, 0x00]),
    ColorStop::new(1.0, [0xe5, 0x39, 0x35]),
];

/// Avalanche terrain colours: 30-35, 35-40, 40-45 and above 45 degrees.
pub const AVALANCHE_COLORS: [[u8; 3]; 4] = [
    [0xff, 0xeb, 0x3b],
    [0xff, 0x98, 0x00],
    [0xe5, 0x39, 0x35],
    [0x8e, 0x24, 0xaa],
];

/// Winter sun palette per aspect octant (N, NE, E, SE, S, SW, W, NW), northern hemisphere.
pub const ASPECT_COLORS: [[u8; 3]; 8] = [
    [0x2c, 0x3e, 0x9c],
    [0x3f, 0x7f, 0xd4],
    [0x7c, 0xc4, 0xa0],
    [0xf2, 0xc0, 0x3a],
    [0xe8, 0x5a, 0x2a],
    [0xf0, 0x90, 0x30],
    [0x9c, 0xc8, 0x60],
    [0x5c, 0x90, 0xc8],
];

/// Everything the per-pixel rules need besides the elevation data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRenderParams {
    pub zoom: u8,
    pub tile_x: u32,
    pub tile_y: u32,
    pub lat: f64,
    pub lon: f64,
    pub style: VisualizationStyle,
    pub day_of_year: u16,
}

impl TileRenderParams {
    pub fn convention(&self) -> DifficultyConvention {
        crate::difficulty::convention_for_point(self.lat, self.lon)
    }

    pub fn uses_smooth_kernel(&self) -> bool {
        self.zoom >= SMOOTH_KERNEL_MIN_ZOOM
    }
}

/// Straight RGBA8 raster, row-major, north row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTile {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl RenderedTile {
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }

    pub fn is_fully_transparent(&self) -> bool {
        self.rgba.chunks_exact(4).all(|px| px[3] == 0)
    }
}

/// Elevation derivatives in metres per metre. `dzdx` grows eastward, `dzds` southward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gradient {
    pub dzdx: f32,
    pub dzds: f32,
}

impl Gradient {
    /// Rise over run of the steepest direction.
    pub fn magnitude(&self) -> f32 {
        self.dzdx.hypot(self.dzds)
    }

    pub fn slope_degrees(&self) -> f32 {
        self.magnitude().atan().to_degrees()
    }

    /// Downhill azimuth in degrees, clockwise from north, in `0..360`.
    pub fn aspect_degrees(&self) -> f32 {
        let az = (-self.dzdx).atan2(self.dzds).to_degrees();
        if az < 0.0 { az + 360.0 } else { az }
    }

    /// Unit surface normal in (east, north, up).
    pub fn normal(&self) -> [f32; 3] {
        let n = [-self.dzdx, self.dzds, 1.0];
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        [n[0] / len, n[1] / len, n[2] / len]
    }
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Height at a kernel offset from (`col`, `row`), substituting `center` for missing samples.
fn kernel_sample(buffer: &PaddedElevationBuffer, col: usize, row: usize, dx: isize, dy: isize, center: f32) -> f32 {
    let c = col as isize + dx;
    let r = row as isize + dy;
    if c < 0 || r < 0 || c >= buffer.size as isize || r >= buffer.size as isize {
        return center;
    }
    let h = buffer.get(c as usize, r as usize);
    if is_no_data(h) { center } else { h }
}

/// 3x3 Sobel gradient at padded texel (`col`, `row`).
pub fn sobel_gradient(buffer: &PaddedElevationBuffer, col: usize, row: usize, pixel_m: f32) -> Gradient {
    const SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];
    const DERIV: [f32; 3] = [-1.0, 0.0, 1.0];
    kernel_gradient(buffer, col, row, pixel_m, &SMOOTH, &DERIV, 8.0)
}

/// 5x5 smoothed derivative gradient used at high zoom where DEM noise dominates.
pub fn smooth_gradient(buffer: &PaddedElevationBuffer, col: usize, row: usize, pixel_m: f32) -> Gradient {
    const SMOOTH: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];
    const DERIV: [f32; 5] = [-1.0, -2.0, 0.0, 2.0, 1.0];
    kernel_gradient(buffer, col, row, pixel_m, &SMOOTH, &DERIV, 16.0 * 8.0)
}

fn kernel_gradient(
    buffer: &PaddedElevationBuffer,
    col: usize,
    row: usize,
    pixel_m: f32,
    smooth: &[f32],
    deriv: &[f32],
    norm: f32,
) -> Gradient {
    let center = buffer.get(col, row);
    let half = (smooth.len() / 2) as isize;
    let (mut gx, mut gs) = (0.0, 0.0);
    for (j, dy) in (-half..=half).enumerate() {
        for (i, dx) in (-half..=half).enumerate() {
            let h = kernel_sample(buffer, col, row, dx, dy, center);
            gx += smooth[j] * deriv[i] * h;
            gs += deriv[j] * smooth[i] * h;
        }
    }
    let scale = norm * pixel_m;
    Gradient {
        dzdx: gx / scale,
        dzds: gs / scale,
    }
}

/// Compass octant (0 = N, 2 = E, 4 = S, 6 = W) nearest to an azimuth in degrees.
pub fn aspect_octant(azimuth_deg: f32) -> usize {
    ((azimuth_deg.rem_euclid(360.0) / 45.0).round() as usize) % 8
}

/// Winter sun colour for a downhill azimuth, blended smoothly between adjacent octants.
pub fn aspect_color(azimuth_deg: f32, lat: f64) -> [u8; 3] {
    // South-facing is warmest in the north; mirror north/south below the equator.
    let az = if lat < 0.0 { 180.0 - azimuth_deg } else { azimuth_deg };
    let position = az.rem_euclid(360.0) / 45.0;
    let lower = position.floor() as usize % 8;
    let upper = (lower + 1) % 8;
    lerp_rgb(ASPECT_COLORS[lower], ASPECT_COLORS[upper], smoothstep(position.fract()))
}

pub fn slope_color(slope_deg: f32) -> Rgba {
    opaque(sample_ramp(&SLOPE_RAMP, slope_deg))
}

pub fn avalanche_color(slope_deg: f32) -> Rgba {
    let band = if slope_deg < 30.0 {
        return TRANSPARENT;
    } else if slope_deg < 35.0 {
        0
    } else if slope_deg < 40.0 {
        1
    } else if slope_deg <= 45.0 {
        2
    } else {
        3
    };
    opaque(AVALANCHE_COLORS[band])
}

pub fn difficulty_color(tables: &GradingTables, convention: DifficultyConvention, gradient: f32) -> Rgba {
    tables
        .classify(convention, gradient)
        .map_or(TRANSPARENT, |difficulty| opaque(convention.color(difficulty)))
}

pub fn sun_exposure_color(score: f32) -> Rgba {
    opaque(sample_ramp(&SUN_EXPOSURE_RAMP, score))
}

/// Multiplicative hillshade factor in `HILLSHADE_AMBIENT..=1`.
pub fn hillshade(gradient: &Gradient) -> f32 {
    let light = SunPosition {
        altitude: HILLSHADE_ALTITUDE_DEG.to_radians(),
        azimuth: HILLSHADE_AZIMUTH_DEG.to_radians(),
    };
    let lit = dot(gradient.normal(), light.direction()) / light.altitude.sin();
    HILLSHADE_AMBIENT + (1.0 - HILLSHADE_AMBIENT) * lit.clamp(0.0, 1.0)
}

/// A texel of the centre tile being shaded, in tile-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub u: f32,
    pub v: f32,
    pub height: f32,
    pub gradient: Gradient,
}

/// Elevation lookups for shadow rays: the fine padded buffer first, then the coarse context.
pub struct TerrainSampler<'a> {
    pub fine: &'a PaddedElevationBuffer,
    pub coarse: Option<(&'a PaddedElevationBuffer, CoarseMapping)>,
}

impl TerrainSampler<'_> {
    /// Height at tile-local (`u`, `v`). `None` for no-data texels and outside all data.
    pub fn height_at(&self, u: f32, v: f32) -> Option<f32> {
        let (buffer, col, row) = self.locate(u, v)?;
        let h = buffer.get(col, row);
        (!is_no_data(h)).then_some(h)
    }

    /// Whether (`u`, `v`) falls inside either buffer.
    pub fn covers(&self, u: f32, v: f32) -> bool {
        self.locate(u, v).is_some()
    }

    fn locate(&self, u: f32, v: f32) -> Option<(&PaddedElevationBuffer, usize, usize)> {
        let fine = self.fine;
        let (col, row) = local_to_padded(fine.kind, fine.tile_size, f64::from(u), f64::from(v));
        if let Some((col, row)) = nearest_texel(fine, col, row) {
            return Some((fine, col, row));
        }
        let (coarse, mapping) = self.coarse.as_ref()?;
        let (cu, cv) = mapping.apply(f64::from(u), f64::from(v));
        let size = coarse.size as f64;
        let (col, row) = nearest_texel(coarse, cu * size, cv * size)?;
        Some((*coarse, col, row))
    }
}

/// Texel containing the padded-space position (`col`, `row`), if inside the buffer.
fn nearest_texel(buffer: &PaddedElevationBuffer, col: f64, row: f64) -> Option<(usize, usize)> {
    let (col, row) = (col.floor(), row.floor());
    let size = buffer.size as f64;
    if col < 0.0 || row < 0.0 || col >= size || row >= size {
        return None;
    }
    Some((col as usize, row as usize))
}

/// Whether terrain between the point and the sun rises above the sun ray.
pub fn is_shadowed(sampler: &TerrainSampler<'_>, point: &SurfacePoint, sun: &SunPosition, tile_m: f32) -> bool {
    let (sx, sy) = sun.local_step();
    let tan_alt = sun.altitude.tan();
    let mut step = SHADOW_STEP_M;
    let mut dist = SHADOW_STEP_M;
    while dist <= SHADOW_MAX_DISTANCE_M {
        let u = point.u + sx * dist / tile_m;
        let v = point.v + sy * dist / tile_m;
        if !sampler.covers(u, v) {
            return false;
        }
        if let Some(h) = sampler.height_at(u, v)
            && h > point.height + dist * tan_alt + SHADOW_TOLERANCE_M
        {
            return true;
        }
        step *= SHADOW_STEP_GROWTH;
        dist += step;
    }
    false
}

/// Normalised daily direct-sun score in `0..=1`.
pub fn sun_exposure_score(
    sampler: &TerrainSampler<'_>,
    point: &SurfacePoint,
    lat: f64,
    day_of_year: u16,
    tile_m: f32,
) -> f32 {
    let normal = point.gradient.normal();
    let mut total = 0.0;
    for sun in daily_positions(lat as f32, day_of_year) {
        if !sun.is_above_horizon() {
            continue;
        }
        let incidence = dot(normal, sun.direction());
        if incidence <= 0.0 || is_shadowed(sampler, point, &sun, tile_m) {
            continue;
        }
        total += incidence * SAMPLE_HOURS;
    }
    (total / EXPOSURE_NORMALIZER).clamp(0.0, 1.0)
}

/// Shade one output pixel (`px`, `py`) of the centre tile.
pub fn shade_pixel(
    sampler: &TerrainSampler<'_>,
    params: &TileRenderParams,
    tables: &GradingTables,
    px: usize,
    py: usize,
) -> Rgba {
    let fine = sampler.fine;
    let (col, row) = output_to_padded(fine.kind, fine.tile_size, px, py);
    let h0 = fine.get(col, row);
    if is_no_data(h0) {
        return TRANSPARENT;
    }

    let tile_size = fine.tile_size as f32;
    let pixel_m = pixel_size_m(f64::from(params.zoom), params.lat, f64::from(tile_size)) as f32;
    let gradient = if params.uses_smooth_kernel() {
        smooth_gradient(fine, col, row, pixel_m)
    } else {
        sobel_gradient(fine, col, row, pixel_m)
    };
    let slope_deg = gradient.slope_degrees();

    let color = match params.style {
        VisualizationStyle::Slope => slope_color(slope_deg),
        VisualizationStyle::DownhillDifficulty => {
            difficulty_color(tables, params.convention(), gradient.magnitude())
        }
        VisualizationStyle::AvalancheSlopeClasses => avalanche_color(slope_deg),
        VisualizationStyle::Aspect => {
            if slope_deg < MIN_ASPECT_SLOPE_DEG {
                TRANSPARENT
            } else {
                opaque(aspect_color(gradient.aspect_degrees(), params.lat))
            }
        }
        VisualizationStyle::SunExposure => {
            let (u, v) = padded_to_local(fine.kind, fine.tile_size, col as f64 + 0.5, row as f64 + 0.5);
            let point = SurfacePoint {
                u: u as f32,
                v: v as f32,
                height: h0,
                gradient,
            };
            let score = sun_exposure_score(
                sampler,
                &point,
                params.lat,
                params.day_of_year,
                pixel_m * tile_size,
            );
            sun_exposure_color(score)
        }
    };

    if color[3] == 0 || !params.style.uses_hillshade() {
        return color;
    }
    shade(color, hillshade(&gradient))
}

/// Render the whole centre tile on the CPU.
pub fn shade_tile(
    padded: &PaddedElevationBuffer,
    params: &TileRenderParams,
    coarse: Option<&PaddedElevationBuffer>,
    tables: &GradingTables,
) -> RenderedTile {
    let tile = crate::tile::TileCoord {
        z: params.zoom,
        x: params.tile_x,
        y: params.tile_y,
    };
    let coarse = match (params.style.casts_shadows(), coarse) {
        (true, Some(buffer)) => CoarseMapping::for_tile(tile).map(|mapping| (buffer, mapping)),
        _ => None,
    };
    let sampler = TerrainSampler {
        fine: padded,
        coarse,
    };

    let size = padded.output_size();
    let mut out = RenderedTile::transparent(size as u32, size as u32);
    for py in 0..size {
        for px in 0..size {
            let color = shade_pixel(&sampler, params, tables, px, py);
            let i = (py * size + px) * 4;
            out.rgba[i..i + 4].copy_from_slice(&color);
        }
    }
    out
}
