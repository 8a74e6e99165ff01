//! WGSL source generation. Pure text: no GPU context is needed to build or
//! inspect a program's source.

use std::fmt::Write as _;

use slopemap_shared::colors::{ColorStop, rgb_to_unit};
use slopemap_shared::difficulty::{DifficultyConvention, GradingTables, SlopeStop};
use slopemap_shared::elevation::NO_DATA;
use slopemap_shared::shading::{
    ASPECT_COLORS, AVALANCHE_COLORS, EXPOSURE_NORMALIZER, HILLSHADE_ALTITUDE_DEG,
    HILLSHADE_AMBIENT, HILLSHADE_AZIMUTH_DEG, MIN_ASPECT_SLOPE_DEG, SHADOW_MAX_DISTANCE_M,
    SHADOW_STEP_GROWTH, SHADOW_STEP_M, SHADOW_TOLERANCE_M, SLOPE_RAMP, SUN_EXPOSURE_RAMP,
};
use slopemap_shared::style::VisualizationStyle;
use slopemap_shared::sun::{SAMPLE_HOURS, SAMPLES_PER_DAY};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

const VERTEX_WGSL: &str = r#"struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(position.x * 2.0 - 1.0, 1.0 - position.y * 2.0, 0.0, 1.0);
    out.uv = position;
    return out;
}
"#;

// Bindings and helpers shared by every fragment program. Must match `TerrainUniform`.
const FRAGMENT_PRELUDE: &str = r#"struct Params {
    zoom: f32,
    latitude: f32,
    longitude: f32,
    day_of_year: f32,
    tile_x: f32,
    tile_y: f32,
    tile_size: f32,
    border: f32,
    padded_size: f32,
    convention: u32,
    smooth_kernel: u32,
    has_coarse: u32,
    coarse_scale: f32,
    coarse_offset_x: f32,
    coarse_offset_y: f32,
    coarse_size: f32,
};

struct FragmentInput {
    @builtin(position) frag_coord: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var elevation: texture_2d<f32>;
@group(0) @binding(2) var elevation_sampler: sampler;
@group(0) @binding(3) var coarse_elevation: texture_2d<f32>;

const PI: f32 = 3.14159265;
const EARTH_RADIUS_M: f32 = 6378137.0;

fn is_no_data(h: f32) -> bool {
    return h <= NO_DATA;
}

fn output_to_padded(pixel: vec2<i32>) -> vec2<i32> {
    return pixel + vec2<i32>(i32(params.border));
}

fn padded_to_local(texel: vec2<f32>) -> vec2<f32> {
    return (texel - vec2<f32>(params.border)) / params.tile_size;
}

fn local_to_padded(uv: vec2<f32>) -> vec2<f32> {
    return vec2<f32>(params.border) + uv * params.tile_size;
}

fn kernel_sample(col: i32, row: i32, center: f32) -> f32 {
    let size = i32(params.padded_size);
    if (col < 0 || row < 0 || col >= size || row >= size) {
        return center;
    }
    let h = textureLoad(elevation, vec2<i32>(col, row), 0).r;
    if (is_no_data(h)) {
        return center;
    }
    return h;
}

// (dz/dx east, dz/ds south) in metres per metre.
fn gradient_at(col: i32, row: i32, center: f32, pixel_m: f32) -> vec2<f32> {
    var g = vec2<f32>(0.0);
    if (params.smooth_kernel != 0u) {
        var weights = array<f32, 5>(1.0, 4.0, 6.0, 4.0, 1.0);
        var deriv = array<f32, 5>(-1.0, -2.0, 0.0, 2.0, 1.0);
        for (var j = 0; j < 5; j += 1) {
            for (var i = 0; i < 5; i += 1) {
                let h = kernel_sample(col + i - 2, row + j - 2, center);
                g.x += weights[j] * deriv[i] * h;
                g.y += deriv[j] * weights[i] * h;
            }
        }
        return g / (128.0 * pixel_m);
    }
    var weights3 = array<f32, 3>(1.0, 2.0, 1.0);
    var deriv3 = array<f32, 3>(-1.0, 0.0, 1.0);
    for (var j = 0; j < 3; j += 1) {
        for (var i = 0; i < 3; i += 1) {
            let h = kernel_sample(col + i - 1, row + j - 1, center);
            g.x += weights3[j] * deriv3[i] * h;
            g.y += deriv3[j] * weights3[i] * h;
        }
    }
    return g / (8.0 * pixel_m);
}

fn slope_degrees(g: vec2<f32>) -> f32 {
    return degrees(atan(length(g)));
}

fn surface_normal(g: vec2<f32>) -> vec3<f32> {
    return normalize(vec3<f32>(-g.x, g.y, 1.0));
}

fn light_direction(altitude: f32, azimuth: f32) -> vec3<f32> {
    return vec3<f32>(cos(altitude) * sin(azimuth), cos(altitude) * cos(azimuth), sin(altitude));
}

fn hillshade(g: vec2<f32>) -> f32 {
    let altitude = radians(HILLSHADE_ALTITUDE_DEG);
    let light = light_direction(altitude, radians(HILLSHADE_AZIMUTH_DEG));
    let lit = clamp(dot(surface_normal(g), light) / sin(altitude), 0.0, 1.0);
    return HILLSHADE_AMBIENT + (1.0 - HILLSHADE_AMBIENT) * lit;
}
"#;

const FRAGMENT_MAIN: &str = r#"
@fragment
fn fs_main(input: FragmentInput) -> @location(0) vec4<f32> {
    let texel = output_to_padded(vec2<i32>(floor(input.frag_coord.xy)));
    let h0 = textureLoad(elevation, texel, 0).r;
    if (is_no_data(h0)) {
        return vec4<f32>(0.0);
    }
    let pixel_m = cos(radians(params.latitude)) * 2.0 * PI * EARTH_RADIUS_M
        / (params.tile_size * exp2(params.zoom));
    let g = gradient_at(texel.x, texel.y, h0, pixel_m);
    let local = padded_to_local(vec2<f32>(texel) + vec2<f32>(0.5));
    let color = style_color(g, local, h0, pixel_m);
"#;

const SUN_EXPOSURE_WGSL: &str = r#"
fn declination(day: f32) -> f32 {
    let gamma = 2.0 * PI * (day - 1.0) / 365.0;
    return 0.006918 - 0.399912 * cos(gamma) + 0.070257 * sin(gamma)
        - 0.006758 * cos(2.0 * gamma) + 0.000907 * sin(2.0 * gamma)
        - 0.002697 * cos(3.0 * gamma) + 0.00148 * sin(3.0 * gamma);
}

// (altitude, azimuth) in radians, azimuth clockwise from north.
fn sun_position(lat: f32, decl: f32, hour: f32) -> vec2<f32> {
    let omega = radians((hour - 12.0) * 15.0);
    let sin_alt = sin(lat) * sin(decl) + cos(lat) * cos(decl) * cos(omega);
    let altitude = asin(clamp(sin_alt, -1.0, 1.0));
    let denom = cos(lat) * cos(altitude);
    var cos_az = select(1.0, -1.0, lat >= 0.0);
    if (abs(denom) >= 1e-6) {
        cos_az = clamp((sin(decl) - sin(lat) * sin_alt) / denom, -1.0, 1.0);
    }
    var azimuth = acos(cos_az);
    if (omega > 0.0) {
        azimuth = 2.0 * PI - azimuth;
    }
    return vec2<f32>(altitude, azimuth);
}

// (height, state): state 0 = outside all data, 1 = no data, 2 = valid.
// Lookups hit texel centres, so linear and nearest filtering both return the texel itself.
fn terrain_sample(uv: vec2<f32>) -> vec2<f32> {
    let fine = floor(local_to_padded(uv));
    if (all(fine >= vec2<f32>(0.0)) && all(fine < vec2<f32>(params.padded_size))) {
        let at = (fine + vec2<f32>(0.5)) / params.padded_size;
        let h = textureSampleLevel(elevation, elevation_sampler, at, 0.0).r;
        return vec2<f32>(h, select(2.0, 1.0, is_no_data(h)));
    }
    if (params.has_coarse == 0u) {
        return vec2<f32>(0.0);
    }
    let coarse_uv = vec2<f32>(params.coarse_offset_x, params.coarse_offset_y) + uv * params.coarse_scale;
    if (any(coarse_uv < vec2<f32>(0.0)) || any(coarse_uv >= vec2<f32>(1.0))) {
        return vec2<f32>(0.0);
    }
    let coarse = floor(coarse_uv * params.coarse_size);
    let at = (coarse + vec2<f32>(0.5)) / params.coarse_size;
    let h = textureSampleLevel(coarse_elevation, elevation_sampler, at, 0.0).r;
    return vec2<f32>(h, select(2.0, 1.0, is_no_data(h)));
}

fn is_shadowed(origin: vec2<f32>, h0: f32, sun: vec2<f32>, tile_m: f32) -> bool {
    let dir = vec2<f32>(sin(sun.y), -cos(sun.y));
    let tan_alt = tan(sun.x);
    var stride = SHADOW_STEP_M;
    var dist = SHADOW_STEP_M;
    while (dist <= SHADOW_MAX_DISTANCE_M) {
        let probe = terrain_sample(origin + dir * (dist / tile_m));
        if (probe.y < 0.5) {
            return false;
        }
        if (probe.y > 1.5 && probe.x > h0 + dist * tan_alt + SHADOW_TOLERANCE_M) {
            return true;
        }
        stride = stride * SHADOW_STEP_GROWTH;
        dist = dist + stride;
    }
    return false;
}

fn sun_exposure_score(origin: vec2<f32>, h0: f32, g: vec2<f32>, tile_m: f32) -> f32 {
    let lat = radians(params.latitude);
    let decl = declination(params.day_of_year);
    let normal = surface_normal(g);
    var total = 0.0;
    for (var i = 0; i < SAMPLES_PER_DAY; i += 1) {
        let hour = f32(i) * SAMPLE_HOURS + SAMPLE_HOURS * 0.5;
        let sun = sun_position(lat, decl, hour);
        if (sun.x <= 0.0) {
            continue;
        }
        let incidence = dot(normal, light_direction(sun.x, sun.y));
        if (incidence <= 0.0) {
            continue;
        }
        if (is_shadowed(origin, h0, sun, tile_m)) {
            continue;
        }
        total += incidence * SAMPLE_HOURS;
    }
    return clamp(total / EXPOSURE_NORMALIZER, 0.0, 1.0);
}
"#;

/// Shared vertex stage: full-screen quad position and texture coordinate pass-through.
pub fn vertex_source() -> &'static str {
    VERTEX_WGSL
}

/// Complete fragment program for `style`.
pub fn fragment_source(style: VisualizationStyle, tables: &GradingTables) -> String {
    let mut src = String::with_capacity(16 * 1024);
    src.push_str(&constants());
    src.push_str(FRAGMENT_PRELUDE);

    match style {
        VisualizationStyle::Slope => {
            src.push_str(&ramp_function("slope_ramp", &SLOPE_RAMP));
            src.push_str(
                r#"
fn style_color(g: vec2<f32>, local: vec2<f32>, h0: f32, pixel_m: f32) -> vec4<f32> {
    return vec4<f32>(slope_ramp(slope_degrees(g)), 1.0);
}
"#,
            );
        }
        VisualizationStyle::DownhillDifficulty => {
            src.push_str(&difficulty_functions(tables));
            src.push_str(
                r#"
fn style_color(g: vec2<f32>, local: vec2<f32>, h0: f32, pixel_m: f32) -> vec4<f32> {
    return difficulty_color(length(g));
}
"#,
            );
        }
        VisualizationStyle::Aspect => {
            src.push_str(&aspect_functions());
            src.push_str(
                r#"
fn style_color(g: vec2<f32>, local: vec2<f32>, h0: f32, pixel_m: f32) -> vec4<f32> {
    if (slope_degrees(g) < MIN_ASPECT_SLOPE_DEG) {
        return vec4<f32>(0.0);
    }
    var azimuth = degrees(atan2(-g.x, g.y));
    if (azimuth < 0.0) {
        azimuth += 360.0;
    }
    return vec4<f32>(aspect_color(azimuth), 1.0);
}
"#,
            );
        }
        VisualizationStyle::SunExposure => {
            src.push_str(SUN_EXPOSURE_WGSL);
            src.push_str(&ramp_function("sun_ramp", &SUN_EXPOSURE_RAMP));
            src.push_str(
                r#"
fn style_color(g: vec2<f32>, local: vec2<f32>, h0: f32, pixel_m: f32) -> vec4<f32> {
    let score = sun_exposure_score(local, h0, g, pixel_m * params.tile_size);
    return vec4<f32>(sun_ramp(score), 1.0);
}
"#,
            );
        }
        VisualizationStyle::AvalancheSlopeClasses => {
            src.push_str(&avalanche_function());
            src.push_str(
                r#"
fn style_color(g: vec2<f32>, local: vec2<f32>, h0: f32, pixel_m: f32) -> vec4<f32> {
    return avalanche_color(slope_degrees(g));
}
"#,
            );
        }
    }

    src.push_str(FRAGMENT_MAIN);
    if style.uses_hillshade() {
        src.push_str(
            "    if (color.a == 0.0) {\n        return color;\n    }\n    return vec4<f32>(color.rgb * hillshade(g), color.a);\n}\n",
        );
    } else {
        src.push_str("    return color;\n}\n");
    }
    src
}

/// WGSL float literal. Debug formatting always keeps a decimal point or exponent.
fn float(value: f32) -> String {
    format!("{value:?}")
}

fn vec3(rgb: [u8; 3]) -> String {
    let [r, g, b] = rgb_to_unit(rgb);
    format!("vec3<f32>({}, {}, {})", float(r), float(g), float(b))
}

fn constants() -> String {
    let mut out = String::new();
    let floats = [
        ("NO_DATA", NO_DATA),
        ("HILLSHADE_AZIMUTH_DEG", HILLSHADE_AZIMUTH_DEG),
        ("HILLSHADE_ALTITUDE_DEG", HILLSHADE_ALTITUDE_DEG),
        ("HILLSHADE_AMBIENT", HILLSHADE_AMBIENT),
        ("MIN_ASPECT_SLOPE_DEG", MIN_ASPECT_SLOPE_DEG),
        ("SHADOW_STEP_M", SHADOW_STEP_M),
        ("SHADOW_STEP_GROWTH", SHADOW_STEP_GROWTH),
        ("SHADOW_MAX_DISTANCE_M", SHADOW_MAX_DISTANCE_M),
        ("SHADOW_TOLERANCE_M", SHADOW_TOLERANCE_M),
        ("EXPOSURE_NORMALIZER", EXPOSURE_NORMALIZER),
        ("SAMPLE_HOURS", SAMPLE_HOURS),
    ];
    for (name, value) in floats {
        let _ = writeln!(out, "const {name}: f32 = {};", float(value));
    }
    let _ = writeln!(out, "const SAMPLES_PER_DAY: i32 = {SAMPLES_PER_DAY};");
    out.push('\n');
    out
}

/// Piecewise-linear ramp over `stops`, clamped at both ends.
fn ramp_function(name: &str, stops: &[ColorStop]) -> String {
    let mut out = format!("\nfn {name}(value: f32) -> vec3<f32> {{\n");
    if let Some(first) = stops.first() {
        let _ = writeln!(
            out,
            "    if (value <= {}) {{\n        return {};\n    }}",
            float(first.at),
            vec3(first.rgb)
        );
    }
    for pair in stops.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        let _ = writeln!(
            out,
            "    if (value <= {hi_at}) {{\n        return mix({lo_rgb}, {hi_rgb}, (value - {lo_at}) / {span});\n    }}",
            hi_at = float(hi.at),
            lo_rgb = vec3(lo.rgb),
            hi_rgb = vec3(hi.rgb),
            lo_at = float(lo.at),
            span = float(hi.at - lo.at),
        );
    }
    let last = stops.last().map_or([0, 0, 0], |stop| stop.rgb);
    let _ = writeln!(out, "    return {};\n}}", vec3(last));
    out
}

fn convention_fn_name(convention: DifficultyConvention) -> &'static str {
    match convention {
        DifficultyConvention::Europe => "difficulty_europe",
        DifficultyConvention::Japan => "difficulty_japan",
        DifficultyConvention::NorthAmerica => "difficulty_north_america",
    }
}

/// Threshold chain for one convention's grading stops.
///
/// An infinite final stop catches every steeper gradient; a finite final stop
/// leaves steeper gradients transparent.
pub fn difficulty_chain(convention: DifficultyConvention, stops: &[SlopeStop]) -> String {
    let mut out = format!(
        "\nfn {}(gradient: f32) -> vec4<f32> {{\n",
        convention_fn_name(convention)
    );
    let color = |stop: &SlopeStop| format!("vec4<f32>({}, 1.0)", vec3(convention.color(stop.difficulty)));

    match stops.split_last() {
        Some((last, finite)) => {
            for stop in finite {
                let _ = writeln!(
                    out,
                    "    if (gradient <= {}) {{\n        return {};\n    }}",
                    float(stop.max_gradient),
                    color(stop)
                );
            }
            if last.max_gradient.is_infinite() {
                let _ = writeln!(out, "    return {};", color(last));
            } else {
                let _ = writeln!(
                    out,
                    "    if (gradient <= {}) {{\n        return {};\n    }}\n    return vec4<f32>(0.0);",
                    float(last.max_gradient),
                    color(last)
                );
            }
        }
        None => out.push_str("    return vec4<f32>(0.0);\n"),
    }
    out.push_str("}\n");
    out
}

fn difficulty_functions(tables: &GradingTables) -> String {
    let mut out = String::new();
    for convention in DifficultyConvention::ALL {
        out.push_str(&difficulty_chain(convention, tables.stops(convention)));
    }
    out.push_str("\nfn difficulty_color(gradient: f32) -> vec4<f32> {\n    switch params.convention {\n");
    for convention in DifficultyConvention::ALL {
        if convention == DifficultyConvention::Europe {
            continue;
        }
        let _ = writeln!(
            out,
            "        case {}u: {{\n            return {}(gradient);\n        }}",
            convention.code(),
            convention_fn_name(convention)
        );
    }
    let _ = writeln!(
        out,
        "        default: {{\n            return {}(gradient);\n        }}\n    }}\n}}",
        convention_fn_name(DifficultyConvention::Europe)
    );
    out
}

fn aspect_functions() -> String {
    let palette: Vec<String> = ASPECT_COLORS.iter().map(|rgb| vec3(*rgb)).collect();
    format!(
        r#"
fn aspect_color(azimuth_deg: f32) -> vec3<f32> {{
    var palette = array<vec3<f32>, 8>(
        {}
    );
    var az = azimuth_deg;
    if (params.latitude < 0.0) {{
        az = 180.0 - az;
    }}
    let wrapped = az - 360.0 * floor(az / 360.0);
    let position = wrapped / 45.0;
    let lower = u32(floor(position)) % 8u;
    let upper = (lower + 1u) % 8u;
    return mix(palette[lower], palette[upper], smoothstep(0.0, 1.0, fract(position)));
}}
"#,
        palette.join(",\n        ")
    )
}

fn avalanche_function() -> String {
    let [yellow, orange, red, violet] = AVALANCHE_COLORS.map(vec3);
    format!(
        r#"
fn avalanche_color(slope_deg: f32) -> vec4<f32> {{
    if (slope_deg < 30.0) {{
        return vec4<f32>(0.0);
    }}
    if (slope_deg < 35.0) {{
        return vec4<f32>({yellow}, 1.0);
    }}
    if (slope_deg < 40.0) {{
        return vec4<f32>({orange}, 1.0);
    }}
    if (slope_deg <= 45.0) {{
        return vec4<f32>({red}, 1.0);
    }}
    return vec4<f32>({violet}, 1.0);
}}
"#
    )
}
