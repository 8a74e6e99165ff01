/// Straight (non-premultiplied) 8-bit RGBA colour.
pub type Rgba = [u8; 4];

pub const TRANSPARENT: Rgba = [0, 0, 0, 0];

/// A colour ramp stop: position on the ramp axis and its RGB value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub at: f32,
    pub rgb: [u8; 3],
}

impl ColorStop {
    pub const fn new(at: f32, rgb: [u8; 3]) -> Self {
        Self { at, rgb }
    }
}

/// Convert an RGB byte triple to normalised floats for shader literals.
pub fn rgb_to_unit(rgb: [u8; 3]) -> [f32; 3] {
    [
        rgb[0] as f32 / 255.0,
        rgb[1] as f32 / 255.0,
        rgb[2] as f32 / 255.0,
    ]
}

/// Linear blend of two RGB colours, `t` clamped to `0..=1`.
pub fn lerp_rgb(from: [u8; 3], to: [u8; 3], t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
    [mix(from[0], to[0]), mix(from[1], to[1]), mix(from[2], to[2])]
}

/// Sample a piecewise-linear ramp. Values outside the stop range clamp to the end colours.
pub fn sample_ramp(stops: &[ColorStop], value: f32) -> [u8; 3] {
    let Some(first) = stops.first() else {
        return [0, 0, 0];
    };
    if value <= first.at {
        return first.rgb;
    }
    for pair in stops.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if value <= hi.at {
            let span = hi.at - lo.at;
            let t = if span > 0.0 { (value - lo.at) / span } else { 1.0 };
            return lerp_rgb(lo.rgb, hi.rgb, t);
        }
    }
    stops[stops.len() - 1].rgb
}

/// Multiply the colour channels by `factor`, keeping alpha.
pub fn shade(color: Rgba, factor: f32) -> Rgba {
    let factor = factor.clamp(0.0, 1.0);
    let scale = |c: u8| (c as f32 * factor).round() as u8;
    [scale(color[0]), scale(color[1]), scale(color[2]), color[3]]
}

pub fn opaque(rgb: [u8; 3]) -> Rgba {
    [rgb[0], rgb[1], rgb[2], 255]
}
