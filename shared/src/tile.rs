//! Slippy-map tile addressing and the coordinate transforms between
//! padded-texture space, tile-local space and WGS84.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::style::PaddingKind;

/// Zoom of the coarse elevation context used for long-range shadow casting.
pub const COARSE_ZOOM: u8 = 8;

/// Deepest zoom a request may address.
pub const MAX_ZOOM: u8 = 24;

const EARTH_RADIUS_M: f64 = 6_378_137.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

/// Neighbour offsets in row-major order of the 3x3 neighbourhood (NW, N, NE, W, C, E, SW, S, SE).
pub const NEIGHBORHOOD_OFFSETS: [(i64, i64); 9] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (0, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Option<Self> {
        if z > MAX_ZOOM {
            return None;
        }
        let n = 1u64 << z;
        if u64::from(x) >= n || u64::from(y) >= n {
            return None;
        }
        Some(Self { z, x, y })
    }

    pub fn tiles_per_axis(self) -> u64 {
        1u64 << self.z
    }

    /// Tile shifted by `(dx, dy)`. X wraps across the antimeridian; rows past the poles do not exist.
    pub fn offset(self, dx: i64, dy: i64) -> Option<Self> {
        let n = self.tiles_per_axis() as i64;
        let y = self.y as i64 + dy;
        if y < 0 || y >= n {
            return None;
        }
        let x = (self.x as i64 + dx).rem_euclid(n);
        Some(Self {
            z: self.z,
            x: x as u32,
            y: y as u32,
        })
    }

    /// The 3x3 neighbourhood in [`NEIGHBORHOOD_OFFSETS`] order.
    pub fn neighborhood(self) -> [Option<TileCoord>; 9] {
        NEIGHBORHOOD_OFFSETS.map(|(dx, dy)| self.offset(dx, dy))
    }

    /// Ancestor tile at a shallower zoom. Returns `self` when `zoom >= self.z`.
    pub fn ancestor(self, zoom: u8) -> Self {
        if zoom >= self.z {
            return self;
        }
        let shift = self.z - zoom;
        Self {
            z: zoom,
            x: self.x >> shift,
            y: self.y >> shift,
        }
    }

    /// Latitude/longitude of the tile centre.
    pub fn center_lat_lon(self) -> (f64, f64) {
        tile_point_to_lat_lon(self.z, self.x as f64 + 0.5, self.y as f64 + 0.5)
    }
}

/// Inverse Web-Mercator: fractional tile coordinates to (lat, lon) in degrees.
pub fn tile_point_to_lat_lon(z: u8, x: f64, y: f64) -> (f64, f64) {
    let n = (1u64 << z) as f64;
    let lon = x / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
    (lat, lon)
}

/// Ground size of one DEM pixel in metres at `lat` for a `tile_size`-pixel tile at `zoom`.
pub fn pixel_size_m(zoom: f64, lat: f64, tile_size: f64) -> f64 {
    lat.to_radians().cos() * 2.0 * PI * EARTH_RADIUS_M / (tile_size * 2f64.powf(zoom))
}

/// Padded-buffer texel (column, row) for an output pixel of the centre tile.
pub fn output_to_padded(kind: PaddingKind, tile_size: usize, px: usize, py: usize) -> (usize, usize) {
    let border = kind.border(tile_size);
    (px + border, py + border)
}

/// Tile-local coordinate (0..1 across the centre tile) of a padded-buffer position.
pub fn padded_to_local(kind: PaddingKind, tile_size: usize, col: f64, row: f64) -> (f64, f64) {
    let border = kind.border(tile_size) as f64;
    let size = tile_size as f64;
    ((col - border) / size, (row - border) / size)
}

/// Inverse of [`padded_to_local`].
pub fn local_to_padded(kind: PaddingKind, tile_size: usize, u: f64, v: f64) -> (f64, f64) {
    let border = kind.border(tile_size) as f64;
    let size = tile_size as f64;
    (border + u * size, border + v * size)
}

/// Maps tile-local coordinates of a fine tile onto the normalised texture
/// coordinates of the extended-padded coarse neighbourhood containing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoarseMapping {
    pub scale: f64,
    pub offset: (f64, f64),
}

impl CoarseMapping {
    /// `None` when `tile` is shallower than [`COARSE_ZOOM`].
    pub fn for_tile(tile: TileCoord) -> Option<Self> {
        if tile.z < COARSE_ZOOM {
            return None;
        }
        let coarse = tile.ancestor(COARSE_ZOOM);
        let ratio = (1u64 << (tile.z - COARSE_ZOOM)) as f64;
        let sub_x = tile.x as f64 - coarse.x as f64 * ratio;
        let sub_y = tile.y as f64 - coarse.y as f64 * ratio;
        Some(Self {
            scale: 1.0 / (3.0 * ratio),
            offset: ((1.0 + sub_x / ratio) / 3.0, (1.0 + sub_y / ratio) / 3.0),
        })
    }

    pub fn apply(&self, u: f64, v: f64) -> (f64, f64) {
        (self.offset.0 + u * self.scale, self.offset.1 + v * self.scale)
    }
}
