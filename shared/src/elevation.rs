use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tile::TileCoord;

/// Elevation value marking "no data".
pub const NO_DATA: f32 = -10_000.0;

/// A decoded DEM tile: square grid of elevations in metres, row-major, north row first.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationGrid {
    pub tile: TileCoord,
    pub size: usize,
    pub data: Vec<f32>,
}

impl ElevationGrid {
    /// `None` unless `data` holds exactly `size * size` samples.
    pub fn new(tile: TileCoord, size: usize, data: Vec<f32>) -> Option<Self> {
        if size == 0 || data.len() != size * size {
            return None;
        }
        Some(Self { tile, size, data })
    }

    pub fn filled(tile: TileCoord, size: usize, value: f32) -> Self {
        Self {
            tile,
            size,
            data: vec![value; size * size],
        }
    }

    pub fn get(&self, col: usize, row: usize) -> f32 {
        self.data[row * self.size + col]
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.size..(row + 1) * self.size]
    }
}

pub fn is_no_data(value: f32) -> bool {
    value <= NO_DATA
}

/// RGB packing scheme of upstream DEM PNG tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemEncoding {
    Terrarium,
    Mapbox,
}

impl DemEncoding {
    pub fn decode_pixel(self, r: u8, g: u8, b: u8) -> f32 {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        match self {
            Self::Terrarium => r * 256.0 + g + b / 256.0 - 32_768.0,
            Self::Mapbox => -10_000.0 + (r * 65_536.0 + g * 256.0 + b) * 0.1,
        }
    }
}

impl FromStr for DemEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terrarium" => Ok(Self::Terrarium),
            "mapbox" | "terrain-rgb" => Ok(Self::Mapbox),
            other => Err(format!("unknown DEM encoding `{other}`")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DemDecodeError {
    #[error("failed to decode DEM image: {0}")]
    Image(#[from] image::ImageError),
    #[error("DEM tile is not square: {width}x{height}")]
    NotSquare { width: u32, height: u32 },
}

/// Decode an RGB-packed DEM PNG. Fully transparent pixels become [`NO_DATA`].
pub fn decode_dem_png(
    tile: TileCoord,
    bytes: &[u8],
    encoding: DemEncoding,
) -> Result<ElevationGrid, DemDecodeError> {
    let rgba = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width != height || width == 0 {
        return Err(DemDecodeError::NotSquare { width, height });
    }

    let data = rgba
        .pixels()
        .map(|px| {
            let [r, g, b, a] = px.0;
            if a == 0 {
                NO_DATA
            } else {
                encoding.decode_pixel(r, g, b)
            }
        })
        .collect();

    Ok(ElevationGrid {
        tile,
        size: width as usize,
        data,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    fn tile() -> TileCoord {
        TileCoord::new(3, 4, 2).unwrap()
    }

    #[test]
    fn terrarium_sea_level_and_peak() {
        assert_eq!(DemEncoding::Terrarium.decode_pixel(128, 0, 0), 0.0);
        assert_eq!(DemEncoding::Terrarium.decode_pixel(140, 200, 128), 3272.5);
    }

    #[test]
    fn mapbox_zero_point() {
        // -10000 + 100000 * 0.1 = 0
        let v = DemEncoding::Mapbox.decode_pixel(1, 134, 160);
        assert!((v - 0.0).abs() < 1e-3, "got {v}");
    }

    #[test]
    fn encoding_parses_aliases() {
        assert_eq!("Terrarium".parse::<DemEncoding>(), Ok(DemEncoding::Terrarium));
        assert_eq!("terrain-rgb".parse::<DemEncoding>(), Ok(DemEncoding::Mapbox));
        assert!("srtm".parse::<DemEncoding>().is_err());
    }

    #[test]
    fn decodes_png_and_marks_transparent_pixels() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([128, 10, 0, 255]));
        img.put_pixel(1, 1, Rgba([0, 0, 0, 0]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode test png");

        let grid = decode_dem_png(tile(), &bytes, DemEncoding::Terrarium).expect("decode");
        assert_eq!(grid.size, 2);
        assert_eq!(grid.get(0, 0), 10.0);
        assert_eq!(grid.get(1, 1), NO_DATA);
        assert!(is_no_data(grid.get(1, 1)));
    }

    #[test]
    fn rejects_non_square_tiles() {
        let img = RgbaImage::from_pixel(2, 3, Rgba([128, 0, 0, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode test png");
        assert!(matches!(
            decode_dem_png(tile(), &bytes, DemEncoding::Terrarium),
            Err(DemDecodeError::NotSquare { .. })
        ));
    }

    #[test]
    fn grid_requires_square_data() {
        assert!(ElevationGrid::new(tile(), 2, vec![0.0; 4]).is_some());
        assert!(ElevationGrid::new(tile(), 2, vec![0.0; 5]).is_none());
    }
}
