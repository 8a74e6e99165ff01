//! Grammar of overlay tile requests:
//! `slope-terrain://{style}/{dayOfYear?}/{demUrlOrZXY}`.

use std::fmt;
use std::str::FromStr;

use crate::style::VisualizationStyle;
use crate::tile::TileCoord;

pub const URL_SCHEME: &str = "slope-terrain";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileRequestError {
    #[error("malformed tile request `{url}`: {reason}")]
    MalformedUrl { url: String, reason: &'static str },
    #[error("invalid parameter {name} = `{value}`: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid tile {z}/{x}/{y}")]
    InvalidTile { z: String, x: String, y: String },
}

/// A parsed overlay request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerrainTileRequest {
    pub style: VisualizationStyle,
    pub day_of_year: Option<u16>,
    pub tile: TileCoord,
}

impl TerrainTileRequest {
    /// Canonical URL form of this request.
    pub fn to_url(&self) -> String {
        self.to_string()
    }

    /// Parse a request with or without the `slope-terrain://` scheme.
    pub fn parse(url: &str) -> Result<Self, TileRequestError> {
        let malformed = |reason| TileRequestError::MalformedUrl {
            url: url.to_owned(),
            reason,
        };

        let body = url
            .strip_prefix(URL_SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .unwrap_or(url)
            .trim_start_matches('/');

        let (style_token, rest) = body
            .split_once('/')
            .ok_or_else(|| malformed("expected {style}/{z}/{x}/{y}"))?;
        if style_token.is_empty() {
            return Err(malformed("missing style"));
        }
        let style = style_token
            .parse::<VisualizationStyle>()
            .map_err(|e| TileRequestError::InvalidParameter {
                name: "style",
                value: e.0,
                reason: "expected one of slope, downhill-difficulty, aspect, sun-exposure, avalanche-slope-classes".to_owned(),
            })?;

        let (day_of_year, dem) = split_day_of_year(rest);
        let day_of_year = day_of_year.map(parse_day_of_year).transpose()?;

        let [z, x, y] = extract_zxy(dem).ok_or_else(|| malformed("missing {z}/{x}/{y}"))?;
        let invalid_tile = || TileRequestError::InvalidTile {
            z: z.to_owned(),
            x: x.to_owned(),
            y: y.to_owned(),
        };
        let zoom = z.parse::<u8>().map_err(|_| invalid_tile())?;
        let tx = x.parse::<u32>().map_err(|_| invalid_tile())?;
        let ty = y.parse::<u32>().map_err(|_| invalid_tile())?;
        let tile = TileCoord::new(zoom, tx, ty).ok_or_else(invalid_tile)?;

        Ok(Self {
            style,
            day_of_year,
            tile,
        })
    }
}

impl fmt::Display for TerrainTileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{URL_SCHEME}://{}/", self.style)?;
        if let Some(day) = self.day_of_year {
            write!(f, "{day}/")?;
        }
        write!(f, "{}/{}/{}", self.tile.z, self.tile.x, self.tile.y)
    }
}

impl FromStr for TerrainTileRequest {
    type Err = TileRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A leading all-digit segment is a day of year only if a z/x/y triple still follows it.
fn split_day_of_year(rest: &str) -> (Option<&str>, &str) {
    if let Some((first, remainder)) = rest.split_once('/')
        && is_integer_token(first)
        && extract_zxy(remainder).is_some()
    {
        return (Some(first), remainder);
    }
    (None, rest)
}

fn parse_day_of_year(token: &str) -> Result<u16, TileRequestError> {
    let invalid = || TileRequestError::InvalidParameter {
        name: "dayOfYear",
        value: token.to_owned(),
        reason: "expected 1..=366".to_owned(),
    };
    let day = token.parse::<u16>().map_err(|_| invalid())?;
    if (1..=366).contains(&day) {
        Ok(day)
    } else {
        Err(invalid())
    }
}

fn is_integer_token(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// The last three integer path segments of a DEM URL or bare `z/x/y`.
///
/// The final segment may carry a file extension (`.png`, `.webp`, ...) and the
/// string may carry a query or fragment.
fn extract_zxy(dem: &str) -> Option<[&str; 3]> {
    let path = dem.split(['?', '#']).next().unwrap_or(dem);
    let mut segments = path.trim_end_matches('/').rsplit('/');
    let last = segments.next()?;
    let y = last.split_once('.').map_or(last, |(stem, _)| stem);
    let x = segments.next()?;
    let z = segments.next()?;
    if [z, x, y].iter().all(|s| is_integer_token(s) || is_signed_token(s)) {
        Some([z, x, y])
    } else {
        None
    }
}

/// Negative coordinates parse as tokens so they surface as invalid tiles, not malformed URLs.
fn is_signed_token(token: &str) -> bool {
    token.strip_prefix('-').is_some_and(is_integer_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(style: VisualizationStyle, day: Option<u16>, z: u8, x: u32, y: u32) -> TerrainTileRequest {
        TerrainTileRequest {
            style,
            day_of_year: day,
            tile: TileCoord::new(z, x, y).unwrap(),
        }
    }

    #[test]
    fn round_trips_every_style_with_and_without_day() {
        for style in VisualizationStyle::ALL {
            for day in [None, Some(1), Some(172), Some(366)] {
                let original = request(style, day, 12, 2128, 1459);
                let url = original.to_url();
                assert_eq!(TerrainTileRequest::parse(&url), Ok(original), "{url}");
            }
        }
    }

    #[test]
    fn formats_canonical_url() {
        let req = request(VisualizationStyle::SunExposure, Some(45), 11, 1064, 729);
        assert_eq!(req.to_url(), "slope-terrain://sun-exposure/45/11/1064/729");
    }

    #[test]
    fn accepts_embedded_dem_urls() {
        let parsed = TerrainTileRequest::parse(
            "slope-terrain://aspect/https://tiles.example.com/terrarium/13/4270/2900.png?key=abc",
        )
        .unwrap();
        assert_eq!(parsed, request(VisualizationStyle::Aspect, None, 13, 4270, 2900));

        let parsed = TerrainTileRequest::parse(
            "slope-terrain://sun-exposure/355/https://dem.example.com/v1/9/266/182.webp",
        )
        .unwrap();
        assert_eq!(parsed, request(VisualizationStyle::SunExposure, Some(355), 9, 266, 182));
    }

    #[test]
    fn accepts_paths_without_scheme() {
        let parsed = TerrainTileRequest::parse("/slope/3/4/2").unwrap();
        assert_eq!(parsed, request(VisualizationStyle::Slope, None, 3, 4, 2));
    }

    #[test]
    fn bare_triple_is_not_mistaken_for_a_day() {
        let parsed = TerrainTileRequest::parse("slope-terrain://slope/12/2128/1459").unwrap();
        assert_eq!(parsed.day_of_year, None);
        assert_eq!(parsed.tile.z, 12);
    }

    #[test]
    fn unknown_style_is_an_invalid_parameter() {
        let err = TerrainTileRequest::parse("slope-terrain://hillshade/12/1/1").unwrap_err();
        assert!(matches!(err, TileRequestError::InvalidParameter { name: "style", .. }));
    }

    #[test]
    fn missing_coordinates_are_malformed() {
        for url in [
            "slope-terrain://slope/12/2128",
            "slope-terrain://slope",
            "slope-terrain://slope/a/b/c",
            "",
        ] {
            let err = TerrainTileRequest::parse(url).unwrap_err();
            assert!(matches!(err, TileRequestError::MalformedUrl { .. }), "{url}: {err:?}");
        }
    }

    #[test]
    fn out_of_range_tiles_are_invalid() {
        for url in [
            "slope-terrain://slope/2/4/0",
            "slope-terrain://slope/30/0/0",
            "slope-terrain://slope/3/-1/0",
            "slope-terrain://slope/3/99999999999/0",
        ] {
            let err = TerrainTileRequest::parse(url).unwrap_err();
            assert!(matches!(err, TileRequestError::InvalidTile { .. }), "{url}: {err:?}");
        }
    }

    #[test]
    fn day_of_year_must_be_in_range() {
        let err = TerrainTileRequest::parse("slope-terrain://sun-exposure/400/12/1/1").unwrap_err();
        assert!(matches!(err, TileRequestError::InvalidParameter { name: "dayOfYear", .. }));
        let err = TerrainTileRequest::parse("slope-terrain://sun-exposure/0/12/1/1").unwrap_err();
        assert!(matches!(err, TileRequestError::InvalidParameter { name: "dayOfYear", .. }));
    }
}
