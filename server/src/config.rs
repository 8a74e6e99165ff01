use std::time::Duration;

use slopemap_shared::DemEncoding;

pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const DEFAULT_DEM_TILE_URL: &str =
    "https://s3.amazonaws.com/elevation-tiles-prod/terrarium/{z}/{x}/{y}.png";
pub const DEFAULT_DEM_CACHE_ENTRIES: usize = 1024;
pub const DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 3;

/// Side length of the transparent tile served when no DEM data exists.
pub const DEFAULT_TILE_SIZE: u32 = 256;

pub const RENDERED_TILE_CACHE_CONTROL: &str = "public, max-age=86400";
pub const EMPTY_TILE_CACHE_CONTROL: &str = "public, max-age=300";

pub fn server_port() -> u16 {
    std::env::var("SERVER_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_SERVER_PORT)
}

/// DEM tile URL template with `{z}`, `{x}` and `{y}` placeholders.
pub fn dem_tile_url() -> String {
    std::env::var("DEM_TILE_URL")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DEM_TILE_URL.to_owned())
}

pub fn dem_encoding() -> DemEncoding {
    std::env::var("DEM_ENCODING")
        .ok()
        .and_then(|value| value.parse::<DemEncoding>().ok())
        .unwrap_or(DemEncoding::Terrarium)
}

pub fn dem_cache_entries() -> usize {
    std::env::var("DEM_CACHE_ENTRIES")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_DEM_CACHE_ENTRIES)
}

pub fn upstream_http_timeout() -> Duration {
    std::env::var("UPSTREAM_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS))
}

pub fn upstream_connect_timeout() -> Duration {
    std::env::var("UPSTREAM_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS))
}

/// Satellite imagery URL template. The imagery proxy is disabled when unset.
pub fn satellite_tile_url() -> Option<String> {
    std::env::var("SATELLITE_TILE_URL")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Comma-separated hex SHA-256 digests of known placeholder imagery tiles.
pub fn empty_tile_hashes() -> String {
    std::env::var("EMPTY_TILE_SHA256").unwrap_or_default()
}

pub fn cpu_fallback_enabled() -> bool {
    std::env::var("CPU_FALLBACK")
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
        })
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        temp_env::with_vars_unset(
            [
                "SERVER_PORT",
                "DEM_TILE_URL",
                "DEM_ENCODING",
                "DEM_CACHE_ENTRIES",
                "SATELLITE_TILE_URL",
                "CPU_FALLBACK",
            ],
            || {
                assert_eq!(server_port(), DEFAULT_SERVER_PORT);
                assert_eq!(dem_tile_url(), DEFAULT_DEM_TILE_URL);
                assert_eq!(dem_encoding(), DemEncoding::Terrarium);
                assert_eq!(dem_cache_entries(), DEFAULT_DEM_CACHE_ENTRIES);
                assert_eq!(satellite_tile_url(), None);
                assert!(cpu_fallback_enabled());
            },
        );
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        temp_env::with_vars(
            [
                ("SERVER_PORT", Some("0")),
                ("DEM_CACHE_ENTRIES", Some("lots")),
                ("UPSTREAM_HTTP_TIMEOUT_SECS", Some("-4")),
            ],
            || {
                assert_eq!(server_port(), DEFAULT_SERVER_PORT);
                assert_eq!(dem_cache_entries(), DEFAULT_DEM_CACHE_ENTRIES);
                assert_eq!(
                    upstream_http_timeout(),
                    Duration::from_secs(DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS)
                );
            },
        );
    }

    #[test]
    fn reads_overrides() {
        temp_env::with_vars(
            [
                ("SERVER_PORT", Some("8080")),
                ("DEM_ENCODING", Some("terrain-rgb")),
                ("UPSTREAM_CONNECT_TIMEOUT_SECS", Some("7")),
                ("SATELLITE_TILE_URL", Some("  https://img.example/{z}/{y}/{x}  ")),
                ("CPU_FALLBACK", Some("off")),
            ],
            || {
                assert_eq!(server_port(), 8080);
                assert_eq!(dem_encoding(), DemEncoding::Mapbox);
                assert_eq!(upstream_connect_timeout(), Duration::from_secs(7));
                assert_eq!(
                    satellite_tile_url().as_deref(),
                    Some("https://img.example/{z}/{y}/{x}")
                );
                assert!(!cpu_fallback_enabled());
            },
        );
    }

    #[test]
    fn blank_template_uses_default() {
        temp_env::with_var("DEM_TILE_URL", Some("   "), || {
            assert_eq!(dem_tile_url(), DEFAULT_DEM_TILE_URL);
        });
    }
}
