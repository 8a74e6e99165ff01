use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use slopemap_renderer::TerrainShading;
use tracing::{error, warn};

use crate::config::{
    dem_cache_entries, dem_encoding, dem_tile_url, empty_tile_hashes, satellite_tile_url,
    upstream_connect_timeout, upstream_http_timeout,
};
use crate::protocol::ProtocolHandler;
use crate::services::dem_source::HttpDemSource;
use crate::services::empty_tile_filter::EmptyTileFilter;

#[derive(Clone)]
pub struct AppState {
    pub protocol: Arc<ProtocolHandler<HttpDemSource>>,
    pub dem_source: Arc<HttpDemSource>,
    pub renderer: Arc<dyn TerrainShading>,
    pub http_client: reqwest::Client,
    /// Upstream imagery template for `/satellite`. None disables the proxy.
    pub satellite_url: Option<String>,
    pub empty_tiles: Arc<EmptyTileFilter>,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    tile_requests_total: AtomicU64,
    tiles_rendered_total: AtomicU64,
    tiles_transparent_total: AtomicU64,
    tiles_not_modified_total: AtomicU64,
    tile_request_errors_total: AtomicU64,
    tile_render_failures_total: AtomicU64,
    dem_fetches_total: AtomicU64,
    dem_cache_hits_total: AtomicU64,
    dem_fetch_errors_total: AtomicU64,
    satellite_requests_total: AtomicU64,
    satellite_empty_tiles_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ObservabilitySnapshot {
    pub tile_requests_total: u64,
    pub tiles_rendered_total: u64,
    pub tiles_transparent_total: u64,
    pub tiles_not_modified_total: u64,
    pub tile_request_errors_total: u64,
    pub tile_render_failures_total: u64,
    pub dem_fetches_total: u64,
    pub dem_cache_hits_total: u64,
    pub dem_fetch_errors_total: u64,
    pub satellite_requests_total: u64,
    pub satellite_empty_tiles_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            tile_requests_total: self.tile_requests_total.load(Ordering::Relaxed),
            tiles_rendered_total: self.tiles_rendered_total.load(Ordering::Relaxed),
            tiles_transparent_total: self.tiles_transparent_total.load(Ordering::Relaxed),
            tiles_not_modified_total: self.tiles_not_modified_total.load(Ordering::Relaxed),
            tile_request_errors_total: self.tile_request_errors_total.load(Ordering::Relaxed),
            tile_render_failures_total: self
                .tile_render_failures_total
                .load(Ordering::Relaxed),
            dem_fetches_total: self.dem_fetches_total.load(Ordering::Relaxed),
            dem_cache_hits_total: self.dem_cache_hits_total.load(Ordering::Relaxed),
            dem_fetch_errors_total: self.dem_fetch_errors_total.load(Ordering::Relaxed),
            satellite_requests_total: self.satellite_requests_total.load(Ordering::Relaxed),
            satellite_empty_tiles_total: self
                .satellite_empty_tiles_total
                .load(Ordering::Relaxed),
        }
    }

    pub fn record_tile_request(&self) {
        self.tile_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tile_rendered(&self) {
        self.tiles_rendered_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tile_transparent(&self) {
        self.tiles_transparent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tile_not_modified(&self) {
        self.tiles_not_modified_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tile_request_error(&self) {
        self.tile_request_errors_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tile_render_failure(&self) {
        self.tile_render_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dem_fetch(&self) {
        self.dem_fetches_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dem_cache_hit(&self) {
        self.dem_cache_hits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dem_fetch_error(&self) {
        self.dem_fetch_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_satellite_request(&self) {
        self.satellite_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_satellite_empty_tile(&self) {
        self.satellite_empty_tiles_total
            .fetch_add(1, Ordering::Relaxed);
    }
}

pub fn build_http_client() -> reqwest::Client {
    let request_timeout = upstream_http_timeout();
    let connect_timeout = upstream_connect_timeout();
    reqwest::Client::builder()
        .user_agent(concat!("slopemap/", env!("CARGO_PKG_VERSION")))
        .timeout(request_timeout)
        .connect_timeout(connect_timeout)
        .build()
        .or_else(|e| {
            warn!(
                error = %e,
                "failed to build configured HTTP client, retrying without custom user-agent"
            );
            reqwest::Client::builder()
                .timeout(request_timeout)
                .connect_timeout(connect_timeout)
                .build()
        })
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to build timeout-configured HTTP client, using defaults");
            reqwest::Client::new()
        })
}

impl AppState {
    pub fn new(renderer: Arc<dyn TerrainShading>) -> Self {
        let http_client = build_http_client();
        let observability = Arc::new(ObservabilityCounters::default());
        let dem_source = Arc::new(HttpDemSource::new(
            http_client.clone(),
            dem_tile_url(),
            dem_encoding(),
            dem_cache_entries(),
            Arc::clone(&observability),
        ));
        Self::with_parts(renderer, dem_source, http_client, observability)
    }

    pub fn with_parts(
        renderer: Arc<dyn TerrainShading>,
        dem_source: Arc<HttpDemSource>,
        http_client: reqwest::Client,
        observability: Arc<ObservabilityCounters>,
    ) -> Self {
        Self {
            protocol: Arc::new(ProtocolHandler::new(
                Arc::clone(&dem_source),
                Arc::clone(&renderer),
            )),
            dem_source,
            renderer,
            http_client,
            satellite_url: satellite_tile_url(),
            empty_tiles: Arc::new(EmptyTileFilter::from_hex_list(&empty_tile_hashes())),
            observability,
        }
    }
}
