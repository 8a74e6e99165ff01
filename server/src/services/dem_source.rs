use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::StatusCode;
use tracing::{debug, warn};

use slopemap_shared::elevation::decode_dem_png;
use slopemap_shared::{DemEncoding, DemTileSource, ElevationGrid, TileCoord};

use crate::state::ObservabilityCounters;

#[derive(Debug, Clone)]
struct CachedDemTile {
    /// None records a tile the upstream does not have (404).
    grid: Option<Arc<ElevationGrid>>,
    fetched_at: DateTime<Utc>,
}

/// Result of one upstream fetch, shared by every request waiting on it.
#[derive(Debug, Clone)]
enum FetchOutcome {
    Found(Arc<ElevationGrid>),
    /// Upstream answered 404.
    Missing,
    Failed,
}

type InflightFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// DEM tiles fetched over HTTP from a `{z}/{x}/{y}` template, decoded and kept
/// in a bounded in-memory cache. Concurrent requests for one tile share a single fetch.
pub struct HttpDemSource {
    client: reqwest::Client,
    url_template: String,
    encoding: DemEncoding,
    cache: DashMap<TileCoord, CachedDemTile>,
    inflight: DashMap<TileCoord, InflightFetch>,
    max_entries: usize,
    observability: Arc<ObservabilityCounters>,
}

impl HttpDemSource {
    pub fn new(
        client: reqwest::Client,
        url_template: String,
        encoding: DemEncoding,
        max_entries: usize,
        observability: Arc<ObservabilityCounters>,
    ) -> Self {
        Self {
            client,
            url_template,
            encoding,
            cache: DashMap::new(),
            inflight: DashMap::new(),
            max_entries: max_entries.max(1),
            observability,
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn tile_url(&self, tile: TileCoord) -> String {
        fill_template(&self.url_template, tile)
    }

    /// Put an already decoded tile into the cache.
    pub fn insert(&self, grid: ElevationGrid) {
        self.cache_tile(grid.tile, Some(Arc::new(grid)));
    }

    fn cache_tile(&self, tile: TileCoord, grid: Option<Arc<ElevationGrid>>) {
        if !self.cache.contains_key(&tile) {
            while self.cache.len() >= self.max_entries {
                if !self.evict_oldest() {
                    break;
                }
            }
        }
        self.cache.insert(
            tile,
            CachedDemTile {
                grid,
                fetched_at: Utc::now(),
            },
        );
    }

    fn evict_oldest(&self) -> bool {
        let Some(oldest) = self
            .cache
            .iter()
            .min_by_key(|entry| entry.value().fetched_at)
            .map(|entry| *entry.key())
        else {
            return false;
        };
        self.cache.remove(&oldest).is_some()
    }

    /// Shared fetch for `tile`, joining one already in flight.
    fn inflight_fetch(&self, tile: TileCoord) -> InflightFetch {
        self.inflight
            .entry(tile)
            .or_insert_with(|| {
                fetch_tile(
                    self.client.clone(),
                    self.tile_url(tile),
                    tile,
                    self.encoding,
                    Arc::clone(&self.observability),
                )
                .boxed()
                .shared()
            })
            .clone()
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }
}

impl DemTileSource for HttpDemSource {
    async fn get_dem_tile(&self, tile: TileCoord) -> Option<Arc<ElevationGrid>> {
        let cached = self.cache.get(&tile).map(|entry| entry.value().grid.clone());
        if let Some(grid) = cached {
            self.observability.record_dem_cache_hit();
            return grid;
        }

        let fetch = self.inflight_fetch(tile);
        let outcome = fetch.clone().await;
        let grid = match outcome {
            FetchOutcome::Found(grid) => {
                self.cache_tile(tile, Some(Arc::clone(&grid)));
                Some(grid)
            }
            FetchOutcome::Missing => {
                self.cache_tile(tile, None);
                None
            }
            FetchOutcome::Failed => None,
        };
        // Cached before removal so later requests never miss both maps.
        self.inflight
            .remove_if(&tile, |_, current| current.ptr_eq(&fetch));
        grid
    }
}

async fn fetch_tile(
    client: reqwest::Client,
    url: String,
    tile: TileCoord,
    encoding: DemEncoding,
    observability: Arc<ObservabilityCounters>,
) -> FetchOutcome {
    observability.record_dem_fetch();

    let resp = match client.get(&url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            observability.record_dem_fetch_error();
            warn!(error = %e, %url, "DEM tile request failed");
            return FetchOutcome::Failed;
        }
    };
    if resp.status() == StatusCode::NOT_FOUND {
        debug!(%url, "DEM tile not available upstream");
        return FetchOutcome::Missing;
    }
    if !resp.status().is_success() {
        observability.record_dem_fetch_error();
        warn!(status = %resp.status(), %url, "DEM tile request rejected");
        return FetchOutcome::Failed;
    }
    let body = match resp.bytes().await {
        Ok(body) => body,
        Err(e) => {
            observability.record_dem_fetch_error();
            warn!(error = %e, %url, "failed to read DEM tile body");
            return FetchOutcome::Failed;
        }
    };

    let decoded = tokio::task::spawn_blocking(move || decode_dem_png(tile, &body, encoding)).await;
    match decoded {
        Ok(Ok(grid)) => FetchOutcome::Found(Arc::new(grid)),
        Ok(Err(e)) => {
            observability.record_dem_fetch_error();
            warn!(error = %e, %url, "failed to decode DEM tile");
            FetchOutcome::Failed
        }
        Err(e) => {
            observability.record_dem_fetch_error();
            warn!(error = %e, %url, "DEM decode task failed");
            FetchOutcome::Failed
        }
    }
}

/// Substitute `{z}`, `{x}` and `{y}` in a tile URL template.
pub fn fill_template(template: &str, tile: TileCoord) -> String {
    template
        .replace("{z}", &tile.z.to_string())
        .replace("{x}", &tile.x.to_string())
        .replace("{y}", &tile.y.to_string())
}
