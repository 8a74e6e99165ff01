use std::fmt::Write as _;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use serde::Serialize;

use slopemap_shared::{PaddingKind, VisualizationStyle};

use crate::state::{AppState, ObservabilitySnapshot};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Serialize)]
pub struct StyleInfo {
    pub style: VisualizationStyle,
    pub padding: PaddingKind,
    pub hillshade: bool,
    pub shadows: bool,
}

pub async fn styles() -> Json<Vec<StyleInfo>> {
    Json(
        VisualizationStyle::ALL
            .into_iter()
            .map(|style| StyleInfo {
                style,
                padding: style.padding_kind(),
                hillshade: style.uses_hillshade(),
                shadows: style.casts_shadows(),
            })
            .collect(),
    )
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let observability = state.observability.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "renderer": {
            "backend": state.renderer.backend(),
            "supported": state.renderer.is_supported(),
        },
        "dem_cache_size": state.dem_source.cache_len(),
        "satellite_proxy": state.satellite_url.is_some(),
        "empty_tile_hashes": state.empty_tiles.len(),
        "observability": {
            "tile_requests_total": observability.tile_requests_total,
            "tiles_rendered_total": observability.tiles_rendered_total,
            "tiles_transparent_total": observability.tiles_transparent_total,
            "tiles_not_modified_total": observability.tiles_not_modified_total,
            "tile_request_errors_total": observability.tile_request_errors_total,
            "tile_render_failures_total": observability.tile_render_failures_total,
            "dem_fetches_total": observability.dem_fetches_total,
            "dem_cache_hits_total": observability.dem_cache_hits_total,
            "dem_fetch_errors_total": observability.dem_fetch_errors_total,
            "satellite_requests_total": observability.satellite_requests_total,
            "satellite_empty_tiles_total": observability.satellite_empty_tiles_total,
        }
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = render_prometheus_metrics(
        state.renderer.is_supported(),
        state.dem_source.cache_len(),
        state.observability.snapshot(),
    );

    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

fn write_metric(body: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    let _ = writeln!(body, "# HELP {name} {help}");
    let _ = writeln!(body, "# TYPE {name} {kind}");
    let _ = writeln!(body, "{name} {value}");
}

fn render_prometheus_metrics(
    renderer_supported: bool,
    dem_cache_size: usize,
    observability: ObservabilitySnapshot,
) -> String {
    let mut body = String::new();
    write_metric(
        &mut body,
        "slopemap_renderer_supported",
        "gauge",
        "Whether the terrain renderer can produce tiles (1 or 0).",
        u64::from(renderer_supported),
    );
    write_metric(
        &mut body,
        "slopemap_dem_cache_size",
        "gauge",
        "Current number of DEM tiles in the cache.",
        dem_cache_size as u64,
    );

    let counters = [
        (
            "slopemap_tile_requests_total",
            "Total overlay tile requests.",
            observability.tile_requests_total,
        ),
        (
            "slopemap_tiles_rendered_total",
            "Total overlay tiles rendered from DEM data.",
            observability.tiles_rendered_total,
        ),
        (
            "slopemap_tiles_transparent_total",
            "Total transparent placeholder tiles served.",
            observability.tiles_transparent_total,
        ),
        (
            "slopemap_tiles_not_modified_total",
            "Total tile requests answered with 304.",
            observability.tiles_not_modified_total,
        ),
        (
            "slopemap_tile_request_errors_total",
            "Total malformed tile requests.",
            observability.tile_request_errors_total,
        ),
        (
            "slopemap_tile_render_failures_total",
            "Total tiles that failed to render.",
            observability.tile_render_failures_total,
        ),
        (
            "slopemap_dem_fetches_total",
            "Total upstream DEM tile fetches.",
            observability.dem_fetches_total,
        ),
        (
            "slopemap_dem_cache_hits_total",
            "Total DEM tiles served from cache.",
            observability.dem_cache_hits_total,
        ),
        (
            "slopemap_dem_fetch_errors_total",
            "Total failed DEM fetches or decodes.",
            observability.dem_fetch_errors_total,
        ),
        (
            "slopemap_satellite_requests_total",
            "Total satellite imagery proxy requests.",
            observability.satellite_requests_total,
        ),
        (
            "slopemap_satellite_empty_tiles_total",
            "Total satellite placeholder tiles answered with 204.",
            observability.satellite_empty_tiles_total,
        ),
    ];
    for (name, help, value) in counters {
        write_metric(&mut body, name, "counter", help, value);
    }

    body
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use slopemap_renderer::CpuRenderer;
    use slopemap_shared::GradingTables;
    use tower::ServiceExt;

    use super::*;

    fn app() -> axum::Router {
        let state = AppState::new(Arc::new(CpuRenderer::new(GradingTables::downhill())));
        crate::app::build_app(state)
    }

    async fn get_json(uri: &str) -> serde_json::Value {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn metrics_output_contains_prometheus_help_type_and_values() {
        let observability = ObservabilitySnapshot {
            tile_requests_total: 12,
            tiles_rendered_total: 9,
            tile_render_failures_total: 1,
            dem_cache_hits_total: 40,
            ..Default::default()
        };

        let metrics = render_prometheus_metrics(true, 17, observability);

        assert!(metrics.contains("# HELP slopemap_renderer_supported"));
        assert!(metrics.contains("# TYPE slopemap_tile_requests_total counter"));
        assert!(metrics.contains("# TYPE slopemap_dem_cache_size gauge"));
        assert!(metrics.contains("slopemap_renderer_supported 1"));
        assert!(metrics.contains("slopemap_dem_cache_size 17"));
        assert!(metrics.contains("slopemap_tile_requests_total 12"));
        assert!(metrics.contains("slopemap_tiles_rendered_total 9"));
        assert!(metrics.contains("slopemap_tile_render_failures_total 1"));
        assert!(metrics.contains("slopemap_dem_cache_hits_total 40"));
        assert!(metrics.contains("slopemap_satellite_empty_tiles_total 0"));
    }

    #[tokio::test]
    async fn styles_lists_every_style() {
        let styles = get_json("/api/styles").await;
        let styles = styles.as_array().unwrap();
        assert_eq!(styles.len(), VisualizationStyle::ALL.len());
        let sun = styles
            .iter()
            .find(|s| s["style"] == "sun-exposure")
            .unwrap();
        assert_eq!(sun["padding"], "extended");
        assert_eq!(sun["shadows"], true);
        let avalanche = styles
            .iter()
            .find(|s| s["style"] == "avalanche-slope-classes")
            .unwrap();
        assert_eq!(avalanche["hillshade"], false);
    }

    #[tokio::test]
    async fn health_reports_renderer_backend() {
        let health = get_json("/api/health").await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["renderer"]["backend"], "cpu");
        assert_eq!(health["renderer"]["supported"], true);
        assert!(health["observability"]["tile_requests_total"].as_u64().is_some());
    }

    #[tokio::test]
    async fn metrics_endpoint_is_prometheus_text() {
        let response = app()
            .oneshot(Request::builder().uri("/api/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            PROMETHEUS_CONTENT_TYPE
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("slopemap_tile_requests_total 0"));
    }
}
