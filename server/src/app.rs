use axum::Router;
use axum::routing::get;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use crate::routes;
use crate::state::AppState;

pub(crate) fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/tiles/{*path}", get(routes::tiles::get_tile))
        .route("/satellite/{z}/{x}/{y}", get(routes::tiles::get_satellite))
        .route("/api/styles", get(routes::api::styles))
        .route("/api/health", get(routes::api::health))
        .route("/api/metrics", get(routes::api::metrics))
        // PNG bodies are skipped by the default compression predicate.
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
