use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{error, warn};

use slopemap_shared::sun::today_day_of_year;
use slopemap_shared::{TerrainTileRequest, TileCoord};

use crate::config::{EMPTY_TILE_CACHE_CONTROL, RENDERED_TILE_CACHE_CONTROL};
use crate::protocol::ProtocolError;
use crate::services::dem_source::fill_template;
use crate::state::AppState;

/// Overlay tile: `/tiles/{style}/[{dayOfYear}/]{z}/{x}/{y}[.png]`.
pub async fn get_tile(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.observability.record_tile_request();

    let request = match TerrainTileRequest::parse(&path) {
        Ok(request) => request,
        Err(e) => {
            state.observability.record_tile_request_error();
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    let day = request.day_of_year.unwrap_or_else(today_day_of_year);
    let etag = tile_etag(&request, day);

    if if_none_match_matches(&headers, &etag) {
        state.observability.record_tile_not_modified();
        return not_modified_response(RENDERED_TILE_CACHE_CONTROL, &etag);
    }

    match state.protocol.render(request, day).await {
        Ok(tile) if tile.rendered => {
            state.observability.record_tile_rendered();
            png_response(tile.png, RENDERED_TILE_CACHE_CONTROL, Some(&etag))
        }
        Ok(tile) => {
            state.observability.record_tile_transparent();
            png_response(tile.png, EMPTY_TILE_CACHE_CONTROL, None)
        }
        Err(ProtocolError::Request(e)) => {
            state.observability.record_tile_request_error();
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => {
            state.observability.record_tile_render_failure();
            error!(error = %e, %request, "tile render failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Satellite imagery proxy. Known placeholder tiles become `204 No Content`.
pub async fn get_satellite(
    State(state): State<AppState>,
    Path((z, x, y)): Path<(u8, u32, u32)>,
) -> Result<Response, StatusCode> {
    let Some(template) = state.satellite_url.as_deref() else {
        return Err(StatusCode::NOT_FOUND);
    };
    let tile = TileCoord::new(z, x, y).ok_or(StatusCode::BAD_REQUEST)?;
    state.observability.record_satellite_request();

    let url = fill_template(template, tile);
    let resp = state.http_client.get(&url).send().await.map_err(|e| {
        warn!(error = %e, %url, "satellite tile request failed");
        StatusCode::BAD_GATEWAY
    })?;
    if !resp.status().is_success() {
        return Err(StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY));
    }
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("image/jpeg"));
    let body = resp.bytes().await.map_err(|_| StatusCode::BAD_GATEWAY)?;

    if state.empty_tiles.is_empty_tile(&body) {
        state.observability.record_satellite_empty_tile();
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(RENDERED_TILE_CACHE_CONTROL),
    );
    Ok(response)
}

fn tile_etag(request: &TerrainTileRequest, day: u16) -> String {
    let tile = request.tile;
    format!(
        "\"{}-{day}-{}-{}-{}\"",
        request.style, tile.z, tile.x, tile.y
    )
}

fn png_response(body: Bytes, cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn not_modified_response(cache_control: &'static str, etag: &str) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Ok(etag_header) = HeaderValue::from_str(etag) {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn normalize_etag(candidate: &str) -> &str {
    candidate.strip_prefix("W/").unwrap_or(candidate).trim()
}

fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH) else {
        return false;
    };
    let Ok(raw) = value.to_str() else {
        return false;
    };

    raw.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || normalize_etag(candidate) == normalize_etag(etag)
    })
}
