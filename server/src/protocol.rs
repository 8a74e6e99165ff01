use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};
use tracing::{debug, error};

use slopemap_renderer::{RendererError, TerrainShading};
use slopemap_shared::padding::assemble_neighborhood;
use slopemap_shared::sun::today_day_of_year;
use slopemap_shared::{
    COARSE_ZOOM, DemTileSource, PaddingKind, TerrainTileRequest, TileRenderParams,
    TileRequestError,
};

use crate::config::DEFAULT_TILE_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Request(#[from] TileRequestError),
    #[error(transparent)]
    Render(#[from] RendererError),
    #[error("failed to encode tile: {0}")]
    Encode(#[from] image::ImageError),
}

/// A PNG ready to hand back to the map.
#[derive(Debug, Clone)]
pub struct EncodedTile {
    pub png: Bytes,
    /// False when the tile is the transparent placeholder.
    pub rendered: bool,
}

/// Turns `slope-terrain://` overlay requests into PNG tiles.
pub struct ProtocolHandler<S> {
    source: Arc<S>,
    renderer: Arc<dyn TerrainShading>,
}

impl<S: DemTileSource> ProtocolHandler<S> {
    pub fn new(source: Arc<S>, renderer: Arc<dyn TerrainShading>) -> Self {
        Self { source, renderer }
    }

    pub async fn handle(&self, url: &str) -> Result<EncodedTile, ProtocolError> {
        let request = TerrainTileRequest::parse(url)?;
        let day = request.day_of_year.unwrap_or_else(today_day_of_year);
        self.render(request, day).await
    }

    pub async fn render(
        &self,
        request: TerrainTileRequest,
        day_of_year: u16,
    ) -> Result<EncodedTile, ProtocolError> {
        let TerrainTileRequest { style, tile, .. } = request;
        let source = self.source.as_ref();

        // At the coarse zoom the fine neighbourhood is already the coarse context.
        let reuse_fine = style.casts_shadows() && tile.z == COARSE_ZOOM;
        let fine = assemble_neighborhood(source, tile, style.padding_kind());
        let coarse = async {
            if style.casts_shadows() && tile.z > COARSE_ZOOM {
                assemble_neighborhood(source, tile.ancestor(COARSE_ZOOM), PaddingKind::Extended)
                    .await
            } else {
                None
            }
        };
        let (padded, coarse) = futures::join!(fine, coarse);

        let Some(padded) = padded else {
            debug!(z = tile.z, x = tile.x, y = tile.y, "no DEM data for tile");
            return transparent_tile(DEFAULT_TILE_SIZE);
        };

        let (lat, lon) = tile.center_lat_lon();
        let params = TileRenderParams {
            zoom: tile.z,
            tile_x: tile.x,
            tile_y: tile.y,
            lat,
            lon,
            style,
            day_of_year,
        };
        let renderer = Arc::clone(&self.renderer);

        tokio::task::spawn_blocking(move || -> Result<EncodedTile, ProtocolError> {
            let output_size = padded.output_size() as u32;
            let coarse = if reuse_fine { Some(&padded) } else { coarse.as_ref() };
            match renderer.process_terrain_tile(Some(&padded), &params, coarse)? {
                Some(rendered) => Ok(EncodedTile {
                    png: encode_png(&rendered.rgba, rendered.width, rendered.height)?,
                    rendered: true,
                }),
                None => transparent_tile(output_size),
            }
        })
        .await
        .map_err(|e| {
            error!(error = %e, "tile render task failed");
            ProtocolError::Render(RendererError::Render(e.to_string()))
        })?
    }
}

pub fn encode_png(rgba: &[u8], width: u32, height: u32) -> Result<Bytes, image::ImageError> {
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Fast, FilterType::Adaptive)
        .write_image(rgba, width, height, ExtendedColorType::Rgba8)?;
    Ok(Bytes::from(out))
}

static TRANSPARENT_DEFAULT_TILE: OnceLock<Bytes> = OnceLock::new();

/// Fully transparent PNG. The default tile size is encoded once and shared.
pub fn transparent_tile(size: u32) -> Result<EncodedTile, ProtocolError> {
    let png = if size == DEFAULT_TILE_SIZE {
        match TRANSPARENT_DEFAULT_TILE.get() {
            Some(png) => png.clone(),
            None => {
                let png = encode_transparent(size)?;
                TRANSPARENT_DEFAULT_TILE.get_or_init(|| png).clone()
            }
        }
    } else {
        encode_transparent(size)?
    };
    Ok(EncodedTile {
        png,
        rendered: false,
    })
}

fn encode_transparent(size: u32) -> Result<Bytes, image::ImageError> {
    let rgba = vec![0u8; (size as usize) * (size as usize) * 4];
    encode_png(&rgba, size, size)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use slopemap_renderer::{CpuRenderer, RendererResult};
    use slopemap_shared::padding::PaddedElevationBuffer;
    use slopemap_shared::shading::RenderedTile;
    use slopemap_shared::{ElevationGrid, GradingTables, TileCoord, VisualizationStyle};

    use super::*;

    #[derive(Default)]
    struct MemorySource {
        tiles: HashMap<TileCoord, Arc<ElevationGrid>>,
        requested: Mutex<Vec<TileCoord>>,
    }

    impl MemorySource {
        fn with_block(z: u8, x: u32, y: u32, radius: u32, size: usize) -> Self {
            let mut source = Self::default();
            for ty in y - radius..=y + radius {
                for tx in x - radius..=x + radius {
                    let tile = TileCoord::new(z, tx, ty).unwrap();
                    let data = (0..size * size)
                        .map(|i| 1500.0 + (i % size) as f32 * 40.0)
                        .collect();
                    let grid = ElevationGrid::new(tile, size, data).unwrap();
                    source.tiles.insert(tile, Arc::new(grid));
                }
            }
            source
        }
    }

    impl DemTileSource for MemorySource {
        async fn get_dem_tile(&self, tile: TileCoord) -> Option<Arc<ElevationGrid>> {
            if let Ok(mut requested) = self.requested.lock() {
                requested.push(tile);
            }
            self.tiles.get(&tile).cloned()
        }
    }

    struct FailingRenderer;

    impl TerrainShading for FailingRenderer {
        fn backend(&self) -> &str {
            "failing"
        }

        fn is_supported(&self) -> bool {
            true
        }

        fn process_terrain_tile(
            &self,
            _padded: Option<&PaddedElevationBuffer>,
            _params: &TileRenderParams,
            _coarse: Option<&PaddedElevationBuffer>,
        ) -> RendererResult<Option<RenderedTile>> {
            Err(RendererError::Render("device lost".into()))
        }
    }

    struct UnsupportedRenderer;

    impl TerrainShading for UnsupportedRenderer {
        fn backend(&self) -> &str {
            "unsupported"
        }

        fn is_supported(&self) -> bool {
            false
        }

        fn process_terrain_tile(
            &self,
            _padded: Option<&PaddedElevationBuffer>,
            _params: &TileRenderParams,
            _coarse: Option<&PaddedElevationBuffer>,
        ) -> RendererResult<Option<RenderedTile>> {
            Ok(None)
        }
    }

    fn cpu() -> Arc<dyn TerrainShading> {
        Arc::new(CpuRenderer::new(GradingTables::downhill()))
    }

    fn decode(png: &[u8]) -> image::RgbaImage {
        image::load_from_memory_with_format(png, image::ImageFormat::Png)
            .unwrap()
            .to_rgba8()
    }

    #[tokio::test]
    async fn renders_tile_at_dem_size() {
        let source = Arc::new(MemorySource::with_block(12, 2128, 1459, 1, 32));
        let handler = ProtocolHandler::new(source, cpu());
        let tile = handler
            .handle("slope-terrain://slope/12/2128/1459")
            .await
            .unwrap();
        assert!(tile.rendered);
        let image = decode(&tile.png);
        assert_eq!(image.dimensions(), (32, 32));
        assert!(image.pixels().all(|px| px.0[3] == 255));
    }

    #[tokio::test]
    async fn missing_center_tile_is_transparent() {
        let source = Arc::new(MemorySource::default());
        let handler = ProtocolHandler::new(source, cpu());
        let tile = handler.handle("aspect/10/3/4").await.unwrap();
        assert!(!tile.rendered);
        let image = decode(&tile.png);
        assert_eq!(image.dimensions(), (DEFAULT_TILE_SIZE, DEFAULT_TILE_SIZE));
        assert!(image.pixels().all(|px| px.0[3] == 0));
    }

    #[tokio::test]
    async fn unsupported_renderer_yields_transparent_tile_of_dem_size() {
        let source = Arc::new(MemorySource::with_block(12, 2128, 1459, 1, 16));
        let handler = ProtocolHandler::new(source, Arc::new(UnsupportedRenderer));
        let tile = handler.handle("slope/12/2128/1459").await.unwrap();
        assert!(!tile.rendered);
        assert_eq!(decode(&tile.png).dimensions(), (16, 16));
    }

    #[tokio::test]
    async fn malformed_request_is_rejected_before_fetching() {
        let source = Arc::new(MemorySource::default());
        let handler = ProtocolHandler::new(Arc::clone(&source), cpu());
        let err = handler.handle("slope-terrain://glow/12/1/2").await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Request(TileRequestError::InvalidParameter { .. })
        ));
        assert!(source.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn renderer_failure_fails_only_that_tile() {
        let source = Arc::new(MemorySource::with_block(12, 2128, 1459, 1, 16));
        let handler = ProtocolHandler::new(source, Arc::new(FailingRenderer));
        let err = handler.handle("slope/12/2128/1459").await.unwrap_err();
        assert!(matches!(err, ProtocolError::Render(RendererError::Render(_))));
    }

    #[tokio::test]
    async fn sun_exposure_also_fetches_coarse_context() {
        let source = Arc::new(MemorySource::with_block(12, 2128, 1459, 1, 8));
        let handler = ProtocolHandler::new(Arc::clone(&source), cpu());
        let request = TerrainTileRequest {
            style: VisualizationStyle::SunExposure,
            day_of_year: Some(172),
            tile: TileCoord::new(12, 2128, 1459).unwrap(),
        };
        let tile = handler.render(request, 172).await.unwrap();
        assert!(tile.rendered);

        let requested = source.requested.lock().unwrap();
        let coarse = TileCoord::new(12, 2128, 1459).unwrap().ancestor(COARSE_ZOOM);
        assert!(requested.contains(&coarse));
        assert_eq!(requested.iter().filter(|t| t.z == COARSE_ZOOM).count(), 9);
    }

    #[tokio::test]
    async fn sun_exposure_at_coarse_zoom_fetches_each_tile_once() {
        let source = Arc::new(MemorySource::with_block(COARSE_ZOOM, 133, 91, 1, 8));
        let handler = ProtocolHandler::new(Arc::clone(&source), cpu());
        let tile = handler
            .handle("slope-terrain://sun-exposure/172/8/133/91")
            .await
            .unwrap();
        assert!(tile.rendered);

        let requested = source.requested.lock().unwrap();
        assert_eq!(requested.len(), 9);
        let mut distinct = requested.clone();
        distinct.sort_by_key(|t| (t.x, t.y));
        distinct.dedup();
        assert_eq!(distinct.len(), 9);
    }

    #[tokio::test]
    async fn slope_skips_coarse_context() {
        let source = Arc::new(MemorySource::with_block(12, 2128, 1459, 1, 8));
        let handler = ProtocolHandler::new(Arc::clone(&source), cpu());
        handler.handle("slope/12/2128/1459").await.unwrap();
        let requested = source.requested.lock().unwrap();
        assert!(requested.iter().all(|t| t.z == 12));
    }

    #[test]
    fn default_transparent_tile_is_shared() {
        let a = transparent_tile(DEFAULT_TILE_SIZE).unwrap();
        let b = transparent_tile(DEFAULT_TILE_SIZE).unwrap();
        assert_eq!(a.png.as_ptr(), b.png.as_ptr());
    }
}
