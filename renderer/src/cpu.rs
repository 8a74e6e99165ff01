use tracing::debug;

use slopemap_shared::difficulty::GradingTables;
use slopemap_shared::padding::PaddedElevationBuffer;
use slopemap_shared::shading::{RenderedTile, TileRenderParams, shade_tile};

use crate::TerrainShading;
use crate::error::{RendererError, RendererResult};

/// Software shading path for hosts without a usable GPU adapter.
pub struct CpuRenderer {
    tables: GradingTables,
}

impl CpuRenderer {
    pub fn new(tables: GradingTables) -> Self {
        Self { tables }
    }
}

impl TerrainShading for CpuRenderer {
    fn backend(&self) -> &str {
        "cpu"
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn process_terrain_tile(
        &self,
        padded: Option<&PaddedElevationBuffer>,
        params: &TileRenderParams,
        coarse: Option<&PaddedElevationBuffer>,
    ) -> RendererResult<Option<RenderedTile>> {
        let Some(padded) = padded else {
            return Ok(None);
        };
        if padded.size == 0 || padded.data.len() != padded.size * padded.size {
            return Err(RendererError::InvalidBuffer(format!(
                "{} samples for a {}x{} buffer",
                padded.data.len(),
                padded.size,
                padded.size
            )));
        }
        let tile = shade_tile(padded, params, coarse, &self.tables);
        debug!(
            z = params.zoom,
            x = params.tile_x,
            y = params.tile_y,
            style = %params.style,
            "terrain tile shaded on cpu"
        );
        Ok(Some(tile))
    }
}
