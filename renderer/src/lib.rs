//! Terrain overlay rendering: WGSL program generation, a pooled wgpu
//! renderer and a CPU fallback behind one trait.

pub mod cpu;
pub mod error;
pub mod programs;
pub mod renderer;
pub mod shaders;
pub mod texture_pool;

pub use cpu::CpuRenderer;
pub use error::{RendererError, RendererResult};
pub use programs::ShaderProgramSet;
pub use renderer::TerrainRenderer;
pub use texture_pool::{TexturePool, TextureSpec};

use slopemap_shared::padding::PaddedElevationBuffer;
use slopemap_shared::shading::{RenderedTile, TileRenderParams};

/// A backend that turns a padded elevation buffer into an RGBA overlay tile.
pub trait TerrainShading: Send + Sync {
    /// Short backend name for logs and the health endpoint.
    fn backend(&self) -> &str;

    fn is_supported(&self) -> bool;

    /// `Ok(None)` when `padded` is absent or the backend cannot render.
    fn process_terrain_tile(
        &self,
        padded: Option<&PaddedElevationBuffer>,
        params: &TileRenderParams,
        coarse: Option<&PaddedElevationBuffer>,
    ) -> RendererResult<Option<RenderedTile>>;
}
