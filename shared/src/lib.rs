pub mod colors;
pub mod difficulty;
pub mod elevation;
pub mod padding;
pub mod shading;
pub mod style;
pub mod sun;
pub mod tile;
pub mod tile_url;

pub use difficulty::{DifficultyConvention, GradingTables, RunDifficulty, convention_for_point};
pub use elevation::{DemEncoding, ElevationGrid, NO_DATA};
pub use padding::{DemTileSource, PaddedElevationBuffer, assemble_neighborhood};
pub use shading::{RenderedTile, TileRenderParams};
pub use style::{PaddingKind, VisualizationStyle};
pub use tile::{COARSE_ZOOM, CoarseMapping, TileCoord};
pub use tile_url::{TerrainTileRequest, TileRequestError};
