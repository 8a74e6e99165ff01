//! Tile neighbourhood assembly: composite a DEM tile and its 8 neighbours
//! into one padded elevation buffer so gradient and shadow kernels can read
//! across tile seams.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;

use crate::elevation::{ElevationGrid, NO_DATA};
use crate::style::{MINIMAL_BORDER, PaddingKind};
use crate::tile::TileCoord;

/// Supplier of decoded DEM tiles. `None` means the tile is unavailable.
pub trait DemTileSource: Send + Sync {
    fn get_dem_tile(
        &self,
        tile: TileCoord,
    ) -> impl Future<Output = Option<Arc<ElevationGrid>>> + Send;
}

/// Padded elevation buffer produced for one render request.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedElevationBuffer {
    pub kind: PaddingKind,
    /// Size of the centre DEM tile in pixels.
    pub tile_size: usize,
    /// Side length of `data`.
    pub size: usize,
    pub data: Vec<f32>,
}

impl PaddedElevationBuffer {
    fn empty(kind: PaddingKind, tile_size: usize) -> Self {
        let size = kind.padded_size(tile_size);
        Self {
            kind,
            tile_size,
            size,
            data: vec![NO_DATA; size * size],
        }
    }

    pub fn get(&self, col: usize, row: usize) -> f32 {
        self.data[row * self.size + col]
    }

    pub fn set(&mut self, col: usize, row: usize, value: f32) {
        self.data[row * self.size + col] = value;
    }

    pub fn border(&self) -> usize {
        self.kind.border(self.tile_size)
    }

    pub fn output_size(&self) -> usize {
        self.kind.output_size(self.size)
    }

    /// Copy a `width x height` block from `src` at (`src_col`, `src_row`) to (`dst_col`, `dst_row`).
    fn blit(
        &mut self,
        src: &ElevationGrid,
        (src_col, src_row): (usize, usize),
        (dst_col, dst_row): (usize, usize),
        (width, height): (usize, usize),
    ) {
        for dy in 0..height {
            let from = &src.row(src_row + dy)[src_col..src_col + width];
            let start = (dst_row + dy) * self.size + dst_col;
            self.data[start..start + width].copy_from_slice(from);
        }
    }
}

/// The 3x3 grids around a centre tile, row-major (NW, N, NE, W, C, E, SW, S, SE).
#[derive(Debug, Clone)]
pub struct Neighborhood {
    pub tiles: [Option<Arc<ElevationGrid>>; 9],
}

impl Neighborhood {
    pub const CENTER: usize = 4;

    pub fn center(&self) -> Option<&ElevationGrid> {
        self.tiles[Self::CENTER].as_deref()
    }

    /// Neighbour at grid cell (`gx`, `gy`) in 0..3, skipping grids whose size differs from the centre.
    fn cell(&self, gx: usize, gy: usize, tile_size: usize) -> Option<&ElevationGrid> {
        self.tiles[gy * 3 + gx]
            .as_deref()
            .filter(|grid| grid.size == tile_size)
    }
}

/// Source rectangle inside a neighbour and destination origin in the padded
/// buffer, along one axis, for neighbour index 0 (before), 1 (same), 2 (after).
fn minimal_axis(index: usize, tile_size: usize) -> (usize, usize, usize) {
    let border = MINIMAL_BORDER;
    match index {
        0 => (tile_size - border, 0, border),
        1 => (0, border, tile_size),
        _ => (0, border + tile_size, border),
    }
}

/// Centre tile plus a 3 px border taken from the edge-adjacent strips of each neighbour.
pub fn compose_minimal(hood: &Neighborhood) -> Option<PaddedElevationBuffer> {
    let center = hood.center()?;
    let tile_size = center.size;
    if tile_size < MINIMAL_BORDER {
        return None;
    }
    let mut buffer = PaddedElevationBuffer::empty(PaddingKind::Minimal, tile_size);

    for gy in 0..3 {
        for gx in 0..3 {
            let Some(grid) = hood.cell(gx, gy, tile_size) else {
                continue;
            };
            let (src_col, dst_col, width) = minimal_axis(gx, tile_size);
            let (src_row, dst_row, height) = minimal_axis(gy, tile_size);
            buffer.blit(grid, (src_col, src_row), (dst_col, dst_row), (width, height));
        }
    }

    Some(buffer)
}

/// Full 3x3 grid of whole tiles.
pub fn compose_extended(hood: &Neighborhood) -> Option<PaddedElevationBuffer> {
    let center = hood.center()?;
    let tile_size = center.size;
    let mut buffer = PaddedElevationBuffer::empty(PaddingKind::Extended, tile_size);

    for gy in 0..3 {
        for gx in 0..3 {
            let Some(grid) = hood.cell(gx, gy, tile_size) else {
                continue;
            };
            buffer.blit(
                grid,
                (0, 0),
                (gx * tile_size, gy * tile_size),
                (tile_size, tile_size),
            );
        }
    }

    Some(buffer)
}

/// Fetch the 3x3 neighbourhood of `tile` concurrently.
pub async fn fetch_neighborhood<S: DemTileSource>(source: &S, tile: TileCoord) -> Neighborhood {
    let fetches = tile.neighborhood().map(|coord| async move {
        match coord {
            Some(coord) => source.get_dem_tile(coord).await,
            None => None,
        }
    });
    let results = join_all(fetches).await;

    let mut tiles: [Option<Arc<ElevationGrid>>; 9] = Default::default();
    for (slot, grid) in tiles.iter_mut().zip(results) {
        *slot = grid;
    }
    Neighborhood { tiles }
}

/// Fetch and composite the padded buffer for `tile`. `None` when the centre tile is unavailable.
pub async fn assemble_neighborhood<S: DemTileSource>(
    source: &S,
    tile: TileCoord,
    kind: PaddingKind,
) -> Option<PaddedElevationBuffer> {
    let hood = fetch_neighborhood(source, tile).await;
    match kind {
        PaddingKind::Minimal => compose_minimal(&hood),
        PaddingKind::Extended => compose_extended(&hood),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use futures::executor::block_on;

    use super::*;

    /// In-memory DEM source that records every request.
    #[derive(Default)]
    pub(crate) struct MemorySource {
        pub tiles: HashMap<TileCoord, Arc<ElevationGrid>>,
        pub requested: Mutex<Vec<TileCoord>>,
    }

    impl MemorySource {
        pub fn insert(&mut self, grid: ElevationGrid) {
            self.tiles.insert(grid.tile, Arc::new(grid));
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

    const SIZE: usize = 8;

    fn center() -> TileCoord {
        TileCoord::new(5, 10, 12).unwrap()
    }

    /// Each neighbour is a constant tile valued 100 * (index + 1).
    fn source_without(missing: Option<usize>) -> MemorySource {
        let mut source = MemorySource::default();
        for (index, coord) in center().neighborhood().into_iter().enumerate() {
            if Some(index) == missing {
                continue;
            }
            let coord = coord.unwrap();
            source.insert(ElevationGrid::filled(coord, SIZE, 100.0 * (index as f32 + 1.0)));
        }
        source
    }

    fn value_of(index: usize) -> f32 {
        100.0 * (index as f32 + 1.0)
    }

    #[test]
    fn minimal_padding_copies_center_and_edge_strips() {
        let source = source_without(None);
        let buffer =
            block_on(assemble_neighborhood(&source, center(), PaddingKind::Minimal)).unwrap();
        assert_eq!(buffer.size, SIZE + 6);
        assert_eq!(source.requested.lock().map(|r| r.len()).unwrap_or(0), 9);

        for row in 0..buffer.size {
            for col in 0..buffer.size {
                let gx = if col < 3 { 0 } else if col < 3 + SIZE { 1 } else { 2 };
                let gy = if row < 3 { 0 } else if row < 3 + SIZE { 1 } else { 2 };
                assert_eq!(buffer.get(col, row), value_of(gy * 3 + gx), "at ({col}, {row})");
            }
        }
    }

    #[test]
    fn minimal_padding_takes_strips_adjacent_to_the_shared_edge() {
        let mut source = source_without(None);
        let tile = center();
        // West neighbour: column value = column index, so its east edge is 5, 6, 7.
        let west = tile.offset(-1, 0).unwrap();
        let data = (0..SIZE * SIZE).map(|i| (i % SIZE) as f32).collect();
        source.insert(ElevationGrid::new(west, SIZE, data).unwrap());
        // North neighbour: row value = row index, so its south edge is 5, 6, 7.
        let north = tile.offset(0, -1).unwrap();
        let data = (0..SIZE * SIZE).map(|i| (i / SIZE) as f32).collect();
        source.insert(ElevationGrid::new(north, SIZE, data).unwrap());

        let buffer = block_on(assemble_neighborhood(&source, tile, PaddingKind::Minimal)).unwrap();
        for row in 3..3 + SIZE {
            assert_eq!(buffer.get(0, row), 5.0);
            assert_eq!(buffer.get(2, row), 7.0);
        }
        for col in 3..3 + SIZE {
            assert_eq!(buffer.get(col, 0), 5.0);
            assert_eq!(buffer.get(col, 2), 7.0);
        }
    }

    #[test]
    fn missing_neighbour_leaves_sentinel_border() {
        // Index 5 is the east neighbour.
        let source = source_without(Some(5));
        let buffer =
            block_on(assemble_neighborhood(&source, center(), PaddingKind::Minimal)).unwrap();
        for row in 3..3 + SIZE {
            for col in 3 + SIZE..buffer.size {
                assert_eq!(buffer.get(col, row), NO_DATA);
            }
            assert_eq!(buffer.get(0, row), value_of(3));
        }
        assert_eq!(buffer.get(buffer.size - 1, 0), value_of(2));
    }

    #[test]
    fn extended_padding_withholds_whole_cell() {
        for missing in [0usize, 1, 5, 8] {
            let source = source_without(Some(missing));
            let buffer =
                block_on(assemble_neighborhood(&source, center(), PaddingKind::Extended)).unwrap();
            assert_eq!(buffer.size, 3 * SIZE);
            for row in 0..buffer.size {
                for col in 0..buffer.size {
                    let index = (row / SIZE) * 3 + col / SIZE;
                    let expected = if index == missing {
                        NO_DATA
                    } else {
                        value_of(index)
                    };
                    assert_eq!(buffer.get(col, row), expected, "missing {missing} at ({col}, {row})");
                }
            }
        }
    }

    #[test]
    fn missing_center_yields_none() {
        let source = source_without(Some(Neighborhood::CENTER));
        assert!(block_on(assemble_neighborhood(&source, center(), PaddingKind::Minimal)).is_none());
        assert!(
            block_on(assemble_neighborhood(&source, center(), PaddingKind::Extended)).is_none()
        );
    }

    #[test]
    fn mismatched_neighbour_size_is_ignored() {
        let mut source = source_without(None);
        let south = center().offset(0, 1).unwrap();
        source.insert(ElevationGrid::filled(south, SIZE * 2, 1.0));
        let buffer =
            block_on(assemble_neighborhood(&source, center(), PaddingKind::Minimal)).unwrap();
        assert_eq!(buffer.get(5, buffer.size - 1), NO_DATA);
    }
}
