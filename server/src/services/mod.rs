pub mod dem_source;
pub mod empty_tile_filter;
