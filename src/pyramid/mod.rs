//! Tile pyramid geometry and generation.
//!
//! # Components
//!
//! - [`PyramidPlan`] / [`LevelGeometry`]: pure geometry of every level and tile
//! - [`TileAddress`] / [`TileRect`]: identity and pixel bounds of one tile
//! - [`PyramidTiler`]: resizes each level and dispatches tiles to a bounded
//!   worker pool
//! - [`PyramidManifest`]: JSON descriptor of a generated pyramid

mod geometry;
mod manifest;
mod tiler;

pub use geometry::{base_tile_height, LevelGeometry, PyramidPlan, TileAddress, TileRect};
pub use manifest::{LevelManifest, PyramidManifest};
pub use tiler::{
    default_workers, LevelReport, PyramidTiler, ResampleFilter, TileFailure, TilerConfig,
    TilingReport, DEFAULT_NUM_LEVELS, DEFAULT_TILE_WIDTH, MAX_LEVELS,
};
