//! Pyramid descriptor.
//!
//! A small JSON document written next to the tiles so a viewer can discover
//! the pyramid layout without probing the filesystem:
//!
//! ```json
//! {
//!   "format": "webp",
//!   "tile_width": 1600,
//!   "tile_height": 900,
//!   "source_width": 3200,
//!   "source_height": 1800,
//!   "levels": [
//!     { "level": 0, "width": 1600, "height": 900, "grid_side": 1, "tile_count": 1 },
//!     { "level": 1, "width": 3200, "height": 1800, "grid_side": 2, "tile_count": 4 }
//!   ]
//! }
//! ```

use serde::Serialize;

use crate::tile::TileFormat;

use super::geometry::{LevelGeometry, PyramidPlan};

/// Serializable description of a generated pyramid.
#[derive(Debug, Clone, Serialize)]
pub struct PyramidManifest {
    /// Tile file extension
    pub format: &'static str,
    pub tile_width: u32,
    pub tile_height: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub levels: Vec<LevelManifest>,
}

/// One level entry of the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct LevelManifest {
    pub level: u32,
    pub width: u32,
    pub height: u32,
    pub grid_side: u32,
    pub tile_count: u64,
}

impl PyramidManifest {
    pub fn new(plan: &PyramidPlan, format: TileFormat) -> Self {
        Self {
            format: format.extension(),
            tile_width: plan.tile_width,
            tile_height: plan.tile_height,
            source_width: plan.source_width,
            source_height: plan.source_height,
            levels: plan.levels().iter().map(LevelManifest::from).collect(),
        }
    }
}

impl From<&LevelGeometry> for LevelManifest {
    fn from(geometry: &LevelGeometry) -> Self {
        Self {
            level: geometry.level,
            width: geometry.width,
            height: geometry.height,
            grid_side: geometry.grid_side,
            tile_count: geometry.tile_count,
        }
    }
}
