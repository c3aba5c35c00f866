//! Pyramid geometry.
//!
//! Pure, deterministic arithmetic describing the tile pyramid: the base tile
//! size, each level's scaled raster size and tile grid, and the mapping from
//! a linear tile index to its pixel rectangle.
//!
//! # Layout
//!
//! Level `i` is the base tile scaled by `2^i` in each direction and is cut
//! into a `2^i x 2^i` grid, giving `4^i` tiles:
//!
//! ```text
//! level 0        level 1              level 2
//! ┌─────┐        ┌─────┬─────┐        ┌──┬──┬──┬──┐
//! │  0  │        │  0  │  1  │        │ 0│ 1│ 2│ 3│
//! └─────┘        ├─────┼─────┤        ├──┼──┼──┼──┤
//!                │  2  │  3  │        │ 4│ 5│ 6│ 7│
//!                └─────┴─────┘        ├──┼──┼──┼──┤
//!                                     │ 8│ 9│10│11│
//!                                     ├──┼──┼──┼──┤
//!                                     │12│13│14│15│
//!                                     └──┴──┴──┴──┘
//! ```
//!
//! Tile `j` sits at column `j mod 2^i` and row `j div 2^i`. Existing viewers
//! address tiles by `(level, index)` with exactly this mapping, so it must
//! not change.

use std::fmt;

use crate::error::TilerError;

// =============================================================================
// TileAddress
// =============================================================================

/// Identifies one output tile: its level and linear index within the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress {
    /// Pyramid level (0 = single tile, lowest resolution)
    pub level: u32,

    /// Linear tile index in `[0, 4^level)`
    pub index: u64,
}

impl TileAddress {
    pub fn new(level: u32, index: u64) -> Self {
        Self { level, index }
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.level, self.index)
    }
}

// =============================================================================
// TileRect
// =============================================================================

/// Pixel bounds of a tile within its level's scaled raster.
///
/// `left` and `top` are inclusive, `right` and `bottom` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl TileRect {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Whether this rectangle shares any pixel with `other`.
    pub fn intersects(&self, other: &TileRect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Whether the rectangle lies entirely inside a `width x height` raster.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.left <= self.right
            && self.top <= self.bottom
            && self.right <= width
            && self.bottom <= height
    }
}

impl fmt::Display for TileRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

// =============================================================================
// Base tile size
// =============================================================================

/// Derive the base tile height from the source aspect ratio.
///
/// `floor(tile_width * source_height / source_width / 2) * 2`. The result is
/// forced even so that every power-of-two level scales it without rounding.
pub fn base_tile_height(
    tile_width: u32,
    source_width: u32,
    source_height: u32,
) -> Result<u32, TilerError> {
    if source_width == 0 || source_height == 0 {
        return Err(TilerError::InvalidConfig(format!(
            "source image must have positive dimensions, got {}x{}",
            source_width, source_height
        )));
    }
    if tile_width == 0 {
        return Err(TilerError::InvalidConfig(
            "base tile width must be greater than 0".to_string(),
        ));
    }

    let scaled = tile_width as u64 * source_height as u64 / source_width as u64;
    let height = scaled / 2 * 2;

    if height == 0 {
        return Err(TilerError::InvalidConfig(format!(
            "base tile height rounds to 0 for a {}px tile over a {}x{} source",
            tile_width, source_width, source_height
        )));
    }

    u32::try_from(height).map_err(|_| {
        TilerError::InvalidConfig(format!("base tile height {} does not fit in u32", height))
    })
}

// =============================================================================
// LevelGeometry
// =============================================================================

/// Bytes per pixel of the intermediate buffer used while resizing (RGBA `f32`).
const RESIZE_BUFFER_BYTES_PER_PIXEL: u64 = 16;

/// Geometry of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelGeometry {
    /// Level index
    pub level: u32,

    /// `2^level`
    pub scale_factor: u32,

    /// Scaled raster width in pixels
    pub width: u32,

    /// Scaled raster height in pixels
    pub height: u32,

    /// Tiles per row and per column (`2^level`)
    pub grid_side: u32,

    /// Number of tiles in the level (`4^level`)
    pub tile_count: u64,

    /// Tile width in pixels (same at every level)
    pub tile_width: u32,

    /// Tile height in pixels (same at every level)
    pub tile_height: u32,
}

impl LevelGeometry {
    /// Compute the geometry of `level` for the given base tile size.
    ///
    /// Fails with [`TilerError::Resource`] when the scaled raster does not fit
    /// in 32-bit pixel coordinates.
    pub fn new(level: u32, tile_width: u32, tile_height: u32) -> Result<Self, TilerError> {
        let overflow = |what: &str| TilerError::Resource {
            level,
            message: format!("{} overflows 32-bit pixel coordinates", what),
        };

        let scale_factor = 1u32
            .checked_shl(level)
            .ok_or_else(|| overflow("scale factor"))?;
        let width = tile_width
            .checked_mul(scale_factor)
            .ok_or_else(|| overflow("scaled width"))?;
        let height = tile_height
            .checked_mul(scale_factor)
            .ok_or_else(|| overflow("scaled height"))?;

        let grid_side = scale_factor;
        let tile_count = grid_side as u64 * grid_side as u64;

        Ok(Self {
            level,
            scale_factor,
            width,
            height,
            grid_side,
            tile_count,
            tile_width,
            tile_height,
        })
    }

    /// Pixel rectangle of tile `index`, or `None` if the index is out of range.
    pub fn tile_rect(&self, index: u64) -> Option<TileRect> {
        if index >= self.tile_count {
            return None;
        }
        Some(self.nominal_rect(index))
    }

    /// Rect the index mapping gives for any `index`, saturating at
    /// `u32::MAX`. Past the last tile it lies outside the level raster.
    pub fn nominal_rect(&self, index: u64) -> TileRect {
        let side = self.grid_side as u64;
        let clamp = |v: u64| u32::try_from(v).unwrap_or(u32::MAX);

        let left = (index % side).saturating_mul(self.tile_width as u64);
        let top = (index / side).saturating_mul(self.tile_height as u64);

        TileRect::new(
            clamp(left),
            clamp(top),
            clamp(left.saturating_add(self.tile_width as u64)),
            clamp(top.saturating_add(self.tile_height as u64)),
        )
    }

    /// Grid position `(left_index, top_index)` of tile `index`.
    pub fn grid_position(&self, index: u64) -> Option<(u32, u32)> {
        if index >= self.tile_count {
            return None;
        }
        let side = self.grid_side as u64;
        Some(((index % side) as u32, (index / side) as u32))
    }

    /// Inverse of [`grid_position`](Self::grid_position).
    pub fn tile_index(&self, left_index: u32, top_index: u32) -> Option<u64> {
        if left_index >= self.grid_side || top_index >= self.grid_side {
            return None;
        }
        Some(top_index as u64 * self.grid_side as u64 + left_index as u64)
    }

    /// All tiles of the level in index order.
    pub fn tiles(&self) -> impl Iterator<Item = (TileAddress, TileRect)> + '_ {
        (0..self.tile_count).filter_map(move |index| {
            self.tile_rect(index)
                .map(|rect| (TileAddress::new(self.level, index), rect))
        })
    }

    /// Size in bytes of the level's resized raster, `None` on overflow.
    pub fn raster_bytes(&self, bytes_per_pixel: u64) -> Option<u64> {
        (self.width as u64)
            .checked_mul(self.height as u64)?
            .checked_mul(bytes_per_pixel)
    }

    /// Peak bytes allocated while resizing a `source_width x source_height`
    /// image to this level, `None` on overflow.
    ///
    /// The resize first samples vertically into an RGBA `f32` buffer of
    /// `source_width x height`, then horizontally into the level raster. A
    /// level with the source's own dimensions is a plain copy.
    pub fn resize_bytes(
        &self,
        source_width: u32,
        source_height: u32,
        bytes_per_pixel: u64,
    ) -> Option<u64> {
        let raster = self.raster_bytes(bytes_per_pixel)?;
        if (self.width, self.height) == (source_width, source_height) {
            return Some(raster);
        }

        let buffer = (source_width as u64)
            .checked_mul(self.height as u64)?
            .checked_mul(RESIZE_BUFFER_BYTES_PER_PIXEL)?;
        raster.checked_add(buffer)
    }
}

// =============================================================================
// PyramidPlan
// =============================================================================

/// Geometry of a whole pyramid, computed once before any tiling starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidPlan {
    pub source_width: u32,
    pub source_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    levels: Vec<LevelGeometry>,
}

impl PyramidPlan {
    /// Plan `num_levels` levels of `tile_width`-wide tiles over a source image.
    pub fn new(
        source_width: u32,
        source_height: u32,
        tile_width: u32,
        num_levels: u32,
    ) -> Result<Self, TilerError> {
        if num_levels == 0 {
            return Err(TilerError::InvalidConfig(
                "number of levels must be at least 1".to_string(),
            ));
        }

        let tile_height = base_tile_height(tile_width, source_width, source_height)?;
        let levels = (0..num_levels)
            .map(|level| LevelGeometry::new(level, tile_width, tile_height))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source_width,
            source_height,
            tile_width,
            tile_height,
            levels,
        })
    }

    /// Reject the plan if resizing any level would need more than `limit`
    /// bytes (see [`LevelGeometry::resize_bytes`]).
    pub fn check_memory(&self, bytes_per_pixel: u64, limit: Option<u64>) -> Result<(), TilerError> {
        for geometry in &self.levels {
            let bytes = geometry
                .resize_bytes(self.source_width, self.source_height, bytes_per_pixel)
                .ok_or_else(|| TilerError::Resource {
                    level: geometry.level,
                    message: "resize size overflows 64 bits".to_string(),
                })?;

            if let Some(limit) = limit {
                if bytes > limit {
                    return Err(TilerError::Resource {
                        level: geometry.level,
                        message: format!(
                            "resizing to {}x{} needs {} bytes, limit is {} bytes",
                            geometry.width, geometry.height, bytes, limit
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn levels(&self) -> &[LevelGeometry] {
        &self.levels
    }

    pub fn level(&self, level: u32) -> Option<&LevelGeometry> {
        self.levels.get(level as usize)
    }

    pub fn num_levels(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Total number of tiles across all levels.
    pub fn total_tiles(&self) -> u64 {
        self.levels.iter().map(|l| l.tile_count).sum()
    }
}

// =============================================================================
// Tests
// =============================================================================
