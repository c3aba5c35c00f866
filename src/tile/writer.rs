//! Tile sinks.
//!
//! A [`TileSink`] receives every cropped tile together with its address. The
//! tiler calls it from many worker threads at once; addresses are distinct,
//! so implementations never see two writes for the same destination.
//!
//! [`DirectoryWriter`] is the filesystem sink used by the binary. It lays
//! tiles out as:
//!
//! ```text
//! <root>/
//! ├── pyramid.json
//! ├── 0/
//! │   └── 0.jpg
//! ├── 1/
//! │   ├── 0.jpg
//! │   ├── 1.jpg
//! │   ├── 2.jpg
//! │   └── 3.jpg
//! └── ...
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::debug;

use crate::error::TileWriteError;
use crate::pyramid::{PyramidManifest, PyramidPlan, TileAddress};

use super::encoder::TileEncoder;

/// File name of the pyramid descriptor written at the output root.
pub const MANIFEST_FILE_NAME: &str = "pyramid.json";

// =============================================================================
// TileSink
// =============================================================================

/// Destination for cropped tiles.
pub trait TileSink: Send + Sync + 'static {
    /// Called once per level before any of its tiles are written.
    fn prepare_level(&self, _level: u32) -> Result<(), TileWriteError> {
        Ok(())
    }

    /// Persist one tile. May be called concurrently for distinct addresses.
    fn write_tile(&self, address: TileAddress, tile: &DynamicImage) -> Result<(), TileWriteError>;
}

// =============================================================================
// DirectoryWriter
// =============================================================================

/// Writes encoded tiles to `<root>/<level>/<index>.<ext>`.
///
/// Each tile is first written to a temporary sibling and then renamed into
/// place, so an interrupted run never leaves a truncated tile behind.
#[derive(Debug, Clone)]
pub struct DirectoryWriter {
    root: PathBuf,
    encoder: TileEncoder,
}

impl DirectoryWriter {
    pub fn new(root: impl Into<PathBuf>, encoder: TileEncoder) -> Self {
        Self {
            root: root.into(),
            encoder,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn encoder(&self) -> &TileEncoder {
        &self.encoder
    }

    /// Directory holding the tiles of `level`.
    pub fn level_dir(&self, level: u32) -> PathBuf {
        self.root.join(level.to_string())
    }

    /// Destination path of a tile.
    pub fn tile_path(&self, address: TileAddress) -> PathBuf {
        self.level_dir(address.level).join(format!(
            "{}.{}",
            address.index,
            self.encoder.format().extension()
        ))
    }

    /// Write `pyramid.json` describing the plan at the output root.
    pub fn write_manifest(&self, plan: &PyramidPlan) -> Result<PathBuf, TileWriteError> {
        fs::create_dir_all(&self.root).map_err(|e| TileWriteError::io(&self.root, e))?;

        let manifest = PyramidManifest::new(plan, self.encoder.format());
        let json = serde_json::to_vec_pretty(&manifest).map_err(|e| TileWriteError::Encode {
            message: e.to_string(),
        })?;

        let path = self.root.join(MANIFEST_FILE_NAME);
        write_atomic(&path, &json)?;
        Ok(path)
    }
}

impl TileSink for DirectoryWriter {
    fn prepare_level(&self, level: u32) -> Result<(), TileWriteError> {
        let dir = self.level_dir(level);
        fs::create_dir_all(&dir).map_err(|e| TileWriteError::io(&dir, e))
    }

    fn write_tile(&self, address: TileAddress, tile: &DynamicImage) -> Result<(), TileWriteError> {
        let data = self.encoder.encode(tile)?;
        let path = self.tile_path(address);
        write_atomic(&path, &data)?;

        debug!(tile = %address, bytes = data.len(), path = %path.display(), "wrote tile");
        Ok(())
    }
}

/// Write via a `.tmp` sibling and rename into place.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), TileWriteError> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, data).map_err(|e| TileWriteError::io(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        TileWriteError::io(path, e)
    })
}

// =============================================================================
// Tests
// =============================================================================
