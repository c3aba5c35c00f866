use std::path::PathBuf;

use thiserror::Error;

use crate::pyramid::{TileAddress, TileRect};

/// Errors that abort a tiling run.
#[derive(Debug, Clone, Error)]
pub enum TilerError {
    /// Bad dimensions, levels or pool size; raised before any work starts
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A level would exceed a configured or arithmetic bound
    #[error("Level {level} exceeds resource bounds: {message}")]
    Resource { level: u32, message: String },

    /// A tile rectangle fell outside its level raster (geometry bug)
    #[error(
        "Tile {address} rect {rect} is outside the {width}x{height} level raster"
    )]
    Bounds {
        address: TileAddress,
        rect: TileRect,
        width: u32,
        height: u32,
    },

    /// Level preparation failed, or a tile failed under fail-fast
    #[error("Write error: {0}")]
    Write(#[from] TileWriteError),

    /// A blocking worker panicked or was aborted
    #[error("Worker failure: {0}")]
    Worker(String),
}

/// Errors produced while encoding or persisting a single tile.
#[derive(Debug, Clone, Error)]
pub enum TileWriteError {
    /// Failed to encode the tile into its output format
    #[error("Encode error: {message}")]
    Encode { message: String },

    /// Filesystem error at the destination
    #[error("I/O error at {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl TileWriteError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        TileWriteError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
