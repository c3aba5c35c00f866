//! # Pyramid Tiler
//!
//! Builds multi-resolution tile pyramids from a single large image, for use
//! with map-style zoomable viewers.
//!
//! Level `i` is the source resized to `tile_width * 2^i` by
//! `tile_height * 2^i` pixels and cut into a `2^i x 2^i` grid of equally
//! sized tiles. Tile `j` of level `i` covers column `j mod 2^i` and row
//! `j div 2^i` and is written to `<output>/<i>/<j>.<ext>`.
//!
//! ## Features
//!
//! - **Exact geometry**: every level is a perfect partition into tiles of the
//!   same size; the tile height follows the source aspect ratio and is even
//! - **Bounded concurrency**: tiles are cropped and encoded on a fixed-size
//!   pool of blocking workers
//! - **Bounded memory**: levels run one at a time and each level raster is
//!   released before the next is allocated; an optional ceiling rejects
//!   runs that would not fit
//! - **Cancellation**: in-flight tiles finish, nothing new is started, and
//!   tiles are written atomically so no partial files remain
//!
//! ## Architecture
//!
//! - [`pyramid`] - Geometry, planning and the tiler itself
//! - [`tile`] - Tile sinks, the directory writer and encoders
//! - [`config`] - CLI configuration
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pyramid_tiler::{DirectoryWriter, PyramidTiler, TileEncoder, TileFormat, TilerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = Arc::new(image::open("stitched.png")?);
//!     let config = TilerConfig::new(1600, 6).with_workers(8);
//!     let tiler = PyramidTiler::new(config, &source)?;
//!
//!     let writer = Arc::new(DirectoryWriter::new(
//!         "levels",
//!         TileEncoder::new(TileFormat::Webp, 70),
//!     ));
//!     writer.write_manifest(tiler.plan())?;
//!
//!     let report = tiler.run(source, writer, &CancellationToken::new()).await?;
//!     println!("{} tiles written", report.tiles_written());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pyramid;
pub mod tile;

// Re-export commonly used types
pub use config::{parse_byte_size, Config};
pub use error::{TileWriteError, TilerError};
pub use pyramid::{
    base_tile_height, default_workers, LevelGeometry, LevelManifest, LevelReport,
    PyramidManifest, PyramidPlan, PyramidTiler, ResampleFilter, TileAddress, TileFailure,
    TileRect, TilerConfig, TilingReport, DEFAULT_NUM_LEVELS, DEFAULT_TILE_WIDTH, MAX_LEVELS,
};
pub use tile::{
    clamp_quality, is_valid_quality, DirectoryWriter, TileEncoder, TileFormat, TileSink,
    DEFAULT_JPEG_QUALITY, MANIFEST_FILE_NAME, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
