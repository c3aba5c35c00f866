//! Tile output layer.
//!
//! The tiler hands every cropped tile to a [`TileSink`]. The filesystem sink
//! encodes it and stores it under its `(level, index)` address:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              PyramidTiler               │
//! └────────────────────┬────────────────────┘
//!                      │ (TileAddress, cropped tile)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            DirectoryWriter              │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ TileEncoder  │  │  atomic write   │  │
//! │  │ (jpeg/png/   │─►│  <root>/<level>/│  │
//! │  │  webp)       │  │  <index>.<ext>  │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileSink`]: destination contract, safe to call concurrently
//! - [`DirectoryWriter`]: filesystem sink plus `pyramid.json` manifest
//! - [`TileEncoder`] / [`TileFormat`]: output codec and quality

mod encoder;
mod writer;

pub use encoder::{
    clamp_quality, is_valid_quality, TileEncoder, TileFormat, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use writer::{DirectoryWriter, TileSink, MANIFEST_FILE_NAME};
