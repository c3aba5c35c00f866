//! Shared helpers for integration tests: synthetic images and test sinks.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use image::{DynamicImage, Rgb, RgbImage};
use tokio_util::sync::CancellationToken;

use pyramid_tiler::{TileAddress, TileSink, TileWriteError};

// =============================================================================
// Images
// =============================================================================

/// RGB image whose pixels encode their own coordinates.
pub fn coordinate_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, coordinate_pixel))
}

/// Pixel value [`coordinate_image`] stores at `(x, y)`.
pub fn coordinate_pixel(x: u32, y: u32) -> Rgb<u8> {
    Rgb([(x % 256) as u8, (y % 256) as u8, ((x / 256) * 16 + y / 256) as u8])
}

// =============================================================================
// Recording Sink
// =============================================================================

/// A tile as seen by a sink.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordedTile {
    pub address: TileAddress,
    pub width: u32,
    pub height: u32,
    pub top_left: [u8; 3],
}

/// Sink that keeps a record of every tile it receives.
#[derive(Default)]
pub struct RecordingSink {
    tiles: Mutex<Vec<RecordedTile>>,
    prepared: Mutex<Vec<u32>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded tiles sorted by address.
    pub fn tiles(&self) -> Vec<RecordedTile> {
        let mut tiles = self.tiles.lock().unwrap().clone();
        tiles.sort();
        tiles
    }

    pub fn prepared_levels(&self) -> Vec<u32> {
        self.prepared.lock().unwrap().clone()
    }

    pub fn get(&self, level: u32, index: u64) -> Option<RecordedTile> {
        self.tiles
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.address == TileAddress::new(level, index))
            .cloned()
    }
}

impl TileSink for RecordingSink {
    fn prepare_level(&self, level: u32) -> Result<(), TileWriteError> {
        self.prepared.lock().unwrap().push(level);
        Ok(())
    }

    fn write_tile(&self, address: TileAddress, tile: &DynamicImage) -> Result<(), TileWriteError> {
        let rgb = tile.to_rgb8();
        let record = RecordedTile {
            address,
            width: rgb.width(),
            height: rgb.height(),
            top_left: rgb.get_pixel(0, 0).0,
        };
        self.tiles.lock().unwrap().push(record);
        Ok(())
    }
}

// =============================================================================
// Failing Sink
// =============================================================================

/// Sink that fails for selected addresses or levels and records the rest.
pub struct FailingSink {
    pub inner: RecordingSink,
    failing_tiles: HashSet<TileAddress>,
    failing_level: Option<u32>,
}

impl FailingSink {
    pub fn failing_tiles(addresses: impl IntoIterator<Item = TileAddress>) -> Self {
        Self {
            inner: RecordingSink::new(),
            failing_tiles: addresses.into_iter().collect(),
            failing_level: None,
        }
    }

    pub fn failing_level(level: u32) -> Self {
        Self {
            inner: RecordingSink::new(),
            failing_tiles: HashSet::new(),
            failing_level: Some(level),
        }
    }
}

impl TileSink for FailingSink {
    fn prepare_level(&self, level: u32) -> Result<(), TileWriteError> {
        if self.failing_level == Some(level) {
            return Err(TileWriteError::Io {
                path: PathBuf::from(level.to_string()),
                message: "permission denied".to_string(),
            });
        }
        self.inner.prepare_level(level)
    }

    fn write_tile(&self, address: TileAddress, tile: &DynamicImage) -> Result<(), TileWriteError> {
        if self.failing_tiles.contains(&address) {
            return Err(TileWriteError::Io {
                path: PathBuf::from(address.to_string()),
                message: "disk full".to_string(),
            });
        }
        self.inner.write_tile(address, tile)
    }
}

// =============================================================================
// Cancelling Sink
// =============================================================================

/// Wraps a sink and cancels a token once `after` tiles have been written.
pub struct CancellingSink<S> {
    inner: S,
    token: CancellationToken,
    after: usize,
    written: AtomicUsize,
}

impl<S: TileSink> CancellingSink<S> {
    pub fn new(inner: S, token: CancellationToken, after: usize) -> Self {
        Self {
            inner,
            token,
            after,
            written: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: TileSink> TileSink for CancellingSink<S> {
    fn prepare_level(&self, level: u32) -> Result<(), TileWriteError> {
        self.inner.prepare_level(level)
    }

    fn write_tile(&self, address: TileAddress, tile: &DynamicImage) -> Result<(), TileWriteError> {
        self.inner.write_tile(address, tile)?;
        if self.written.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.token.cancel();
        }
        Ok(())
    }
}

// =============================================================================
// Filesystem
// =============================================================================

/// All files under `root`, relative to it, sorted.
pub fn list_files(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                let relative = path.strip_prefix(root).unwrap();
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    let mut files = Vec::new();
    if root.exists() {
        walk(root, root, &mut files);
    }
    files.sort();
    files
}
