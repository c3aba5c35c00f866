//! Configuration management for the pyramid tiler.
//!
//! This module provides the command-line configuration:
//! - Command-line arguments via clap
//! - Environment variables with `TILER_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use pyramid_tiler::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! let tiler_config = config.tiler_config()?;
//! ```
//!
//! # Environment Variables
//!
//! - `TILER_OUTPUT` - Output root directory (required)
//! - `TILER_TILE_WIDTH` - Tile width in pixels (default: 1600)
//! - `TILER_LEVELS` - Number of zoom levels (default: 6)
//! - `TILER_FILTER` - Resampling filter (default: catmull-rom)
//! - `TILER_FORMAT` - Tile format (default: webp)
//! - `TILER_QUALITY` - JPEG / lossy WebP quality (default: 70)
//! - `TILER_MAX_MEMORY` - Ceiling for one level's resize, e.g. `2GiB`
//! - `TILER_WORKERS` - Concurrent tile jobs (default: available parallelism)

use std::path::PathBuf;

use clap::Parser;

use crate::pyramid::{
    default_workers, ResampleFilter, TilerConfig, DEFAULT_NUM_LEVELS, DEFAULT_TILE_WIDTH,
    MAX_LEVELS,
};
use crate::tile::{is_valid_quality, TileEncoder, TileFormat, DEFAULT_JPEG_QUALITY};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Pyramid Tiler - build zoomable tile pyramids from one large image.
///
/// Level `i` is the source resized to `tile_width * 2^i` pixels wide and cut
/// into `4^i` tiles written to `<output>/<i>/<index>.<ext>`.
#[derive(Parser, Debug, Clone)]
#[command(name = "pyramid-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Input / Output
    // =========================================================================
    /// Source image (PNG, JPEG, TIFF or WebP).
    pub input: PathBuf,

    /// Output root directory.
    #[arg(short, long, env = "TILER_OUTPUT")]
    pub output: PathBuf,

    // =========================================================================
    // Pyramid Geometry
    // =========================================================================
    /// Tile width in pixels. Tile height follows the source aspect ratio.
    #[arg(long, default_value_t = DEFAULT_TILE_WIDTH, env = "TILER_TILE_WIDTH")]
    pub tile_width: u32,

    /// Number of zoom levels to generate.
    #[arg(short, long, default_value_t = DEFAULT_NUM_LEVELS, env = "TILER_LEVELS")]
    pub levels: u32,

    /// Resampling filter used to resize every level.
    #[arg(long, value_enum, default_value_t = ResampleFilter::CatmullRom, env = "TILER_FILTER")]
    pub filter: ResampleFilter,

    // =========================================================================
    // Encoding
    // =========================================================================
    /// Tile image format.
    #[arg(long, value_enum, default_value_t = TileFormat::Webp, env = "TILER_FORMAT")]
    pub format: TileFormat,

    /// JPEG / lossy WebP quality (1-100, default 70).
    ///
    /// Rejected for the lossless `png` and `webp-lossless` formats.
    #[arg(short, long, env = "TILER_QUALITY")]
    pub quality: Option<u8>,

    // =========================================================================
    // Resources
    // =========================================================================
    /// Memory ceiling for resizing one level (e.g. 512MB, 4GiB).
    ///
    /// Counts the level raster plus the resize buffer of
    /// `source_width * level_height * 16` bytes. The run is refused up front
    /// if any level would exceed it.
    #[arg(long, env = "TILER_MAX_MEMORY")]
    pub max_memory: Option<String>,

    /// Number of tiles processed concurrently.
    ///
    /// Defaults to the available parallelism.
    #[arg(short, long, env = "TILER_WORKERS")]
    pub workers: Option<usize>,

    /// Abort on the first tile that fails to write.
    ///
    /// By default failures are collected and listed at the end.
    #[arg(long, default_value_t = false)]
    pub fail_fast: bool,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level, one line per tile).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_width == 0 {
            return Err("tile_width must be greater than 0".to_string());
        }

        if self.levels == 0 || self.levels > MAX_LEVELS {
            return Err(format!("levels must be between 1 and {}", MAX_LEVELS));
        }

        if let Some(quality) = self.quality {
            if !is_valid_quality(quality) {
                return Err("quality must be between 1 and 100".to_string());
            }
            if !self.format.uses_quality() {
                return Err(format!(
                    "quality has no effect on lossless {:?} tiles",
                    self.format
                ));
            }
        }

        if self.workers == Some(0) {
            return Err("workers must be greater than 0".to_string());
        }

        if let Some(ref max_memory) = self.max_memory {
            match parse_byte_size(max_memory) {
                Ok(0) => return Err("max_memory must be greater than 0".to_string()),
                Ok(_) => {}
                Err(e) => return Err(format!("max_memory: {}", e)),
            }
        }

        if self.output.as_os_str().is_empty() {
            return Err("output directory is required. Set --output or TILER_OUTPUT".to_string());
        }

        Ok(())
    }

    /// Build the tiler configuration (call validate() first).
    pub fn tiler_config(&self) -> Result<TilerConfig, String> {
        let mut config = TilerConfig::new(self.tile_width, self.levels)
            .with_filter(self.filter)
            .with_workers(self.workers.unwrap_or_else(default_workers))
            .with_fail_fast(self.fail_fast);

        if let Some(ref max_memory) = self.max_memory {
            config = config.with_max_memory(parse_byte_size(max_memory)?);
        }

        Ok(config)
    }

    /// Encoder for the configured format and quality.
    pub fn encoder(&self) -> TileEncoder {
        TileEncoder::new(self.format, self.quality.unwrap_or(DEFAULT_JPEG_QUALITY))
    }
}

// =============================================================================
// Size Parsing
// =============================================================================

/// Parse a human byte size such as `1024`, `512KB`, `4GiB` or `1.5 GB`.
///
/// Decimal suffixes (`KB`, `MB`, `GB`, `TB`) are powers of 1000, binary
/// suffixes (`KiB`, `MiB`, `GiB`, `TiB`) powers of 1024. Case-insensitive.
pub fn parse_byte_size(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    if number.is_empty() {
        return Err(format!("invalid size '{}'", input));
    }

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "t" | "tb" => 1_000_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        "tib" => 1 << 40,
        other => return Err(format!("unknown size unit '{}'", other)),
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| format!("size '{}' is too large", input));
    }

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid size '{}'", input))?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(format!("size '{}' is too large", input));
    }
    Ok(bytes as u64)
}

// =============================================================================
// Tests
// =============================================================================
