//! Pyramid tiler.
//!
//! Drives a whole run: for each level, resize the source once, then crop
//! every tile on a bounded pool of blocking workers and hand it to a
//! [`TileSink`].
//!
//! # Resource model
//!
//! ```text
//!  level i ──► resize (blocking) ──► Arc<raster> ──┬─► worker ─► crop ─► sink
//!                                                  ├─► worker ─► crop ─► sink
//!                                                  └─► ...  (≤ workers in flight)
//!          ◄── barrier: all jobs joined, raster dropped ──┘
//! ```
//!
//! Levels run one after another so that at most one level raster is alive at
//! a time. Within a level, jobs share the raster read-only and write to
//! distinct destinations, so no locking is needed.

use std::sync::Arc;
use std::time::Instant;

use clap::ValueEnum;
use image::imageops::FilterType;
use image::DynamicImage;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{TileWriteError, TilerError};
use crate::tile::TileSink;

use super::geometry::{LevelGeometry, PyramidPlan, TileAddress, TileRect};

/// Default tile width at the base level (pixels).
pub const DEFAULT_TILE_WIDTH: u32 = 1600;

/// Default number of zoom levels.
pub const DEFAULT_NUM_LEVELS: u32 = 6;

/// Upper bound on the number of levels (the deepest allowed level alone
/// holds 4^23 tiles).
pub const MAX_LEVELS: u32 = 24;

// =============================================================================
// Configuration
// =============================================================================

/// Resampling filter used to resize the source for every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ResampleFilter {
    Nearest,
    Triangle,
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResampleFilter> for FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Gaussian => FilterType::Gaussian,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Configuration of a tiling run.
#[derive(Debug, Clone)]
pub struct TilerConfig {
    /// Tile width in pixels, identical at every level
    pub tile_width: u32,

    /// Number of levels to generate
    pub num_levels: u32,

    /// Filter applied uniformly when resizing each level
    pub filter: ResampleFilter,

    /// Maximum number of tile jobs in flight
    pub workers: usize,

    /// Ceiling for resizing a single level, in bytes.
    ///
    /// A level of `w x h` pixels from a `W x H` source costs
    /// `w * h * bytes_per_pixel + W * h * 16`: the level raster plus the
    /// RGBA `f32` buffer of the vertical resize pass. A level of exactly
    /// `W x H` is a copy and costs only its raster.
    pub max_memory_bytes: Option<u64>,

    /// Abort the run on the first tile write failure instead of collecting it
    pub fail_fast: bool,
}

impl TilerConfig {
    pub fn new(tile_width: u32, num_levels: u32) -> Self {
        Self {
            tile_width,
            num_levels,
            filter: ResampleFilter::default(),
            workers: default_workers(),
            max_memory_bytes: None,
            fail_fast: false,
        }
    }

    pub fn with_filter(mut self, filter: ResampleFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn validate(&self) -> Result<(), TilerError> {
        if self.tile_width == 0 {
            return Err(TilerError::InvalidConfig(
                "tile width must be greater than 0".to_string(),
            ));
        }
        if self.num_levels == 0 || self.num_levels > MAX_LEVELS {
            return Err(TilerError::InvalidConfig(format!(
                "number of levels must be between 1 and {}",
                MAX_LEVELS
            )));
        }
        if self.workers == 0 {
            return Err(TilerError::InvalidConfig(
                "worker count must be greater than 0".to_string(),
            ));
        }
        if self.max_memory_bytes == Some(0) {
            return Err(TilerError::InvalidConfig(
                "memory limit must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_WIDTH, DEFAULT_NUM_LEVELS)
    }
}

/// Worker count matching the machine's available parallelism.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// =============================================================================
// Reports
// =============================================================================

/// Outcome of one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelReport {
    pub level: u32,
    pub tile_count: u64,
    pub written: u64,
    pub failed: u64,

    /// Cancellation stopped the level before every tile was submitted
    pub cancelled: bool,
}

/// A tile that could not be written.
#[derive(Debug, Clone)]
pub struct TileFailure {
    pub address: TileAddress,
    pub error: TileWriteError,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct TilingReport {
    /// Levels that were started, in order
    pub levels: Vec<LevelReport>,

    /// Tiles whose write failed; re-running regenerates them
    pub failures: Vec<TileFailure>,

    /// The run stopped early on a cancellation request
    pub cancelled: bool,
}

impl TilingReport {
    pub fn tiles_written(&self) -> u64 {
        self.levels.iter().map(|l| l.written).sum()
    }

    pub fn tiles_failed(&self) -> u64 {
        self.levels.iter().map(|l| l.failed).sum()
    }

    /// Every tile of every planned level was written.
    pub fn is_complete(&self, plan: &PyramidPlan) -> bool {
        !self.cancelled
            && self.failures.is_empty()
            && self.tiles_written() == plan.total_tiles()
    }
}

// =============================================================================
// PyramidTiler
// =============================================================================

type JobResult = Result<(TileAddress, Result<(), TileWriteError>), TilerError>;

/// Generates a tile pyramid from one source image.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use pyramid_tiler::pyramid::{PyramidTiler, TilerConfig};
/// use pyramid_tiler::tile::{DirectoryWriter, TileEncoder, TileFormat};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let source = Arc::new(image::open("map.png")?);
/// let tiler = PyramidTiler::new(TilerConfig::new(1600, 6), &source)?;
///
/// let writer = Arc::new(DirectoryWriter::new("tiles", TileEncoder::new(TileFormat::Jpeg, 70)));
/// let report = tiler.run(source, writer, &CancellationToken::new()).await?;
/// println!("{} tiles written", report.tiles_written());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PyramidTiler {
    config: TilerConfig,
    plan: PyramidPlan,
}

impl PyramidTiler {
    /// Validate `config` against `source` and plan every level.
    pub fn new(config: TilerConfig, source: &DynamicImage) -> Result<Self, TilerError> {
        let bytes_per_pixel = source.color().bytes_per_pixel() as u64;
        Self::with_dimensions(config, source.width(), source.height(), bytes_per_pixel)
    }

    /// Plan from source dimensions only.
    ///
    /// Fails with [`TilerError::InvalidConfig`] on bad configuration and with
    /// [`TilerError::Resource`] if any level exceeds the memory ceiling, so
    /// nothing is written for a run that could not finish.
    pub fn with_dimensions(
        config: TilerConfig,
        source_width: u32,
        source_height: u32,
        bytes_per_pixel: u64,
    ) -> Result<Self, TilerError> {
        config.validate()?;

        let plan = PyramidPlan::new(
            source_width,
            source_height,
            config.tile_width,
            config.num_levels,
        )?;
        plan.check_memory(bytes_per_pixel, config.max_memory_bytes)?;

        Ok(Self { config, plan })
    }

    pub fn config(&self) -> &TilerConfig {
        &self.config
    }

    pub fn plan(&self) -> &PyramidPlan {
        &self.plan
    }

    /// Generate every level, in increasing order.
    ///
    /// Per-tile write failures are collected in the report unless
    /// `fail_fast` is set. When `cancel` fires, no further tiles are
    /// submitted, in-flight tiles complete, and the report is returned with
    /// `cancelled` set.
    pub async fn run<S: TileSink>(
        &self,
        source: Arc<DynamicImage>,
        sink: Arc<S>,
        cancel: &CancellationToken,
    ) -> Result<TilingReport, TilerError> {
        if (source.width(), source.height()) != (self.plan.source_width, self.plan.source_height)
        {
            return Err(TilerError::InvalidConfig(format!(
                "source is {}x{} but the pyramid was planned for {}x{}",
                source.width(),
                source.height(),
                self.plan.source_width,
                self.plan.source_height
            )));
        }

        info!(
            levels = self.plan.num_levels(),
            tiles = self.plan.total_tiles(),
            tile_width = self.plan.tile_width,
            tile_height = self.plan.tile_height,
            workers = self.config.workers,
            "starting pyramid"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut report = TilingReport::default();

        for geometry in self.plan.levels() {
            if cancel.is_cancelled() {
                break;
            }
            let level = self
                .run_level(geometry, &source, &sink, &semaphore, cancel, &mut report.failures)
                .await?;
            report.levels.push(level);
        }

        report.cancelled = cancel.is_cancelled();
        if report.cancelled {
            warn!(
                written = report.tiles_written(),
                "pyramid generation cancelled"
            );
        }
        Ok(report)
    }

    async fn run_level<S: TileSink>(
        &self,
        geometry: &LevelGeometry,
        source: &Arc<DynamicImage>,
        sink: &Arc<S>,
        semaphore: &Arc<Semaphore>,
        cancel: &CancellationToken,
        failures: &mut Vec<TileFailure>,
    ) -> Result<LevelReport, TilerError> {
        let started = Instant::now();
        let level = geometry.level;

        info!(
            level,
            width = geometry.width,
            height = geometry.height,
            tiles = geometry.tile_count,
            "processing level"
        );

        let prepare_sink = Arc::clone(sink);
        blocking(move || prepare_sink.prepare_level(level)).await??;

        let raster = {
            let source = Arc::clone(source);
            let (width, height) = (geometry.width, geometry.height);
            let filter = FilterType::from(self.config.filter);
            Arc::new(blocking(move || source.resize_exact(width, height, filter)).await?)
        };

        let mut report = LevelReport {
            level,
            tile_count: geometry.tile_count,
            written: 0,
            failed: 0,
            cancelled: false,
        };
        let mut jobs: JoinSet<JobResult> = JoinSet::new();
        let mut fatal: Option<TilerError> = None;
        let mut next = 0u64;

        while next < geometry.tile_count && fatal.is_none() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(done) = jobs.join_next(), if !jobs.is_empty() => {
                    if let Err(e) = self.record(done, &mut report, failures) {
                        fatal = Some(e);
                    }
                }

                permit = Arc::clone(semaphore).acquire_owned() => {
                    let permit = match permit {
                        Ok(permit) => permit,
                        Err(e) => {
                            fatal = Some(TilerError::Worker(e.to_string()));
                            continue;
                        }
                    };
                    let address = TileAddress::new(level, next);
                    let rect = match dispatch_rect(geometry, address) {
                        Ok(rect) => rect,
                        Err(e) => {
                            fatal = Some(e);
                            continue;
                        }
                    };
                    next += 1;

                    let raster = Arc::clone(&raster);
                    let sink = Arc::clone(sink);
                    jobs.spawn_blocking(move || {
                        let _permit = permit;
                        let tile = crop_tile(&raster, address, rect)?;
                        Ok((address, sink.write_tile(address, &tile)))
                    });
                }
            }
        }

        // Barrier: in-flight jobs always run to completion.
        while let Some(done) = jobs.join_next().await {
            if let Err(e) = self.record(done, &mut report, failures) {
                fatal.get_or_insert(e);
            }
        }

        // Release the level raster before the next level allocates its own.
        drop(raster);

        if let Some(e) = fatal {
            return Err(e);
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        report.cancelled = next < geometry.tile_count;
        if report.cancelled {
            warn!(
                level,
                written = report.written,
                failed = report.failed,
                total = report.tile_count,
                elapsed_ms,
                "level cancelled"
            );
        } else {
            info!(
                level,
                written = report.written,
                failed = report.failed,
                total = report.tile_count,
                elapsed_ms,
                "level complete"
            );
        }
        Ok(report)
    }

    /// Account for one finished job; `Err` means the run must stop.
    fn record(
        &self,
        done: Result<JobResult, JoinError>,
        report: &mut LevelReport,
        failures: &mut Vec<TileFailure>,
    ) -> Result<(), TilerError> {
        let (address, outcome) = done.map_err(|e| TilerError::Worker(e.to_string()))??;

        match outcome {
            Ok(()) => {
                report.written += 1;
                Ok(())
            }
            Err(error) if self.config.fail_fast => Err(TilerError::Write(error)),
            Err(error) => {
                warn!(tile = %address, error = %error, "failed to write tile");
                report.failed += 1;
                failures.push(TileFailure { address, error });
                Ok(())
            }
        }
    }
}

/// Rect of the tile about to be dispatched; an index past the grid is a
/// [`TilerError::Bounds`] error.
fn dispatch_rect(geometry: &LevelGeometry, address: TileAddress) -> Result<TileRect, TilerError> {
    geometry
        .tile_rect(address.index)
        .ok_or_else(|| TilerError::Bounds {
            address,
            rect: geometry.nominal_rect(address.index),
            width: geometry.width,
            height: geometry.height,
        })
}

/// Crop one tile out of a level raster.
fn crop_tile(
    raster: &DynamicImage,
    address: TileAddress,
    rect: TileRect,
) -> Result<DynamicImage, TilerError> {
    let (width, height) = (raster.width(), raster.height());
    if !rect.fits_within(width, height) {
        return Err(TilerError::Bounds {
            address,
            rect,
            width,
            height,
        });
    }

    debug!(tile = %address, rect = %rect, "cropping tile");
    Ok(raster.crop_imm(rect.left, rect.top, rect.width(), rect.height()))
}

async fn blocking<T, F>(f: F) -> Result<T, TilerError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TilerError::Worker(e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
