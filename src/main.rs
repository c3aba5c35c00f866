//! Pyramid Tiler - build zoomable tile pyramids from one large image.
//!
//! This binary decodes the source image, plans the pyramid, and writes every
//! level to the output directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use image::{DynamicImage, ImageReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pyramid_tiler::{
    config::Config,
    pyramid::{PyramidPlan, PyramidTiler, TilingReport},
    tile::DirectoryWriter,
};

/// Exit code reported when the run is interrupted.
const EXIT_CANCELLED: u8 = 130;

/// Failed tiles listed individually in the summary.
const MAX_LISTED_FAILURES: usize = 10;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let tiler_config = match config.tiler_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Input: {}", config.input.display());
    info!("  Output: {}", config.output.display());
    info!(
        "  Levels: {}, tile width: {}px, filter: {:?}",
        config.levels, config.tile_width, config.filter
    );
    let encoder = config.encoder();
    if encoder.format().uses_quality() {
        info!(
            "  Format: {:?} (quality {}), workers: {}",
            encoder.format(),
            encoder.quality(),
            tiler_config.workers
        );
    } else {
        info!(
            "  Format: {:?}, workers: {}",
            encoder.format(),
            tiler_config.workers
        );
    }
    if let Some(limit) = tiler_config.max_memory_bytes {
        info!("  Memory limit per level: {:.1} MB", limit as f64 / 1e6);
    }

    // Decode source
    info!("");
    info!("Loading image into memory...");
    let started = Instant::now();
    let source = match load_source(config.input.clone()).await {
        Ok(image) => image,
        Err(e) => {
            error!("  Failed to load {}: {}", config.input.display(), e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "  Loaded {}x{} image in {:.1}s",
        source.width(),
        source.height(),
        started.elapsed().as_secs_f64()
    );

    // Plan the pyramid; resource limits are checked before anything is written
    let tiler = match PyramidTiler::new(tiler_config, &source) {
        Ok(tiler) => tiler,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    log_plan(tiler.plan());

    let writer = Arc::new(DirectoryWriter::new(&config.output, encoder));
    if let Err(e) = writer.write_manifest(tiler.plan()) {
        error!("Failed to write manifest: {}", e);
        return ExitCode::FAILURE;
    }

    // Ctrl-C stops submitting new tiles; in-flight tiles still complete
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight tiles...");
                cancel.cancel();
            }
        }
    });

    let started = Instant::now();
    let report = match tiler.run(Arc::new(source), writer, &cancel).await {
        Ok(report) => report,
        Err(e) => {
            error!("Tiling failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    print_summary(&report, tiler.plan(), &config.output, started);

    if report.cancelled {
        ExitCode::from(EXIT_CANCELLED)
    } else if !report.failures.is_empty() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Decode the source image on a blocking thread, without allocation limits.
async fn load_source(path: PathBuf) -> Result<DynamicImage, String> {
    tokio::task::spawn_blocking(move || decode_image(&path))
        .await
        .map_err(|e| e.to_string())?
}

fn decode_image(path: &Path) -> Result<DynamicImage, String> {
    let mut reader = ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .with_guessed_format()
        .map_err(|e| e.to_string())?;
    reader.no_limits();
    reader.decode().map_err(|e| e.to_string())
}

fn log_plan(plan: &PyramidPlan) {
    info!(
        "  Tile size: {}x{}, {} tiles over {} levels",
        plan.tile_width,
        plan.tile_height,
        plan.total_tiles(),
        plan.num_levels()
    );
    for level in plan.levels() {
        info!(
            "    level {}: {}x{} px, {}x{} grid",
            level.level, level.width, level.height, level.grid_side, level.grid_side
        );
    }
    info!("");
}

fn print_summary(report: &TilingReport, plan: &PyramidPlan, output: &Path, started: Instant) {
    info!("────────────────────────────────────────────────────────────────");
    info!(
        "  {} of {} tiles written to {} in {:.1}s",
        report.tiles_written(),
        plan.total_tiles(),
        output.display(),
        started.elapsed().as_secs_f64()
    );
    for level in &report.levels {
        info!(
            "    level {}: {}/{} written, {} failed{}",
            level.level,
            level.written,
            level.tile_count,
            level.failed,
            if level.cancelled { " (cancelled)" } else { "" }
        );
    }

    if report.cancelled {
        warn!("  Cancelled: re-run to generate the remaining tiles");
    }

    if !report.failures.is_empty() {
        error!("  {} tile(s) failed:", report.failures.len());
        for failure in report.failures.iter().take(MAX_LISTED_FAILURES) {
            error!("    {}: {}", failure.address, failure.error);
        }
        if report.failures.len() > MAX_LISTED_FAILURES {
            error!(
                "    ... and {} more",
                report.failures.len() - MAX_LISTED_FAILURES
            );
        }
    }
    info!("────────────────────────────────────────────────────────────────");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pyramid_tiler=debug"
    } else {
        "pyramid_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
