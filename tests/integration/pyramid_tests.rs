//! Pyramid generation tests.
//!
//! Tests verify:
//! - Every tile of every level is submitted exactly once
//! - Tiles land on the right pixels of the scaled raster
//! - Level 0 covers the whole image in a single tile
//! - Geometry is identical across runs

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pyramid_tiler::{PyramidTiler, ResampleFilter, TileAddress, TilerConfig};

use super::test_utils::{coordinate_image, coordinate_pixel, RecordingSink};

fn nearest(tile_width: u32, levels: u32) -> TilerConfig {
    TilerConfig::new(tile_width, levels)
        .with_filter(ResampleFilter::Nearest)
        .with_workers(4)
}

// =============================================================================
// Coverage
// =============================================================================

#[tokio::test]
async fn test_every_tile_submitted_once() {
    let source = Arc::new(coordinate_image(320, 180));
    let tiler = PyramidTiler::new(nearest(40, 4), &source).unwrap();
    let sink = Arc::new(RecordingSink::new());

    let report = tiler
        .run(source, Arc::clone(&sink), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_complete(tiler.plan()));
    assert_eq!(sink.prepared_levels(), vec![0, 1, 2, 3]);

    let tiles = sink.tiles();
    assert_eq!(tiles.len() as u64, 1 + 4 + 16 + 64);

    let addresses: HashSet<TileAddress> = tiles.iter().map(|t| t.address).collect();
    assert_eq!(addresses.len(), tiles.len());
    for level in 0..4u32 {
        for index in 0..4u64.pow(level) {
            assert!(addresses.contains(&TileAddress::new(level, index)));
        }
    }

    // 40 * 180 / 320 = 22.5 -> 22
    assert!(tiles.iter().all(|t| (t.width, t.height) == (40, 22)));

    for (level, expected) in report.levels.iter().zip([1u64, 4, 16, 64]) {
        assert_eq!(level.tile_count, expected);
        assert_eq!(level.written, expected);
        assert_eq!(level.failed, 0);
    }
}

// =============================================================================
// Pixel placement
// =============================================================================

#[tokio::test]
async fn test_tiles_map_to_source_pixels() {
    // Level 1 of a 160px tile over a 320x180 source is the source itself,
    // so each tile's top-left pixel must be the source pixel at its rect origin.
    let source = Arc::new(coordinate_image(320, 180));
    let tiler = PyramidTiler::new(nearest(160, 2), &source).unwrap();
    assert_eq!(tiler.plan().tile_height, 90);

    let sink = Arc::new(RecordingSink::new());
    tiler
        .run(source, Arc::clone(&sink), &CancellationToken::new())
        .await
        .unwrap();

    let expected = [(0, 0), (160, 0), (0, 90), (160, 90)];
    for (index, (x, y)) in expected.into_iter().enumerate() {
        let tile = sink.get(1, index as u64).unwrap();
        assert_eq!((tile.width, tile.height), (160, 90));
        assert_eq!(tile.top_left, coordinate_pixel(x, y).0, "tile 1/{}", index);
    }
}

#[tokio::test]
async fn test_scenario_3200x1800() {
    let source = Arc::new(coordinate_image(3200, 1800));
    let tiler = PyramidTiler::new(nearest(1600, 2), &source).unwrap();

    let plan = tiler.plan();
    assert_eq!((plan.tile_width, plan.tile_height), (1600, 900));

    let level0 = plan.level(0).unwrap();
    assert_eq!(level0.tile_count, 1);
    assert_eq!(level0.tile_rect(0).unwrap().to_string(), "(0, 0, 1600, 900)");

    let level1 = plan.level(1).unwrap();
    assert_eq!((level1.width, level1.height), (3200, 1800));
    assert_eq!(
        level1.tile_rect(2).unwrap().to_string(),
        "(0, 900, 1600, 1800)"
    );

    let sink = Arc::new(RecordingSink::new());
    tiler
        .run(source, Arc::clone(&sink), &CancellationToken::new())
        .await
        .unwrap();

    let level0_tile = sink.get(0, 0).unwrap();
    assert_eq!((level0_tile.width, level0_tile.height), (1600, 900));

    let tile = sink.get(1, 2).unwrap();
    assert_eq!(tile.top_left, coordinate_pixel(0, 900).0);
}

#[tokio::test]
async fn test_level_zero_is_whole_image() {
    let source = Arc::new(coordinate_image(200, 100));
    let tiler = PyramidTiler::new(nearest(200, 1), &source).unwrap();
    let sink = Arc::new(RecordingSink::new());

    tiler
        .run(source, Arc::clone(&sink), &CancellationToken::new())
        .await
        .unwrap();

    let tiles = sink.tiles();
    assert_eq!(tiles.len(), 1);
    assert_eq!((tiles[0].width, tiles[0].height), (200, 100));
    assert_eq!(tiles[0].top_left, coordinate_pixel(0, 0).0);
}

// =============================================================================
// Determinism
// =============================================================================

#[tokio::test]
async fn test_runs_are_reproducible() {
    let source = Arc::new(coordinate_image(300, 200));
    let tiler = PyramidTiler::new(nearest(50, 3), &source).unwrap();

    let first = Arc::new(RecordingSink::new());
    tiler
        .run(Arc::clone(&source), Arc::clone(&first), &CancellationToken::new())
        .await
        .unwrap();

    let second = Arc::new(RecordingSink::new());
    tiler
        .run(source, Arc::clone(&second), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.tiles(), second.tiles());
}

#[tokio::test]
async fn test_single_worker_matches_many() {
    let source = Arc::new(coordinate_image(300, 200));

    let serial = Arc::new(RecordingSink::new());
    PyramidTiler::new(nearest(50, 3).with_workers(1), &source)
        .unwrap()
        .run(Arc::clone(&source), Arc::clone(&serial), &CancellationToken::new())
        .await
        .unwrap();

    let parallel = Arc::new(RecordingSink::new());
    PyramidTiler::new(nearest(50, 3).with_workers(16), &source)
        .unwrap()
        .run(source, Arc::clone(&parallel), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(serial.tiles(), parallel.tiles());
}

// =============================================================================
// Planning errors
// =============================================================================

#[test]
fn test_memory_ceiling_rejects_before_work() {
    let source = coordinate_image(320, 180);
    let config = nearest(160, 5).with_max_memory(2_000_000);

    let err = PyramidTiler::new(config, &source).unwrap_err();
    assert!(matches!(
        err,
        pyramid_tiler::TilerError::Resource { level: 2, .. }
    ));
}

#[test]
fn test_memory_ceiling_counts_resize_buffer() {
    // Every level raster fits in 96 MB; downscaling 8000 columns to level 0
    // does not.
    let config = nearest(4000, 2).with_max_memory(96_000_000);
    let err = PyramidTiler::with_dimensions(config, 8000, 4000, 3).unwrap_err();
    assert!(matches!(
        err,
        pyramid_tiler::TilerError::Resource { level: 0, .. }
    ));

    let config = nearest(4000, 2).with_max_memory(280_000_000);
    assert!(PyramidTiler::with_dimensions(config, 8000, 4000, 3).is_ok());
}

#[test]
fn test_level_cap_applies_to_library_config() {
    // 2px tiles keep level 24 within 32-bit coordinates, so only the cap
    // stops this plan.
    let source = coordinate_image(4, 4);
    assert!(matches!(
        PyramidTiler::new(nearest(2, pyramid_tiler::MAX_LEVELS + 1), &source),
        Err(pyramid_tiler::TilerError::InvalidConfig(_))
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let source = coordinate_image(320, 180);
    assert!(matches!(
        PyramidTiler::new(TilerConfig::new(0, 3), &source),
        Err(pyramid_tiler::TilerError::InvalidConfig(_))
    ));
    assert!(matches!(
        PyramidTiler::new(TilerConfig::new(100, 3).with_workers(0), &source),
        Err(pyramid_tiler::TilerError::InvalidConfig(_))
    ));
}
