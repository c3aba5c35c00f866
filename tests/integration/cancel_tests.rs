//! Cancellation tests.
//!
//! Tests verify:
//! - No tiles are submitted after cancellation
//! - Tiles written before cancellation are complete files
//! - Later levels are never prepared
//! - Only the interrupted level is reported as cancelled

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pyramid_tiler::{DirectoryWriter, PyramidTiler, TileEncoder, TileFormat, TilerConfig};

use super::test_utils::{coordinate_image, list_files, CancellingSink, RecordingSink};

#[tokio::test]
async fn test_cancel_mid_level_stops_submission() {
    let source = Arc::new(coordinate_image(160, 90));
    let tiler = PyramidTiler::new(TilerConfig::new(40, 3).with_workers(1), &source).unwrap();
    let cancel = CancellationToken::new();
    let sink = Arc::new(CancellingSink::new(RecordingSink::new(), cancel.clone(), 3));

    let report = tiler.run(source, Arc::clone(&sink), &cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.tiles_written(), 3);
    assert_eq!(report.levels.len(), 2);
    assert_eq!(report.levels[1].written, 2);
    assert!(!report.levels[0].cancelled);
    assert!(report.levels[1].cancelled);
    assert_eq!(sink.inner().prepared_levels(), vec![0, 1]);

    let written: Vec<_> = sink.inner().tiles().iter().map(|t| t.address.to_string()).collect();
    assert_eq!(written, vec!["0/0", "1/0", "1/1"]);
}

#[tokio::test]
async fn test_cancelled_run_leaves_only_complete_files() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(coordinate_image(160, 90));
    let tiler = PyramidTiler::new(TilerConfig::new(40, 3).with_workers(1), &source).unwrap();
    let cancel = CancellationToken::new();

    let writer = DirectoryWriter::new(dir.path(), TileEncoder::new(TileFormat::Png, 70));
    let sink = Arc::new(CancellingSink::new(writer, cancel.clone(), 4));

    let report = tiler.run(source, sink, &cancel).await.unwrap();
    assert!(report.cancelled);

    let files = list_files(dir.path());
    assert_eq!(files, vec!["0/0.png", "1/0.png", "1/1.png", "1/2.png"]);
    assert!(!dir.path().join("2").exists());

    for file in files {
        let tile = image::open(dir.path().join(file)).unwrap();
        assert_eq!((tile.width(), tile.height()), (40, 22));
    }
}

#[tokio::test]
async fn test_cancel_with_parallel_workers_submits_subset() {
    let source = Arc::new(coordinate_image(160, 90));
    let tiler = PyramidTiler::new(TilerConfig::new(40, 4).with_workers(4), &source).unwrap();
    let cancel = CancellationToken::new();
    let sink = Arc::new(CancellingSink::new(RecordingSink::new(), cancel.clone(), 10));

    let report = tiler.run(source, Arc::clone(&sink), &cancel).await.unwrap();

    assert!(report.cancelled);
    let total = tiler.plan().total_tiles();
    assert!(report.tiles_written() >= 10);
    assert!(report.tiles_written() < total);
    assert_eq!(report.tiles_written(), sink.inner().tiles().len() as u64);
}
