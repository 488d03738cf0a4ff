//! Full-run integration tests: partition, cleanup, merge sweeps,
//! consolidation and export against the in-memory store and JSON datasets.

use geo::{coord, polygon, Area, Rect};
use landstitch::config::RunConfig;
use landstitch::dataset::{JsonDataset, VectorReader, VectorWriter};
use landstitch::store::{MemoryStore, SpatialStore, TileStatus};
use landstitch::workflow::Workflow;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// 200 x 200 area of interest, split 2 x 2.
fn aoi() -> Rect<f64> {
    Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 200.0, y: 200.0 })
}

/// One hardbone rectangle crossing the vertical tile border at x = 100.
fn write_inputs(dir: &Path) {
    let hardbone = polygon![
        (x: 60.0, y: 20.0),
        (x: 140.0, y: 20.0),
        (x: 140.0, y: 60.0),
        (x: 60.0, y: 60.0),
        (x: 60.0, y: 20.0),
    ];
    JsonDataset
        .write_polygons(&dir.join("hardbone.json"), &[hardbone])
        .unwrap();
    JsonDataset
        .write_polygons(&dir.join("backbone.json"), &[])
        .unwrap();
    JsonDataset
        .write_lines(&dir.join("baseline.json"), &[])
        .unwrap();
}

fn config(dir: &Path) -> RunConfig {
    RunConfig::new("integration", aoi())
        .with_partition_count(2)
        .with_degree_of_parallelism(2)
        .with_buffer_distance(50.0)
        .with_snap_tolerance(5.0)
        .with_simplify_tolerance(0.5)
        // Keep corners exact so areas can be asserted precisely.
        .with_smooth_ratio(0.0)
        .with_elimination_threshold(10.0)
        .with_baseline_path(dir.join("baseline.json"))
        .with_hardbone_path(dir.join("hardbone.json"))
        .with_backbone_path(dir.join("backbone.json"))
        .with_output_path(dir.join("result.json"))
}

#[tokio::test]
async fn test_full_run_produces_seamless_coverage() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path());

    let store = Arc::new(MemoryStore::new());
    let workflow = Workflow::new(config(dir.path()), store.clone(), CancellationToken::new());
    workflow.run().await.unwrap();

    // Every tile carries the directional flags of its existing neighbors.
    let source = store.source_by_name_or_insert("integration");
    let by_cell = |east, north| {
        store
            .tile_at(source.id, east, north)
            .expect("tile must exist")
    };
    assert!(by_cell(0, 0).status.contains(TileStatus::MERGED_EAST));
    assert!(by_cell(0, 0).status.contains(TileStatus::MERGED_NORTH));
    assert!(by_cell(1, 1).status.contains(TileStatus::MERGED_WEST));
    assert!(by_cell(1, 1).status.contains(TileStatus::MERGED_SOUTH));
    for tile in store.tiles_for_source(source.id) {
        assert!(!tile.locked);
    }

    // Consolidation converged: every record stands alone.
    for record in store.results_for_source(source.id) {
        assert!(record.completed);
        assert!(record.related_ids.is_empty());
        assert!(!record.locked);
    }

    // Area conservation: the exported polygons cover the AOI exactly.
    let exported = JsonDataset
        .read_polygons(&dir.path().join("result.json"))
        .unwrap();
    assert!(!exported.is_empty());
    let total: f64 = exported.iter().map(|p| p.unsigned_area()).sum();
    assert!(
        (total - 40_000.0).abs() < 1.0,
        "exported area {total} should match the AOI"
    );

    // The split rectangle came back as one feature.
    assert!(
        exported
            .iter()
            .any(|p| (p.unsigned_area() - 3200.0).abs() < 1.0),
        "expected the stitched rectangle in the output"
    );
}

#[tokio::test]
async fn test_rerun_resumes_without_duplicating() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path());

    let store = Arc::new(MemoryStore::new());
    let workflow = Workflow::new(config(dir.path()), store.clone(), CancellationToken::new());
    workflow.run().await.unwrap();

    let source = store.source_by_name_or_insert("integration");
    let mut ids_first: Vec<_> = store
        .results_for_source(source.id)
        .into_iter()
        .map(|r| r.id)
        .collect();
    ids_first.sort();
    let versions_first: Vec<_> = {
        let mut tiles = store.tiles_for_source(source.id);
        tiles.sort_by_key(|t| (t.east_of_origin, t.north_of_origin));
        tiles.into_iter().map(|t| t.version).collect()
    };

    // Second run over the same store and source name: a pure no-op apart
    // from rewriting the output file.
    let workflow = Workflow::new(config(dir.path()), store.clone(), CancellationToken::new());
    workflow.run().await.unwrap();

    let mut ids_second: Vec<_> = store
        .results_for_source(source.id)
        .into_iter()
        .map(|r| r.id)
        .collect();
    ids_second.sort();
    assert_eq!(ids_first, ids_second, "no resurrection, no duplication");

    let versions_second: Vec<_> = {
        let mut tiles = store.tiles_for_source(source.id);
        tiles.sort_by_key(|t| (t.east_of_origin, t.north_of_origin));
        tiles.into_iter().map(|t| t.version).collect()
    };
    assert_eq!(versions_first, versions_second, "tiles untouched on rerun");
}

#[tokio::test]
async fn test_projection_sidecar_travels_with_output() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path());
    fs::write(dir.path().join("baseline.prj"), "PROJCS[\"ETRS89\"]").unwrap();

    let store = Arc::new(MemoryStore::new());
    let workflow = Workflow::new(config(dir.path()), store, CancellationToken::new());
    workflow.run().await.unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("result.prj")).unwrap(),
        "PROJCS[\"ETRS89\"]"
    );
}

#[tokio::test]
async fn test_empty_inputs_export_empty_tiles() {
    let dir = TempDir::new().unwrap();
    JsonDataset
        .write_polygons(&dir.path().join("hardbone.json"), &[])
        .unwrap();
    JsonDataset
        .write_polygons(&dir.path().join("backbone.json"), &[])
        .unwrap();
    JsonDataset
        .write_lines(&dir.path().join("baseline.json"), &[])
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let workflow = Workflow::new(config(dir.path()), store.clone(), CancellationToken::new());
    workflow.run().await.unwrap();

    let source = store.source_by_name_or_insert("integration");
    for tile in store.tiles_for_source(source.id) {
        assert!(tile.status.contains(TileStatus::EXPORTED));
    }
    let exported = JsonDataset
        .read_polygons(&dir.path().join("result.json"))
        .unwrap();
    assert!(exported.is_empty());
}

#[tokio::test]
async fn test_per_tile_outputs_are_written() {
    let dir = TempDir::new().unwrap();
    write_inputs(dir.path());
    let tile_dir = dir.path().join("tiles");

    let store = Arc::new(MemoryStore::new());
    let config = config(dir.path()).with_tile_output_dir(&tile_dir);
    let workflow = Workflow::new(config, store, CancellationToken::new());
    workflow.run().await.unwrap();

    for (east, north) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        let path = tile_dir.join(format!("tile_{east}_{north}.json"));
        let polygons = JsonDataset.read_polygons(&path).unwrap();
        assert!(!polygons.is_empty(), "missing tile output {east},{north}");
        let area: f64 = polygons.iter().map(|p| p.unsigned_area()).sum();
        assert!((area - 10_000.0).abs() < 1.0, "tile {east},{north} coverage");
    }
}
