//! Run orchestration.
//!
//! One [`Workflow`] drives a complete retiling run:
//!
//! 1. partition the area of interest into a tile grid
//! 2. per-tile cleanup, bounded parallel, resumable per tile
//! 3. horizontal merge sweep, then vertical merge sweep
//! 4. copy tile geometries to the result store
//! 5. consolidation closure sweep
//! 6. final elimination pass and export
//!
//! Cancellation is cooperative and checked between phases and per tile;
//! everything already persisted stays persisted, and a rerun with the same
//! source name picks up where the cancelled run stopped.

use crate::config::RunConfig;
use crate::consolidate::{ConsolidateError, Consolidator};
use crate::dataset::{
    copy_projection_sidecar, dataset_for, DatasetError, VectorReader, VectorWriter,
};
use crate::eliminate::eliminate;
use crate::grid::{expand_rect, TileGrid};
use crate::merge::{MergeAxis, MergeError, MergeSweep};
use crate::pipeline::{run_cleanup, CleanupParams, TileInput};
use crate::store::{SpatialStore, StoreError, TileGeometry, TileLayers, TileRecord, TileStatus};
use geo::{LineString, Polygon};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Consolidate(#[from] ConsolidateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("tile task failed: {0}")]
    Task(String),
}

/// Drives one retiling run against a store.
pub struct Workflow {
    config: RunConfig,
    store: Arc<dyn SpatialStore>,
    cancel: CancellationToken,
}

impl Workflow {
    pub fn new(config: RunConfig, store: Arc<dyn SpatialStore>, cancel: CancellationToken) -> Self {
        Self {
            config,
            store,
            cancel,
        }
    }

    /// Runs all phases to completion (or to cancellation, which is not an
    /// error).
    pub async fn run(&self) -> Result<(), WorkflowError> {
        let source = self.store.source_by_name_or_insert(&self.config.source_name);
        let grid = TileGrid::split(self.config.aoi, self.config.partition_count);
        info!(
            source = %source.name,
            tiles = self.config.partition_count * self.config.partition_count,
            "starting retiling run"
        );

        let baseline: Arc<Vec<LineString<f64>>> = Arc::new(
            dataset_for(&self.config.baseline_path)?.read_lines(&self.config.baseline_path)?,
        );
        let hardbones: Arc<Vec<Polygon<f64>>> = Arc::new(
            dataset_for(&self.config.hardbone_path)?.read_polygons(&self.config.hardbone_path)?,
        );
        let backbones: Arc<Vec<Polygon<f64>>> = Arc::new(
            dataset_for(&self.config.backbone_path)?.read_polygons(&self.config.backbone_path)?,
        );
        let border = match &self.config.border_path {
            Some(path) => Some(dataset_for(path)?.read_polygons(path)?),
            None => None,
        };

        self.process_tiles(source.id, &grid, baseline, hardbones, backbones, border)
            .await?;
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let sweep = MergeSweep::new(
            Arc::clone(&self.store),
            grid.clone(),
            source.id,
            self.config.degree_of_parallelism,
            self.cancel.clone(),
        );
        sweep.run(MergeAxis::Horizontal).await?;
        sweep.run(MergeAxis::Vertical).await?;
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let consolidator = Consolidator::new(
            Arc::clone(&self.store),
            source.id,
            self.cancel.clone(),
        );
        consolidator.copy_results();
        consolidator.run().await?;
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        self.export(source.id)
    }

    /// Runs the cleanup pipeline for every tile of the grid, bounded by the
    /// configured parallelism. Tiles already processed by an earlier run
    /// are skipped.
    async fn process_tiles(
        &self,
        source_id: Uuid,
        grid: &TileGrid,
        baseline: Arc<Vec<LineString<f64>>>,
        hardbones: Arc<Vec<Polygon<f64>>>,
        backbones: Arc<Vec<Polygon<f64>>>,
        border: Option<Vec<Polygon<f64>>>,
    ) -> Result<(), WorkflowError> {
        let mut params = CleanupParams::from_config(&self.config);
        if let Some(border) = border {
            params = params.with_border(border);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.degree_of_parallelism.max(1)));
        let mut workers = JoinSet::new();

        for (east, north, rect) in grid.cells() {
            if self.cancel.is_cancelled() {
                break;
            }
            let (east, north) = (east as u32, north as u32);

            let tile = match self.store.tile_at(source_id, east, north) {
                Some(existing)
                    if existing.status.contains(TileStatus::PROCESSED)
                        || existing.status.contains(TileStatus::EXPORTED) =>
                {
                    debug!(east, north, "tile already processed, skipping");
                    continue;
                }
                Some(existing) => existing,
                None => {
                    let tile = TileRecord {
                        id: Uuid::new_v4(),
                        source_id,
                        east_of_origin: east,
                        north_of_origin: north,
                        cell_size: grid.cell_width(),
                        locked: false,
                        status: TileStatus::CREATED,
                        version: 0,
                    };
                    self.store.insert_tile(tile.clone());
                    tile
                }
            };

            let work_rect = expand_rect(rect, self.config.buffer_distance);
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let baseline = Arc::clone(&baseline);
            let hardbones = Arc::clone(&hardbones);
            let backbones = Arc::clone(&backbones);
            let params = params.clone();
            let tile_output_dir = self.config.tile_output_dir.clone();

            workers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| WorkflowError::Task(e.to_string()))?;

                let input = TileInput {
                    baseline: crate::geometry::clip_lines_to_rect(&baseline, work_rect),
                    hardbones: crate::geometry::clip_polygons_to_rect(&hardbones, work_rect),
                    backbones: crate::geometry::clip_polygons_to_rect(&backbones, work_rect),
                };

                let mut done = tile;
                match run_cleanup(input, rect, work_rect, &params) {
                    None => {
                        done.status.insert(TileStatus::EXPORTED);
                        debug!(east, north, "empty tile exported");
                    }
                    Some(output) => {
                        if let Some(dir) = &tile_output_dir {
                            write_tile_output(dir, east, north, &output.clipped)?;
                        }
                        let layers = TileLayers {
                            clipped: output.clipped.into_iter().map(TileGeometry::new).collect(),
                            buffered: output.buffered.into_iter().map(TileGeometry::new).collect(),
                        };
                        debug!(
                            east,
                            north,
                            clipped = layers.clipped.len(),
                            buffered = layers.buffered.len(),
                            "tile processed"
                        );
                        store.set_tile_layers(done.id, layers);
                        done.status.insert(TileStatus::PROCESSED);
                    }
                }
                store.update_tile(done)?;
                Ok::<(), WorkflowError>(())
            });
        }

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| WorkflowError::Task(e.to_string()))??;
        }
        Ok(())
    }

    /// Final elimination pass over the consolidated results, then export.
    fn export(&self, source_id: Uuid) -> Result<(), WorkflowError> {
        let polygons: Vec<Polygon<f64>> = self
            .store
            .results_for_source(source_id)
            .into_iter()
            .map(|record| record.polygon)
            .collect();
        let polygons = eliminate(polygons, self.config.elimination_threshold);

        dataset_for(&self.config.output_path)?
            .write_polygons(&self.config.output_path, &polygons)?;
        copy_projection_sidecar(&self.config.baseline_path, &self.config.output_path)?;
        info!(
            polygons = polygons.len(),
            output = %self.config.output_path.display(),
            "run complete"
        );
        Ok(())
    }
}

fn write_tile_output(
    dir: &PathBuf,
    east: u32,
    north: u32,
    clipped: &[Polygon<f64>],
) -> Result<(), WorkflowError> {
    let path = dir.join(format!("tile_{east}_{north}.json"));
    dataset_for(&path)?.write_polygons(&path, clipped)?;
    Ok(())
}
