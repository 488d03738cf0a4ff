//! Convergent tile merge sweeps.
//!
//! Each axis is swept until no tile pair remains whose A side lacks the
//! directional merge flag. The remaining-pair count ignores lock state and
//! is the authoritative progress measure; locked pairs are simply deferred
//! to the next round. Workers race for tiles with single-row
//! compare-and-swap lock acquisitions, so two sweeps (or two processes
//! sharing a store) can run concurrently without double-merging a pair.

use super::stitch::stitch_pair;
use super::MergeError;
use crate::grid::TileGrid;
use crate::store::{SpatialStore, StoreError, TileLayers, TileRecord, TileStatus};
use geo::LineString;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pause before re-scanning when every remaining pair is locked by someone
/// else.
const LOCKED_BACKOFF: Duration = Duration::from_millis(50);

/// Which tile adjacency a sweep works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAxis {
    /// East/West neighbors. Must complete before the vertical sweep.
    Horizontal,
    /// North/South neighbors.
    Vertical,
}

impl MergeAxis {
    /// Flag set on the owning (A) tile after a successful merge.
    fn flag_a(self) -> TileStatus {
        match self {
            MergeAxis::Horizontal => TileStatus::MERGED_EAST,
            MergeAxis::Vertical => TileStatus::MERGED_NORTH,
        }
    }

    /// Flag set on the neighbor (B) tile.
    fn flag_b(self) -> TileStatus {
        match self {
            MergeAxis::Horizontal => TileStatus::MERGED_WEST,
            MergeAxis::Vertical => TileStatus::MERGED_SOUTH,
        }
    }

    fn neighbor_of(self, east: u32, north: u32) -> (u32, u32) {
        match self {
            MergeAxis::Horizontal => (east + 1, north),
            MergeAxis::Vertical => (east, north + 1),
        }
    }

    fn border(self, grid: &TileGrid, east: u32, north: u32) -> Option<LineString<f64>> {
        match self {
            MergeAxis::Horizontal => grid.east_border(east as usize, north as usize),
            MergeAxis::Vertical => grid.north_border(east as usize, north as usize),
        }
    }
}

/// Drives the merge sweeps for one source over a tile grid.
pub struct MergeSweep {
    store: Arc<dyn SpatialStore>,
    grid: TileGrid,
    source_id: Uuid,
    parallelism: usize,
    cancel: CancellationToken,
}

impl MergeSweep {
    pub fn new(
        store: Arc<dyn SpatialStore>,
        grid: TileGrid,
        source_id: Uuid,
        parallelism: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            grid,
            source_id,
            parallelism: parallelism.max(1),
            cancel,
        }
    }

    /// Sweeps one axis to convergence.
    pub async fn run(&self, axis: MergeAxis) -> Result<(), MergeError> {
        loop {
            if self.cancel.is_cancelled() {
                info!(?axis, "merge sweep cancelled");
                return Ok(());
            }

            let remaining = self.remaining_pairs(axis);
            if remaining.is_empty() {
                info!(?axis, "merge sweep converged");
                return Ok(());
            }
            debug!(?axis, pairs = remaining.len(), "merge sweep round");

            // Re-select only currently unlocked pairs for dispatch; the rest
            // stay on the counter and come back next round.
            let ready: Vec<(TileRecord, TileRecord, LineString<f64>)> = remaining
                .into_iter()
                .filter(|(a, b, _)| !a.locked && !b.locked)
                .collect();
            if ready.is_empty() {
                tokio::time::sleep(LOCKED_BACKOFF).await;
                continue;
            }

            let semaphore = Arc::new(Semaphore::new(self.parallelism));
            let mut workers = JoinSet::new();
            for (a, b, border) in ready {
                let store = Arc::clone(&self.store);
                let semaphore = Arc::clone(&semaphore);
                workers.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| MergeError::Task(e.to_string()))?;
                    merge_pair(store, axis, a.id, b.id, border)
                });
            }
            while let Some(joined) = workers.join_next().await {
                joined.map_err(|e| MergeError::Task(e.to_string()))??;
            }
        }
    }

    /// Pairs grid-adjacent on `axis` whose A tile lacks the merge flag,
    /// regardless of lock state.
    fn remaining_pairs(&self, axis: MergeAxis) -> Vec<(TileRecord, TileRecord, LineString<f64>)> {
        let tiles = self.store.tiles_for_source(self.source_id);
        let mut pairs = Vec::new();
        for tile in &tiles {
            if tile.status.contains(axis.flag_a()) {
                continue;
            }
            let (east, north) = axis.neighbor_of(tile.east_of_origin, tile.north_of_origin);
            let Some(neighbor) = tiles
                .iter()
                .find(|t| t.east_of_origin == east && t.north_of_origin == north)
            else {
                continue;
            };
            let Some(border) = axis.border(&self.grid, tile.east_of_origin, tile.north_of_origin)
            else {
                continue;
            };
            pairs.push((tile.clone(), neighbor.clone(), border));
        }
        pairs
    }
}

/// Worker protocol for one pair. Every early return before both locks are
/// held leaves both tiles untouched.
fn merge_pair(
    store: Arc<dyn SpatialStore>,
    axis: MergeAxis,
    a_id: Uuid,
    b_id: Uuid,
    border: LineString<f64>,
) -> Result<(), MergeError> {
    // Fresh reads; the records from pair selection are stale by now.
    let (Some(a), Some(b)) = (store.tile(a_id), store.tile(b_id)) else {
        // Gone means another worker finished the job.
        return Ok(());
    };
    if a.status.contains(axis.flag_a()) || b.status.contains(axis.flag_b()) {
        return Ok(());
    }
    if a.locked || b.locked {
        return Ok(());
    }

    // Lock A, then B. Failing B releases A; a conflict means a lost race
    // and the pair comes back on the next round.
    let mut lock_a = a.clone();
    lock_a.locked = true;
    let a = match store.update_tile(lock_a) {
        Ok(tile) => tile,
        Err(StoreError::Conflict { .. }) | Err(StoreError::NotFound { .. }) => return Ok(()),
    };
    let mut lock_b = b.clone();
    lock_b.locked = true;
    let b = match store.update_tile(lock_b) {
        Ok(tile) => tile,
        Err(StoreError::Conflict { .. }) | Err(StoreError::NotFound { .. }) => {
            let mut unlock_a = a;
            unlock_a.locked = false;
            if let Err(err) = store.update_tile(unlock_a) {
                warn!(%err, "failed to release lock after losing pair race");
            }
            return Ok(());
        }
    };

    let a_layers = store.tile_layers(a.id);
    let b_layers = store.tile_layers(b.id);
    let outcome = stitch_pair(a_layers.clipped, &a_layers.buffered, b_layers.clipped, &border)?;
    debug!(
        merged = outcome.merged,
        a_east = a.east_of_origin,
        a_north = a.north_of_origin,
        ?axis,
        "tile pair stitched"
    );
    store.set_tile_layers(
        a.id,
        TileLayers {
            clipped: outcome.a_clipped,
            buffered: a_layers.buffered,
        },
    );
    store.set_tile_layers(
        b.id,
        TileLayers {
            clipped: outcome.b_clipped,
            buffered: b_layers.buffered,
        },
    );

    // Flags and unlock; we hold both locks, so conflicts here are bugs and
    // surface as errors.
    let mut done_a = a;
    done_a.status.insert(axis.flag_a());
    done_a.locked = false;
    store.update_tile(done_a)?;
    let mut done_b = b;
    done_b.status.insert(axis.flag_b());
    done_b.locked = false;
    store.update_tile(done_b)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, TileGeometry};
    use geo::{coord, polygon, Area, Rect};

    fn grid() -> TileGrid {
        TileGrid::split(
            Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 200.0, y: 200.0 }),
            2,
        )
    }

    fn tile(source_id: Uuid, east: u32, north: u32) -> TileRecord {
        TileRecord {
            id: Uuid::new_v4(),
            source_id,
            east_of_origin: east,
            north_of_origin: north,
            cell_size: 100.0,
            locked: false,
            status: TileStatus::PROCESSED,
            version: 0,
        }
    }

    fn rect_geometry(x0: f64, y0: f64, x1: f64, y1: f64) -> TileGeometry {
        TileGeometry::new(polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ])
    }

    /// Scenario: one rectangle split at the vertical border x = 100.
    fn seed_split_rectangle(store: &MemoryStore, source_id: Uuid) -> (TileRecord, TileRecord) {
        let a = tile(source_id, 0, 0);
        let b = tile(source_id, 1, 0);
        store.insert_tile(a.clone());
        store.insert_tile(b.clone());

        let a_half = rect_geometry(60.0, 20.0, 100.0, 60.0);
        let b_half = rect_geometry(100.0, 20.0, 140.0, 60.0);
        let uncut = rect_geometry(60.0, 20.0, 140.0, 60.0);
        store.set_tile_layers(
            a.id,
            TileLayers {
                clipped: vec![a_half],
                buffered: vec![uncut],
            },
        );
        store.set_tile_layers(
            b.id,
            TileLayers {
                clipped: vec![b_half.clone()],
                buffered: vec![b_half],
            },
        );
        (a, b)
    }

    #[tokio::test]
    async fn test_horizontal_sweep_merges_split_rectangle() {
        let store = Arc::new(MemoryStore::new());
        let source_id = Uuid::new_v4();
        let (a, b) = seed_split_rectangle(&store, source_id);

        let sweep = MergeSweep::new(
            store.clone(),
            grid(),
            source_id,
            2,
            CancellationToken::new(),
        );
        sweep.run(MergeAxis::Horizontal).await.unwrap();

        let a_after = store.tile(a.id).unwrap();
        let b_after = store.tile(b.id).unwrap();
        assert!(a_after.status.contains(TileStatus::MERGED_EAST));
        assert!(b_after.status.contains(TileStatus::MERGED_WEST));
        assert!(!a_after.locked);
        assert!(!b_after.locked);

        // Tile A holds the union of both halves.
        let a_layers = store.tile_layers(a.id);
        assert_eq!(a_layers.clipped.len(), 1);
        assert!((a_layers.clipped[0].polygon.unsigned_area() - 3200.0).abs() < 1e-6);

        // Tile B's half was consumed; only the mirror remains.
        let b_layers = store.tile_layers(b.id);
        assert_eq!(b_layers.clipped.len(), 1);
        assert!(b_layers.clipped[0].related_ids.contains(&a_layers.clipped[0].id));
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent_once_converged() {
        let store = Arc::new(MemoryStore::new());
        let source_id = Uuid::new_v4();
        let (a, _) = seed_split_rectangle(&store, source_id);

        let sweep = MergeSweep::new(
            store.clone(),
            grid(),
            source_id,
            2,
            CancellationToken::new(),
        );
        sweep.run(MergeAxis::Horizontal).await.unwrap();
        let version_after_first = store.tile(a.id).unwrap().version;
        let layers_after_first = store.tile_layers(a.id);

        sweep.run(MergeAxis::Horizontal).await.unwrap();
        assert_eq!(store.tile(a.id).unwrap().version, version_after_first);
        assert_eq!(store.tile_layers(a.id), layers_after_first);
    }

    #[tokio::test]
    async fn test_locked_pair_is_left_untouched() {
        let store = Arc::new(MemoryStore::new());
        let source_id = Uuid::new_v4();
        let (a, b) = seed_split_rectangle(&store, source_id);

        // Simulated concurrent worker holds the lock on A.
        let mut locked = store.tile(a.id).unwrap();
        locked.locked = true;
        store.update_tile(locked).unwrap();
        let a_before = store.tile(a.id).unwrap();
        let b_before = store.tile(b.id).unwrap();
        let a_layers_before = store.tile_layers(a.id);
        let b_layers_before = store.tile_layers(b.id);

        // The pair stays locked forever, so cancel after a moment instead of
        // waiting for convergence.
        let cancel = CancellationToken::new();
        let sweep = MergeSweep::new(store.clone(), grid(), source_id, 2, cancel.clone());
        let canceller = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                cancel.cancel();
            }
        });
        sweep.run(MergeAxis::Horizontal).await.unwrap();
        canceller.await.unwrap();

        assert_eq!(store.tile(a.id).unwrap(), a_before);
        assert_eq!(store.tile(b.id).unwrap(), b_before);
        assert_eq!(store.tile_layers(a.id), a_layers_before);
        assert_eq!(store.tile_layers(b.id), b_layers_before);
    }

    #[tokio::test]
    async fn test_vertical_sweep_sets_north_south_flags() {
        let store = Arc::new(MemoryStore::new());
        let source_id = Uuid::new_v4();
        let a = tile(source_id, 0, 0);
        let b = tile(source_id, 0, 1);
        store.insert_tile(a.clone());
        store.insert_tile(b.clone());

        let sweep = MergeSweep::new(
            store.clone(),
            grid(),
            source_id,
            1,
            CancellationToken::new(),
        );
        sweep.run(MergeAxis::Vertical).await.unwrap();

        assert!(store
            .tile(a.id)
            .unwrap()
            .status
            .contains(TileStatus::MERGED_NORTH));
        assert!(store
            .tile(b.id)
            .unwrap()
            .status
            .contains(TileStatus::MERGED_SOUTH));
    }

    #[test]
    fn test_axis_neighbor_addressing() {
        assert_eq!(MergeAxis::Horizontal.neighbor_of(1, 2), (2, 2));
        assert_eq!(MergeAxis::Vertical.neighbor_of(1, 2), (1, 3));
    }
}
