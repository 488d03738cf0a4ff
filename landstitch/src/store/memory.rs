//! In-memory store backed by concurrent maps.

use super::entities::{ResultRecord, SourceRecord, TileLayers, TileRecord};
use super::error::StoreError;
use super::SpatialStore;
use dashmap::DashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Concurrent in-memory implementation of [`SpatialStore`].
///
/// Each row map shards its locks, so compare-and-swap updates on distinct
/// rows never contend. Source creation goes through one mutex to keep
/// insert-if-absent atomic across concurrent callers.
#[derive(Default)]
pub struct MemoryStore {
    sources: Mutex<Vec<SourceRecord>>,
    tiles: DashMap<Uuid, TileRecord>,
    layers: DashMap<Uuid, TileLayers>,
    results: DashMap<Uuid, ResultRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpatialStore for MemoryStore {
    fn source_by_name_or_insert(&self, name: &str) -> SourceRecord {
        let mut sources = self.sources.lock().expect("source mutex poisoned");
        if let Some(existing) = sources.iter().find(|s| s.name == name) {
            return existing.clone();
        }
        let source = SourceRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        sources.push(source.clone());
        source
    }

    fn insert_tile(&self, tile: TileRecord) {
        self.tiles.insert(tile.id, tile);
    }

    fn tile(&self, id: Uuid) -> Option<TileRecord> {
        self.tiles.get(&id).map(|t| t.clone())
    }

    fn tile_at(&self, source_id: Uuid, east: u32, north: u32) -> Option<TileRecord> {
        self.tiles
            .iter()
            .find(|t| {
                t.source_id == source_id && t.east_of_origin == east && t.north_of_origin == north
            })
            .map(|t| t.clone())
    }

    fn tiles_for_source(&self, source_id: Uuid) -> Vec<TileRecord> {
        self.tiles
            .iter()
            .filter(|t| t.source_id == source_id)
            .map(|t| t.clone())
            .collect()
    }

    fn update_tile(&self, tile: TileRecord) -> Result<TileRecord, StoreError> {
        let mut stored = self
            .tiles
            .get_mut(&tile.id)
            .ok_or(StoreError::NotFound { id: tile.id })?;
        if stored.version != tile.version {
            return Err(StoreError::Conflict { id: tile.id });
        }
        let mut updated = tile;
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    fn set_tile_layers(&self, tile_id: Uuid, layers: TileLayers) {
        self.layers.insert(tile_id, layers);
    }

    fn tile_layers(&self, tile_id: Uuid) -> TileLayers {
        self.layers
            .get(&tile_id)
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    fn has_results(&self, source_id: Uuid) -> bool {
        self.results.iter().any(|r| r.source_id == source_id)
    }

    fn insert_result(&self, result: ResultRecord) {
        self.results.insert(result.id, result);
    }

    fn result(&self, id: Uuid) -> Option<ResultRecord> {
        self.results.get(&id).map(|r| r.clone())
    }

    fn results_for_source(&self, source_id: Uuid) -> Vec<ResultRecord> {
        self.results
            .iter()
            .filter(|r| r.source_id == source_id)
            .map(|r| r.clone())
            .collect()
    }

    fn incomplete_results(&self, source_id: Uuid) -> Vec<ResultRecord> {
        self.results
            .iter()
            .filter(|r| r.source_id == source_id && !r.completed)
            .map(|r| r.clone())
            .collect()
    }

    fn results_referencing(&self, source_id: Uuid, id: Uuid) -> Vec<ResultRecord> {
        self.results
            .iter()
            .filter(|r| r.source_id == source_id && r.related_ids.contains(&id))
            .map(|r| r.clone())
            .collect()
    }

    fn update_result(&self, result: ResultRecord) -> Result<ResultRecord, StoreError> {
        let mut stored = self
            .results
            .get_mut(&result.id)
            .ok_or(StoreError::NotFound { id: result.id })?;
        if stored.version != result.version {
            return Err(StoreError::Conflict { id: result.id });
        }
        let mut updated = result;
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    fn delete_result(&self, id: Uuid) -> Result<(), StoreError> {
        self.results
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TileStatus;
    use geo::polygon;
    use std::collections::BTreeSet;

    fn sample_tile(source_id: Uuid) -> TileRecord {
        TileRecord {
            id: Uuid::new_v4(),
            source_id,
            east_of_origin: 0,
            north_of_origin: 0,
            cell_size: 50.0,
            locked: false,
            status: TileStatus::CREATED,
            version: 0,
        }
    }

    fn sample_result(source_id: Uuid) -> ResultRecord {
        ResultRecord {
            id: Uuid::new_v4(),
            source_id,
            polygon: polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)],
            related_ids: BTreeSet::new(),
            locked: false,
            completed: false,
            version: 0,
        }
    }

    #[test]
    fn test_source_insert_is_idempotent_by_name() {
        let store = MemoryStore::new();
        let first = store.source_by_name_or_insert("clc2024");
        let second = store.source_by_name_or_insert("clc2024");
        assert_eq!(first.id, second.id);
        assert_ne!(first.id, store.source_by_name_or_insert("clc2030").id);
    }

    #[test]
    fn test_tile_update_bumps_version() {
        let store = MemoryStore::new();
        let tile = sample_tile(Uuid::new_v4());
        store.insert_tile(tile.clone());

        let mut change = tile.clone();
        change.locked = true;
        let updated = store.update_tile(change).unwrap();
        assert_eq!(updated.version, 1);
        assert!(store.tile(tile.id).unwrap().locked);
    }

    #[test]
    fn test_stale_tile_update_conflicts() {
        let store = MemoryStore::new();
        let tile = sample_tile(Uuid::new_v4());
        store.insert_tile(tile.clone());

        let mut winner = tile.clone();
        winner.locked = true;
        store.update_tile(winner).unwrap();

        // Same original version again: stale.
        let mut loser = tile.clone();
        loser.status.insert(TileStatus::PROCESSED);
        assert_eq!(
            store.update_tile(loser),
            Err(StoreError::Conflict { id: tile.id })
        );
        // The losing write left no trace.
        assert!(!store.tile(tile.id).unwrap().status.contains(TileStatus::PROCESSED));
    }

    #[test]
    fn test_deleted_result_stays_deleted() {
        let store = MemoryStore::new();
        let result = sample_result(Uuid::new_v4());
        store.insert_result(result.clone());
        store.delete_result(result.id).unwrap();

        assert_eq!(
            store.update_result(result.clone()),
            Err(StoreError::NotFound { id: result.id })
        );
        assert!(store.result(result.id).is_none());
    }

    #[test]
    fn test_reverse_reference_lookup() {
        let store = MemoryStore::new();
        let source_id = Uuid::new_v4();
        let target = sample_result(source_id);
        let mut referrer = sample_result(source_id);
        referrer.related_ids.insert(target.id);
        store.insert_result(target.clone());
        store.insert_result(referrer.clone());

        let referencing = store.results_referencing(source_id, target.id);
        assert_eq!(referencing.len(), 1);
        assert_eq!(referencing[0].id, referrer.id);
    }

    #[test]
    fn test_incomplete_filter() {
        let store = MemoryStore::new();
        let source_id = Uuid::new_v4();
        let open = sample_result(source_id);
        let mut done = sample_result(source_id);
        done.completed = true;
        store.insert_result(open.clone());
        store.insert_result(done);

        let incomplete = store.incomplete_results(source_id);
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].id, open.id);
    }

    #[test]
    fn test_tile_layers_roundtrip() {
        let store = MemoryStore::new();
        let tile_id = Uuid::new_v4();
        assert!(store.tile_layers(tile_id).clipped.is_empty());

        let geometry = crate::store::TileGeometry::new(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ]);
        store.set_tile_layers(
            tile_id,
            TileLayers {
                clipped: vec![geometry.clone()],
                buffered: vec![geometry],
            },
        );
        assert_eq!(store.tile_layers(tile_id).clipped.len(), 1);
    }
}
