//! Row-versioned record store.
//!
//! Every mutable row carries a `version` counter; updates are
//! compare-and-swap on the version the caller read, and a mismatch comes
//! back as [`StoreError::Conflict`] for the caller to defer. The store is
//! behind the [`SpatialStore`] trait so the sweeps can run against the
//! in-memory implementation in tests and against any future backend without
//! change.

mod entities;
mod error;
mod memory;

pub use entities::{
    ResultRecord, SourceRecord, TileGeometry, TileLayers, TileRecord, TileStatus,
};
pub use error::StoreError;
pub use memory::MemoryStore;

use uuid::Uuid;

/// Record store seam used by the pipeline, the merge sweeps and the
/// consolidation phase.
pub trait SpatialStore: Send + Sync {
    /// Finds a source by name, creating it when absent. Repeated calls with
    /// the same name return the same record, which is what makes reruns
    /// resume instead of duplicating work.
    fn source_by_name_or_insert(&self, name: &str) -> SourceRecord;

    fn insert_tile(&self, tile: TileRecord);

    fn tile(&self, id: Uuid) -> Option<TileRecord>;

    /// The tile at a grid address, if one was created.
    fn tile_at(&self, source_id: Uuid, east: u32, north: u32) -> Option<TileRecord>;

    fn tiles_for_source(&self, source_id: Uuid) -> Vec<TileRecord>;

    /// Compare-and-swap update keyed on `tile.version`. On success the
    /// stored version is bumped and the stored row returned.
    fn update_tile(&self, tile: TileRecord) -> Result<TileRecord, StoreError>;

    /// Replaces both geometry sets of a tile.
    fn set_tile_layers(&self, tile_id: Uuid, layers: TileLayers);

    fn tile_layers(&self, tile_id: Uuid) -> TileLayers;

    fn has_results(&self, source_id: Uuid) -> bool;

    fn insert_result(&self, result: ResultRecord);

    fn result(&self, id: Uuid) -> Option<ResultRecord>;

    fn results_for_source(&self, source_id: Uuid) -> Vec<ResultRecord>;

    /// Results of a source not yet marked `completed`.
    fn incomplete_results(&self, source_id: Uuid) -> Vec<ResultRecord>;

    /// Results of a source whose `related_ids` contain `id` (reverse
    /// references, used to close the relation graph from both directions).
    fn results_referencing(&self, source_id: Uuid, id: Uuid) -> Vec<ResultRecord>;

    /// Compare-and-swap update keyed on `result.version`.
    fn update_result(&self, result: ResultRecord) -> Result<ResultRecord, StoreError>;

    fn delete_result(&self, id: Uuid) -> Result<(), StoreError>;
}
