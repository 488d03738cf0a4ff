//! Result consolidation: relation-graph closure across all tiles.
//!
//! After the merge sweeps every logical feature may exist as several
//! physical records linked by `related_ids` (the merged shape plus its
//! mirror placeholders, possibly chained across tile corners). This phase
//! copies every tile geometry into the result store, then repeatedly
//! absorbs related records into each other until every record stands alone
//! and is marked `completed`.
//!
//! Termination is guaranteed because relation edges are only ever consumed:
//! an absorbed record is deleted, and a degenerate union removes the edge
//! from both sides instead of merging.

use crate::store::{ResultRecord, SpatialStore, StoreError};
use crate::geometry::try_union;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Backlog size above which records are processed eight at a time. Below
/// it, one at a time: wide batches on a small backlog mostly fight over
/// locks for the same relation clusters.
const WIDE_BATCH_BACKLOG: usize = 64;
const WIDE_BATCH: usize = 8;

#[derive(Debug, Error)]
pub enum ConsolidateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("consolidation task failed: {0}")]
    Task(String),
}

/// Drives consolidation for one source.
pub struct Consolidator {
    store: Arc<dyn SpatialStore>,
    source_id: Uuid,
    cancel: CancellationToken,
}

impl Consolidator {
    pub fn new(store: Arc<dyn SpatialStore>, source_id: Uuid, cancel: CancellationToken) -> Self {
        Self {
            store,
            source_id,
            cancel,
        }
    }

    /// Copies every clipped tile geometry into the result store.
    ///
    /// A source that already has results keeps them untouched, so an
    /// interrupted run resumes instead of duplicating rows.
    pub fn copy_results(&self) {
        if self.store.has_results(self.source_id) {
            info!("results already present, skipping copy");
            return;
        }
        let mut copied = 0usize;
        for tile in self.store.tiles_for_source(self.source_id) {
            for geometry in self.store.tile_layers(tile.id).clipped {
                self.store
                    .insert_result(ResultRecord::from_tile_geometry(self.source_id, &geometry));
                copied += 1;
            }
        }
        info!(copied, "tile geometries copied to result store");
    }

    /// Sweeps until every result record is `completed`.
    pub async fn run(&self) -> Result<(), ConsolidateError> {
        loop {
            if self.cancel.is_cancelled() {
                info!("consolidation cancelled");
                return Ok(());
            }

            let backlog = self.store.incomplete_results(self.source_id);
            if backlog.is_empty() {
                info!("consolidation converged");
                return Ok(());
            }
            let width = if backlog.len() > WIDE_BATCH_BACKLOG {
                WIDE_BATCH
            } else {
                1
            };
            debug!(backlog = backlog.len(), width, "consolidation round");

            let semaphore = Arc::new(Semaphore::new(width));
            let mut workers = JoinSet::new();
            for record in backlog {
                let store = Arc::clone(&self.store);
                let semaphore = Arc::clone(&semaphore);
                let source_id = self.source_id;
                workers.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| ConsolidateError::Task(e.to_string()))?;
                    process_record(store, source_id, record.id)
                });
            }
            while let Some(joined) = workers.join_next().await {
                joined.map_err(|e| ConsolidateError::Task(e.to_string()))??;
            }

            if self.store.incomplete_results(self.source_id).is_empty() {
                continue;
            }
            // Deferred records spin here until their locks clear; yield so a
            // cancel or an external unlock can land.
            tokio::task::yield_now().await;
        }
    }
}

/// Closes the relation graph around one record.
fn process_record(
    store: Arc<dyn SpatialStore>,
    source_id: Uuid,
    id: Uuid,
) -> Result<(), ConsolidateError> {
    let Some(record) = store.result(id) else {
        // Absorbed by another worker since selection: a successful no-op.
        return Ok(());
    };
    if record.completed {
        return Ok(());
    }
    if record.locked {
        return Ok(());
    }

    let mut lock = record;
    lock.locked = true;
    let mut record = match store.update_result(lock) {
        Ok(record) => record,
        Err(StoreError::Conflict { .. }) | Err(StoreError::NotFound { .. }) => return Ok(()),
    };

    let mut deferred = false;
    loop {
        let extended = extended_relations(store.as_ref(), source_id, &record);
        let mut progressed = false;

        for other_id in extended {
            let Some(other) = store.result(other_id) else {
                // Already absorbed elsewhere; the forward edge, if any, is
                // resolved.
                if record.related_ids.remove(&other_id) {
                    record = store.update_result(record)?;
                }
                continue;
            };
            if other.locked {
                deferred = true;
                continue;
            }
            let mut lock_other = other;
            lock_other.locked = true;
            let other = match store.update_result(lock_other) {
                Ok(other) => other,
                Err(StoreError::Conflict { .. }) | Err(StoreError::NotFound { .. }) => {
                    deferred = true;
                    continue;
                }
            };

            match try_union(&record.polygon, &other.polygon) {
                Ok(polygon) => {
                    record.polygon = polygon;
                    record.related_ids.remove(&other.id);
                    for &carried in &other.related_ids {
                        if carried != record.id {
                            record.related_ids.insert(carried);
                        }
                    }
                    record = store.update_result(record)?;
                    store.delete_result(other.id)?;
                    progressed = true;
                }
                Err(err) => {
                    // Drop the edge from both sides so the graph still
                    // shrinks; both shapes survive.
                    warn!(%err, "degenerate consolidation union, keeping both records");
                    record.related_ids.remove(&other.id);
                    record = store.update_result(record)?;
                    let mut release = other;
                    release.related_ids.remove(&record.id);
                    release.locked = false;
                    store.update_result(release)?;
                }
            }
        }

        if !progressed {
            break;
        }
    }

    record.locked = false;
    record.completed = !deferred;
    store.update_result(record)?;
    Ok(())
}

/// Forward relations plus reverse references, minus self.
fn extended_relations(
    store: &dyn SpatialStore,
    source_id: Uuid,
    record: &ResultRecord,
) -> BTreeSet<Uuid> {
    let mut extended = record.related_ids.clone();
    for referrer in store.results_referencing(source_id, record.id) {
        extended.insert(referrer.id);
    }
    extended.remove(&record.id);
    extended
}
