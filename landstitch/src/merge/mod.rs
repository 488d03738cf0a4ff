//! Cross-tile boundary merging.
//!
//! The sweep machinery ([`sweep`]) decides which tile pairs to merge and
//! under what locking protocol; the stitching itself ([`stitch`]) is pure
//! geometry over the two tiles' working sets.

mod stitch;
mod sweep;

pub use stitch::{stitch_pair, StitchOutcome};
pub use sweep::{MergeAxis, MergeSweep};

use crate::geometry::GeometryError;
use crate::store::StoreError;
use thiserror::Error;

/// Failures of the merge phase.
///
/// Lock conflicts never appear here: those are deferrals handled inside the
/// sweep. What does appear is corrupt topology or a store that rejects a
/// write while the worker holds the lock.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("merge task failed: {0}")]
    Task(String),
}
