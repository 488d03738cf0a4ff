use thiserror::Error;
use uuid::Uuid;

/// Store failures.
///
/// A version conflict is an expected outcome under concurrent sweeps: the
/// caller backs off and the row is retried on a later round.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The row changed since it was read; the update was not applied.
    #[error("version conflict on record {id}")]
    Conflict { id: Uuid },

    /// No row with this id exists.
    #[error("record {id} not found")]
    NotFound { id: Uuid },
}
