//! Per-tile processing.

mod cleanup;

pub use cleanup::{run_cleanup, CleanupOutput, CleanupParams, TileInput};
