//! Landstitch - retiling and topological reconciliation for vector land cover
//!
//! This library cuts an area of interest into a grid of tiles, cleans and
//! vectorizes each tile independently, then stitches the tile outputs back
//! into a single seamless, non-overlapping polygon layer.
//!
//! # High-Level API
//!
//! The [`workflow`] module drives the whole run:
//!
//! ```ignore
//! use landstitch::config::RunConfig;
//! use landstitch::store::MemoryStore;
//! use landstitch::workflow::Workflow;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = RunConfig::default().with_partition_count(4);
//! let store = Arc::new(MemoryStore::new());
//! let workflow = Workflow::new(config, store, CancellationToken::new());
//! workflow.run().await?;
//! ```
//!
//! # Pipeline
//!
//! ```text
//! partition AOI → per-tile cleanup (parallel) → horizontal merge sweep
//!     → vertical merge sweep → copy to result store → consolidation sweep
//!     → final elimination → export
//! ```
//!
//! Tiles are processed concurrently and reconciled under optimistic locking:
//! workers never block on each other, they skip contended rows and retry on
//! the next sweep. Convergence is guaranteed by monotone status flags and a
//! relation graph whose edge count only shrinks.

pub mod config;
pub mod consolidate;
pub mod dataset;
pub mod eliminate;
pub mod geometry;
pub mod grid;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod stage;
pub mod store;
pub mod workflow;

/// Version of the landstitch library and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
