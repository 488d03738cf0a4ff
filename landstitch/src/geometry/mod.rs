//! Geometry engine adapter.
//!
//! Thin adapters over the [`geo`] computational-geometry kernels and the
//! [`rstar`] spatial index, shaped for the tile cleanup and stitching code:
//!
//! - boolean operations with defensive error handling ([`ops`])
//! - line dissolve into maximal connected strings ([`dissolve`])
//! - spatial-index-batched linework difference ([`difference`])
//! - Chaikin corner-cutting smoothing ([`smooth`])
//! - endpoint snapping to a reference vertex cloud ([`snap`])
//! - snap-round noding at a fixed precision grid ([`node`])
//! - polygonization of a noded line network ([`polygonize`])
//!
//! The robust kernels themselves (DE-9IM relate, boolean overlay,
//! Douglas-Peucker simplification, distance queries) come from `geo`; this
//! module only composes them and owns the fallback policy for numerically
//! degenerate inputs.

mod difference;
mod dissolve;
mod node;
mod ops;
mod polygonize;
mod smooth;
mod snap;

pub use difference::difference_lines;
pub use dissolve::dissolve_lines;
pub use node::snap_round_node;
pub use ops::{
    boundary_interior_is_curve, clip_lines_to_rect, clip_polygons_to_polygons,
    clip_polygons_to_rect, explode_segments,
    exposure_is_curve, interior_interior_is_curve, lines_bounding_rect, overlap_length,
    polygon_boundaries, shared_border, shared_segments, total_length, try_union, try_union_many,
    SegmentIndex,
};
pub use polygonize::polygonize;
pub use smooth::chaikin_smooth;
pub use snap::snap_endpoints;

use thiserror::Error;

/// Errors surfaced by geometry operations.
///
/// Degenerate boolean operations are expected on numerically fragile input
/// and are handled defensively by callers (the pairing is left unmerged).
/// An empty shared border after a positive crossing test is not: it means
/// the upstream pipeline produced corrupt topology.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// A boolean operation failed on numerically ill-formed input.
    #[error("degenerate boolean operation: {0}")]
    Degenerate(String),

    /// A topological predicate claimed a border crossing but the computed
    /// intersection was empty.
    #[error("boundary crossing reported but computed shared border is empty")]
    EmptySharedBorder,
}
