//! Per-tile cleanup pipeline.
//!
//! Takes the raw reference layers of one tile, already clipped to the
//! tile's buffered working window, and produces the cleaned polygon
//! coverage for that window:
//!
//! ```text
//! hardbone/backbone polygons
//!        │ boundaries + dissolve
//!        ▼
//! backbone − hardbone (index-batched line difference)
//!        │ combine + dissolve
//!        ▼
//! simplify → smooth → snap endpoints to baseline
//!        │ merge baseline + working-window frame
//!        ▼
//! snap-round node → polygonize → optional outer-border clip
//!        │ elimination (protected, small-cluster, general)
//!        ▼
//! buffered coverage ──clip to tile rect──▶ clipped coverage
//! ```
//!
//! Every expensive step is a lazy [`Stage`], so each runs exactly once no
//! matter how many downstream stages consume it. A tile with no hardbone
//! polygons short-circuits to "nothing to do"; the caller marks it exported.

use crate::config::RunConfig;
use crate::eliminate::{eliminate, eliminate_merge_small, eliminate_protected};
use crate::geometry::{
    chaikin_smooth, clip_polygons_to_polygons, clip_polygons_to_rect, difference_lines,
    dissolve_lines, polygon_boundaries, polygonize, snap_endpoints, snap_round_node,
};
use crate::stage::Stage;
use geo::{LineString, Polygon, Rect, Simplify};
use std::sync::Arc;
use tracing::debug;

/// Reference layers of one tile, clipped to its buffered working window.
#[derive(Debug, Clone, Default)]
pub struct TileInput {
    pub baseline: Vec<LineString<f64>>,
    pub hardbones: Vec<Polygon<f64>>,
    pub backbones: Vec<Polygon<f64>>,
}

/// Tunable knobs of the cleanup recipe.
#[derive(Debug, Clone)]
pub struct CleanupParams {
    pub simplify_tolerance: f64,
    pub smooth_ratio: f64,
    pub snap_tolerance: f64,
    pub precision_scale: f64,
    pub elimination_threshold: f64,
    /// Study-area border to clip the polygonized result against.
    pub border: Option<Vec<Polygon<f64>>>,
}

impl CleanupParams {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            simplify_tolerance: config.simplify_tolerance,
            smooth_ratio: config.smooth_ratio,
            snap_tolerance: config.snap_tolerance,
            precision_scale: config.precision_scale,
            elimination_threshold: config.elimination_threshold,
            border: None,
        }
    }

    pub fn with_border(mut self, border: Vec<Polygon<f64>>) -> Self {
        self.border = Some(border);
        self
    }
}

/// Both persisted variants of a processed tile.
#[derive(Debug, Clone)]
pub struct CleanupOutput {
    /// Confined to the tile rectangle; the authoritative output.
    pub clipped: Vec<Polygon<f64>>,
    /// Confined to the buffered working window; merge context only.
    pub buffered: Vec<Polygon<f64>>,
}

/// Runs the cleanup recipe for one tile.
///
/// `tile_rect` is the tile's own cell; `work_rect` is the cell expanded by
/// the buffer distance (the window the inputs were clipped to). Returns
/// `None` when the tile has no hardbone input, which is the empty-tile
/// short circuit, not an error.
pub fn run_cleanup(
    input: TileInput,
    tile_rect: Rect<f64>,
    work_rect: Rect<f64>,
    params: &CleanupParams,
) -> Option<CleanupOutput> {
    if input.hardbones.is_empty() {
        debug!("tile has no hardbone polygons, short-circuiting");
        return None;
    }

    let TileInput {
        baseline,
        hardbones,
        backbones,
    } = input;
    let protected = baseline.clone();
    let CleanupParams {
        simplify_tolerance,
        smooth_ratio,
        snap_tolerance,
        precision_scale,
        elimination_threshold,
        ref border,
    } = *params;

    let hardbone_lines = Stage::new("hardbone-lines", move || {
        dissolve_lines(&polygon_boundaries(&hardbones))
    });
    let backbone_lines = Stage::new("backbone-lines", move || {
        dissolve_lines(&polygon_boundaries(&backbones))
    });

    let difference = {
        let hardbone_lines = Arc::clone(&hardbone_lines);
        backbone_lines.chain("difference", move |backbone| {
            difference_lines(backbone, &hardbone_lines.execute())
        })
    };

    let combined = {
        let hardbone_lines = Arc::clone(&hardbone_lines);
        difference.chain("combine", move |difference| {
            let mut lines = hardbone_lines.execute().to_vec();
            lines.extend_from_slice(difference);
            dissolve_lines(&lines)
        })
    };

    let simplified = combined.chain("simplify", move |lines| {
        lines
            .iter()
            .map(|ls| ls.simplify(&simplify_tolerance))
            .collect()
    });
    let smoothed = simplified.chain("smooth", move |lines| chaikin_smooth(lines, smooth_ratio));

    let snapped = {
        let baseline = baseline.clone();
        smoothed.chain("snap-to-baseline", move |lines| {
            snap_endpoints(lines, &baseline, snap_tolerance)
        })
    };

    // The working-window frame closes the faces cut open at the window
    // edge, so polygonization covers the whole window.
    let merged = snapped.chain("merge-baseline", move |lines| {
        let mut all = lines.to_vec();
        all.extend(baseline);
        all.push(work_rect.to_polygon().exterior().clone());
        all
    });

    let noded = merged.chain("node", move |lines| snap_round_node(lines, precision_scale));
    let faces = noded.chain("polygonize", |lines| polygonize(lines));

    let mut polygons = faces.execute().to_vec();
    if let Some(border) = border {
        polygons = clip_polygons_to_polygons(&polygons, border);
    }

    let polygons = eliminate_protected(polygons, elimination_threshold, &protected);
    let polygons = eliminate_merge_small(polygons, elimination_threshold);
    let polygons = eliminate(polygons, elimination_threshold);

    let clipped = clip_polygons_to_rect(&polygons, tile_rect);
    Some(CleanupOutput {
        clipped,
        buffered: polygons,
    })
}
