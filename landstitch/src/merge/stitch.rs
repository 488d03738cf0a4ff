//! Boundary stitching between two adjacent tiles.
//!
//! Tile A owns the merge: polygons of A that genuinely cross the shared
//! border are unioned with their continuations from tile B, the merged
//! shape stays in A, and B receives a placeholder mirroring the merged
//! shape with symmetric back-references. Consolidation later collapses the
//! two halves into one logical feature.

use crate::geometry::{
    boundary_interior_is_curve, exposure_is_curve, explode_segments, shared_segments,
    try_union_many, GeometryError,
};
use crate::store::TileGeometry;
use geo::{BooleanOps, Contains, InteriorPoint, Intersects, LineString, MultiLineString, Polygon};
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};
use uuid::Uuid;

/// Result of stitching one tile pair.
pub struct StitchOutcome {
    /// Tile A's clipped set with merged shapes in place.
    pub a_clipped: Vec<TileGeometry>,
    /// Tile B's clipped set with consumed polygons removed and mirror
    /// placeholders added.
    pub b_clipped: Vec<TileGeometry>,
    /// Number of merges performed.
    pub merged: usize,
}

/// Stitches the clipped polygons of tile A across `border` with their
/// continuations in tile B.
///
/// `a_buffered` supplies the uncut counterparts that reveal where an A
/// polygon really continues past the border as opposed to merely ending on
/// it.
///
/// # Errors
///
/// Returns [`GeometryError::EmptySharedBorder`] when a polygon reports a
/// 1-dimensional border crossing but the computed shared segments are
/// empty. That means corrupt upstream topology and fails the sweep fast.
pub fn stitch_pair(
    a_clipped: Vec<TileGeometry>,
    a_buffered: &[TileGeometry],
    b_clipped: Vec<TileGeometry>,
    border: &LineString<f64>,
) -> Result<StitchOutcome, GeometryError> {
    let border_segments = explode_segments(std::slice::from_ref(border));

    let mut a_result: Vec<TileGeometry> = Vec::new();
    // Ids in `a_result` produced by a merge in this pass; later polygons may
    // match them as continuations and absorb them.
    let mut merged_ids: BTreeSet<Uuid> = BTreeSet::new();
    let mut b_remaining = b_clipped;
    let mut merged_count = 0usize;

    for geometry in a_clipped {
        if !boundary_interior_is_curve(&geometry.polygon, border) {
            a_result.push(geometry);
            continue;
        }

        // Invariant check: a claimed crossing must produce shared segments.
        let own_segments =
            explode_segments(&crate::geometry::polygon_boundaries(std::slice::from_ref(
                &geometry.polygon,
            )));
        if shared_segments(&own_segments, &border_segments).is_empty() {
            return Err(GeometryError::EmptySharedBorder);
        }

        // The uncut counterpart tells a through-going polygon apart from one
        // that legitimately ends at the border.
        let Some(interior) = geometry.polygon.interior_point() else {
            a_result.push(geometry);
            continue;
        };
        let Some(counterpart) = a_buffered
            .iter()
            .find(|candidate| candidate.polygon.contains(&interior))
        else {
            debug!("no buffered counterpart, polygon terminates at border");
            a_result.push(geometry);
            continue;
        };

        let exposures = match border_exposures(&counterpart.polygon, border) {
            Some(exposures) => exposures,
            None => {
                warn!("degenerate border clip, leaving polygon unmerged");
                a_result.push(geometry);
                continue;
            }
        };
        if exposures.is_empty() {
            // The counterpart only grazes the border.
            a_result.push(geometry);
            continue;
        }

        // Continuations: B polygons and shapes already merged in this pass
        // whose boundary runs along an exposure sub-segment.
        let crosses = |polygon: &Polygon<f64>| {
            exposures
                .iter()
                .any(|segment| boundary_interior_is_curve(polygon, segment))
        };
        let b_matches: Vec<usize> = b_remaining
            .iter()
            .enumerate()
            .filter(|(_, candidate)| {
                candidate.polygon.intersects(border) && crosses(&candidate.polygon)
            })
            .map(|(index, _)| index)
            .collect();
        let a_matches: Vec<usize> = a_result
            .iter()
            .enumerate()
            .filter(|(_, candidate)| merged_ids.contains(&candidate.id) && crosses(&candidate.polygon))
            .map(|(index, _)| index)
            .collect();

        if b_matches.is_empty() && a_matches.is_empty() {
            a_result.push(geometry);
            continue;
        }

        let continuations: Vec<Polygon<f64>> = b_matches
            .iter()
            .map(|&index| b_remaining[index].polygon.clone())
            .chain(a_matches.iter().map(|&index| a_result[index].polygon.clone()))
            .collect();

        match try_union_many(&geometry.polygon, &continuations) {
            Err(err) => {
                // Leave every participant exactly where it was.
                warn!(%err, "degenerate stitch union, leaving pairing unmerged");
                a_result.push(geometry);
            }
            Ok(polygon) => {
                let mut related = geometry.related_ids.clone();
                for &index in b_matches.iter() {
                    related.append(&mut b_remaining[index].related_ids.clone());
                }
                for &index in a_matches.iter() {
                    related.append(&mut a_result[index].related_ids.clone());
                }

                // Remove consumed polygons, highest index first.
                let mut b_sorted = b_matches;
                b_sorted.sort_unstable_by(|a, b| b.cmp(a));
                for index in b_sorted {
                    b_remaining.remove(index);
                }
                let mut a_sorted = a_matches;
                a_sorted.sort_unstable_by(|a, b| b.cmp(a));
                for index in a_sorted {
                    let absorbed = a_result.remove(index);
                    merged_ids.remove(&absorbed.id);
                }

                let mirror_id = Uuid::new_v4();
                related.insert(mirror_id);
                related.remove(&geometry.id);

                let mirror = TileGeometry {
                    id: mirror_id,
                    polygon: polygon.clone(),
                    related_ids: BTreeSet::from([geometry.id]),
                };
                b_remaining.push(mirror);

                merged_ids.insert(geometry.id);
                a_result.push(TileGeometry {
                    id: geometry.id,
                    polygon,
                    related_ids: related,
                });
                merged_count += 1;
            }
        }
    }

    Ok(StitchOutcome {
        a_clipped: a_result,
        b_clipped: b_remaining,
        merged: merged_count,
    })
}

/// Sub-segments of `border` inside `counterpart` that are genuine
/// exposures. `None` when the overlay is degenerate.
fn border_exposures(
    counterpart: &Polygon<f64>,
    border: &LineString<f64>,
) -> Option<Vec<LineString<f64>>> {
    let multi = MultiLineString::new(vec![border.clone()]);
    let inside = catch_unwind(AssertUnwindSafe(|| counterpart.clip(&multi, false))).ok()?;
    Some(
        inside
            .into_iter()
            .filter(|segment| segment.0.len() >= 2)
            .filter(|segment| exposure_is_curve(counterpart, segment))
            .collect(),
    )
}
