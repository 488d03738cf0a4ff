//! Small-polygon elimination.
//!
//! Polygons below the area threshold are merged into the touching neighbor
//! they share the longest 1-dimensional border with. Sweeps repeat until a
//! full pass makes no progress, because absorbing one small polygon can put
//! a grown neighbor next to another small one. Small polygons with no
//! mergeable neighbor are retained.
//!
//! Two variants exist besides the general pass:
//! - [`eliminate_protected`] refuses any merge whose shared border runs
//!   along a protected line for more than a negligible length, so mandatory
//!   boundaries are never dissolved away.
//! - [`eliminate_merge_small`] coalesces clusters of adjacent small
//!   polygons with each other first; their union may clear the threshold
//!   and survive the final general pass as one shape.

use crate::geometry::{
    explode_segments, overlap_length, shared_border, total_length, try_union, SegmentIndex,
};
use geo::{Area, BoundingRect, LineString, Polygon};
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Shared-border length on a protected line below which the overlap is
/// treated as numerical noise rather than a real crossing.
const PROTECTED_EPSILON: f64 = 1e-6;

struct LargeEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for LargeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn polygon_envelope(polygon: &Polygon<f64>) -> AABB<[f64; 2]> {
    match polygon.bounding_rect() {
        Some(rect) => AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
        None => AABB::from_point([0.0, 0.0]),
    }
}

/// Merges polygons below `threshold` area into their neighbors.
pub fn eliminate(polygons: Vec<Polygon<f64>>, threshold: f64) -> Vec<Polygon<f64>> {
    eliminate_impl(polygons, threshold, None)
}

/// Like [`eliminate`], but a candidate neighbor is rejected when the shared
/// border runs along one of the `protected` lines.
pub fn eliminate_protected(
    polygons: Vec<Polygon<f64>>,
    threshold: f64,
    protected: &[LineString<f64>],
) -> Vec<Polygon<f64>> {
    let index = SegmentIndex::new(&explode_segments(protected));
    eliminate_impl(polygons, threshold, Some(&index))
}

fn eliminate_impl(
    polygons: Vec<Polygon<f64>>,
    threshold: f64,
    protected: Option<&SegmentIndex>,
) -> Vec<Polygon<f64>> {
    // Strictly above threshold is large; exactly at threshold still merges.
    let (mut large, mut small): (Vec<Polygon<f64>>, Vec<Polygon<f64>>) = polygons
        .into_iter()
        .partition(|p| p.unsigned_area() > threshold);

    loop {
        let entries: Vec<LargeEntry> = large
            .iter()
            .enumerate()
            .map(|(index, polygon)| LargeEntry {
                index,
                envelope: polygon_envelope(polygon),
            })
            .collect();
        let mut tree = RTree::bulk_load(entries);

        let mut progress = false;
        let mut retained = Vec::new();

        for polygon in small.drain(..) {
            // Touching neighbors, ranked by shared border length.
            let mut candidates: Vec<(usize, f64)> = tree
                .locate_in_envelope_intersecting(&polygon_envelope(&polygon))
                .filter_map(|entry| {
                    let border = shared_border(&polygon, &large[entry.index]);
                    let length = total_length(&border);
                    if length <= 0.0 {
                        return None;
                    }
                    if let Some(protected) = protected {
                        if overlap_length(&border, protected) > PROTECTED_EPSILON {
                            return None;
                        }
                    }
                    Some((entry.index, length))
                })
                .collect();
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

            let mut merged = false;
            for (index, _) in candidates {
                match try_union(&large[index], &polygon) {
                    Ok(unioned) => {
                        large[index] = unioned;
                        // Index the grown envelope too, so adjacencies the
                        // merge exposed are found within this sweep.
                        tree.insert(LargeEntry {
                            index,
                            envelope: polygon_envelope(&large[index]),
                        });
                        merged = true;
                        progress = true;
                        break;
                    }
                    Err(err) => {
                        warn!(%err, "degenerate elimination union, trying next neighbor");
                    }
                }
            }
            if !merged {
                retained.push(polygon);
            }
        }

        small = retained;
        if !progress {
            break;
        }
    }

    if !small.is_empty() {
        debug!(retained = small.len(), "small polygons without mergeable neighbor kept");
    }
    large.extend(small);
    large
}

/// Coalesces adjacent small polygons with each other.
///
/// Polygons at or above the threshold pass through untouched. Merged
/// clusters are returned as-is even when they stay below the threshold; a
/// following general pass decides their fate.
pub fn eliminate_merge_small(polygons: Vec<Polygon<f64>>, threshold: f64) -> Vec<Polygon<f64>> {
    let (large, mut small): (Vec<Polygon<f64>>, Vec<Polygon<f64>>) = polygons
        .into_iter()
        .partition(|p| p.unsigned_area() > threshold);

    // Pair ids survive index shifts; a merge mints a fresh id.
    let mut ids: Vec<usize> = (0..small.len()).collect();
    let mut next_id = small.len();
    let mut failed: HashSet<(usize, usize)> = HashSet::new();

    'outer: loop {
        for i in 0..small.len() {
            for j in (i + 1)..small.len() {
                let pair = (ids[i].min(ids[j]), ids[i].max(ids[j]));
                if failed.contains(&pair) {
                    continue;
                }
                if total_length(&shared_border(&small[i], &small[j])) <= 0.0 {
                    continue;
                }
                match try_union(&small[i], &small[j]) {
                    Ok(unioned) => {
                        small[i] = unioned;
                        ids[i] = next_id;
                        next_id += 1;
                        small.swap_remove(j);
                        ids.swap_remove(j);
                        continue 'outer;
                    }
                    Err(err) => {
                        warn!(%err, "degenerate small-cluster union, keeping parts separate");
                        failed.insert(pair);
                    }
                }
            }
        }
        break;
    }

    let mut result = large;
    result.extend(small);
    result
}
