//! Endpoint snapping against a reference line layer.
//!
//! Line endpoints are pulled onto the nearest reference vertex within
//! tolerance; when no vertex is close enough, the fallback is the nearest
//! point on any reference segment. Endpoints farther than the tolerance
//! from both stay where they are.

use super::ops::explode_segments;
use geo::{Closest, ClosestPoint, Coord, EuclideanDistance, Line, LineString, Point};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::BTreeSet;

/// A reference vertex, indexed under the envelope of the segment it belongs
/// to so an envelope query also discovers segments that pass nearby without
/// having a vertex nearby.
struct VertexEntry {
    vertex: Coord<f64>,
    segment: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for VertexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for VertexEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.vertex.x - point[0];
        let dy = self.vertex.y - point[1];
        dx * dx + dy * dy
    }
}

/// Snapping index over a reference line layer.
pub struct SnapIndex {
    tree: RTree<VertexEntry>,
    segments: Vec<Line<f64>>,
    tolerance: f64,
}

impl SnapIndex {
    /// Builds the index from reference lines.
    pub fn new(reference: &[LineString<f64>], tolerance: f64) -> Self {
        let segments = explode_segments(reference);
        let mut entries = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            let envelope = AABB::from_corners(
                [
                    segment.start.x.min(segment.end.x),
                    segment.start.y.min(segment.end.y),
                ],
                [
                    segment.start.x.max(segment.end.x),
                    segment.start.y.max(segment.end.y),
                ],
            );
            entries.push(VertexEntry {
                vertex: segment.start,
                segment: i,
                envelope,
            });
            entries.push(VertexEntry {
                vertex: segment.end,
                segment: i,
                envelope,
            });
        }
        Self {
            tree: RTree::bulk_load(entries),
            segments,
            tolerance,
        }
    }

    /// Snap target for one endpoint: nearest vertex within tolerance first,
    /// then the nearest point on any nearby segment, else `None`.
    fn snap_target(&self, point: Coord<f64>) -> Option<Coord<f64>> {
        let p = Point::from(point);

        if let Some(entry) = self.tree.nearest_neighbor(&[point.x, point.y]) {
            if p.euclidean_distance(&Point::from(entry.vertex)) <= self.tolerance {
                return Some(entry.vertex);
            }
        }

        // Fallback: nearest point on any segment whose envelope comes within
        // tolerance of the endpoint.
        let search = AABB::from_corners(
            [point.x - self.tolerance, point.y - self.tolerance],
            [point.x + self.tolerance, point.y + self.tolerance],
        );
        let candidates: BTreeSet<usize> = self
            .tree
            .locate_in_envelope_intersecting(&search)
            .map(|entry| entry.segment)
            .collect();

        let mut best: Option<(f64, Coord<f64>)> = None;
        for segment in candidates {
            let closest = match self.segments[segment].closest_point(&p) {
                Closest::SinglePoint(c) | Closest::Intersection(c) => c,
                Closest::Indeterminate => continue,
            };
            let distance = p.euclidean_distance(&closest);
            if distance <= self.tolerance && best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, closest.into()));
            }
        }
        best.map(|(_, c)| c)
    }
}

/// Snaps the endpoints of every line to the reference layer.
pub fn snap_endpoints(
    lines: &[LineString<f64>],
    reference: &[LineString<f64>],
    tolerance: f64,
) -> Vec<LineString<f64>> {
    if reference.is_empty() {
        return lines.to_vec();
    }
    let index = SnapIndex::new(reference, tolerance);

    lines
        .iter()
        .map(|ls| {
            let mut coords = ls.0.clone();
            if coords.len() < 2 {
                return ls.clone();
            }
            if let Some(snapped) = index.snap_target(coords[0]) {
                coords[0] = snapped;
            }
            let last = coords.len() - 1;
            if let Some(snapped) = index.snap_target(coords[last]) {
                coords[last] = snapped;
            }
            LineString::new(coords)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;

    #[test]
    fn test_snap_to_nearest_vertex_within_tolerance() {
        // Endpoint 15 units from the vertex at (0, 0), tolerance 20.
        let reference = vec![line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)]];
        let line = vec![line_string![(x: 0.0, y: 15.0), (x: 0.0, y: 50.0)]];
        let snapped = snap_endpoints(&line, &reference, 20.0);
        assert_eq!(snapped[0].0[0], geo::coord! { x: 0.0, y: 0.0 });
        // The far endpoint stays.
        assert_eq!(snapped[0].0[1], geo::coord! { x: 0.0, y: 50.0 });
    }

    #[test]
    fn test_snap_falls_back_to_segment_point() {
        // Vertices at (-50, 0) and (50, 0) are 25+ units away from (0, 10),
        // but the segment between them passes 10 units below it.
        let reference = vec![line_string![(x: -50.0, y: 0.0), (x: 50.0, y: 0.0)]];
        let line = vec![line_string![(x: 0.0, y: 10.0), (x: 0.0, y: 60.0)]];
        let snapped = snap_endpoints(&line, &reference, 20.0);
        assert_eq!(snapped[0].0[0], geo::coord! { x: 0.0, y: 0.0 });
    }

    #[test]
    fn test_snap_leaves_far_endpoint_unchanged() {
        let reference = vec![line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)]];
        let line = vec![line_string![(x: 50.0, y: 25.0), (x: 50.0, y: 60.0)]];
        let snapped = snap_endpoints(&line, &reference, 20.0);
        assert_eq!(snapped[0].0[0], geo::coord! { x: 50.0, y: 25.0 });
    }

    #[test]
    fn test_snap_prefers_vertex_over_closer_segment_point() {
        // A vertex 15 units away wins over a perpendicular foot 10 units away.
        let reference = vec![line_string![(x: -50.0, y: 10.0), (x: 50.0, y: 10.0)]];
        let line = vec![line_string![(x: 35.0, y: 0.0), (x: 35.0, y: -40.0)]];
        let snapped = snap_endpoints(&line, &reference, 20.0);
        assert_eq!(snapped[0].0[0], geo::coord! { x: 50.0, y: 10.0 });
    }

    #[test]
    fn test_snap_with_empty_reference() {
        let line = vec![line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)]];
        let snapped = snap_endpoints(&line, &[], 20.0);
        assert_eq!(snapped, line);
    }
}
