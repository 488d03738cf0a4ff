//! Linework difference: remove from one line layer every portion that runs
//! along another layer.
//!
//! Pairing every input segment against every reference segment is O(n·m)
//! and dominates tile cleanup on large inputs, so reference segments are
//! held in an R-tree and each input segment only sees the candidates whose
//! envelopes intersect its own. Overlap removal is 1-dimensional interval
//! subtraction along the segment.

use super::ops::explode_segments;
use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Line, LineString};
use rstar::{RTree, RTreeObject, AABB};

struct Seg {
    line: Line<f64>,
}

impl RTreeObject for Seg {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [
                self.line.start.x.min(self.line.end.x),
                self.line.start.y.min(self.line.end.y),
            ],
            [
                self.line.start.x.max(self.line.end.x),
                self.line.start.y.max(self.line.end.y),
            ],
        )
    }
}

/// Subtracts the `other` linework from `lines`.
///
/// Collinear overlaps are removed; transversal crossings are kept (a road
/// crossing a boundary does not erase it).
pub fn difference_lines(
    lines: &[LineString<f64>],
    other: &[LineString<f64>],
) -> Vec<LineString<f64>> {
    let reference: Vec<Seg> = explode_segments(other)
        .into_iter()
        .map(|line| Seg { line })
        .collect();
    let index = RTree::bulk_load(reference);

    let mut result = Vec::new();
    for segment in explode_segments(lines) {
        let envelope = Seg { line: segment }.envelope();
        let mut covered: Vec<(f64, f64)> = Vec::new();
        for candidate in index.locate_in_envelope_intersecting(&envelope) {
            if let Some(LineIntersection::Collinear { intersection }) =
                line_intersection(segment, candidate.line)
            {
                let t0 = parameter_of(&segment, intersection.start);
                let t1 = parameter_of(&segment, intersection.end);
                covered.push((t0.min(t1), t0.max(t1)));
            }
        }
        for (t0, t1) in subtract_intervals(&covered) {
            let start = point_at(&segment, t0);
            let end = point_at(&segment, t1);
            result.push(LineString::new(vec![start, end]));
        }
    }
    result
}

/// Position of `point` along `segment` as a parameter in [0, 1].
fn parameter_of(segment: &Line<f64>, point: Coord<f64>) -> f64 {
    let dx = segment.end.x - segment.start.x;
    let dy = segment.end.y - segment.start.y;
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return 0.0;
    }
    ((point.x - segment.start.x) * dx + (point.y - segment.start.y) * dy) / len2
}

fn point_at(segment: &Line<f64>, t: f64) -> Coord<f64> {
    Coord {
        x: segment.start.x + (segment.end.x - segment.start.x) * t,
        y: segment.start.y + (segment.end.y - segment.start.y) * t,
    }
}

/// Complements a set of covered [t0, t1] intervals within [0, 1].
fn subtract_intervals(covered: &[(f64, f64)]) -> Vec<(f64, f64)> {
    const EPS: f64 = 1e-12;
    let mut sorted: Vec<(f64, f64)> = covered
        .iter()
        .map(|&(a, b)| (a.max(0.0), b.min(1.0)))
        .filter(|&(a, b)| b - a > EPS)
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut remaining = Vec::new();
    let mut cursor = 0.0;
    for (start, end) in sorted {
        if start - cursor > EPS {
            remaining.push((cursor, start));
        }
        cursor = cursor.max(end);
    }
    if 1.0 - cursor > EPS {
        remaining.push((cursor, 1.0));
    }
    remaining
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;
    use geo::EuclideanLength;

    #[test]
    fn test_difference_removes_collinear_overlap() {
        let lines = vec![line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]];
        let other = vec![line_string![(x: 4.0, y: 0.0), (x: 6.0, y: 0.0)]];
        let diff = difference_lines(&lines, &other);
        let total: f64 = diff.iter().map(|l| l.euclidean_length()).sum();
        assert!((total - 8.0).abs() < 1e-9);
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn test_difference_keeps_transversal_crossing() {
        let lines = vec![line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]];
        let other = vec![line_string![(x: 5.0, y: -5.0), (x: 5.0, y: 5.0)]];
        let diff = difference_lines(&lines, &other);
        let total: f64 = diff.iter().map(|l| l.euclidean_length()).sum();
        assert!((total - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_difference_full_cover_removes_everything() {
        let lines = vec![line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]];
        let other = vec![line_string![(x: -1.0, y: 0.0), (x: 11.0, y: 0.0)]];
        assert!(difference_lines(&lines, &other).is_empty());
    }

    #[test]
    fn test_difference_disjoint_keeps_everything() {
        let lines = vec![line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]];
        let other = vec![line_string![(x: 0.0, y: 5.0), (x: 10.0, y: 5.0)]];
        let diff = difference_lines(&lines, &other);
        let total: f64 = diff.iter().map(|l| l.euclidean_length()).sum();
        assert!((total - 10.0).abs() < 1e-9);
    }
}
