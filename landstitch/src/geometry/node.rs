//! Snap-round noding at a fixed precision grid.
//!
//! All coordinates are forced onto a grid of `1 / scale` spacing, then every
//! segment is split at its intersections with every other segment (proper
//! crossings and collinear overlaps alike), with the cut points themselves
//! rounded to the grid. The output is a fully noded set of unique two-point
//! segments from which a valid planar graph can be built.

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Line, LineString};
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashSet;

struct Seg {
    line: Line<f64>,
    id: usize,
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

fn round_coord(c: Coord<f64>, scale: f64) -> Coord<f64> {
    Coord {
        x: (c.x * scale).round() / scale,
        y: (c.y * scale).round() / scale,
    }
}

fn coord_key(c: Coord<f64>) -> (u64, u64) {
    (c.x.to_bits(), c.y.to_bits())
}

/// Nodes the given linework on a precision grid with spacing `1 / scale`.
pub fn snap_round_node(lines: &[LineString<f64>], scale: f64) -> Vec<LineString<f64>> {
    // Round input coordinates and collect non-degenerate segments.
    let mut segments: Vec<Line<f64>> = Vec::new();
    for ls in lines {
        for line in ls.lines() {
            let start = round_coord(line.start, scale);
            let end = round_coord(line.end, scale);
            if coord_key(start) != coord_key(end) {
                segments.push(Line::new(start, end));
            }
        }
    }

    let indexed: Vec<Seg> = segments
        .iter()
        .enumerate()
        .map(|(id, line)| Seg { line: *line, id })
        .collect();
    let tree = RTree::bulk_load(indexed);

    let mut noded: Vec<Line<f64>> = Vec::new();
    let mut seen: HashSet<((u64, u64), (u64, u64))> = HashSet::new();

    for (id, segment) in segments.iter().enumerate() {
        let envelope = Seg {
            line: *segment,
            id: 0,
        }
        .envelope();

        // Parameters along the segment where it must be cut.
        let mut cuts: Vec<f64> = vec![0.0, 1.0];
        for other in tree.locate_in_envelope_intersecting(&envelope) {
            if other.id == id {
                continue;
            }
            match line_intersection(*segment, other.line) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    cuts.push(parameter_of(segment, round_coord(intersection, scale)));
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    cuts.push(parameter_of(segment, intersection.start));
                    cuts.push(parameter_of(segment, intersection.end));
                }
                None => {}
            }
        }
        cuts.retain(|t| (0.0..=1.0).contains(t));
        cuts.sort_by(|a, b| a.total_cmp(b));

        for pair in cuts.windows(2) {
            let start = round_coord(point_at(segment, pair[0]), scale);
            let end = round_coord(point_at(segment, pair[1]), scale);
            let (ka, kb) = (coord_key(start), coord_key(end));
            if ka == kb {
                continue;
            }
            let key = if ka <= kb { (ka, kb) } else { (kb, ka) };
            if seen.insert(key) {
                noded.push(Line::new(start, end));
            }
        }
    }

    noded
        .into_iter()
        .map(|line| LineString::new(vec![line.start, line.end]))
        .collect()
}

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
