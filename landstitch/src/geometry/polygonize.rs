//! Polygonization: build polygon faces from a noded line network.
//!
//! Every segment becomes two directed half-edges. Faces are traced by
//! always leaving a node on the first outgoing edge clockwise from the
//! reversed incoming edge, which keeps the face interior on the left;
//! counterclockwise rings (positive signed area) are face shells. Clockwise rings are either inner boundaries of a
//! surrounding face, assigned as holes to the smallest shell strictly
//! containing them, or the single unbounded outer face, which is dropped.
//! Dangling edges trace degenerate zero-area rings and disappear.
//!
//! The input must already be noded (see [`super::snap_round_node`]);
//! segments are matched at bit-identical endpoints, and duplicate segments
//! collapse to one.

use geo::{Contains, Coord, LineString, Point, Polygon};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct NodeKey(u64, u64);

impl NodeKey {
    fn of(c: Coord<f64>) -> Self {
        Self(c.x.to_bits(), c.y.to_bits())
    }
}

struct HalfEdge {
    from: Coord<f64>,
    to: Coord<f64>,
    angle: f64,
    twin: usize,
}

/// Builds polygons from a noded set of line segments.
pub fn polygonize(lines: &[LineString<f64>]) -> Vec<Polygon<f64>> {
    // Two directed half-edges per unique undirected segment.
    let mut edges: Vec<HalfEdge> = Vec::new();
    let mut seen: HashSet<(NodeKey, NodeKey)> = HashSet::new();
    for ls in lines {
        for line in ls.lines() {
            let (a, b) = (NodeKey::of(line.start), NodeKey::of(line.end));
            if a == b {
                continue;
            }
            let key = if (a.0, a.1) <= (b.0, b.1) { (a, b) } else { (b, a) };
            if !seen.insert(key) {
                continue;
            }
            let forward = edges.len();
            edges.push(HalfEdge {
                from: line.start,
                to: line.end,
                angle: angle_of(line.start, line.end),
                twin: forward + 1,
            });
            edges.push(HalfEdge {
                from: line.end,
                to: line.start,
                angle: angle_of(line.end, line.start),
                twin: forward,
            });
        }
    }

    // Outgoing edges per node, sorted counterclockwise.
    let mut outgoing: HashMap<NodeKey, Vec<usize>> = HashMap::new();
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(NodeKey::of(edge.from)).or_default().push(i);
    }
    for list in outgoing.values_mut() {
        list.sort_by(|&a, &b| edges[a].angle.total_cmp(&edges[b].angle));
    }

    let mut used = vec![false; edges.len()];
    let mut shells: Vec<(f64, Vec<Coord<f64>>)> = Vec::new();
    let mut hole_rings: Vec<Vec<Coord<f64>>> = Vec::new();

    for start in 0..edges.len() {
        if used[start] {
            continue;
        }

        // Trace one face.
        let mut ring: Vec<Coord<f64>> = vec![edges[start].from];
        let mut current = start;
        loop {
            used[current] = true;
            ring.push(edges[current].to);

            let twin = edges[current].twin;
            let node = NodeKey::of(edges[current].to);
            let candidates = &outgoing[&node];

            // First outgoing edge clockwise from the reversed incoming edge
            // keeps the face interior on the left; at a dead end the only
            // candidate is the reverse itself and the walk doubles back.
            let twin_pos = candidates
                .iter()
                .position(|&e| e == twin)
                .expect("twin edge must be registered at its origin node");
            let next = candidates[(twin_pos + candidates.len() - 1) % candidates.len()];

            if next == start {
                break;
            }
            if used[next] {
                // Either the walk closed onto an already-emitted face or the
                // network is inconsistent; stop tracing this ring.
                break;
            }
            current = next;
        }

        if ring.len() < 4 {
            continue;
        }
        if NodeKey::of(*ring.first().unwrap()) != NodeKey::of(*ring.last().unwrap()) {
            continue;
        }
        let area = signed_area(&ring);
        if area > 0.0 {
            shells.push((area, ring));
        } else if area < 0.0 {
            hole_rings.push(ring);
        }
    }

    // Smallest-area shells first, so each hole lands in its innermost
    // enclosing face. A clockwise ring strictly inside no shell is the
    // unbounded outer face.
    shells.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut polygons: Vec<Polygon<f64>> = shells
        .into_iter()
        .map(|(_, ring)| Polygon::new(LineString::new(ring), vec![]))
        .collect();

    for ring in hole_rings {
        let enclosing = polygons.iter().position(|shell| {
            ring.iter()
                .any(|&coord| shell.contains(&Point::from(coord)))
        });
        if let Some(index) = enclosing {
            polygons[index].interiors_push(LineString::new(ring));
        }
    }

    polygons
}

fn angle_of(from: Coord<f64>, to: Coord<f64>) -> f64 {
    (to.y - from.y).atan2(to.x - from.x)
}

fn signed_area(ring: &[Coord<f64>]) -> f64 {
    let mut sum = 0.0;
    for pair in ring.windows(2) {
        sum += pair[0].x * pair[1].y - pair[1].x * pair[0].y;
    }
    sum / 2.0
}
