//! Line dissolve: merge touching segments into maximal connected strings.
//!
//! Segments are chained through nodes of degree two; nodes of any other
//! degree (dead ends, junctions) terminate a string. Duplicate segments
//! collapse to one.

use geo::{Coord, Line, LineString};
use std::collections::HashMap;

/// Exact coordinate key: dissolve joins only bit-identical endpoints, which
/// is what the snap-round noding upstream guarantees.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct CoordKey(u64, u64);

impl CoordKey {
    fn of(c: Coord<f64>) -> Self {
        Self(c.x.to_bits(), c.y.to_bits())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct SegKey(CoordKey, CoordKey);

impl SegKey {
    fn of(line: &Line<f64>) -> Self {
        let a = CoordKey::of(line.start);
        let b = CoordKey::of(line.end);
        // Undirected: normalize the endpoint order.
        if (a.0, a.1) <= (b.0, b.1) {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

/// Dissolves line strings into maximal connected line strings.
pub fn dissolve_lines(lines: &[LineString<f64>]) -> Vec<LineString<f64>> {
    // Dedupe segments, drop zero-length ones.
    let mut segments: Vec<Line<f64>> = Vec::new();
    let mut seen: HashMap<SegKey, ()> = HashMap::new();
    for ls in lines {
        for line in ls.lines() {
            if CoordKey::of(line.start) == CoordKey::of(line.end) {
                continue;
            }
            if seen.insert(SegKey::of(&line), ()).is_none() {
                segments.push(line);
            }
        }
    }

    // Node adjacency: node -> (segment index, other endpoint).
    let mut adjacency: HashMap<CoordKey, Vec<usize>> = HashMap::new();
    for (i, line) in segments.iter().enumerate() {
        adjacency.entry(CoordKey::of(line.start)).or_default().push(i);
        adjacency.entry(CoordKey::of(line.end)).or_default().push(i);
    }

    let mut used = vec![false; segments.len()];
    let mut result = Vec::new();

    // Start walks at non-degree-2 nodes first so junctions stay split.
    let mut start_order: Vec<usize> = (0..segments.len()).collect();
    start_order.sort_by_key(|&i| {
        let start_deg = adjacency[&CoordKey::of(segments[i].start)].len();
        let end_deg = adjacency[&CoordKey::of(segments[i].end)].len();
        usize::from(start_deg == 2 && end_deg == 2)
    });

    for seed in start_order {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let mut coords = vec![segments[seed].start, segments[seed].end];

        // Extend forward from the tail, then backward from the head.
        extend(&segments, &adjacency, &mut used, &mut coords);
        coords.reverse();
        extend(&segments, &adjacency, &mut used, &mut coords);

        result.push(LineString::new(coords));
    }

    result
}

fn extend(
    segments: &[Line<f64>],
    adjacency: &HashMap<CoordKey, Vec<usize>>,
    used: &mut [bool],
    coords: &mut Vec<Coord<f64>>,
) {
    loop {
        let tail = *coords.last().unwrap();
        let key = CoordKey::of(tail);
        let incident = &adjacency[&key];
        if incident.len() != 2 {
            break;
        }
        let next = incident.iter().copied().find(|&i| !used[i]);
        let Some(next) = next else { break };
        used[next] = true;
        let line = segments[next];
        let other = if CoordKey::of(line.start) == key {
            line.end
        } else {
            line.start
        };
        coords.push(other);
        // Closed ring: stop when we come back around.
        if CoordKey::of(other) == CoordKey::of(coords[0]) {
            break;
        }
    }
}
