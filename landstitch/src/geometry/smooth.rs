//! Chaikin corner-cutting smoothing, one pass.

use geo::{Coord, LineString};

/// Smooths a set of line strings with one Chaikin corner-cutting pass.
///
/// Each segment contributes two points at `ratio` and `1 - ratio` along its
/// length. Endpoints of open lines are preserved so snapped junctions stay
/// put; closed rings stay closed. Lines with two points or fewer pass
/// through unchanged.
pub fn chaikin_smooth(lines: &[LineString<f64>], ratio: f64) -> Vec<LineString<f64>> {
    lines.iter().map(|ls| chaikin(ls, ratio)).collect()
}

fn chaikin(line: &LineString<f64>, ratio: f64) -> LineString<f64> {
    let input = &line.0;
    if input.len() <= 2 {
        return line.clone();
    }

    let closed = input.first() == input.last();
    let mut output: Vec<Coord<f64>> = Vec::with_capacity(input.len() * 2);

    if !closed {
        output.push(input[0]);
    }

    for window in input.windows(2) {
        let (p0, p1) = (window[0], window[1]);
        output.push(lerp(p0, p1, ratio));
        output.push(lerp(p0, p1, 1.0 - ratio));
    }

    if closed {
        output.push(output[0]);
    } else {
        output.push(input[input.len() - 1]);
    }

    LineString::new(output)
}

fn lerp(p0: Coord<f64>, p1: Coord<f64>, t: f64) -> Coord<f64> {
    Coord {
        x: p0.x * (1.0 - t) + p1.x * t,
        y: p0.y * (1.0 - t) + p1.y * t,
    }
}
