//! Boolean operations, relate predicates and shared-border extraction.
//!
//! The boolean overlay in `geo` can panic on numerically degenerate input
//! (self-touching rings, collapsed spikes). All unions here go through
//! [`try_union`], which catches the panic and reports it as a
//! [`GeometryError::Degenerate`] so callers can leave the pairing unmerged
//! instead of aborting a whole sweep.

use super::GeometryError;
use geo::coordinate_position::CoordPos;
use geo::line_intersection::{line_intersection, LineIntersection};
use geo::relate::IntersectionMatrix;
use geo::{
    BooleanOps, BoundingRect, EuclideanLength, Intersects, Line, LineString, MultiLineString,
    Polygon, Rect, Relate,
};
use geo::dimensions::Dimensions;
use rstar::{RTree, RTreeObject, AABB};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A line segment wrapped for use in an [`RTree`].
struct Seg {
    line: Line<f64>,
}

impl RTreeObject for Seg {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let (min_x, max_x) = ord(self.line.start.x, self.line.end.x);
        let (min_y, max_y) = ord(self.line.start.y, self.line.end.y);
        AABB::from_corners([min_x, min_y], [max_x, max_y])
    }
}

fn ord(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// R-tree over line segments, used for shared-border and overlap queries.
pub struct SegmentIndex {
    tree: RTree<Seg>,
}

impl SegmentIndex {
    /// Bulk-loads an index over the given segments.
    pub fn new(segments: &[Line<f64>]) -> Self {
        let entries = segments.iter().map(|line| Seg { line: *line }).collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Returns the segments whose envelope intersects `envelope`.
    fn query(&self, envelope: &AABB<[f64; 2]>) -> impl Iterator<Item = &Line<f64>> {
        self.tree
            .locate_in_envelope_intersecting(envelope)
            .map(|seg| &seg.line)
    }
}

/// Converts polygon exterior and interior rings to line strings.
pub fn polygon_boundaries(polygons: &[Polygon<f64>]) -> Vec<LineString<f64>> {
    let mut lines = Vec::new();
    for polygon in polygons {
        lines.push(polygon.exterior().clone());
        for interior in polygon.interiors() {
            lines.push(interior.clone());
        }
    }
    lines
}

/// Explodes line strings into their individual two-point segments.
pub fn explode_segments(lines: &[LineString<f64>]) -> Vec<Line<f64>> {
    lines.iter().flat_map(|ls| ls.lines()).collect()
}

/// Total Euclidean length of a set of segments.
pub fn total_length(segments: &[Line<f64>]) -> f64 {
    segments.iter().map(|l| l.euclidean_length()).sum()
}

/// Unions two polygons, catching degenerate-input panics from the overlay.
///
/// A multi-part result means the inputs did not actually share a
/// 1-dimensional border; that is reported as degenerate as well, since the
/// callers only union shapes matched by a curve relation.
pub fn try_union(a: &Polygon<f64>, b: &Polygon<f64>) -> Result<Polygon<f64>, GeometryError> {
    let unioned = catch_unwind(AssertUnwindSafe(|| a.union(b)))
        .map_err(|_| GeometryError::Degenerate("polygon union panicked".into()))?;

    let mut parts: Vec<Polygon<f64>> = unioned.into_iter().collect();
    match parts.len() {
        1 => Ok(parts.remove(0)),
        n => Err(GeometryError::Degenerate(format!(
            "union produced {n} disjoint parts"
        ))),
    }
}

/// Unions `base` with every polygon in `others`, in order.
pub fn try_union_many(
    base: &Polygon<f64>,
    others: &[Polygon<f64>],
) -> Result<Polygon<f64>, GeometryError> {
    let mut merged = base.clone();
    for other in others {
        merged = try_union(&merged, other)?;
    }
    Ok(merged)
}

/// Clips polygons to a rectangle, keeping every intersection part.
///
/// A degenerate overlay on a single polygon keeps that polygon unclipped
/// rather than dropping it.
pub fn clip_polygons_to_rect(polygons: &[Polygon<f64>], rect: Rect<f64>) -> Vec<Polygon<f64>> {
    let clip = rect.to_polygon();
    let mut result = Vec::new();
    for polygon in polygons {
        if !polygon.intersects(&clip) {
            continue;
        }
        match catch_unwind(AssertUnwindSafe(|| polygon.intersection(&clip))) {
            Ok(parts) => {
                for part in parts {
                    if part.exterior().0.len() >= 4 {
                        result.push(part);
                    }
                }
            }
            Err(_) => {
                tracing::warn!("degenerate clip, keeping polygon unclipped");
                result.push(polygon.clone());
            }
        }
    }
    result
}

/// Clips polygons against an arbitrary polygonal border, keeping every
/// intersection part. Degenerate overlays keep the input polygon, same as
/// [`clip_polygons_to_rect`].
pub fn clip_polygons_to_polygons(
    polygons: &[Polygon<f64>],
    border: &[Polygon<f64>],
) -> Vec<Polygon<f64>> {
    let mut result = Vec::new();
    for polygon in polygons {
        let mut kept_any = false;
        let mut degenerate = false;
        for clip in border {
            if !polygon.intersects(clip) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| polygon.intersection(clip))) {
                Ok(parts) => {
                    for part in parts {
                        if part.exterior().0.len() >= 4 {
                            result.push(part);
                            kept_any = true;
                        }
                    }
                }
                Err(_) => degenerate = true,
            }
        }
        if degenerate && !kept_any {
            tracing::warn!("degenerate border clip, keeping polygon unclipped");
            result.push(polygon.clone());
        }
    }
    result
}

/// Clips line strings to a rectangle.
pub fn clip_lines_to_rect(lines: &[LineString<f64>], rect: Rect<f64>) -> Vec<LineString<f64>> {
    let clip = rect.to_polygon();
    let multi = MultiLineString::new(lines.to_vec());
    let clipped = clip.clip(&multi, false);
    clipped
        .into_iter()
        .filter(|ls| ls.0.len() >= 2)
        .collect()
}

/// True when the boundary of `polygon` meets the interior of `line` in a
/// 1-dimensional curve (a genuine crossing, not a point touch).
pub fn boundary_interior_is_curve(polygon: &Polygon<f64>, line: &LineString<f64>) -> bool {
    let im: IntersectionMatrix = polygon.relate(line);
    im.get(CoordPos::OnBoundary, CoordPos::Inside) == Dimensions::OneDimensional
}

/// True when the interiors of `polygon` and `line` share a curve.
pub fn interior_interior_is_curve(polygon: &Polygon<f64>, line: &LineString<f64>) -> bool {
    let im: IntersectionMatrix = polygon.relate(line);
    im.get(CoordPos::Inside, CoordPos::Inside) == Dimensions::OneDimensional
}

/// Exposure test for a buffered counterpart against a border sub-segment.
///
/// The sub-segment is a genuine exposure when it runs through the polygon
/// interior, or when it only touches the boundary at a point but the clipped
/// portion inside the polygon is still a curve (a graze that carries length).
pub fn exposure_is_curve(buffered: &Polygon<f64>, segment: &LineString<f64>) -> bool {
    let im: IntersectionMatrix = buffered.relate(segment);
    if im.get(CoordPos::Inside, CoordPos::Inside) == Dimensions::OneDimensional {
        return true;
    }
    if im.get(CoordPos::OnBoundary, CoordPos::Inside) == Dimensions::ZeroDimensional {
        let multi = MultiLineString::new(vec![segment.clone()]);
        let inside = buffered.clip(&multi, false);
        return inside.euclidean_length() > 0.0;
    }
    false
}

/// Computes the collinear overlap of two segments, if any.
fn collinear_overlap(a: Line<f64>, b: Line<f64>) -> Option<Line<f64>> {
    match line_intersection(a, b) {
        Some(LineIntersection::Collinear { intersection }) => {
            if intersection.euclidean_length() > 0.0 {
                Some(intersection)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Extracts the 1-dimensional shared portions between two segment sets.
///
/// Both sets are assumed to come from a common noded linework, so shared
/// borders appear as collinear segment overlaps.
pub fn shared_segments(a: &[Line<f64>], b: &[Line<f64>]) -> Vec<Line<f64>> {
    let index = SegmentIndex::new(b);
    let mut shared = Vec::new();
    for seg in a {
        let envelope = Seg { line: *seg }.envelope();
        for candidate in index.query(&envelope) {
            if let Some(overlap) = collinear_overlap(*seg, *candidate) {
                shared.push(overlap);
            }
        }
    }
    shared
}

/// Total length of the collinear overlap between `segments` and an indexed
/// set of protected segments.
pub fn overlap_length(segments: &[Line<f64>], protected: &SegmentIndex) -> f64 {
    let mut length = 0.0;
    for seg in segments {
        let envelope = Seg { line: *seg }.envelope();
        for candidate in protected.query(&envelope) {
            if let Some(overlap) = collinear_overlap(*seg, *candidate) {
                length += overlap.euclidean_length();
            }
        }
    }
    length
}

/// Shared border between two polygons as collinear boundary overlaps.
pub fn shared_border(a: &Polygon<f64>, b: &Polygon<f64>) -> Vec<Line<f64>> {
    let a_segments = explode_segments(&polygon_boundaries(std::slice::from_ref(a)));
    let b_segments = explode_segments(&polygon_boundaries(std::slice::from_ref(b)));
    shared_segments(&a_segments, &b_segments)
}

/// Bounding rectangle of a set of line strings, if any are non-empty.
pub fn lines_bounding_rect(lines: &[LineString<f64>]) -> Option<Rect<f64>> {
    let multi = MultiLineString::new(lines.to_vec());
    multi.bounding_rect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, polygon, line_string};

    fn unit_square(x: f64, y: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]
    }

    #[test]
    fn test_try_union_adjacent_squares() {
        let a = unit_square(0.0, 0.0, 10.0);
        let b = unit_square(10.0, 0.0, 10.0);
        let merged = try_union(&a, &b).unwrap();
        use geo::Area;
        assert!((merged.unsigned_area() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_try_union_disjoint_is_degenerate() {
        let a = unit_square(0.0, 0.0, 10.0);
        let b = unit_square(100.0, 100.0, 10.0);
        assert!(try_union(&a, &b).is_err());
    }

    #[test]
    fn test_shared_border_length() {
        let a = unit_square(0.0, 0.0, 10.0);
        let b = unit_square(10.0, 0.0, 10.0);
        let border = shared_border(&a, &b);
        assert!((total_length(&border) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_shared_border_empty_for_disjoint() {
        let a = unit_square(0.0, 0.0, 10.0);
        let b = unit_square(50.0, 0.0, 10.0);
        assert!(shared_border(&a, &b).is_empty());
    }

    #[test]
    fn test_boundary_interior_curve_detects_crossing() {
        let poly = unit_square(0.0, 0.0, 10.0);
        // Border running along the right edge of the square.
        let border = line_string![
            (x: 10.0, y: -5.0),
            (x: 10.0, y: 15.0),
        ];
        assert!(boundary_interior_is_curve(&poly, &border));

        // A border far away shares nothing.
        let far = line_string![(x: 50.0, y: 0.0), (x: 50.0, y: 10.0)];
        assert!(!boundary_interior_is_curve(&poly, &far));
    }

    #[test]
    fn test_interior_interior_curve() {
        let poly = unit_square(0.0, 0.0, 10.0);
        let through = line_string![(x: -5.0, y: 5.0), (x: 15.0, y: 5.0)];
        assert!(interior_interior_is_curve(&poly, &through));

        let along_edge = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)];
        assert!(!interior_interior_is_curve(&poly, &along_edge));
    }

    #[test]
    fn test_clip_polygons_to_rect() {
        let poly = unit_square(0.0, 0.0, 20.0);
        let rect = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 20.0 });
        let clipped = clip_polygons_to_rect(&[poly], rect);
        assert_eq!(clipped.len(), 1);
        use geo::Area;
        assert!((clipped[0].unsigned_area() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_clip_lines_to_rect() {
        let line = line_string![(x: -5.0, y: 5.0), (x: 25.0, y: 5.0)];
        let rect = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 });
        let clipped = clip_lines_to_rect(&[line], rect);
        assert_eq!(clipped.len(), 1);
        assert!((clipped[0].euclidean_length() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlap_length_against_protected() {
        let border = vec![Line::new(
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 10.0, y: 0.0 },
        )];
        let protected = SegmentIndex::new(&[Line::new(
            coord! { x: 5.0, y: 0.0 },
            coord! { x: 20.0, y: 0.0 },
        )]);
        assert!((overlap_length(&border, &protected) - 5.0).abs() < 1e-9);

        let clear = SegmentIndex::new(&[Line::new(
            coord! { x: 0.0, y: 5.0 },
            coord! { x: 10.0, y: 5.0 },
        )]);
        assert_eq!(overlap_length(&border, &clear), 0.0);
    }
}
