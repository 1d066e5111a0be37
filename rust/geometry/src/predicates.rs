// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar predicates used by the topology engine and the validator.
//!
//! Orientation and segment intersection go through `geo`'s robust kernel so
//! that exact touches (shared endpoints) are reported as exact coordinates.

use geo::algorithm::coordinate_position::{CoordPos, CoordinatePosition};
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::kernels::{Kernel, Orientation, RobustKernel};
use geo::{PreparedGeometry, Relate};

use crate::types::{BBox, Coord, LineString, Polygon};

/// Side of a directed segment a point lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
    On,
}

/// Robust orientation of `c` relative to the directed segment `a -> b`.
pub fn side_of(a: &Coord, b: &Coord, c: &Coord) -> Side {
    match <RobustKernel as Kernel<f64>>::orient2d(a.to_geo(), b.to_geo(), c.to_geo()) {
        Orientation::CounterClockwise => Side::Left,
        Orientation::Clockwise => Side::Right,
        Orientation::Collinear => Side::On,
    }
}

/// Exact test: `p` lies on the closed segment `a`-`b`.
pub fn point_on_segment(p: &Coord, a: &Coord, b: &Coord) -> bool {
    if p.x < a.x.min(b.x) || p.x > a.x.max(b.x) || p.y < a.y.min(b.y) || p.y > a.y.max(b.y) {
        return false;
    }
    side_of(a, b, p) == Side::On
}

/// Exact test: `p` lies somewhere on `line`.
pub fn point_on_line(p: &Coord, line: &LineString) -> bool {
    if line.len() == 1 {
        return line.coords[0].same_xy(p);
    }
    line.segments().any(|(a, b)| point_on_segment(p, &a, &b))
}

/// Intersection of two segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentIntersection {
    /// A single shared point.
    Point(Coord),
    /// A collinear overlap of positive length, given by its two ends.
    Overlap(Coord, Coord),
}

/// Intersects segment `a1-a2` with segment `b1-b2`.
pub fn intersect_segments(a1: &Coord, a2: &Coord, b1: &Coord, b2: &Coord) -> Option<SegmentIntersection> {
    let p = geo::Line::new(a1.to_geo(), a2.to_geo());
    let q = geo::Line::new(b1.to_geo(), b2.to_geo());
    match line_intersection(p, q)? {
        LineIntersection::SinglePoint { intersection, .. } => {
            Some(SegmentIntersection::Point(Coord::from_geo(intersection)))
        }
        LineIntersection::Collinear { intersection } => {
            let start = Coord::from_geo(intersection.start);
            let end = Coord::from_geo(intersection.end);
            if start.same_xy(&end) {
                Some(SegmentIntersection::Point(start))
            } else {
                Some(SegmentIntersection::Overlap(start, end))
            }
        }
    }
}

fn segment_bbox(a: &Coord, b: &Coord) -> BBox {
    BBox::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
}

/// All pairwise segment intersections between two lines.
///
/// Each entry carries the segment indices on `a` and `b`.
pub fn line_intersections(a: &LineString, b: &LineString) -> Vec<(usize, usize, SegmentIntersection)> {
    let mut out = Vec::new();
    let (Some(abox), Some(bbox)) = (a.bbox(), b.bbox()) else {
        return out;
    };
    if !abox.intersects(&bbox) {
        return out;
    }
    let b_segments: Vec<(usize, Coord, Coord, BBox)> = b
        .segments()
        .enumerate()
        .map(|(j, (b1, b2))| (j, b1, b2, segment_bbox(&b1, &b2)))
        .filter(|(_, _, _, sb)| sb.intersects(&abox))
        .collect();
    for (i, (a1, a2)) in a.segments().enumerate() {
        let sa = segment_bbox(&a1, &a2);
        if !sa.intersects(&bbox) {
            continue;
        }
        for (j, b1, b2, sb) in &b_segments {
            if !sa.intersects(sb) {
                continue;
            }
            if let Some(hit) = intersect_segments(&a1, &a2, b1, b2) {
                out.push((i, *j, hit));
            }
        }
    }
    out
}

/// `true` when the line does not intersect itself.
///
/// Adjacent segments may only share their common vertex; a closed line may
/// additionally touch itself at its closing vertex.
pub fn is_simple(line: &LineString) -> bool {
    let line = line.dedup();
    let segments: Vec<(Coord, Coord)> = line.segments().collect();
    let n = segments.len();
    if n == 0 {
        return false;
    }
    let closed = line.is_closed();
    if closed && n < 3 {
        return false;
    }
    let boxes: Vec<BBox> = segments.iter().map(|(a, b)| segment_bbox(a, b)).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if !boxes[i].intersects(&boxes[j]) {
                continue;
            }
            let Some(hit) = intersect_segments(&segments[i].0, &segments[i].1, &segments[j].0, &segments[j].1) else {
                continue;
            };
            let adjacent = j == i + 1;
            let wraps = closed && i == 0 && j == n - 1;
            match hit {
                SegmentIntersection::Overlap(..) => return false,
                SegmentIntersection::Point(p) => {
                    let allowed = (adjacent && p.same_xy(&segments[i].1))
                        || (wraps && p.same_xy(&segments[0].0));
                    if !allowed {
                        return false;
                    }
                }
            }
        }
    }
    true
}

/// Location of a coordinate relative to a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Inside,
    Boundary,
    Outside,
}

/// Locates `c` relative to `polygon`.
pub fn polygon_position(polygon: &Polygon, c: &Coord) -> Position {
    position_in(&polygon.to_geo(), c)
}

fn position_in(polygon: &geo::Polygon<f64>, c: &Coord) -> Position {
    match polygon.coordinate_position(&c.to_geo()) {
        CoordPos::Inside => Position::Inside,
        CoordPos::OnBoundary => Position::Boundary,
        CoordPos::Outside => Position::Outside,
    }
}

/// Locates `c` relative to the area enclosed by a single closed ring.
pub fn ring_position(ring: &[Coord], c: &Coord) -> Position {
    let polygon = geo::Polygon::new(
        geo::LineString::new(ring.iter().map(|p| p.to_geo()).collect()),
        Vec::new(),
    );
    position_in(&polygon, c)
}

/// A polygon prepared once and queried many times with the DE-9IM
/// "covers" predicate.
pub struct Covers {
    polygon: geo::Polygon<f64>,
    prepared: PreparedGeometry<'static, f64>,
    bbox: Option<BBox>,
}

impl Covers {
    pub fn new(polygon: &Polygon) -> Self {
        let polygon_geo = polygon.to_geo();
        Self {
            prepared: PreparedGeometry::from(polygon_geo.clone()),
            polygon: polygon_geo,
            bbox: polygon.bbox(),
        }
    }

    /// `true` when the straight segment `a`-`b` lies within the polygon's
    /// interior or boundary.
    pub fn covers_segment(&self, a: &Coord, b: &Coord) -> bool {
        let Some(bbox) = self.bbox else {
            return false;
        };
        if !bbox.contains_coord(a) || !bbox.contains_coord(b) {
            return false;
        }
        let segment = geo::Line::new(a.to_geo(), b.to_geo());
        self.prepared.relate(&segment).is_covers()
    }

    /// Strict interior test.
    pub fn contains_coord(&self, c: &Coord) -> bool {
        position_in(&self.polygon, c) == Position::Inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Polygon {
        Polygon::new(
            LineString::from_xy(&[(0.0, 0.0), (size, 0.0), (size, size), (0.0, size), (0.0, 0.0)]),
            Vec::new(),
        )
    }

    #[test]
    fn orientation_sides() {
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(1.0, 0.0);
        assert_eq!(side_of(&a, &b, &Coord::new(0.5, 1.0)), Side::Left);
        assert_eq!(side_of(&a, &b, &Coord::new(0.5, -1.0)), Side::Right);
        assert_eq!(side_of(&a, &b, &Coord::new(2.0, 0.0)), Side::On);
    }

    #[test]
    fn point_on_segment_is_bounded() {
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(2.0, 2.0);
        assert!(point_on_segment(&Coord::new(1.0, 1.0), &a, &b));
        assert!(!point_on_segment(&Coord::new(3.0, 3.0), &a, &b));
        assert!(point_on_segment(&a, &a, &b));
    }

    #[test]
    fn crossing_segments_meet_once() {
        let hit = intersect_segments(
            &Coord::new(0.0, 0.0),
            &Coord::new(2.0, 2.0),
            &Coord::new(0.0, 2.0),
            &Coord::new(2.0, 0.0),
        );
        assert_eq!(hit, Some(SegmentIntersection::Point(Coord::new(1.0, 1.0))));
    }

    #[test]
    fn collinear_segments_overlap() {
        let hit = intersect_segments(
            &Coord::new(0.0, 0.0),
            &Coord::new(3.0, 0.0),
            &Coord::new(1.0, 0.0),
            &Coord::new(5.0, 0.0),
        );
        match hit {
            Some(SegmentIntersection::Overlap(a, b)) => {
                let mut xs = [a.x, b.x];
                xs.sort_by(|p, q| p.partial_cmp(q).unwrap());
                assert_eq!(xs, [1.0, 3.0]);
            }
            other => panic!("expected overlap, got {other:?}"),
        }
    }

    #[test]
    fn simple_and_self_crossing_lines() {
        let zigzag = LineString::from_xy(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0), (3.0, 1.0)]);
        assert!(is_simple(&zigzag));
        let bowtie = LineString::from_xy(&[(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0)]);
        assert!(!is_simple(&bowtie));
        let ring = LineString::from_xy(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        assert!(is_simple(&ring));
        let backtrack = LineString::from_xy(&[(0.0, 0.0), (2.0, 0.0), (1.0, 0.0)]);
        assert!(!is_simple(&backtrack));
    }

    #[test]
    fn line_intersections_reports_segment_indices() {
        let a = LineString::from_xy(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0)]);
        let b = LineString::from_xy(&[(2.0, -1.0), (2.0, 1.0)]);
        let hits = line_intersections(&a, &b);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[0].1, 0);
    }

    #[test]
    fn polygon_positions() {
        let sq = square(4.0);
        assert_eq!(polygon_position(&sq, &Coord::new(2.0, 2.0)), Position::Inside);
        assert_eq!(polygon_position(&sq, &Coord::new(4.0, 2.0)), Position::Boundary);
        assert_eq!(polygon_position(&sq, &Coord::new(5.0, 2.0)), Position::Outside);
    }

    #[test]
    fn covers_accepts_chords_and_rejects_exits() {
        // L-shaped polygon: the chord across the notch leaves the polygon.
        let l_shape = Polygon::new(
            LineString::from_xy(&[(0.0, 0.0), (4.0, 0.0), (4.0, 2.0), (2.0, 2.0), (2.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
            Vec::new(),
        );
        let covers = Covers::new(&l_shape);
        assert!(covers.covers_segment(&Coord::new(0.0, 0.0), &Coord::new(2.0, 2.0)));
        assert!(covers.covers_segment(&Coord::new(0.0, 0.0), &Coord::new(4.0, 0.0)));
        assert!(!covers.covers_segment(&Coord::new(4.0, 2.0), &Coord::new(2.0, 4.0)));
        assert!(covers.contains_coord(&Coord::new(1.0, 1.0)));
        assert!(!covers.contains_coord(&Coord::new(4.0, 1.0)));
        for _ in 0..3 {
            assert!(covers.covers_segment(&Coord::new(0.0, 4.0), &Coord::new(1.0, 1.0)));
        }
    }
}
