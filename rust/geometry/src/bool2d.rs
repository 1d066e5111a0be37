// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 2D Boolean Operations for Face Overlap Detection
//!
//! Polygon intersection areas using the i_overlay crate. The
//! validator compares these against the face areas to tell overlapping
//! faces from nested ones.

use crate::measure::signed_ring_area;
use crate::types::{Coord, Polygon};
use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;

/// Minimum area threshold - results smaller than this are considered empty
const MIN_AREA_THRESHOLD: f64 = 1e-10;

/// Area shared by two polygons.
pub fn intersection_area(a: &Polygon, b: &Polygon) -> f64 {
    let subject = polygon_to_paths(a);
    let clip = polygon_to_paths(b);
    if subject.is_empty() || clip.is_empty() {
        return 0.0;
    }

    // Result is Vec<Vec<Vec<[f64; 2]>>> - Vec of shapes, each shape is Vec of contours
    let result = subject.overlay(&clip, OverlayRule::Intersect, FillRule::EvenOdd);
    shapes_area(&result)
}

/// Convert a Polygon to i_overlay path format
///
/// With the EvenOdd fill rule the winding of holes does not matter.
fn polygon_to_paths(polygon: &Polygon) -> Vec<Vec<[f64; 2]>> {
    polygon
        .rings()
        .filter(|ring| ring.len() >= 4)
        .map(|ring| ring_to_path(&ring.coords))
        .collect()
}

/// Convert a closed ring to an open i_overlay path
fn ring_to_path(ring: &[Coord]) -> Vec<[f64; 2]> {
    let open = match (ring.first(), ring.last()) {
        (Some(a), Some(b)) if ring.len() > 1 && a.same_xy(b) => &ring[..ring.len() - 1],
        _ => ring,
    };
    open.iter().map(|c| [c.x, c.y]).collect()
}

/// Sum of shape areas; the first contour of a shape is its outer boundary,
/// the remaining ones are holes.
fn shapes_area(shapes: &[Vec<Vec<[f64; 2]>>]) -> f64 {
    let mut total = 0.0;
    for shape in shapes {
        let mut contours = shape.iter().map(|contour| {
            let coords: Vec<Coord> = contour.iter().map(|p| Coord::new(p[0], p[1])).collect();
            signed_ring_area(&coords).abs()
        });
        let Some(outer) = contours.next() else {
            continue;
        };
        let holes: f64 = contours.sum();
        total += outer - holes;
    }
    if total < MIN_AREA_THRESHOLD {
        0.0
    } else {
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LineString;
    use approx::assert_relative_eq;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon {
        Polygon::new(
            LineString::from_xy(&[(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]),
            Vec::new(),
        )
    }

    #[test]
    fn test_partial_overlap() {
        let a = rect(0.0, 0.0, 2.0, 2.0);
        let b = rect(1.0, 1.0, 3.0, 3.0);
        assert_relative_eq!(intersection_area(&a, &b), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_shared_edge_is_not_overlap() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 0.0, 2.0, 1.0);
        assert_eq!(intersection_area(&a, &b), 0.0);
    }

    #[test]
    fn test_nested_polygon() {
        let outer = rect(0.0, 0.0, 10.0, 10.0);
        let inner = rect(2.0, 2.0, 4.0, 4.0);
        assert_relative_eq!(intersection_area(&outer, &inner), inner.area(), epsilon = 1e-9);
    }

    #[test]
    fn test_hole_excludes_area() {
        let hole = LineString::from_xy(&[(2.0, 2.0), (2.0, 8.0), (8.0, 8.0), (8.0, 2.0), (2.0, 2.0)]);
        let donut = Polygon::new(rect(0.0, 0.0, 10.0, 10.0).exterior, vec![hole]);
        let inside_hole = rect(4.0, 4.0, 6.0, 6.0);
        assert_eq!(intersection_area(&donut, &inside_hole), 0.0);
    }
}
