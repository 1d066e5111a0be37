// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interior points of polygons
//!
//! Wrapper around earcutr: the centroid of the largest triangle of a
//! polygon's triangulation lies strictly inside the polygon.

use crate::error::{Error, Result};
use crate::types::{Coord, LineString, Polygon};

/// Open vertex list of a ring (closing duplicate removed).
fn open_ring(ring: &LineString) -> &[Coord] {
    let coords = &ring.coords;
    if ring.is_closed() {
        &coords[..coords.len() - 1]
    } else {
        coords
    }
}

/// Triangulate a polygon with holes.
///
/// Returns the flattened vertices (outer ring first, then each hole) and
/// the triangle indices into them.
pub fn triangulate(polygon: &Polygon) -> Result<(Vec<Coord>, Vec<usize>)> {
    let outer = open_ring(&polygon.exterior);
    if outer.len() < 3 {
        return Err(Error::TriangulationError(
            "Need at least 3 points to triangulate".to_string(),
        ));
    }

    let mut points: Vec<Coord> = outer.to_vec();
    let mut hole_indices = Vec::with_capacity(polygon.interiors.len());
    for hole in &polygon.interiors {
        let hole = open_ring(hole);
        if hole.len() < 3 {
            continue;
        }
        hole_indices.push(points.len());
        points.extend_from_slice(hole);
    }

    // Flatten vertices for earcutr
    let mut vertices = Vec::with_capacity(points.len() * 2);
    for p in &points {
        vertices.push(p.x);
        vertices.push(p.y);
    }

    let indices = earcutr::earcut(&vertices, &hole_indices, 2)
        .map_err(|e| Error::TriangulationError(format!("{:?}", e)))?;

    Ok((points, indices))
}

/// A point strictly inside `polygon`, or `None` when it has no area.
pub fn interior_point(polygon: &Polygon) -> Option<Coord> {
    let (points, indices) = triangulate(polygon).ok()?;
    let mut best: Option<(f64, Coord)> = None;
    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (points[tri[0]], points[tri[1]], points[tri[2]]);
        let area = ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs() / 2.0;
        if area <= 0.0 {
            continue;
        }
        if best.map_or(true, |(best_area, _)| area > best_area) {
            let centroid = Coord::new((a.x + b.x + c.x) / 3.0, (a.y + b.y + c.y) / 3.0);
            best = Some((area, centroid));
        }
    }
    best.map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicates::{polygon_position, Position};

    #[test]
    fn test_square_interior_point() {
        let square = Polygon::new(
            LineString::from_xy(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
            Vec::new(),
        );
        let p = interior_point(&square).unwrap();
        assert_eq!(polygon_position(&square, &p), Position::Inside);
    }

    #[test]
    fn test_interior_point_avoids_hole() {
        let outer = LineString::from_xy(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]);
        let hole = LineString::from_xy(&[(1.0, 1.0), (1.0, 9.0), (9.0, 9.0), (9.0, 1.0), (1.0, 1.0)]);
        let donut = Polygon::new(outer, vec![hole]);
        let p = interior_point(&donut).unwrap();
        assert_eq!(polygon_position(&donut, &p), Position::Inside);
    }

    #[test]
    fn test_degenerate_ring_has_no_interior() {
        let flat = Polygon::new(
            LineString::from_xy(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 0.0)]),
            Vec::new(),
        );
        assert!(interior_point(&flat).is_none());
    }

    #[test]
    fn test_triangulate_counts() {
        let square = Polygon::new(
            LineString::from_xy(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]),
            Vec::new(),
        );
        let (points, indices) = triangulate(&square).unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(indices.len(), 6);
    }
}
