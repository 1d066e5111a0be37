// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry import: inserting points, lines and polygons as primitives.
//!
//! Lines are noded against the existing topology before insertion: every
//! place where they meet a node, cross or touch an edge, or cross
//! themselves becomes a node, and the pieces between consecutive nodes
//! become edges. Long lines and rings are cut beforehand so that no single
//! edge or face grows past the configured point thresholds.

use planar_topo_geometry::{
    distance_to_line, interior_point, intersect_segments, line_intersections, locate_point,
    polygon_position, project_on_segment, split_line_by_points, Coord, Covers, Geometry,
    LineString, Polygon, Position, SegmentIntersection, Shape,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::engine::TopoEngine;
use crate::error::{Error, Result};
use crate::keys::{EdgeId, FaceId, NodeId, UNIVERSAL_FACE};
use crate::store::TopoStore;

/// Primitives produced by a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub faces: Vec<FaceId>,
}

/// Decomposition of an oversized ring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RingSplit {
    /// Consecutive pieces of the ring itself.
    pub outer: Vec<LineString>,
    /// Straight chords between piece end points, inside the ring.
    pub inner: Vec<LineString>,
}

/// Cuts a closed ring into pieces of at most about `max_points` vertices
/// and picks up to `cap` chords that subdivide the enclosed area.
///
/// Chords are taken longest first between non-adjacent piece end points,
/// at most two per end point. A chord must be covered by the ring polygon,
/// pass through its interior and not cross an already confirmed chord.
pub fn plan_ring_split(ring: &LineString, max_points: usize, cap: usize) -> Result<RingSplit> {
    if ring.len() < 4 || !ring.is_closed() {
        return Err(Error::InvalidGeometry("ring must be closed with at least 4 points".into()));
    }
    let outer = split_line_by_points(ring, max_points)?;
    let mut nodes: Vec<Coord> = outer.iter().filter_map(|piece| piece.first()).collect();
    if nodes.len() > 1 && nodes.first().zip(nodes.last()).is_some_and(|(a, b)| a.same_xy(b)) {
        nodes.pop();
    }
    let k = nodes.len();

    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for i in 0..k {
        for j in (i + 1)..k {
            let adjacent = j == i + 1 || (i == 0 && j == k - 1);
            if !adjacent {
                candidates.push((nodes[i].distance(&nodes[j]), i, j));
            }
        }
    }
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then((a.1, a.2).cmp(&(b.1, b.2))));

    let covers = Covers::new(&Polygon::new(ring.clone(), Vec::new()));
    let mut used = vec![0u8; k];
    let mut confirmed: Vec<(usize, usize)> = Vec::new();
    for (_, i, j) in candidates {
        if confirmed.len() >= cap {
            break;
        }
        if used[i] >= 2 || used[j] >= 2 {
            continue;
        }
        let (a, b) = (nodes[i], nodes[j]);
        if !covers.covers_segment(&a, &b) || !covers.contains_coord(&Coord::lerp(&a, &b, 0.5)) {
            continue;
        }
        let crosses = confirmed.iter().any(|&(p, q)| {
            match intersect_segments(&a, &b, &nodes[p], &nodes[q]) {
                None => false,
                Some(SegmentIntersection::Point(_)) if [p, q].contains(&i) || [p, q].contains(&j) => {
                    false
                }
                Some(_) => true,
            }
        });
        if crosses {
            continue;
        }
        used[i] += 1;
        used[j] += 1;
        confirmed.push((i, j));
    }

    let inner = confirmed
        .into_iter()
        .map(|(i, j)| LineString::new(vec![nodes[i], nodes[j]]))
        .collect();
    Ok(RingSplit { outer, inner })
}

/// Fractional position of `p` along segment `seg` of `line`.
fn position_on(line: &LineString, seg: usize, p: &Coord) -> f64 {
    let (a, b) = (line.coords[seg], line.coords[seg + 1]);
    seg as f64 + project_on_segment(p, &a, &b).0
}

/// A vertex of the noded line; `node` is set at cut points.
#[derive(Debug, Clone, Copy)]
struct Vertex {
    position: f64,
    point: Coord,
    node: Option<NodeId>,
}

impl<S: TopoStore> TopoEngine<S> {
    /// Inserts a point, reusing a node or splitting an edge within
    /// snapping distance.
    pub fn add_point(&self, p: &Coord) -> Result<NodeId> {
        if let Some(node) = self.node_near(p, None)? {
            return Ok(node.id);
        }
        if let Some(edge) = self.edge_near(p)? {
            let at = locate_point(&edge.geom, p)
                .map(|loc| loc.point)
                .unwrap_or(*p);
            return self.mod_edge_split(edge.id, &at);
        }
        self.add_iso_node(None, p)
    }

    /// Inserts a line, noding it against the existing primitives.
    ///
    /// Returns the ids of the edges the line is made of, reused or new, in
    /// line order.
    pub fn add_line(&self, line: &LineString) -> Result<Vec<EdgeId>> {
        let line = line.dedup();
        let (Some(first), Some(last), Some(bbox)) = (line.first(), line.last(), line.bbox()) else {
            return Err(Error::InvalidGeometry("line needs at least 2 distinct points".into()));
        };
        if line.len() < 2 {
            return Err(Error::InvalidGeometry("line needs at least 2 distinct points".into()));
        }
        let last_index = (line.len() - 1) as f64;

        let mut cuts: Vec<(f64, Coord)> = vec![(0.0, first), (last_index, last)];
        let reach = bbox.buffered(self.tolerance_at(&first).max(self.tolerance_at(&last)));
        for node in self.store().nodes_in_box(&reach)? {
            if let Some(loc) = locate_point(&line, &node.point) {
                if loc.distance <= self.tolerance_at(&node.point) {
                    cuts.push((loc.position(), node.point));
                }
            }
        }
        for edge in self.store().edges_in_box(&reach)? {
            for (i, _, hit) in line_intersections(&line, &edge.geom) {
                match hit {
                    SegmentIntersection::Point(p) => cuts.push((position_on(&line, i, &p), p)),
                    SegmentIntersection::Overlap(p, q) => {
                        cuts.push((position_on(&line, i, &p), p));
                        cuts.push((position_on(&line, i, &q), q));
                    }
                }
            }
            for (k, v) in line.coords.iter().enumerate() {
                if distance_to_line(v, &edge.geom) <= self.tolerance_at(v) {
                    cuts.push((k as f64, *v));
                }
            }
        }
        let segments = line.len() - 1;
        for (i, j, hit) in line_intersections(&line, &line) {
            let adjacent = j == i + 1 || (line.is_closed() && i == 0 && j + 1 == segments);
            if j <= i || adjacent {
                continue;
            }
            let points = match hit {
                SegmentIntersection::Point(p) => vec![p],
                SegmentIntersection::Overlap(p, q) => vec![p, q],
            };
            for p in points {
                cuts.push((position_on(&line, i, &p), p));
                cuts.push((position_on(&line, j, &p), p));
            }
        }
        cuts.sort_by(|a, b| a.0.total_cmp(&b.0));
        cuts.dedup_by(|b, a| b.0 == a.0);

        let mut vertices: Vec<Vertex> = Vec::with_capacity(line.len() + cuts.len());
        for (position, p) in cuts {
            let id = self.add_point(&p)?;
            let point = self.node(id)?.point;
            vertices.push(Vertex {
                position,
                point,
                node: Some(id),
            });
        }
        for (k, c) in line.coords.iter().enumerate() {
            let position = k as f64;
            if !vertices.iter().any(|v| v.node.is_some() && v.position == position) {
                vertices.push(Vertex {
                    position,
                    point: *c,
                    node: None,
                });
            }
        }
        vertices.sort_by(|a, b| {
            a.position
                .total_cmp(&b.position)
                .then(b.node.is_some().cmp(&a.node.is_some()))
        });
        let mut noded: Vec<Vertex> = Vec::with_capacity(vertices.len());
        for v in vertices {
            match noded.last_mut() {
                Some(prev) if prev.point.same_xy(&v.point) => {
                    if prev.node.is_none() {
                        prev.node = v.node;
                    }
                }
                _ => noded.push(v),
            }
        }

        let mut edges: Vec<EdgeId> = Vec::new();
        let mut piece: Vec<Coord> = Vec::new();
        let mut from: Option<NodeId> = None;
        for v in &noded {
            piece.push(v.point);
            let Some(node) = v.node else {
                continue;
            };
            if let Some(start) = from {
                let geom = LineString::new(std::mem::take(&mut piece));
                if let Some(edge) = self.insert_piece(start, node, geom)? {
                    if !edges.contains(&edge) {
                        edges.push(edge);
                    }
                }
            }
            piece = vec![v.point];
            from = Some(node);
        }
        debug!(edges = edges.len(), "add line");
        Ok(edges)
    }

    /// Adds one noded piece, or finds the existing edge with its shape.
    fn insert_piece(&self, start: NodeId, end: NodeId, geom: LineString) -> Result<Option<EdgeId>> {
        if geom.len() < 2 || (start == end && geom.len() < 4) {
            return Ok(None);
        }
        for edge in self.store().edges_by_node(start)? {
            let joins = (edge.start_node == start && edge.end_node == end)
                || (edge.start_node == end && edge.end_node == start);
            if !joins {
                continue;
            }
            let along = |a: &LineString, b: &LineString| {
                a.coords.iter().all(|c| distance_to_line(c, b) <= self.tolerance_at(c))
            };
            if edge.geom.same_shape(&geom) || (along(&geom, &edge.geom) && along(&edge.geom, &geom)) {
                return Ok(Some(edge.id));
            }
        }
        self.add_edge_mod_face(start, end, &geom).map(Some)
    }

    /// Inserts the rings of a polygon and returns the faces it covers.
    pub fn add_polygon(&self, polygon: &Polygon) -> Result<Vec<FaceId>> {
        for ring in polygon.rings() {
            self.add_line(ring)?;
        }
        self.faces_covered(polygon)
    }

    /// Bounded faces whose interior point lies inside `polygon`.
    pub(crate) fn faces_covered(&self, polygon: &Polygon) -> Result<Vec<FaceId>> {
        let Some(bbox) = polygon.bbox() else {
            return Ok(Vec::new());
        };
        let mut faces = Vec::new();
        for face in self.store().faces_in_box(&bbox)? {
            if face == UNIVERSAL_FACE {
                continue;
            }
            let geom = match self.face_geometry(face) {
                Ok(geom) => geom,
                Err(Error::NoGeometry(_)) => continue,
                Err(e) => return Err(e),
            };
            let inside = geom
                .bbox()
                .is_some_and(|b| bbox.intersects(&b))
                && interior_point(&geom).is_some_and(|p| polygon_position(polygon, &p) == Position::Inside);
            if inside {
                faces.push(face);
            }
        }
        faces.sort_unstable();
        Ok(faces)
    }

    /// Bulk import of any supported geometry.
    ///
    /// Lines and rings above the configured thresholds are cut first. The
    /// first failing sub-insertion aborts the import with
    /// [`Error::ImportFailed`].
    pub fn import_geometry(&self, geometry: &Geometry) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        match &geometry.shape {
            Shape::Point(p) => summary.nodes.push(self.add_point(p).map_err(Error::import_failed)?),
            Shape::MultiPoint(points) => {
                for p in points {
                    summary.nodes.push(self.add_point(p).map_err(Error::import_failed)?);
                }
            }
            Shape::LineString(line) => self.import_line(line, &mut summary)?,
            Shape::MultiLineString(lines) => {
                for line in lines {
                    self.import_line(line, &mut summary)?;
                }
            }
            Shape::Polygon(polygon) => self.import_polygon(polygon, &mut summary)?,
            Shape::MultiPolygon(polygons) => {
                for polygon in polygons {
                    self.import_polygon(polygon, &mut summary)?;
                }
            }
        }
        info!(
            kind = %geometry.kind(),
            nodes = summary.nodes.len(),
            edges = summary.edges.len(),
            faces = summary.faces.len(),
            "import geometry"
        );
        Ok(summary)
    }

    fn import_line(&self, line: &LineString, summary: &mut ImportSummary) -> Result<()> {
        let pieces = match self.settings().line_max_points {
            Some(max) if line.len() > max => {
                split_line_by_points(line, max).map_err(|e| Error::import_failed(e.into()))?
            }
            _ => vec![line.clone()],
        };
        for piece in &pieces {
            let edges = self.add_line(piece).map_err(Error::import_failed)?;
            extend_unique(&mut summary.edges, edges);
        }
        Ok(())
    }

    fn import_polygon(&self, polygon: &Polygon, summary: &mut ImportSummary) -> Result<()> {
        for ring in polygon.rings() {
            let lines = match self.settings().ring_max_points {
                Some(max) if ring.len() > max => {
                    let plan = plan_ring_split(ring, max, self.settings().max_inner_edges)
                        .map_err(Error::import_failed)?;
                    debug!(outer = plan.outer.len(), inner = plan.inner.len(), "split ring");
                    plan.inner.into_iter().chain(plan.outer).collect()
                }
                _ => vec![ring.clone()],
            };
            for line in &lines {
                let edges = self.add_line(line).map_err(Error::import_failed)?;
                extend_unique(&mut summary.edges, edges);
            }
        }
        let faces = self.faces_covered(polygon).map_err(Error::import_failed)?;
        extend_unique(&mut summary.faces, faces);
        Ok(())
    }
}

fn extend_unique<T: PartialEq>(into: &mut Vec<T>, items: Vec<T>) {
    for item in items {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Fixture;
    use approx::assert_relative_eq;

    fn square_ring(n_per_side: usize, size: f64) -> LineString {
        let mut coords = Vec::new();
        let step = size / n_per_side as f64;
        for i in 0..n_per_side {
            coords.push(Coord::new(i as f64 * step, 0.0));
        }
        for i in 0..n_per_side {
            coords.push(Coord::new(size, i as f64 * step));
        }
        for i in 0..n_per_side {
            coords.push(Coord::new(size - i as f64 * step, size));
        }
        for i in 0..n_per_side {
            coords.push(Coord::new(0.0, size - i as f64 * step));
        }
        coords.push(Coord::new(0.0, 0.0));
        LineString::new(coords)
    }

    #[test]
    fn ring_split_respects_cap_and_coverage() {
        let ring = square_ring(4, 8.0);
        let plan = plan_ring_split(&ring, 3, 8).unwrap();
        assert!(plan.outer.len() > 2);
        assert!(!plan.inner.is_empty());
        assert!(plan.inner.len() <= 8);
        let covers = Covers::new(&Polygon::new(ring.clone(), Vec::new()));
        for chord in &plan.inner {
            let (a, b) = (chord.coords[0], chord.coords[1]);
            assert!(covers.covers_segment(&a, &b));
        }
        let capped = plan_ring_split(&ring, 3, 1).unwrap();
        assert_eq!(capped.inner.len(), 1);
        // the kept chord is the longest: a diagonal of the square
        assert_relative_eq!(capped.inner[0].length(), 8.0 * 2f64.sqrt());
    }

    #[test]
    fn concave_rings_reject_outside_chords() {
        // an L shape: the chord between the two arm tips leaves the polygon
        let ring = LineString::from_xy(&[
            (0.0, 0.0),
            (4.0, 0.0),
            (4.0, 1.0),
            (1.0, 1.0),
            (1.0, 4.0),
            (0.0, 4.0),
            (0.0, 0.0),
        ]);
        let plan = plan_ring_split(&ring, 2, 8).unwrap();
        let covers = Covers::new(&Polygon::new(ring.clone(), Vec::new()));
        for chord in &plan.inner {
            assert!(covers.covers_segment(&chord.coords[0], &chord.coords[1]));
        }
        assert!(plan
            .inner
            .iter()
            .all(|c| !(c.coords.contains(&Coord::new(4.0, 1.0)) && c.coords.contains(&Coord::new(1.0, 4.0)))));
    }

    #[test]
    fn points_snap_to_nodes_and_edges() {
        let fx = Fixture::new(0.5);
        let engine = fx.engine();
        let a = engine.add_point(&Coord::new(0.0, 0.0)).unwrap();
        assert_eq!(engine.add_point(&Coord::new(0.2, 0.2)).unwrap(), a);
        let edges = engine.add_line(&LineString::from_xy(&[(0.0, 0.0), (10.0, 0.0)])).unwrap();
        assert_eq!(edges.len(), 1);
        let mid = engine.add_point(&Coord::new(5.0, 0.3)).unwrap();
        assert_eq!(engine.node(mid).unwrap().point, Coord::new(5.0, 0.0));
        assert_eq!(fx.count("edge"), 2);
    }

    #[test]
    fn crossing_lines_are_noded() {
        let fx = Fixture::new(0.0);
        let engine = fx.engine();
        engine.add_line(&LineString::from_xy(&[(0.0, 0.0), (10.0, 0.0)])).unwrap();
        let edges = engine
            .add_line(&LineString::from_xy(&[(5.0, -5.0), (5.0, 5.0)]))
            .unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(fx.count("edge"), 4);
        assert_eq!(fx.count("node"), 5);
        // inserting the same line again reuses its edges
        let again = engine
            .add_line(&LineString::from_xy(&[(5.0, 5.0), (5.0, -5.0)]))
            .unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(fx.count("edge"), 4);
    }

    #[test]
    fn polygon_import_reports_faces() {
        let fx = Fixture::new(0.0);
        let engine = fx.engine();
        let polygon = Polygon::new(square_ring(1, 4.0), Vec::new());
        let faces = engine.add_polygon(&polygon).unwrap();
        assert_eq!(faces, vec![1]);
        assert_relative_eq!(engine.face_geometry(1).unwrap().area(), 16.0);
    }
}
